//! Year-range parsing for `unitdate` values and date fields of search
//! documents.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Years above this bound are treated as typing noise.
pub const MAX_PLAUSIBLE_YEAR: i32 = 2100;

/// `{start, stop}` years of a record. Both `None` when nothing parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: Option<i32>,
    pub stop: Option<i32>,
}

impl YearRange {
    pub fn new(start: Option<i32>, stop: Option<i32>) -> Self {
        YearRange { start, stop }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.stop.is_none()
    }
}

fn range_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 1850/01/01 - 1860/12/31
            r"^\s*(?P<start>\d{2,4})/\d{1,2}/\d{1,2}\s*-\s*(?P<stop>\d{2,4})/\d{1,2}/\d{1,2}\s*$",
            // 1850-01-01/1860-12-31
            r"^\s*(?P<start>\d{2,4})-\d{1,2}-\d{1,2}\s*/\s*(?P<stop>\d{2,4})-\d{1,2}-\d{1,2}\s*$",
            // 1850-1860, 1850/1860
            r"^\s*(?P<start>\d{2,4})\s*[/-]\s*(?P<stop>\d{2,4})\s*$",
            // 1850
            r"^\s*(?P<start>\d{2,4})\s*$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn plausible(year: Option<i32>) -> Option<i32> {
    year.filter(|y| *y <= MAX_PLAUSIBLE_YEAR)
}

/// Parse one of the four accepted range shapes.
///
/// Implausible years are dropped, a missing bound takes the value of the
/// other one and `stop` is raised to `start` when the range is inverted.
/// Never fails: unrecognised input gives an empty range.
pub fn parse_daterange(value: &str) -> YearRange {
    for re in range_patterns() {
        if let Some(caps) = re.captures(value) {
            let start = plausible(caps.name("start").and_then(|m| m.as_str().parse().ok()));
            let stop = plausible(caps.name("stop").and_then(|m| m.as_str().parse().ok()));
            let (start, stop) = match (start, stop) {
                (Some(a), Some(b)) if a > b => (Some(a), Some(a)),
                (Some(a), None) => (Some(a), Some(a)),
                (None, Some(b)) => (Some(b), Some(b)),
                other => other,
            };
            return YearRange::new(start, stop);
        }
    }
    YearRange::default()
}

/// Parse a `unitdate`: the `normal` attribute wins, the element text is
/// tried when the attribute is absent or unparsable.
pub fn parse_unitdate(normal: Option<&str>, text: Option<&str>) -> YearRange {
    for candidate in [normal, text].into_iter().flatten() {
        let range = parse_daterange(candidate);
        if !range.is_empty() {
            return range;
        }
    }
    YearRange::default()
}

/// Year accepted in search documents: below 1000 is ignored, five digits
/// and more keep their first four, 2050 and later is ignored.
pub fn search_year(year: Option<i32>) -> Option<i32> {
    let year = year?;
    if year < 1000 {
        return None;
    }
    let year = if year >= 10_000 {
        year.to_string()[..4].parse().ok()?
    } else {
        year
    };
    if year < 2050 {
        Some(year)
    } else {
        None
    }
}

/// Date fields of a search document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDates {
    pub year: i32,
    pub sortdate: String,
    pub dates: DateBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub gte: i32,
    pub lte: i32,
}

/// Project a record's range onto search-document date fields.
///
/// `context` is only used to label the error logged for inverted ranges.
pub fn search_dates(range: &YearRange, context: &str) -> Option<SearchDates> {
    let start = search_year(range.start);
    let stop = search_year(range.stop);
    let (gte, lte) = match (start, stop) {
        (Some(a), Some(b)) if a > b => {
            tracing::error!(start = a, stop = b, "{}: start year after stop year", context);
            return None;
        }
        (Some(a), Some(b)) => (a, b),
        (Some(a), None) => (a, a),
        (None, Some(b)) => (b, b),
        (None, None) => return None,
    };
    Some(SearchDates {
        year: gte,
        sortdate: format!("{}-01-01", gte),
        dates: DateBounds { gte, lte },
    })
}
