//! String helpers shared by the extractors: whitespace cleanup, markup
//! stripping, label folding and identifier cleanup.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum length (in characters) of index labels and identifiers.
pub const MAX_LABEL_CHARS: usize = 256;

const IDENTIFIER_EXTENSIONS: &[&str] = &[".xml", ".pdf", ".csv"];

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

/// Collapse every run of whitespace to one space, keeping a leading or
/// trailing space so inline fragments still join with a separator.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// Collapse runs of whitespace to a single space and trim.
pub fn clean(text: &str) -> String {
    collapse_whitespace(text).trim().to_string()
}

/// `clean`, returning `None` for blank input.
pub fn clean_opt(text: &str) -> Option<String> {
    let cleaned = clean(text);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Drop anything that looks like an HTML/XML tag.
pub fn remove_html_tags(text: &str) -> String {
    markup_re().replace_all(text, " ").into_owned()
}

/// Truncate to `max` characters. The flag reports whether anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Strip a trailing `.xml`/`.pdf`/`.csv` suffix (case-insensitive) and
/// truncate to [`MAX_LABEL_CHARS`].
pub fn clean_identifier(value: &str) -> String {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    let stem = IDENTIFIER_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &trimmed[..trimmed.len() - ext.len()])
        .unwrap_or(trimmed);
    truncate_chars(stem, MAX_LABEL_CHARS).0
}

/// Fold an index label for comparison: punctuation becomes whitespace,
/// diacritics and ligatures are folded to ASCII, case is lowered and
/// whitespace collapsed.
pub fn normalize_entry(label: &str) -> String {
    let mut folded = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_alphanumeric() {
            match fold_char(c) {
                Some(ascii) => folded.push_str(ascii),
                None => folded.extend(c.to_lowercase()),
            }
        } else {
            folded.push(' ');
        }
    }
    clean(&folded.to_lowercase())
}

fn fold_char(c: char) -> Option<&'static str> {
    let s = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ą' => "a",
        'æ' | 'Æ' => "ae",
        'ç' | 'ć' | 'č' | 'Ç' | 'Ć' | 'Č' => "c",
        'ď' | 'đ' | 'Ď' | 'Đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "i",
        'ł' | 'Ł' => "l",
        'ñ' | 'ń' | 'ň' | 'Ñ' | 'Ń' | 'Ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' => "o",
        'œ' | 'Œ' => "oe",
        'ř' | 'Ř' => "r",
        'ś' | 'š' | 'ş' | 'Ś' | 'Š' | 'Ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' | 'Ť' | 'Ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' => "u",
        'ý' | 'ÿ' | 'Ý' | 'Ÿ' => "y",
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => "z",
        _ => return None,
    };
    Some(s)
}
