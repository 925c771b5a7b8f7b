//! Index-entry collection: controlled-vocabulary terms (persons, places,
//! subjects, ...) and originators attached to a record.
//!
//! Entries are gathered from fixed zones of a record's subtree, cleaned,
//! folded into a `normalized` comparison key and deduplicated. Two keys
//! are available:
//!
//! - [`DedupKey::Normalized`] collapses spelling variants
//!   (`Paris` / `paris` → one entry);
//! - [`DedupKey::Label`] keeps them, and is the mode used whenever entries
//!   inherited from ancestors are merged into a component.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::text::{clean, normalize_entry, remove_html_tags, truncate_chars, MAX_LABEL_CHARS};
use crate::xml::Node;

/// Element names that produce index entries.
pub const INDEX_TYPES: &[&str] = &[
    "persname",
    "corpname",
    "famname",
    "name",
    "geogname",
    "subject",
    "function",
    "genreform",
    "occupation",
];

/// Types whose `normal` attribute, when present, is the preferred label.
const NORMAL_ATTR_TYPES: &[&str] = &[
    "corpname", "famname", "name", "persname", "geogname", "genreform", "subject",
];

/// Types accepted inside `origination`.
const ORIGINATION_TYPES: &[&str] = &["persname", "corpname", "geogname", "subject", "famname", "name"];

const ROOT_ZONES: &[&str] = &[
    "controlaccess/",
    "did/unittitle/",
    "bioghist/",
    "bioghist/p/",
    "scopecontent/",
    "scopecontent/p/",
];

const COMPONENT_ZONES: &[&str] = &[
    "controlaccess//",
    "did/unittitle//",
    "bioghist//",
    "scopecontent//",
];

pub const INDEX_ROLE: &str = "index";
pub const DEFAULT_ORIGINATION_ROLE: &str = "originator";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub normalized: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authfilenumber: Option<String>,
    /// Opaque reference owned by the authority resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

impl IndexEntry {
    /// Build an entry from a raw label. `None` when the cleaned label is
    /// empty; over-long labels are truncated with a warning.
    pub fn new(kind: &str, raw_label: &str, role: &str) -> Option<Self> {
        let label = clean(&remove_html_tags(raw_label));
        if label.is_empty() {
            return None;
        }
        let (label, truncated) = truncate_chars(&label, MAX_LABEL_CHARS);
        if truncated {
            tracing::warn!(kind, "index label truncated to {} characters: {}", MAX_LABEL_CHARS, label);
        }
        Some(IndexEntry {
            kind: kind.to_string(),
            normalized: normalize_entry(&label),
            label,
            role: role.to_string(),
            authfilenumber: None,
            authority: None,
        })
    }
}

/// Which fields make two entries "the same".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupKey {
    /// `(type, normalized)`
    Normalized,
    /// `(type, label)`
    Label,
}

/// Keep the first entry of every key, preserving order.
pub fn unique_entries<I>(entries: I, key: DedupKey) -> Vec<IndexEntry>
where
    I: IntoIterator<Item = IndexEntry>,
{
    let mut seen: HashSet<(String, String)> = HashSet::new();
    entries
        .into_iter()
        .filter(|e| {
            let k = match key {
                DedupKey::Normalized => (e.kind.clone(), e.normalized.clone()),
                DedupKey::Label => (e.kind.clone(), e.label.clone()),
            };
            seen.insert(k)
        })
        .collect()
}

/// Where in the hierarchy a record sits; decides which zones are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Root,
    Component,
}

fn entry_from_node(node: &Node<'_>, role: &str) -> Option<IndexEntry> {
    let kind = node.tag();
    let text = node.text();
    let raw = match node.attr_nonempty("normal") {
        Some(normal) if NORMAL_ATTR_TYPES.contains(&kind) => normal,
        _ => text.as_str(),
    };
    let mut entry = IndexEntry::new(kind, raw, role)?;
    entry.authfilenumber = node.attr_nonempty("authfilenumber").map(str::to_string);
    Some(entry)
}

/// Index entries of a record (`archdesc` or a component element),
/// deduplicated with the strict key.
pub fn collect_index_entries(record: &Node<'_>, level: Level) -> Vec<IndexEntry> {
    let mut nodes: Vec<Node<'_>> = Vec::new();
    let zones = match level {
        Level::Root => ROOT_ZONES,
        Level::Component => COMPONENT_ZONES,
    };
    for zone in zones {
        for kind in INDEX_TYPES {
            nodes.extend(record.select(&format!("{}{}", zone, kind)));
        }
    }
    let genreform_path = match level {
        Level::Root => "did/physdesc/genreform",
        Level::Component => "did/physdesc//genreform",
    };
    nodes.extend(record.select(genreform_path));

    nodes.sort_by_key(|n| n.id());
    nodes.dedup_by_key(|n| n.id());

    let entries = nodes
        .iter()
        .filter(|n| !(n.tag() == "geogname" && n.has_ancestor("imprint")))
        .filter_map(|n| entry_from_node(n, INDEX_ROLE));
    unique_entries(entries, DedupKey::Normalized)
}

/// Originators declared in `did/origination`, with the role taken from the
/// origination's `label` (lowercased, default `originator`).
pub fn collect_origination(record: &Node<'_>) -> Vec<IndexEntry> {
    let mut out = Vec::new();
    for origination in record.select("did/origination") {
        let role = origination
            .attr_nonempty("label")
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| DEFAULT_ORIGINATION_ROLE.to_string());
        for child in origination.elements() {
            if ORIGINATION_TYPES.contains(&child.tag()) {
                out.extend(entry_from_node(&child, &role));
            }
        }
    }
    unique_entries(out, DedupKey::Normalized)
}

/// Merge entries inherited from the ancestors with a component's own
/// entries, keeping spelling variants apart.
pub fn merge_inherited(inherited: &[IndexEntry], own: Vec<IndexEntry>) -> Vec<IndexEntry> {
    unique_entries(inherited.iter().cloned().chain(own), DedupKey::Label)
}
