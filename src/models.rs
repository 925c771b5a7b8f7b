//! Records produced by an import and their search-index projection.
//!
//! A file yields one [`RootRecord`] and a tree of [`ComponentRecord`]s.
//! Components refer to their parent by stable identifier only; the tree is
//! an arena keyed by those identifiers, never a graph of references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dao::DigitizedVersion;
use crate::dates::{search_dates, SearchDates};
use crate::extract::{DescriptiveText, HeaderInfo, Identity};
use crate::index_entries::{unique_entries, DedupKey, IndexEntry};
use crate::text::{clean, remove_html_tags};

/// Search category shared by every archival record.
pub const ARCHIVES_CATEGORY: &str = "archives";

/// Provider (archive service) a file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub code: String,
    pub name: String,
    pub title: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    FindingAid,
    Component,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::FindingAid => "finding_aid",
            RecordKind::Component => "component",
        }
    }

    pub fn category(&self) -> &'static str {
        ARCHIVES_CATEGORY
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootRecord {
    pub stable_id: String,
    /// Import name: file base name, or the `eadid` without a file.
    pub name: String,
    pub eadid: String,
    pub fatype: Option<String>,
    pub service_code: String,
    pub header: HeaderInfo,
    pub identity: Identity,
    pub text: DescriptiveText,
    pub originators: Vec<String>,
    pub index_entries: Vec<IndexEntry>,
    pub digitized_versions: Vec<DigitizedVersion>,
    pub source_file: Option<String>,
    pub content_hash: Option<String>,
    pub artifact_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub stable_id: String,
    pub root_stable_id: String,
    pub parent_stable_id: Option<String>,
    pub path: Vec<usize>,
    pub order: usize,
    /// `id` attribute of the source element.
    pub component_id: Option<String>,
    pub identity: Identity,
    pub text: DescriptiveText,
    pub index_entries: Vec<IndexEntry>,
    pub digitized_versions: Vec<DigitizedVersion>,
    pub created_at: DateTime<Utc>,
}

/// Denormalized search-index document, keyed by `stable_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub stable_id: String,
    pub record_type: RecordKind,
    pub category: String,
    pub root_stable_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_stable_id: Option<String>,
    pub path: Vec<usize>,
    pub title: String,
    pub unitid: Option<String>,
    pub eadid: String,
    pub service_code: String,
    pub service_name: String,
    pub publisher: Option<String>,
    pub originators: Vec<String>,
    #[serde(flatten)]
    pub dates: Option<SearchDates>,
    pub index_entries: Vec<IndexEntry>,
    pub digitized: bool,
    pub scopecontent: Option<String>,
}

fn plain_text(html: Option<&str>) -> Option<String> {
    html.map(|h| clean(&remove_html_tags(h)))
        .filter(|t| !t.is_empty())
}

impl SearchDocument {
    pub fn from_root(root: &RootRecord, service: &ServiceInfo) -> Self {
        SearchDocument {
            stable_id: root.stable_id.clone(),
            record_type: RecordKind::FindingAid,
            category: RecordKind::FindingAid.category().to_string(),
            root_stable_id: root.stable_id.clone(),
            parent_stable_id: None,
            path: Vec::new(),
            title: root.identity.display_title().to_string(),
            unitid: root.identity.unitid.clone(),
            eadid: root.eadid.clone(),
            service_code: service.code.clone(),
            service_name: service.name.clone(),
            publisher: root.header.publisher.clone(),
            originators: root.originators.clone(),
            dates: search_dates(&root.identity.dates, &root.stable_id),
            index_entries: unique_entries(root.index_entries.iter().cloned(), DedupKey::Normalized),
            digitized: !root.digitized_versions.is_empty(),
            scopecontent: plain_text(root.text.scopecontent.as_deref()),
        }
    }

    pub fn from_component(
        component: &ComponentRecord,
        root: &RootRecord,
        service: &ServiceInfo,
    ) -> Self {
        SearchDocument {
            stable_id: component.stable_id.clone(),
            record_type: RecordKind::Component,
            category: RecordKind::Component.category().to_string(),
            root_stable_id: root.stable_id.clone(),
            parent_stable_id: component.parent_stable_id.clone(),
            path: component.path.clone(),
            title: component.identity.display_title().to_string(),
            unitid: component.identity.unitid.clone(),
            eadid: root.eadid.clone(),
            service_code: service.code.clone(),
            service_name: service.name.clone(),
            publisher: root.header.publisher.clone(),
            originators: root.originators.clone(),
            dates: search_dates(&component.identity.dates, &component.stable_id),
            index_entries: unique_entries(
                component.index_entries.iter().cloned(),
                DedupKey::Normalized,
            ),
            digitized: !component.digitized_versions.is_empty(),
            scopecontent: plain_text(component.text.scopecontent.as_deref()),
        }
    }
}
