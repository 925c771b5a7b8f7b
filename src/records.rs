//! Record builder: turns a normalized tree into one [`RootRecord`] and its
//! [`ComponentRecord`]s, in creation order (root first, then components
//! depth-first), with stable identifiers assigned from content and
//! position.

use chrono::{DateTime, Utc};

use crate::dao::DaoResolver;
use crate::error::ImportError;
use crate::extract::UNTITLED;
use crate::ids::{component_stable_id, root_stable_id};
use crate::index_entries::{unique_entries, DedupKey, IndexEntry};
use crate::models::{ComponentRecord, RootRecord, SearchDocument, ServiceInfo};
use crate::reader::FindingAidReader;
use crate::text::clean_identifier;
use crate::xml::XmlTree;

/// Per-file inputs of the builder.
pub struct BuildContext<'a> {
    /// File base name; `None` when the document does not come from a file.
    pub import_name: Option<&'a str>,
    pub service: &'a ServiceInfo,
    pub resolver: &'a DaoResolver,
    pub source_file: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BuiltFindingAid {
    pub root: RootRecord,
    /// Depth-first pre-order; parents always precede their children.
    pub components: Vec<ComponentRecord>,
}

impl BuiltFindingAid {
    /// Every stable identifier of the tree, root first.
    pub fn stable_ids(&self) -> Vec<String> {
        std::iter::once(self.root.stable_id.clone())
            .chain(self.components.iter().map(|c| c.stable_id.clone()))
            .collect()
    }

    /// One search document per record, in creation order.
    pub fn search_documents(&self, service: &ServiceInfo) -> Vec<SearchDocument> {
        std::iter::once(SearchDocument::from_root(&self.root, service))
            .chain(
                self.components
                    .iter()
                    .map(|c| SearchDocument::from_component(c, &self.root, service)),
            )
            .collect()
    }
}

/// Stored entries: originators first, then index terms, keeping variants.
fn stored_entries(origination: Vec<IndexEntry>, entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    unique_entries(origination.into_iter().chain(entries), DedupKey::Label)
}

pub fn build_finding_aid(
    tree: &XmlTree,
    ctx: &BuildContext<'_>,
) -> Result<BuiltFindingAid, ImportError> {
    let reader = FindingAidReader::new(tree, ctx.resolver)?;
    let header = reader.header();

    let eadid = header
        .eadid
        .as_deref()
        .or(ctx.import_name)
        .map(clean_identifier)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ImportError::InvalidFindingAid("neither a file name nor an eadid".to_string())
        })?;
    let name = ctx
        .import_name
        .map(str::to_string)
        .unwrap_or_else(|| eadid.clone());
    let stable_id = root_stable_id(&name);

    let props = reader.root_props();
    let nodes = reader.components(&props);

    let mut identity = props.identity;
    identity.title.get_or_insert_with(|| UNTITLED.to_string());
    let mut daos = props.daos;
    ctx.resolver.apply_provider_rules(&eadid, &mut daos);

    let originators = props
        .origination
        .iter()
        .map(|e| e.label.clone())
        .collect();

    let root = RootRecord {
        stable_id: stable_id.clone(),
        name,
        eadid: eadid.clone(),
        fatype: props.fatype,
        service_code: ctx.service.code.clone(),
        header,
        identity,
        text: props.text,
        originators,
        index_entries: stored_entries(props.origination, props.index_entries),
        digitized_versions: daos,
        source_file: ctx.source_file.clone(),
        content_hash: ctx.content_hash.clone(),
        artifact_path: None,
        created_at: ctx.created_at,
    };

    let components = nodes
        .into_iter()
        .map(|node| {
            let parent_stable_id = match node.path.len() {
                0 | 1 => None,
                n => Some(component_stable_id(&stable_id, &node.path[..n - 1])),
            };
            let mut identity = node.identity;
            identity.title.get_or_insert_with(|| UNTITLED.to_string());
            let mut daos = node.daos;
            ctx.resolver.apply_provider_rules(&eadid, &mut daos);
            ComponentRecord {
                stable_id: component_stable_id(&stable_id, &node.path),
                root_stable_id: stable_id.clone(),
                parent_stable_id,
                order: node.path.last().copied().unwrap_or(0),
                path: node.path,
                component_id: node.component_id,
                identity,
                text: node.text,
                index_entries: stored_entries(node.origination, node.index_entries),
                digitized_versions: daos,
                created_at: ctx.created_at,
            }
        })
        .collect();

    Ok(BuiltFindingAid { root, components })
}
