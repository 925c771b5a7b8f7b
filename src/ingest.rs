//! Single-file import.
//!
//! [`import_one`] takes one finding aid file through the whole pipeline:
//! service resolution, reimport decision, normalization, record building,
//! replacement of a previous import, artifact rendering, authority
//! resolution and record creation. It writes through the caller's
//! [`RecordStore`] without committing; the batch layer owns transaction
//! boundaries, the artifact write and search indexing.
//!
//! Per-file states, logged at debug level:
//!
//! ```text
//! Parsing -> RootCreated -> ComponentsCreated -> Done
//!    \___________\________________\___________-> Failed
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use globset::GlobSet;

use crate::authority::{AuthorityResolver, Grouping};
use crate::config::Config;
use crate::dao::DaoResolver;
use crate::error::ImportError;
use crate::ids::{content_hash, root_stable_id};
use crate::models::{RecordKind, SearchDocument};
use crate::normalize::preprocess;
use crate::publish::{render_artifact, Artifact};
use crate::records::{build_finding_aid, BuildContext};
use crate::services::ServiceMap;
use crate::store::{NewRecord, RecordStore};

/// Everything a worker needs, built once per batch and shared read-only.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub services: ServiceMap,
    pub resolver: DaoResolver,
    pub reimport: bool,
    pub force_delete: bool,
    pub artifacts_dir: Option<PathBuf>,
    pub grouping: Grouping,
    pub workers: usize,
    pub synchronous: bool,
    pub batch_size: usize,
    /// Excludes applied while expanding directory arguments.
    pub exclude: GlobSet,
}

impl ImportContext {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(ImportContext {
            services: ServiceMap::from_config(&config.services),
            resolver: DaoResolver::new(&config.digitized, config.digitized.compile_rules()?),
            reimport: config.import.reimport,
            force_delete: config.import.force_delete,
            artifacts_dir: config.import.artifacts_dir.clone(),
            grouping: Grouping::parse(&config.import.authority_grouping)?,
            workers: config.import.effective_workers(),
            synchronous: config.import.synchronous,
            batch_size: config.search.batch_size,
            exclude: config.import.exclude_set()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Parsing,
    RootCreated,
    ComponentsCreated,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    /// Root plus `components` component records were created.
    Imported { components: usize },
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct FileImport {
    pub path: PathBuf,
    pub status: ImportStatus,
    pub root_stable_id: Option<String>,
    /// Search projection of every created record, root first.
    pub documents: Vec<SearchDocument>,
    /// Identifiers of a previous import that no longer exist.
    pub stale_ids: Vec<String>,
    /// Cleaned XML to write once the records are committed.
    pub artifact: Option<Artifact>,
}

impl FileImport {
    fn skipped(path: &Path, reason: impl Into<String>) -> Self {
        FileImport {
            path: path.to_path_buf(),
            status: ImportStatus::Skipped(reason.into()),
            root_stable_id: None,
            documents: Vec::new(),
            stale_ids: Vec::new(),
            artifact: None,
        }
    }
}

pub fn is_xml_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false)
}

fn log_state(path: &Path, state: FileState) {
    tracing::debug!(path = %path.display(), ?state, "file state");
}

/// Import one file. Any error leaves the store transaction dirty; the
/// caller must roll it back.
pub async fn import_one(
    path: &Path,
    ctx: &ImportContext,
    store: &mut dyn RecordStore,
    authorities: &mut dyn AuthorityResolver,
) -> Result<FileImport> {
    let result = run_file(path, ctx, store, authorities).await;
    if result.is_err() {
        log_state(path, FileState::Failed);
    }
    result
}

async fn run_file(
    path: &Path,
    ctx: &ImportContext,
    store: &mut dyn RecordStore,
    authorities: &mut dyn AuthorityResolver,
) -> Result<FileImport> {
    if !is_xml_file(path) {
        tracing::warn!(path = %path.display(), "not an .xml file, skipped");
        return Ok(FileImport::skipped(path, "not an .xml file"));
    }
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("no file name in {}", path.display()))?;

    let service = ctx.services.resolve(path);
    let stable_id = root_stable_id(&basename);
    let existing = store
        .find_by_key(RecordKind::FindingAid, &stable_id)
        .await?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(ImportError::from)
        .with_context(|| format!("reading {}", path.display()))?;
    let hash = content_hash(&bytes);

    if let Some(previous) = &existing {
        if !ctx.reimport {
            tracing::info!(path = %path.display(), "already imported, skipped");
            return Ok(FileImport::skipped(path, "already imported"));
        }
        if !ctx.force_delete && previous.content_hash.as_deref() == Some(hash.as_str()) {
            tracing::info!(path = %path.display(), "unchanged since last import, skipped");
            return Ok(FileImport::skipped(path, "unchanged"));
        }
    }

    log_state(path, FileState::Parsing);
    let tree = preprocess(&bytes)?;
    let build_ctx = BuildContext {
        import_name: Some(&basename),
        service: &service,
        resolver: &ctx.resolver,
        source_file: Some(path.display().to_string()),
        content_hash: Some(hash),
        created_at: existing
            .as_ref()
            .map(|previous| previous.created_at)
            .unwrap_or_else(Utc::now),
    };
    let mut built = build_finding_aid(&tree, &build_ctx)?;

    let mut stale_ids = Vec::new();
    if existing.is_some() {
        let removed = store.delete_subtree(&stable_id).await?;
        let current: std::collections::HashSet<String> =
            built.stable_ids().into_iter().collect();
        stale_ids = removed
            .into_iter()
            .filter(|id| !current.contains(id))
            .collect();
        tracing::info!(
            path = %path.display(),
            stale = stale_ids.len(),
            "replacing previous import"
        );
    }

    let mut artifact = None;
    if ctx.artifacts_dir.is_some() {
        match render_artifact(&service.code, &basename, &tree) {
            Ok(rendered) => {
                built.root.artifact_path = Some(rendered.relpath.display().to_string());
                artifact = Some(rendered);
            }
            Err(e) => tracing::warn!(path = %path.display(), "artifact not rendered: {}", e),
        }
    }

    authorities.resolve_all(&service.code, &mut built.root.index_entries);
    for component in built.components.iter_mut() {
        authorities.resolve_all(&service.code, &mut component.index_entries);
    }

    let root_key = store.create(NewRecord::Root(&built.root)).await?;
    log_state(path, FileState::RootCreated);

    let mut keys: HashMap<&str, i64> = HashMap::with_capacity(built.components.len());
    for component in &built.components {
        let parent_key = match &component.parent_stable_id {
            Some(parent) => Some(*keys.get(parent.as_str()).ok_or_else(|| {
                anyhow!("component {} created before its parent", component.stable_id)
            })?),
            None => None,
        };
        let key = store
            .create(NewRecord::Component {
                record: component,
                root_key,
                parent_key,
            })
            .await?;
        keys.insert(&component.stable_id, key);
    }
    log_state(path, FileState::ComponentsCreated);

    let documents = built.search_documents(&service);
    log_state(path, FileState::Done);
    tracing::info!(
        path = %path.display(),
        service = %service.code,
        components = built.components.len(),
        "imported"
    );

    Ok(FileImport {
        path: path.to_path_buf(),
        status: ImportStatus::Imported {
            components: built.components.len(),
        },
        root_stable_id: Some(stable_id),
        documents,
        stale_ids,
        artifact,
    })
}
