//! Batch import over a pool of workers.
//!
//! [`import_many`] filters the input paths, then feeds them through a
//! bounded queue to `workers` tokio tasks. The queue is closed with one
//! [`Job::Stop`] sentinel per worker. Each worker owns its own
//! [`RecordStore`] connection and authority cache and, for every file:
//!
//! 1. runs [`import_one`],
//! 2. flushes and commits on success, rolls back on failure,
//! 3. writes the republished artifact of a committed file,
//! 4. deletes stale identifiers from the search index,
//! 5. upserts the file's search documents in batches of `batch_size`.
//!
//! A failing file never stops its worker. Files of a worker that panicked
//! are reported as failed. With one worker, or when
//! `[import].synchronous` is set, files run one after the other on the
//! calling task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use globset::GlobSet;
use tokio::sync::{mpsc, Mutex};
use walkdir::WalkDir;

use crate::authority::GroupedAuthorities;
use crate::config::Config;
use crate::error::ImportError;
use crate::ingest::{import_one, is_xml_file, ImportContext, ImportStatus};
use crate::migrate;
use crate::progress::{FileOutcome, ImportProgressEvent, ImportProgressReporter};
use crate::publish::write_artifact;
use crate::search::{
    create_index, delete_in_batches, upsert_in_batches, MemoryIndex, SearchIndex,
};
use crate::store::memory::MemoryStore;
use crate::store::sqlite::SqliteStoreFactory;
use crate::store::{RecordStore, StoreFactory};

/// Per-batch result, printed by `eadi import`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    fn record(&mut self, path: PathBuf, outcome: Outcome) {
        match outcome {
            Outcome::Imported => self.imported += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(reason) => self.failed.push((path, reason)),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Imported,
    Skipped,
    Failed(String),
}

impl Outcome {
    fn progress(&self) -> FileOutcome {
        match self {
            Outcome::Imported => FileOutcome::Imported,
            Outcome::Skipped => FileOutcome::Skipped,
            Outcome::Failed(_) => FileOutcome::Failed,
        }
    }
}

/// Queue message; one `Stop` per worker ends the batch.
#[derive(Debug)]
enum Job {
    Path(PathBuf),
    Stop,
}

/// Collaborators shared by every worker.
#[derive(Clone)]
pub struct Pipeline {
    pub context: Arc<ImportContext>,
    pub stores: Arc<dyn StoreFactory>,
    pub index: Arc<dyn SearchIndex>,
    pub progress: Arc<dyn ImportProgressReporter>,
}

struct Counter {
    done: AtomicU64,
    total: u64,
}

/// Expand directories into the `.xml` files below them, minus `exclude`,
/// and drop paths that do not exist. Dropped paths are reported as
/// failures.
pub fn collect_paths(
    inputs: &[PathBuf],
    exclude: &GlobSet,
) -> (Vec<PathBuf>, Vec<(PathBuf, String)>) {
    let mut paths = Vec::new();
    let mut rejected = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_xml_file(p))
                .filter(|p| {
                    let relative = p.strip_prefix(input).unwrap_or(p);
                    !exclude.is_match(relative)
                })
                .collect();
            found.sort();
            paths.extend(found);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            tracing::warn!(path = %input.display(), "no such file, not queued");
            rejected.push((input.clone(), "no such file".to_string()));
        }
    }
    (paths, rejected)
}

fn failure_reason(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ImportError>() {
        Some(e) => format!("{}: {}", e.kind(), e),
        None => format!("{:#}", err),
    }
}

/// Import one file and settle its transaction and search documents.
async fn process_file(
    path: &Path,
    pipeline: &Pipeline,
    store: &mut dyn RecordStore,
    authorities: &mut GroupedAuthorities,
) -> Outcome {
    let file = match import_one(path, &pipeline.context, store, authorities).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), "import failed: {:#}", e);
            if let Err(rb) = store.rollback().await {
                tracing::error!(path = %path.display(), "rollback failed: {:#}", rb);
            }
            return Outcome::Failed(failure_reason(&e));
        }
    };

    if let ImportStatus::Skipped(_) = file.status {
        if let Err(e) = store.rollback().await {
            tracing::warn!(path = %path.display(), "rollback failed: {:#}", e);
        }
        return Outcome::Skipped;
    }

    let committed = match store.flush().await {
        Ok(()) => store.commit().await,
        Err(e) => Err(e),
    };
    if let Err(e) = committed {
        tracing::error!(path = %path.display(), "commit failed: {:#}", e);
        if let Err(rb) = store.rollback().await {
            tracing::error!(path = %path.display(), "rollback failed: {:#}", rb);
        }
        return Outcome::Failed(format!("store: {:#}", e));
    }

    if let (Some(dir), Some(artifact)) = (&pipeline.context.artifacts_dir, &file.artifact) {
        if let Err(e) = write_artifact(dir, artifact).await {
            tracing::warn!(path = %path.display(), "artifact not written: {:#}", e);
        }
    }

    let batch_size = pipeline.context.batch_size;
    let indexed = async {
        if !file.stale_ids.is_empty() {
            delete_in_batches(pipeline.index.as_ref(), &file.stale_ids, batch_size).await?;
        }
        if !file.documents.is_empty() {
            upsert_in_batches(pipeline.index.as_ref(), &file.documents, batch_size).await?;
        }
        anyhow::Ok(())
    }
    .await;
    if let Err(e) = indexed {
        tracing::error!(
            path = %path.display(),
            index = pipeline.index.name(),
            "records committed but search indexing failed: {:#}",
            e
        );
        return Outcome::Failed(format!("index: {:#}", e));
    }

    Outcome::Imported
}

fn report(pipeline: &Pipeline, counter: &Counter, path: &Path, outcome: &Outcome) {
    let n = counter.done.fetch_add(1, Ordering::SeqCst) + 1;
    pipeline.progress.report(ImportProgressEvent::File {
        path: path.display().to_string(),
        outcome: outcome.progress(),
        n,
        total: counter.total,
    });
}

async fn worker(
    id: usize,
    pipeline: Pipeline,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    counter: Arc<Counter>,
) -> Vec<(PathBuf, Outcome)> {
    let mut results = Vec::new();
    let mut store = match pipeline.stores.open().await {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::error!(worker = id, "cannot open store: {:#}", e);
            None
        }
    };
    let mut authorities = GroupedAuthorities::new(pipeline.context.grouping);

    loop {
        let job = { queue.lock().await.recv().await };
        let path = match job {
            Some(Job::Path(path)) => path,
            Some(Job::Stop) | None => break,
        };
        // Keep draining without a store so the producer never blocks.
        let outcome = match store.as_mut() {
            Some(store) => process_file(&path, &pipeline, store.as_mut(), &mut authorities).await,
            None => Outcome::Failed("store: unavailable".to_string()),
        };
        report(&pipeline, &counter, &path, &outcome);
        results.push((path, outcome));
    }
    tracing::debug!(worker = id, files = results.len(), "worker finished");
    results
}

/// Import every path, never failing as a whole. Per-file problems end up
/// in [`BatchSummary::failed`].
pub async fn import_many(inputs: &[PathBuf], pipeline: Pipeline) -> BatchSummary {
    let owned = inputs.to_vec();
    let exclude = pipeline.context.exclude.clone();
    let (paths, rejected) =
        match tokio::task::spawn_blocking(move || collect_paths(&owned, &exclude)).await {
            Ok(collected) => collected,
            Err(e) => {
                tracing::error!("path expansion failed: {}", e);
                let failed = inputs
                    .iter()
                    .map(|p| (p.clone(), format!("io: path expansion failed: {}", e)))
                    .collect();
                (Vec::new(), failed)
            }
        };
    let mut summary = BatchSummary {
        failed: rejected,
        ..BatchSummary::default()
    };

    let workers = pipeline.context.workers.max(1).min(paths.len().max(1));
    let synchronous = workers == 1 || pipeline.context.synchronous;
    pipeline.progress.report(ImportProgressEvent::Queued {
        total: paths.len() as u64,
        workers: if synchronous { 1 } else { workers },
    });
    let counter = Arc::new(Counter {
        done: AtomicU64::new(0),
        total: paths.len() as u64,
    });

    if synchronous {
        let mut store = match pipeline.stores.open().await {
            Ok(store) => store,
            Err(e) => {
                tracing::error!("cannot open store: {:#}", e);
                for path in paths {
                    summary.record(path, Outcome::Failed("store: unavailable".to_string()));
                }
                return summary;
            }
        };
        let mut authorities = GroupedAuthorities::new(pipeline.context.grouping);
        for path in paths {
            let outcome = process_file(&path, &pipeline, store.as_mut(), &mut authorities).await;
            report(&pipeline, &counter, &path, &outcome);
            summary.record(path, outcome);
        }
        return summary;
    }

    let (tx, rx) = mpsc::channel::<Job>(workers * 2);
    let queue = Arc::new(Mutex::new(rx));
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            tokio::spawn(worker(
                id,
                pipeline.clone(),
                Arc::clone(&queue),
                Arc::clone(&counter),
            ))
        })
        .collect();
    // only workers hold the receiver, so sends fail once every worker is gone
    drop(queue);

    for path in paths.iter().cloned() {
        if tx.send(Job::Path(path)).await.is_err() {
            tracing::error!("all workers exited early");
            break;
        }
    }
    for _ in 0..workers {
        let _ = tx.send(Job::Stop).await;
    }
    drop(tx);

    let mut reported: HashMap<PathBuf, usize> = HashMap::new();
    for handle in handles {
        match handle.await {
            Ok(results) => {
                for (path, outcome) in results {
                    *reported.entry(path.clone()).or_default() += 1;
                    summary.record(path, outcome);
                }
            }
            Err(e) => tracing::error!("worker task panicked: {}", e),
        }
    }
    // whatever a dead worker held never came back
    for path in paths {
        match reported.get_mut(&path) {
            Some(n) if *n > 0 => *n -= 1,
            _ => summary.record(path, Outcome::Failed("worker panicked".to_string())),
        }
    }
    summary
}

/// `eadi import`: wire the configured collaborators, run the batch and
/// print its summary. `dry_run` swaps in the in-memory store and index
/// and writes no artifacts.
pub async fn run_import(
    config: &Config,
    inputs: &[PathBuf],
    dry_run: bool,
    progress: Arc<dyn ImportProgressReporter>,
) -> Result<BatchSummary> {
    let mut context = ImportContext::from_config(config)?;
    if dry_run {
        context.artifacts_dir = None;
    }
    let context = Arc::new(context);

    let (stores, index): (Arc<dyn StoreFactory>, Arc<dyn SearchIndex>) = if dry_run {
        (Arc::new(MemoryStore::new()), Arc::new(MemoryIndex::new()))
    } else {
        migrate::run_migrations(config).await?;
        (
            Arc::new(SqliteStoreFactory::new(config)),
            create_index(&config.search)?,
        )
    };
    tracing::info!(
        workers = context.workers,
        index = index.name(),
        dry_run,
        "starting import"
    );

    let pipeline = Pipeline {
        context,
        stores,
        index,
        progress,
    };
    let summary = import_many(inputs, pipeline).await;

    println!("import{}", if dry_run { " (dry-run)" } else { "" });
    println!(
        "  imported {}, skipped {}, failed {}",
        summary.imported,
        summary.skipped,
        summary.failed.len()
    );
    for (path, reason) in &summary.failed {
        println!("  failed: {}  {}", path.display(), reason);
    }
    println!("ok");

    Ok(summary)
}
