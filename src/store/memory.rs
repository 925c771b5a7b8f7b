//! In-memory [`RecordStore`] used by tests and `eadi import --dry-run`.
//!
//! Committed state lives behind a shared mutex; every connection stages its
//! operations and replays them onto the shared state on commit. Reads see
//! the committed state with the connection's own staged operations applied.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dao::DigitizedVersion;
use crate::index_entries::IndexEntry;
use crate::models::RecordKind;

use super::{NewRecord, RecordStore, StoreFactory, StoredRecord};

#[derive(Debug, Clone)]
struct Row {
    key: i64,
    kind: RecordKind,
    stable_id: String,
    root_stable_id: String,
    parent_key: Option<i64>,
    name: Option<String>,
    content_hash: Option<String>,
    created_at: DateTime<Utc>,
    index_entries: Vec<IndexEntry>,
    digitized_versions: Vec<DigitizedVersion>,
}

impl Row {
    fn stored(&self) -> StoredRecord {
        StoredRecord {
            key: self.key,
            kind: self.kind,
            stable_id: self.stable_id.clone(),
            root_stable_id: self.root_stable_id.clone(),
            name: self.name.clone(),
            content_hash: self.content_hash.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Create(Row),
    DeleteSubtree(String),
}

#[derive(Debug, Clone, Default)]
struct State {
    next_key: i64,
    /// Rows in creation order.
    rows: Vec<Row>,
    commits: usize,
}

impl State {
    fn apply(&mut self, op: &Op) -> Vec<String> {
        match op {
            Op::Create(row) => {
                self.rows.push(row.clone());
                Vec::new()
            }
            Op::DeleteSubtree(root) => {
                let exists = self
                    .rows
                    .iter()
                    .any(|r| r.kind == RecordKind::FindingAid && r.stable_id == *root);
                if !exists {
                    return Vec::new();
                }
                let removed: Vec<String> = self
                    .rows
                    .iter()
                    .filter(|r| r.root_stable_id == *root)
                    .map(|r| r.stable_id.clone())
                    .collect();
                self.rows.retain(|r| r.root_stable_id != *root);
                let (roots, rest): (Vec<String>, Vec<String>) =
                    removed.into_iter().partition(|id| id == root);
                roots.into_iter().chain(rest).collect()
            }
        }
    }
}

/// Shared handle; clones see the same committed data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// A new connection with its own staging area.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            store: self.clone(),
            staged: Vec::new(),
        }
    }

    pub fn root_count(&self) -> usize {
        self.count(RecordKind::FindingAid)
    }

    pub fn component_count(&self) -> usize {
        self.count(RecordKind::Component)
    }

    fn count(&self, kind: RecordKind) -> usize {
        self.lock()
            .map(|s| s.rows.iter().filter(|r| r.kind == kind).count())
            .unwrap_or(0)
    }

    /// Root records imported under `name`.
    pub fn roots_named(&self, name: &str) -> Vec<StoredRecord> {
        self.lock()
            .map(|s| {
                s.rows
                    .iter()
                    .filter(|r| r.kind == RecordKind::FindingAid && r.name.as_deref() == Some(name))
                    .map(Row::stored)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stable identifiers of the components of a root, in creation order.
    pub fn components_of(&self, root_stable_id: &str) -> Vec<String> {
        self.lock()
            .map(|s| {
                s.rows
                    .iter()
                    .filter(|r| {
                        r.kind == RecordKind::Component && r.root_stable_id == root_stable_id
                    })
                    .map(|r| r.stable_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parent key of a record, as stored.
    pub fn parent_key_of(&self, stable_id: &str) -> Option<i64> {
        self.lock()
            .ok()?
            .rows
            .iter()
            .find(|r| r.stable_id == stable_id)
            .and_then(|r| r.parent_key)
    }

    pub fn index_entries_of(&self, stable_id: &str) -> Vec<IndexEntry> {
        self.lock()
            .ok()
            .and_then(|s| {
                s.rows
                    .iter()
                    .find(|r| r.stable_id == stable_id)
                    .map(|r| r.index_entries.clone())
            })
            .unwrap_or_default()
    }

    pub fn commit_count(&self) -> usize {
        self.lock().map(|s| s.commits).unwrap_or(0)
    }
}

#[async_trait]
impl StoreFactory for MemoryStore {
    async fn open(&self) -> Result<Box<dyn RecordStore>> {
        Ok(Box::new(self.connect()))
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
    staged: Vec<Op>,
}

impl MemoryConnection {
    /// Committed state with this connection's staged operations applied.
    fn view(&self) -> Result<State> {
        let mut state = self.store.lock()?.clone();
        for op in &self.staged {
            state.apply(op);
        }
        Ok(state)
    }
}

#[async_trait]
impl RecordStore for MemoryConnection {
    async fn create(&mut self, record: NewRecord<'_>) -> Result<i64> {
        let key = {
            let mut state = self.store.lock()?;
            state.next_key += 1;
            state.next_key
        };
        let row = match record {
            NewRecord::Root(root) => Row {
                key,
                kind: RecordKind::FindingAid,
                stable_id: root.stable_id.clone(),
                root_stable_id: root.stable_id.clone(),
                parent_key: None,
                name: Some(root.name.clone()),
                content_hash: root.content_hash.clone(),
                created_at: root.created_at,
                index_entries: root.index_entries.clone(),
                digitized_versions: root.digitized_versions.clone(),
            },
            NewRecord::Component {
                record,
                parent_key,
                ..
            } => Row {
                key,
                kind: RecordKind::Component,
                stable_id: record.stable_id.clone(),
                root_stable_id: record.root_stable_id.clone(),
                parent_key,
                name: None,
                content_hash: None,
                created_at: record.created_at,
                index_entries: record.index_entries.clone(),
                digitized_versions: record.digitized_versions.clone(),
            },
        };
        if self.view()?.rows.iter().any(|r| r.stable_id == row.stable_id) {
            return Err(anyhow!("duplicate stable id {}", row.stable_id));
        }
        self.staged.push(Op::Create(row));
        Ok(key)
    }

    async fn find_by_key(
        &mut self,
        kind: RecordKind,
        stable_id: &str,
    ) -> Result<Option<StoredRecord>> {
        Ok(self
            .view()?
            .rows
            .iter()
            .find(|r| r.kind == kind && r.stable_id == stable_id)
            .map(Row::stored))
    }

    async fn delete_subtree(&mut self, root_stable_id: &str) -> Result<Vec<String>> {
        let op = Op::DeleteSubtree(root_stable_id.to_string());
        let removed = self.view()?.apply(&op);
        self.staged.push(op);
        Ok(removed)
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut state = self.store.lock()?;
        for op in &staged {
            state.apply(op);
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        Ok(())
    }
}
