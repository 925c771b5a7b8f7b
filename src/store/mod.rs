//! Record store abstraction.
//!
//! Each import worker owns one [`RecordStore`] connection obtained from a
//! shared [`StoreFactory`]. Writes are transactional per file: the
//! orchestrator calls [`flush`](RecordStore::flush) and
//! [`commit`](RecordStore::commit) after a file succeeds and
//! [`rollback`](RecordStore::rollback) after it fails, so a failing file
//! never leaves partial records and never affects another worker's
//! committed files.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create`](RecordStore::create) | insert a root or component record, returning its key |
//! | [`find_by_key`](RecordStore::find_by_key) | look a record up by stable identifier |
//! | [`delete_subtree`](RecordStore::delete_subtree) | remove a root record and all its components |
//! | [`flush`](RecordStore::flush) | write buffered child rows (index entries, digitized versions) |
//! | [`commit`](RecordStore::commit) / [`rollback`](RecordStore::rollback) | end the current transaction |
//!
//! Backends: [`sqlite::SqliteStore`] and [`memory::MemoryStore`].

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ComponentRecord, RecordKind, RootRecord};

/// A record to insert. Components carry the keys assigned to their root
/// and parent earlier in the same import.
#[derive(Debug, Clone, Copy)]
pub enum NewRecord<'a> {
    Root(&'a RootRecord),
    Component {
        record: &'a ComponentRecord,
        root_key: i64,
        parent_key: Option<i64>,
    },
}

impl NewRecord<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            NewRecord::Root(_) => RecordKind::FindingAid,
            NewRecord::Component { .. } => RecordKind::Component,
        }
    }

    pub fn stable_id(&self) -> &str {
        match self {
            NewRecord::Root(r) => &r.stable_id,
            NewRecord::Component { record, .. } => &record.stable_id,
        }
    }
}

/// Lightweight view of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub key: i64,
    pub kind: RecordKind,
    pub stable_id: String,
    pub root_stable_id: String,
    /// Import name; set on root records only.
    pub name: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait RecordStore: Send {
    async fn create(&mut self, record: NewRecord<'_>) -> Result<i64>;

    async fn find_by_key(&mut self, kind: RecordKind, stable_id: &str)
        -> Result<Option<StoredRecord>>;

    /// Delete a root record and its whole component tree. Returns the
    /// stable identifiers that were removed (root first), empty when the
    /// root did not exist.
    async fn delete_subtree(&mut self, root_stable_id: &str) -> Result<Vec<String>>;

    async fn flush(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Opens one independent connection per worker.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RecordStore>>;
}
