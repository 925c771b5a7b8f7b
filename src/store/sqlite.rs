//! SQLite-backed [`RecordStore`].
//!
//! Every worker owns its own connection. A transaction is opened lazily
//! with `BEGIN IMMEDIATE` on the first write and closed by
//! [`commit`](RecordStore::commit) or [`rollback`](RecordStore::rollback).
//! Index entries and digitized versions are buffered and written on
//! [`flush`](RecordStore::flush).

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use crate::config::Config;
use crate::dao::DigitizedVersion;
use crate::db;
use crate::index_entries::IndexEntry;
use crate::models::RecordKind;

use super::{NewRecord, RecordStore, StoreFactory, StoredRecord};

struct PendingChildren {
    record_stable_id: String,
    root_stable_id: String,
    entries: Vec<IndexEntry>,
    daos: Vec<DigitizedVersion>,
}

pub struct SqliteStore {
    conn: SqliteConnection,
    in_transaction: bool,
    pending: Vec<PendingChildren>,
}

impl SqliteStore {
    pub async fn open(db_path: &std::path::Path) -> Result<Self> {
        Ok(SqliteStore {
            conn: db::open_connection(db_path).await?,
            in_transaction: false,
            pending: Vec::new(),
        })
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            sqlx::query("BEGIN IMMEDIATE")
                .execute(&mut self.conn)
                .await?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("serializing record")
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create(&mut self, record: NewRecord<'_>) -> Result<i64> {
        self.begin().await?;
        let now = Utc::now().timestamp();

        let key = match record {
            NewRecord::Root(root) => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO root_records
                        (stable_id, name, eadid, service_code, title, source_file,
                         content_hash, artifact_path, created_at, updated_at, record_json)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&root.stable_id)
                .bind(&root.name)
                .bind(&root.eadid)
                .bind(&root.service_code)
                .bind(root.identity.display_title())
                .bind(&root.source_file)
                .bind(&root.content_hash)
                .bind(&root.artifact_path)
                .bind(root.created_at.timestamp())
                .bind(now)
                .bind(to_json(root)?)
                .execute(&mut self.conn)
                .await
                .with_context(|| format!("inserting finding aid {}", root.stable_id))?;

                self.pending.push(PendingChildren {
                    record_stable_id: root.stable_id.clone(),
                    root_stable_id: root.stable_id.clone(),
                    entries: root.index_entries.clone(),
                    daos: root.digitized_versions.clone(),
                });
                result.last_insert_rowid()
            }
            NewRecord::Component {
                record,
                root_key,
                parent_key,
            } => {
                let path = record
                    .path
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join("-");
                let result = sqlx::query(
                    r#"
                    INSERT INTO component_records
                        (stable_id, root_id, parent_id, root_stable_id, path, sort_order,
                         title, created_at, record_json)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.stable_id)
                .bind(root_key)
                .bind(parent_key)
                .bind(&record.root_stable_id)
                .bind(path)
                .bind(record.order as i64)
                .bind(record.identity.display_title())
                .bind(record.created_at.timestamp())
                .bind(to_json(record)?)
                .execute(&mut self.conn)
                .await
                .with_context(|| format!("inserting component {}", record.stable_id))?;

                self.pending.push(PendingChildren {
                    record_stable_id: record.stable_id.clone(),
                    root_stable_id: record.root_stable_id.clone(),
                    entries: record.index_entries.clone(),
                    daos: record.digitized_versions.clone(),
                });
                result.last_insert_rowid()
            }
        };
        Ok(key)
    }

    async fn find_by_key(
        &mut self,
        kind: RecordKind,
        stable_id: &str,
    ) -> Result<Option<StoredRecord>> {
        let sql = match kind {
            RecordKind::FindingAid => {
                "SELECT id, stable_id, stable_id AS root_stable_id, name, content_hash, created_at \
                 FROM root_records WHERE stable_id = ?"
            }
            RecordKind::Component => {
                "SELECT id, stable_id, root_stable_id, NULL AS name, NULL AS content_hash, created_at \
                 FROM component_records WHERE stable_id = ?"
            }
        };
        let row = sqlx::query(sql)
            .bind(stable_id)
            .fetch_optional(&mut self.conn)
            .await?;

        Ok(row.map(|row| StoredRecord {
            key: row.get("id"),
            kind,
            stable_id: row.get("stable_id"),
            root_stable_id: row.get("root_stable_id"),
            name: row.get("name"),
            content_hash: row.get("content_hash"),
            created_at: from_ts(row.get("created_at")),
        }))
    }

    async fn delete_subtree(&mut self, root_stable_id: &str) -> Result<Vec<String>> {
        self.flush().await?;
        self.begin().await?;

        let root: Option<String> =
            sqlx::query_scalar("SELECT stable_id FROM root_records WHERE stable_id = ?")
                .bind(root_stable_id)
                .fetch_optional(&mut self.conn)
                .await?;
        let Some(root) = root else {
            return Ok(Vec::new());
        };

        let components: Vec<String> = sqlx::query_scalar(
            "SELECT stable_id FROM component_records WHERE root_stable_id = ? ORDER BY id ASC",
        )
        .bind(root_stable_id)
        .fetch_all(&mut self.conn)
        .await?;

        sqlx::query("DELETE FROM index_entries WHERE root_stable_id = ?")
            .bind(root_stable_id)
            .execute(&mut self.conn)
            .await?;
        sqlx::query("DELETE FROM digitized_versions WHERE root_stable_id = ?")
            .bind(root_stable_id)
            .execute(&mut self.conn)
            .await?;
        // components go with the root through ON DELETE CASCADE
        sqlx::query("DELETE FROM root_records WHERE stable_id = ?")
            .bind(root_stable_id)
            .execute(&mut self.conn)
            .await?;

        Ok(std::iter::once(root).chain(components).collect())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.begin().await?;
        let pending = std::mem::take(&mut self.pending);

        for children in &pending {
            for (position, entry) in children.entries.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO index_entries
                        (record_stable_id, root_stable_id, position, type, label,
                         normalized, role, authfilenumber, authority)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&children.record_stable_id)
                .bind(&children.root_stable_id)
                .bind(position as i64)
                .bind(&entry.kind)
                .bind(&entry.label)
                .bind(&entry.normalized)
                .bind(&entry.role)
                .bind(&entry.authfilenumber)
                .bind(&entry.authority)
                .execute(&mut self.conn)
                .await?;
            }
            for (position, dao) in children.daos.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO digitized_versions
                        (record_stable_id, root_stable_id, position, role, url, illustration_url)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&children.record_stable_id)
                .bind(&children.root_stable_id)
                .bind(position as i64)
                .bind(&dao.role)
                .bind(&dao.url)
                .bind(&dao.illustration_url)
                .execute(&mut self.conn)
                .await?;
            }
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.flush().await?;
        if self.in_transaction {
            sqlx::query("COMMIT").execute(&mut self.conn).await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        if self.in_transaction {
            self.in_transaction = false;
            sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        }
        Ok(())
    }
}

/// Opens one [`SqliteStore`] per worker on the configured database.
pub struct SqliteStoreFactory {
    db_path: PathBuf,
}

impl SqliteStoreFactory {
    pub fn new(config: &Config) -> Self {
        SqliteStoreFactory {
            db_path: config.db.path.clone(),
        }
    }
}

#[async_trait]
impl StoreFactory for SqliteStoreFactory {
    async fn open(&self) -> Result<Box<dyn RecordStore>> {
        Ok(Box::new(SqliteStore::open(&self.db_path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DescriptiveText, HeaderInfo, Identity};
    use crate::migrate::run_migrations;
    use crate::models::{ComponentRecord, RootRecord};
    use tempfile::TempDir;

    fn root() -> RootRecord {
        RootRecord {
            stable_id: "r1".into(),
            name: "FRAD054_IR_1.xml".into(),
            eadid: "FRAD054_IR_1".into(),
            fatype: None,
            service_code: "FRAD054".into(),
            header: HeaderInfo::default(),
            identity: Identity::default(),
            text: DescriptiveText::default(),
            originators: Vec::new(),
            index_entries: vec![IndexEntry::new("geogname", "Nancy", "index").unwrap()],
            digitized_versions: Vec::new(),
            source_file: None,
            content_hash: Some("abc".into()),
            artifact_path: None,
            created_at: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
        }
    }

    fn component(stable_id: &str, path: Vec<usize>) -> ComponentRecord {
        ComponentRecord {
            stable_id: stable_id.into(),
            root_stable_id: "r1".into(),
            parent_stable_id: None,
            order: *path.last().unwrap(),
            path,
            component_id: None,
            identity: Identity::default(),
            text: DescriptiveText::default(),
            index_entries: Vec::new(),
            digitized_versions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    async fn setup() -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("data/records.sqlite"));
        run_migrations(&config).await.unwrap();
        (tmp, config)
    }

    #[tokio::test]
    async fn create_commit_and_find() {
        let (_tmp, config) = setup().await;
        let mut store = SqliteStore::open(&config.db.path).await.unwrap();
        let r = root();
        let root_key = store.create(NewRecord::Root(&r)).await.unwrap();
        let c = component("c1", vec![0]);
        store
            .create(NewRecord::Component {
                record: &c,
                root_key,
                parent_key: None,
            })
            .await
            .unwrap();
        store.commit().await.unwrap();

        let found = store
            .find_by_key(RecordKind::FindingAid, "r1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.key, root_key);
        assert_eq!(found.content_hash.as_deref(), Some("abc"));
        assert_eq!(found.created_at.timestamp(), 1_600_000_000);
        assert!(store
            .find_by_key(RecordKind::Component, "c1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rollback_leaves_nothing_behind() {
        let (_tmp, config) = setup().await;
        let mut store = SqliteStore::open(&config.db.path).await.unwrap();
        let r = root();
        store.create(NewRecord::Root(&r)).await.unwrap();
        store.rollback().await.unwrap();

        assert!(store
            .find_by_key(RecordKind::FindingAid, "r1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_subtree_removes_everything() {
        let (_tmp, config) = setup().await;
        let mut store = SqliteStore::open(&config.db.path).await.unwrap();
        let r = root();
        let root_key = store.create(NewRecord::Root(&r)).await.unwrap();
        let parent = component("c1", vec![0]);
        let parent_key = store
            .create(NewRecord::Component {
                record: &parent,
                root_key,
                parent_key: None,
            })
            .await
            .unwrap();
        let child = component("c2", vec![0, 0]);
        store
            .create(NewRecord::Component {
                record: &child,
                root_key,
                parent_key: Some(parent_key),
            })
            .await
            .unwrap();
        store.commit().await.unwrap();

        let removed = store.delete_subtree("r1").await.unwrap();
        store.commit().await.unwrap();
        assert_eq!(removed, vec!["r1", "c1", "c2"]);

        let pool = db::connect(&config).await.unwrap();
        let left: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM component_records) + (SELECT COUNT(*) FROM index_entries)",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(left, 0);
        assert!(store.delete_subtree("r1").await.unwrap().is_empty());
    }
}
