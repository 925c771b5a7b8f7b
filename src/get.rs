//! Record retrieval by stable identifier.
//!
//! Looks the identifier up among finding aids first, then components, and
//! prints the stored record as pretty JSON. Used by `eadi get`.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::RecordKind;

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub kind: RecordKind,
    pub stable_id: String,
    pub title: String,
    pub created_at: String, // ISO8601
    pub record: serde_json::Value,
}

/// Fetch one record, `None` when the identifier is unknown.
pub async fn fetch_record(pool: &SqlitePool, stable_id: &str) -> Result<Option<RecordResponse>> {
    let queries = [
        (
            RecordKind::FindingAid,
            "SELECT stable_id, title, created_at, record_json FROM root_records WHERE stable_id = ?",
        ),
        (
            RecordKind::Component,
            "SELECT stable_id, title, created_at, record_json FROM component_records WHERE stable_id = ?",
        ),
    ];

    for (kind, sql) in queries {
        let row = sqlx::query(sql)
            .bind(stable_id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            let record_json: String = row.get("record_json");
            let record: serde_json::Value = serde_json::from_str(&record_json)
                .with_context(|| format!("corrupt record_json for {}", stable_id))?;
            return Ok(Some(RecordResponse {
                kind,
                stable_id: row.get("stable_id"),
                title: row.get("title"),
                created_at: format_ts_iso(row.get("created_at")),
                record,
            }));
        }
    }
    Ok(None)
}

pub async fn get_record(config: &Config, stable_id: &str) -> Result<RecordResponse> {
    let pool = db::connect(config).await?;
    let record = fetch_record(&pool, stable_id).await;
    pool.close().await;

    match record? {
        Some(record) => Ok(record),
        None => bail!("record not found: {}", stable_id),
    }
}

/// CLI entry point; prints the record as JSON to stdout.
pub async fn run_get(config: &Config, stable_id: &str) -> Result<()> {
    let record = get_record(config, stable_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
