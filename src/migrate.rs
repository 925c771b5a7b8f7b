use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Finding aids, one per imported file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS root_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stable_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            eadid TEXT NOT NULL,
            service_code TEXT NOT NULL,
            title TEXT NOT NULL,
            source_file TEXT,
            content_hash TEXT,
            artifact_path TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            record_json TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Components; deleting a root cascades to its whole tree
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS component_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stable_id TEXT NOT NULL UNIQUE,
            root_id INTEGER NOT NULL,
            parent_id INTEGER,
            root_stable_id TEXT NOT NULL,
            path TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            record_json TEXT NOT NULL,
            FOREIGN KEY (root_id) REFERENCES root_records(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES component_records(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_stable_id TEXT NOT NULL,
            root_stable_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            type TEXT NOT NULL,
            label TEXT NOT NULL,
            normalized TEXT NOT NULL,
            role TEXT NOT NULL,
            authfilenumber TEXT,
            authority TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS digitized_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_stable_id TEXT NOT NULL,
            root_stable_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            role TEXT,
            url TEXT,
            illustration_url TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_components_root ON component_records(root_stable_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_root ON index_entries(root_stable_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_authority ON index_entries(authority)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_digitized_root ON digitized_versions(root_stable_id)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_roots_service ON root_records(service_code)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
