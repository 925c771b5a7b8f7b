use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Connection;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

fn connect_options(db_path: &Path) -> Result<SqliteConnectOptions> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }

    Ok(
        SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true),
    )
}

/// Shared pool for read-only commands and migrations.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let options = connect_options(&config.db.path)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Dedicated connection owned by one import worker.
pub async fn open_connection(db_path: &Path) -> Result<SqliteConnection> {
    let options = connect_options(db_path)?;
    let conn = SqliteConnection::connect_with(&options)
        .await
        .with_context(|| format!("opening {}", db_path.display()))?;
    Ok(conn)
}
