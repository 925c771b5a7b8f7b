//! Database statistics overview.
//!
//! Summarizes what has been imported: finding aid and component counts,
//! index entries, digitized versions, and a per-service breakdown. Used by
//! `eadi stats` to check that an import run did what was expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-service breakdown of record counts.
struct ServiceStats {
    service_code: String,
    finding_aids: i64,
    components: i64,
    last_import_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_roots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM root_records")
        .fetch_one(&pool)
        .await?;

    let total_components: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM component_records")
        .fetch_one(&pool)
        .await?;

    let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
        .fetch_one(&pool)
        .await?;

    let total_authorities: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT authority) FROM index_entries")
            .fetch_one(&pool)
            .await?;

    let total_daos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM digitized_versions")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("EAD Import: Database Stats");
    println!("===========================");
    println!();
    println!("  Database:           {}", config.db.path.display());
    println!("  Size:               {}", format_bytes(db_size));
    println!();
    println!("  Finding aids:       {}", total_roots);
    println!("  Components:         {}", total_components);
    println!(
        "  Index entries:      {} ({} authorities)",
        total_entries, total_authorities
    );
    println!("  Digitized versions: {}", total_daos);

    let rows = sqlx::query(
        r#"
        SELECT
            r.service_code,
            COUNT(DISTINCT r.id) AS finding_aids,
            COUNT(c.id) AS components,
            MAX(r.updated_at) AS last_import
        FROM root_records r
        LEFT JOIN component_records c ON c.root_id = r.id
        GROUP BY r.service_code
        ORDER BY finding_aids DESC, r.service_code ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let service_stats: Vec<ServiceStats> = rows
        .iter()
        .map(|row| ServiceStats {
            service_code: row.get("service_code"),
            finding_aids: row.get("finding_aids"),
            components: row.get("components"),
            last_import_ts: row.get("last_import"),
        })
        .collect();

    if !service_stats.is_empty() {
        println!();
        println!("  By service:");
        println!(
            "  {:<16} {:>8} {:>11}   {}",
            "SERVICE", "FA", "COMPONENTS", "LAST IMPORT"
        );
        println!("  {}", "-".repeat(56));

        for s in &service_stats {
            let last = match s.last_import_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<16} {:>8} {:>11}   {}",
                s.service_code, s.finding_aids, s.components, last
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_human_readable() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn recent_timestamps_are_relative() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
