//! Registry and store overview for `smartdoc stats`.

use anyhow::Result;

use crate::config::Config;
use crate::workspace::Workspace;

pub async fn run_stats(config: &Config, ws: &Workspace) -> Result<()> {
    let stats = ws.registry.stats().await?;
    let chunks = ws.store.count().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("SmartDoc Registry Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Sources:     {}", stats.total_sources);
    println!("  Chunks:      {}", chunks);
    println!("  Analyses:    {} cached", stats.cached_analyses);
    println!("  Log entries: {}", stats.log_entries);

    if !stats.by_type.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<12} {:>8} {:>12}", "TYPE", "SOURCES", "SIZE");
        println!("  {}", "-".repeat(34));
        for t in &stats.by_type {
            println!(
                "  {:<12} {:>8} {:>12}",
                t.source_type.as_str(),
                t.count,
                format_bytes(t.total_bytes.max(0) as u64)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
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
pub fn format_ts_relative(ts: i64) -> String {
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
