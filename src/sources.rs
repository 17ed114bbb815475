//! Source inspection and removal commands: `smartdoc sources`,
//! `smartdoc logs <source>`, `smartdoc remove <source>`.

use anyhow::Result;

use smartdoc_core::models::SourceType;

use crate::stats::{format_bytes, format_ts_relative};
use crate::workspace::Workspace;

pub async fn list_sources(ws: &Workspace, source_type: Option<SourceType>) -> Result<()> {
    let sources = ws.registry.list_sources(source_type).await?;

    if sources.is_empty() {
        println!("No sources registered.");
        return Ok(());
    }

    println!(
        "{:<44} {:<11} {:<11} {:>10}   UPDATED",
        "SOURCE", "TYPE", "STATUS", "SIZE"
    );
    for s in &sources {
        println!(
            "{:<44} {:<11} {:<11} {:>10}   {}",
            s.path,
            s.source_type.as_str(),
            s.status.as_str(),
            s.size_bytes
                .map(|b| format_bytes(b.max(0) as u64))
                .unwrap_or_else(|| "-".to_string()),
            format_ts_relative(s.updated_at.timestamp())
        );
    }

    Ok(())
}

pub async fn show_logs(ws: &Workspace, source: &str) -> Result<()> {
    let logs = ws.registry.logs_for(source).await?;

    if logs.is_empty() {
        println!("No processing log entries for {}.", source);
        return Ok(());
    }

    for entry in &logs {
        println!(
            "{}  {:<20} {:<8} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.step,
            entry.status.as_str(),
            entry.message
        );
        if !entry.details.is_null() {
            println!("    {}", entry.details);
        }
    }

    Ok(())
}

pub async fn remove_source(ws: &Workspace, source: &str) -> Result<()> {
    let (chunks, registered) = ws.remove_source(source).await?;

    if !registered && chunks == 0 {
        println!("Source not found: {}", source);
    } else {
        println!("Removed {} ({} chunks).", source, chunks);
    }

    Ok(())
}
