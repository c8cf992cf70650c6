// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use serde::Serialize;
use tether_core::{MutationQueue, QueueItem, Result};

use crate::cli::OutputFormat;

use super::{format_millis, open_store};

/// JSON output structure for the queue command.
#[derive(Serialize)]
struct QueueOutputJson {
    items: Vec<QueueItem>,
    /// Records that could not be read and were removed while loading.
    purged: usize,
}

/// List persisted mutations in the order a drain would apply them.
pub fn run(store_dir: &Path, output: OutputFormat) -> Result<()> {
    let store = open_store(store_dir)?;
    let mut queue = MutationQueue::new(store);
    let report = queue.restore();
    let items = queue.pending();

    match output {
        OutputFormat::Text => {
            if report.purged > 0 {
                eprintln!("warning: removed {} unreadable queue records", report.purged);
            }
            if items.is_empty() {
                println!("No queued mutations.");
                return Ok(());
            }
            for item in &items {
                println!("{}", format_item(item));
            }
        }
        OutputFormat::Json => {
            let json = QueueOutputJson {
                items,
                purged: report.purged,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

/// One text line per queued mutation.
pub(crate) fn format_item(item: &QueueItem) -> String {
    let mut line = format!(
        "{}  p{}  {:<6}  {}/{}  queued {}",
        item.id,
        item.priority,
        item.kind.to_string(),
        item.data_type,
        item.key,
        format_millis(item.created_at)
    );
    if item.retry_count > 0 {
        line.push_str(&format!("  retries {}", item.retry_count));
    }
    if let Some(err) = &item.last_error {
        line.push_str(&format!("  ({err})"));
    }
    line
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
