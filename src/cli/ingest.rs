//! Ingest command implementation

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{short_id, truncate};
use crate::ingest::Ingestor;
use crate::source::SourceRegistry;
use crate::store::Store;

/// A single file, or every `*.json` file below a directory in path order
fn collect_payload_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(anyhow!("No such file or directory: {}", path.display()));
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// A file holds one payload, or an array of payloads
fn read_payloads(file: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", file.display()))?;
    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

pub fn run(
    store: &mut Store,
    registry: &SourceRegistry,
    ingestor: &Ingestor,
    path: &Path,
    source_name: &str,
    request_id: Option<&str>,
) -> Result<()> {
    let source = registry
        .get_source(source_name)
        .ok_or_else(|| anyhow!("Unknown or disabled source: {}", source_name))?;

    let files = collect_payload_files(path)?;
    if files.is_empty() {
        println!("No JSON payloads found under {}", path.display());
        return Ok(());
    }

    println!("📥 {} ({})", source.name(), source.description());

    let (mut created, mut updated, mut skipped) = (0usize, 0usize, 0usize);
    for file in &files {
        for payload in read_payloads(file)? {
            let Some(transcript) = source
                .transform(&payload)
                .with_context(|| format!("Failed to transform payload in {}", file.display()))?
            else {
                warn!(file = %file.display(), "payload skipped");
                skipped += 1;
                continue;
            };

            let outcome = ingestor
                .ingest(store, &transcript, request_id)
                .with_context(|| format!("Failed to ingest {}", transcript.source_id))?;

            if outcome.is_new {
                created += 1;
            } else {
                updated += 1;
            }

            println!(
                "   → {} {:<8} {:<12} {:<22} {}",
                short_id(&outcome.transcript_id),
                if outcome.is_new { "new" } else { "updated" },
                outcome.visibility.as_str(),
                outcome
                    .link_source
                    .map(|s| s.as_str())
                    .unwrap_or("unrouted"),
                truncate(&transcript.title, 40),
            );
        }
    }

    println!(
        "\n✅ Ingestion complete: {} new, {} updated, {} skipped",
        created, updated, skipped
    );
    Ok(())
}
