//! List command implementation

use anyhow::Result;

use super::{short_id, truncate};
use crate::store::Store;
use crate::visibility::Viewer;

pub fn run(store: &Store, viewer: &Viewer, query: Option<String>, limit: Option<usize>) -> Result<()> {
    let transcripts = store
        .evaluator()
        .list_transcripts(viewer, query.as_deref(), limit)?;

    if transcripts.is_empty() {
        println!("No visible transcripts found.");
        return Ok(());
    }

    println!("{:<12} {:<10} {:<24} {}", "Date", "ID", "Source", "Title");
    println!("{}", "-".repeat(100));

    for transcript in transcripts {
        // "2026-03-02T15:04:00+00:00" -> "03-02 15:04"
        let date = if transcript.date.len() >= 16 {
            format!("{} {}", &transcript.date[5..10], &transcript.date[11..16])
        } else {
            transcript.date.clone()
        };

        println!(
            "{:<12} {:<10} {:<24} {}",
            date,
            short_id(&transcript.id),
            truncate(&transcript.source_id, 24),
            truncate(&transcript.title, 50),
        );
    }

    Ok(())
}
