//! Audit command implementation

use anyhow::Result;

use super::{match_id, IdMatch};
use crate::store::Store;

pub fn run(store: &Store, transcript_query: &str) -> Result<()> {
    let candidates = store.find_transcript_ids_by_prefix(transcript_query)?;
    let transcript_id = match match_id(transcript_query, candidates) {
        IdMatch::One(id) => id,
        IdMatch::None => {
            println!("Transcript '{}' not found.", transcript_query);
            return Ok(());
        }
        IdMatch::Ambiguous(ids) => {
            println!(
                "Transcript id '{}' is ambiguous, {} matches:",
                transcript_query,
                ids.len()
            );
            for id in ids {
                println!("   {}", id);
            }
            return Ok(());
        }
    };

    let events = store.transcript_audit_events(&transcript_id)?;
    if events.is_empty() {
        println!("No audit events for transcript '{}'.", transcript_id);
        return Ok(());
    }

    println!("{:<26} {:<24} {:<14} {}", "Timestamp", "Event", "Request", "Payload");
    println!("{}", "-".repeat(100));
    for event in events {
        println!(
            "{:<26} {:<24} {:<14} {}",
            event.created_at,
            event.event_type,
            event.request_id.as_deref().unwrap_or("-"),
            event.payload
        );
    }
    Ok(())
}
