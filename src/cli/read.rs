//! Read command implementation

use anyhow::Result;

use super::{match_id, truncate, IdMatch};
use crate::store::Store;
use crate::visibility::Viewer;

pub fn run(store: &Store, viewer: &Viewer, transcript_query: &str) -> Result<()> {
    let evaluator = store.evaluator();

    // Accept a short id from `list` output; only visible ids take part
    let candidates = store.find_transcript_ids_by_prefix(transcript_query)?;
    let transcript_id = match match_id(transcript_query, evaluator.filter_visible(viewer, &candidates)?) {
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
                let title = store.get_transcript(&id)?.map(|t| t.title).unwrap_or_default();
                println!("   {}  {}", id, truncate(&title, 60));
            }
            return Ok(());
        }
    };

    let Some(transcript) = evaluator.transcript_for(viewer, &transcript_id)? else {
        println!("Transcript '{}' not found.", transcript_query);
        return Ok(());
    };

    println!("\n{}", "=".repeat(80));
    println!("Transcript: {} ({})", transcript.id, transcript.source_id);
    println!("Title: {}", transcript.title);
    println!("Date: {}", transcript.date);

    if let Some(classification) = store.get_classification(&transcript.id)? {
        println!(
            "Visibility: {} ({}{})",
            classification.visibility,
            classification.classification_reason,
            if classification.is_weekly_exception { ", weekly exception" } else { "" }
        );
    }
    if let Some(link) = store.get_project_link(&transcript.id)? {
        let project = store
            .get_project(&link.project_id)?
            .map(|p| p.name)
            .unwrap_or_else(|| link.project_id.clone());
        println!("Project: {} via {}", project, link.link_source);
    }

    let attendees = store.get_attendees(&transcript.id)?;
    if !attendees.is_empty() {
        let people: Vec<String> = attendees
            .iter()
            .map(|a| match &a.name {
                Some(name) => format!("{} <{}>", name, a.email),
                None => a.email.clone(),
            })
            .collect();
        println!("Attendees: {}", people.join(", "));
    }
    println!("{}", "=".repeat(80));

    if let Some(summary) = &transcript.summary {
        println!("\n## Summary\n\n{}", summary);
    }
    println!("\n{}", transcript.content);

    Ok(())
}
