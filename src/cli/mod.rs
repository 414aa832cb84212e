//! Subcommand implementations for the `meetroute` binary

pub mod audit;
pub mod client;
pub mod grant;
pub mod ingest;
pub mod list;
pub mod project;
pub mod read;

use anyhow::{anyhow, Result};

use crate::store::{ClientRow, ProjectRow, Store};

/// Result of resolving a typed id or id prefix against stored ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IdMatch {
    None,
    One(String),
    Ambiguous(Vec<String>),
}

/// An exact id wins; otherwise the prefix must select a single candidate
pub(crate) fn match_id(query: &str, mut candidates: Vec<String>) -> IdMatch {
    if let Some(pos) = candidates.iter().position(|id| id == query) {
        return IdMatch::One(candidates.swap_remove(pos));
    }
    match candidates.len() {
        0 => IdMatch::None,
        1 => IdMatch::One(candidates.remove(0)),
        _ => IdMatch::Ambiguous(candidates),
    }
}

/// Exact id or name matches win over id-prefix matches; more than one
/// remaining match is an error
fn find_unique<T>(
    kind: &str,
    query: &str,
    rows: Vec<T>,
    id: fn(&T) -> &str,
    name: fn(&T) -> &str,
) -> Result<T> {
    let (exact, prefixed): (Vec<T>, Vec<T>) = rows
        .into_iter()
        .filter(|r| id(r).starts_with(query) || name(r) == query)
        .partition(|r| id(r) == query || name(r) == query);
    let mut matches = if exact.is_empty() { prefixed } else { exact };

    match matches.len() {
        0 => Err(anyhow!("{} not found: {}", kind, query)),
        1 => Ok(matches.remove(0)),
        _ => {
            let ids: Vec<&str> = matches.iter().map(id).collect();
            Err(anyhow!(
                "{} '{}' is ambiguous, matches: {}",
                kind,
                query,
                ids.join(", ")
            ))
        }
    }
}

/// Find a client by id, id prefix or exact name
pub(crate) fn find_client(store: &Store, query: &str) -> Result<ClientRow> {
    find_unique("Client", query, store.list_clients()?, |c| c.id.as_str(), |c| c.name.as_str())
}

/// Find a project by id, id prefix or exact name
pub(crate) fn find_project(store: &Store, query: &str) -> Result<ProjectRow> {
    find_unique("Project", query, store.list_projects(None)?, |p| p.id.as_str(), |p| p.name.as_str())
}

/// `--clear-owner` beats `--owner`; neither leaves the owner unchanged
pub(crate) fn owner_change(owner: Option<&str>, clear_owner: bool) -> Option<Option<&str>> {
    if clear_owner {
        Some(None)
    } else {
        owner.map(Some)
    }
}

pub(crate) fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or(text);
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
