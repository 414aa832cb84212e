//! Project-link resolution
//!
//! A non-private transcript is routed to at most one project by running an
//! ordered list of lookups and keeping the first hit:
//!
//! 1. `domain_match`: a project claims one of the attendee domains
//! 2. `title_alias`: a project alias equals the normalized title
//! 3. `client_inbox_fallback`: a client is named after an attendee domain
//!    root and has an inbox project
//! 4. `global_triage_fallback`: the global inbox project
//!
//! Later lookups never run once an earlier one has matched.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::normalize::{escape_like, RoutingSignals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    DomainMatch,
    TitleAlias,
    ClientInboxFallback,
    GlobalTriageFallback,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkSource::DomainMatch => "domain_match",
            LinkSource::TitleAlias => "title_alias",
            LinkSource::ClientInboxFallback => "client_inbox_fallback",
            LinkSource::GlobalTriageFallback => "global_triage_fallback",
        }
    }
}

impl fmt::Display for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "domain_match" => Ok(LinkSource::DomainMatch),
            "title_alias" => Ok(LinkSource::TitleAlias),
            "client_inbox_fallback" => Ok(LinkSource::ClientInboxFallback),
            "global_triage_fallback" => Ok(LinkSource::GlobalTriageFallback),
            other => Err(format!("unknown link source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCandidate {
    pub project_id: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLink {
    pub project_id: String,
    pub client_id: String,
    pub link_source: LinkSource,
}

/// Catalog lookups the cascade is built from
///
/// All inputs are already normalized.
pub trait ProjectCatalog {
    /// Lowest project id among projects claiming any of `domains`
    fn project_by_domain(&self, domains: &[String]) -> Result<Option<ProjectCandidate>>;

    fn project_by_alias(&self, normalized_title: &str) -> Result<Option<ProjectCandidate>>;

    /// Exact client-name match on `root` (lowest id), else the first `root%`
    /// prefix match by normalized name then id
    fn client_by_domain_root(&self, root: &str) -> Result<Option<String>>;

    fn client_inbox(&self, client_id: &str) -> Result<Option<ProjectCandidate>>;

    fn global_inbox(&self) -> Result<Option<ProjectCandidate>>;
}

type Strategy = fn(&dyn ProjectCatalog, &RoutingSignals) -> Result<Option<ProjectCandidate>>;

const CASCADE: [(LinkSource, Strategy); 4] = [
    (LinkSource::DomainMatch, match_domain),
    (LinkSource::TitleAlias, match_title_alias),
    (LinkSource::ClientInboxFallback, match_client_inbox),
    (LinkSource::GlobalTriageFallback, match_global_inbox),
];

fn match_domain(
    catalog: &dyn ProjectCatalog,
    signals: &RoutingSignals,
) -> Result<Option<ProjectCandidate>> {
    if signals.domains.is_empty() {
        return Ok(None);
    }
    catalog.project_by_domain(&signals.domains)
}

fn match_title_alias(
    catalog: &dyn ProjectCatalog,
    signals: &RoutingSignals,
) -> Result<Option<ProjectCandidate>> {
    if signals.normalized_title.is_empty() {
        return Ok(None);
    }
    catalog.project_by_alias(&signals.normalized_title)
}

fn match_client_inbox(
    catalog: &dyn ProjectCatalog,
    signals: &RoutingSignals,
) -> Result<Option<ProjectCandidate>> {
    for root in &signals.domain_roots {
        if let Some(client_id) = catalog.client_by_domain_root(root)? {
            // first known client decides; no inbox means fall through
            return catalog.client_inbox(&client_id);
        }
    }
    Ok(None)
}

fn match_global_inbox(
    catalog: &dyn ProjectCatalog,
    _signals: &RoutingSignals,
) -> Result<Option<ProjectCandidate>> {
    catalog.global_inbox()
}

/// Run the cascade; `Ok(None)` leaves the transcript unrouted
///
/// Only meaningful for non-private transcripts.
pub fn resolve(
    catalog: &dyn ProjectCatalog,
    signals: &RoutingSignals,
) -> Result<Option<ResolvedLink>> {
    for (link_source, strategy) in CASCADE {
        if let Some(candidate) = strategy(catalog, signals)? {
            debug!(
                stage = link_source.as_str(),
                project_id = %candidate.project_id,
                "resolver matched"
            );
            return Ok(Some(ResolvedLink {
                project_id: candidate.project_id,
                client_id: candidate.client_id,
                link_source,
            }));
        }
        debug!(stage = link_source.as_str(), "resolver stage missed");
    }
    Ok(None)
}

/// `ProjectCatalog` over the store's tables
///
/// Borrowing a plain connection lets ingestion run lookups inside its own
/// transaction.
pub struct SqliteCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn load_candidate(&self, project_id: &str) -> Result<ProjectCandidate> {
        let client_id: Option<String> = self
            .conn
            .query_row(
                "SELECT client_id FROM projects WHERE id = ?",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;

        match client_id {
            Some(client_id) => Ok(ProjectCandidate {
                project_id: project_id.to_string(),
                client_id,
            }),
            None => Err(Error::not_found("project", project_id)),
        }
    }

    fn first_project(&self, sql: &str, params: impl rusqlite::Params) -> Result<Option<ProjectCandidate>> {
        self.conn
            .query_row(sql, params, |row| {
                Ok(ProjectCandidate {
                    project_id: row.get(0)?,
                    client_id: row.get(1)?,
                })
            })
            .optional()
            .map_err(Into::into)
    }
}

impl ProjectCatalog for SqliteCatalog<'_> {
    fn project_by_domain(&self, domains: &[String]) -> Result<Option<ProjectCandidate>> {
        let domains = serde_json::to_string(domains)?;
        let project_id: Option<String> = self
            .conn
            .query_row(
                r#"SELECT project_id
                   FROM project_domains
                   WHERE normalized_domain IN (SELECT value FROM json_each(?1))
                   ORDER BY project_id
                   LIMIT 1"#,
                params![domains],
                |row| row.get(0),
            )
            .optional()?;

        project_id.map(|id| self.load_candidate(&id)).transpose()
    }

    fn project_by_alias(&self, normalized_title: &str) -> Result<Option<ProjectCandidate>> {
        let project_id: Option<String> = self
            .conn
            .query_row(
                r#"SELECT project_id
                   FROM project_aliases
                   WHERE normalized_alias = ?
                   ORDER BY project_id
                   LIMIT 1"#,
                params![normalized_title],
                |row| row.get(0),
            )
            .optional()?;

        project_id.map(|id| self.load_candidate(&id)).transpose()
    }

    fn client_by_domain_root(&self, root: &str) -> Result<Option<String>> {
        let exact: Option<String> = self
            .conn
            .query_row(
                r#"SELECT id FROM clients
                   WHERE normalized_name = ?
                   ORDER BY id
                   LIMIT 1"#,
                params![root],
                |row| row.get(0),
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        let pattern = format!("{}%", escape_like(root));
        self.conn
            .query_row(
                r#"SELECT id FROM clients
                   WHERE normalized_name LIKE ? ESCAPE '\'
                   ORDER BY normalized_name, id
                   LIMIT 1"#,
                params![pattern],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn client_inbox(&self, client_id: &str) -> Result<Option<ProjectCandidate>> {
        self.first_project(
            r#"SELECT id, client_id FROM projects
               WHERE client_id = ? AND is_inbox = TRUE AND scope = 'client'
               ORDER BY name, id
               LIMIT 1"#,
            params![client_id],
        )
    }

    fn global_inbox(&self) -> Result<Option<ProjectCandidate>> {
        self.first_project(
            r#"SELECT id, client_id FROM projects
               WHERE scope = 'global' AND is_inbox = TRUE
               ORDER BY name, id
               LIMIT 1"#,
            [],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_attendees;
    use crate::store::{NewProject, ProjectScope, Store};
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn signals(title: &str, emails: &[&str]) -> RoutingSignals {
        let attendees = normalize_attendees(emails.iter().map(|e| (*e, None)));
        RoutingSignals::derive(title, &attendees)
    }

    fn candidate(project_id: &str) -> ProjectCandidate {
        ProjectCandidate {
            project_id: project_id.to_string(),
            client_id: "c".to_string(),
        }
    }

    /// Answers from fixed tables and records every lookup it serves
    #[derive(Default)]
    struct RecordingCatalog {
        domain: Option<ProjectCandidate>,
        alias: Option<ProjectCandidate>,
        clients: HashMap<String, String>,
        inboxes: HashMap<String, ProjectCandidate>,
        global: Option<ProjectCandidate>,
        calls: RefCell<Vec<String>>,
    }

    impl RecordingCatalog {
        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ProjectCatalog for RecordingCatalog {
        fn project_by_domain(&self, domains: &[String]) -> Result<Option<ProjectCandidate>> {
            self.calls.borrow_mut().push(format!("domain:{}", domains.join(",")));
            Ok(self.domain.clone())
        }

        fn project_by_alias(&self, normalized_title: &str) -> Result<Option<ProjectCandidate>> {
            self.calls.borrow_mut().push(format!("alias:{}", normalized_title));
            Ok(self.alias.clone())
        }

        fn client_by_domain_root(&self, root: &str) -> Result<Option<String>> {
            self.calls.borrow_mut().push(format!("client:{}", root));
            Ok(self.clients.get(root).cloned())
        }

        fn client_inbox(&self, client_id: &str) -> Result<Option<ProjectCandidate>> {
            self.calls.borrow_mut().push(format!("inbox:{}", client_id));
            Ok(self.inboxes.get(client_id).cloned())
        }

        fn global_inbox(&self) -> Result<Option<ProjectCandidate>> {
            self.calls.borrow_mut().push("global".to_string());
            Ok(self.global.clone())
        }
    }

    #[test]
    fn test_domain_match_short_circuits_alias_lookup() {
        let catalog = RecordingCatalog {
            domain: Some(candidate("p-domain")),
            alias: Some(candidate("p-alias")),
            global: Some(candidate("p-global")),
            ..Default::default()
        };

        let link = resolve(&catalog, &signals("Website Weekly", &["alice@clientco.com"]))
            .unwrap()
            .unwrap();
        assert_eq!(link.project_id, "p-domain");
        assert_eq!(link.link_source, LinkSource::DomainMatch);
        assert_eq!(catalog.calls(), vec!["domain:clientco.com"]);
    }

    #[test]
    fn test_alias_used_when_no_domain_matches() {
        let catalog = RecordingCatalog {
            alias: Some(candidate("p-alias")),
            global: Some(candidate("p-global")),
            ..Default::default()
        };

        let link = resolve(&catalog, &signals(" Website Weekly ", &["a@vendor.io"]))
            .unwrap()
            .unwrap();
        assert_eq!(link.link_source, LinkSource::TitleAlias);
        assert_eq!(
            catalog.calls(),
            vec!["domain:vendor.io", "alias:website weekly"]
        );
    }

    #[test]
    fn test_first_known_client_decides_inbox() {
        let mut catalog = RecordingCatalog {
            global: Some(candidate("p-global")),
            ..Default::default()
        };
        catalog.clients.insert("acme".into(), "c-acme".into());
        catalog.clients.insert("vendor".into(), "c-vendor".into());
        catalog.inboxes.insert("c-vendor".into(), candidate("p-vendor-inbox"));

        // acme is found first but has no inbox, so routing falls to global
        let link = resolve(&catalog, &signals("Sync", &["a@acme.com", "b@vendor.io"]))
            .unwrap()
            .unwrap();
        assert_eq!(link.link_source, LinkSource::GlobalTriageFallback);
        assert_eq!(link.project_id, "p-global");
        assert_eq!(
            catalog.calls(),
            vec![
                "domain:acme.com,vendor.io",
                "alias:sync",
                "client:acme",
                "inbox:c-acme",
                "global"
            ]
        );
    }

    #[test]
    fn test_no_signals_skips_lookups_needing_them() {
        let catalog = RecordingCatalog::default();
        assert!(resolve(&catalog, &signals("", &[])).unwrap().is_none());
        assert_eq!(catalog.calls(), vec!["global"]);
    }

    #[test]
    fn test_link_source_parse() {
        for source in [
            LinkSource::DomainMatch,
            LinkSource::TitleAlias,
            LinkSource::ClientInboxFallback,
            LinkSource::GlobalTriageFallback,
        ] {
            assert_eq!(source.as_str().parse::<LinkSource>().unwrap(), source);
        }
        assert!("manual".parse::<LinkSource>().is_err());
    }

    // ------------------------------------------------------------
    // SQLite catalog
    // ------------------------------------------------------------

    fn project(store: &mut Store, client_id: &str, name: &str, scope: ProjectScope, is_inbox: bool) -> String {
        store
            .create_project(
                &NewProject {
                    client_id,
                    name,
                    scope,
                    owner_user_id: None,
                    is_inbox,
                },
                None,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_sqlite_domain_tie_break_is_lowest_project_id() {
        let mut store = Store::open_in_memory().unwrap();
        let client = store.create_client("ClientCo", None, None).unwrap();
        let p1 = project(&mut store, &client.id, "One", ProjectScope::Client, false);
        let p2 = project(&mut store, &client.id, "Two", ProjectScope::Client, false);
        store.add_project_domain(&p1, "clientco.com", None).unwrap();
        store.add_project_domain(&p2, "clientco.io", None).unwrap();

        let catalog = SqliteCatalog::new(store.conn());
        let link = resolve(
            &catalog,
            &signals("x", &["a@clientco.io", "b@ClientCo.com"]),
        )
        .unwrap()
        .unwrap();
        assert_eq!(link.link_source, LinkSource::DomainMatch);
        assert_eq!(link.project_id, std::cmp::min(p1.clone(), p2.clone()));
        assert_eq!(link.client_id, client.id);
    }

    #[test]
    fn test_sqlite_client_prefix_and_inbox_tie_break() {
        let mut store = Store::open_in_memory().unwrap();
        let client = store.create_client("UnknownVendor Inc", None, None).unwrap();
        project(&mut store, &client.id, "Zeta inbox", ProjectScope::Client, true);
        let first = project(&mut store, &client.id, "Alpha inbox", ProjectScope::Client, true);
        project(&mut store, &client.id, "Regular", ProjectScope::Client, false);

        let catalog = SqliteCatalog::new(store.conn());
        assert_eq!(
            catalog.client_by_domain_root("unknownvendor").unwrap().as_deref(),
            Some(client.id.as_str())
        );
        // wildcard characters in the root are literal
        assert_eq!(catalog.client_by_domain_root("unknown_endor").unwrap(), None);

        let link = resolve(&catalog, &signals("Intro", &["bob@unknownvendor.io"]))
            .unwrap()
            .unwrap();
        assert_eq!(link.link_source, LinkSource::ClientInboxFallback);
        assert_eq!(link.project_id, first);
    }

    #[test]
    fn test_sqlite_exact_client_name_beats_prefix() {
        let mut store = Store::open_in_memory().unwrap();
        let longer = store.create_client("Acme Analytics", None, None).unwrap();
        let exact = store.create_client("acme", None, None).unwrap();

        let catalog = SqliteCatalog::new(store.conn());
        assert_eq!(
            catalog.client_by_domain_root("acme").unwrap().as_deref(),
            Some(exact.id.as_str())
        );
        assert_eq!(
            catalog.client_by_domain_root("acme a").unwrap().as_deref(),
            Some(longer.id.as_str())
        );
    }

    #[test]
    fn test_sqlite_prefix_match_ignores_name_case() {
        let mut store = Store::open_in_memory().unwrap();
        store.create_client("Acme Zeta", None, None).unwrap();
        let beta = store.create_client("acme beta", None, None).unwrap();

        let catalog = SqliteCatalog::new(store.conn());
        assert_eq!(
            catalog.client_by_domain_root("acme").unwrap().as_deref(),
            Some(beta.id.as_str())
        );
    }

    #[test]
    fn test_sqlite_exact_name_tie_break_is_lowest_id() {
        let mut store = Store::open_in_memory().unwrap();
        let upper = store.create_client("ACME", None, None).unwrap();
        let lower = store.create_client("acme", None, None).unwrap();

        let catalog = SqliteCatalog::new(store.conn());
        let expected = std::cmp::min(upper.id, lower.id);
        assert_eq!(
            catalog.client_by_domain_root("acme").unwrap(),
            Some(expected)
        );
    }

    #[test]
    fn test_sqlite_global_inbox_and_unrouted() {
        let mut store = Store::open_in_memory().unwrap();
        let internal = store.create_client("Internal", None, None).unwrap();

        {
            let catalog = SqliteCatalog::new(store.conn());
            assert!(resolve(&catalog, &signals("Chat", &["x@nowhere.net"]))
                .unwrap()
                .is_none());
        }

        let triage = project(&mut store, &internal.id, "Triage", ProjectScope::Global, true);
        // a client-scoped inbox is never the global fallback
        project(&mut store, &internal.id, "Aaa", ProjectScope::Client, true);

        let catalog = SqliteCatalog::new(store.conn());
        let link = resolve(&catalog, &signals("Chat", &["x@nowhere.net"]))
            .unwrap()
            .unwrap();
        assert_eq!(link.link_source, LinkSource::GlobalTriageFallback);
        assert_eq!(link.project_id, triage);
    }

    #[test]
    fn test_sqlite_dangling_domain_row_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "PRAGMA foreign_keys = OFF;
                 INSERT INTO project_domains (project_id, domain, normalized_domain, created_at)
                 VALUES ('gone', 'clientco.com', 'clientco.com', 'now');",
            )
            .unwrap();

        let catalog = SqliteCatalog::new(store.conn());
        let err = resolve(&catalog, &signals("x", &["a@clientco.com"])).unwrap_err();
        assert!(err.is_not_found());
    }
}
