//! Transcript and catalog storage with SQLite
//!
//! One `Store` wraps one connection. Writes that must be atomic (ingestion,
//! catalog edits together with their audit event) run in their own
//! transaction; reads go straight to the connection.

mod catalog;
mod schema;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::audit::{self, AuditEventRow};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::normalize::escape_like;

pub use catalog::{ClientUpdate, NewProject, ProjectUpdate};
pub use schema::SCHEMA;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Store {
    conn: Connection,
    clock: Box<dyn Clock>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            clock: Box::new(SystemClock),
        })
    }

    /// Replace the time source used for every timestamp this store writes
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Connection, &dyn Clock) {
        (&mut self.conn, self.clock.as_ref())
    }

    // ============================================
    // TRANSCRIPTS
    // ============================================

    pub fn get_transcript(&self, id: &str) -> Result<Option<TranscriptRow>> {
        let row = self.conn.query_row(
            r#"SELECT id, source_id, title, content, summary, date, created_at, updated_at
               FROM transcripts
               WHERE id = ?"#,
            params![id],
            |row| {
                Ok(TranscriptRow {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    title: row.get(2)?,
                    content: row.get(3)?,
                    summary: row.get(4)?,
                    date: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            },
        );

        match row {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_transcript_id_by_source(&self, source_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT id FROM transcripts WHERE source_id = ?",
                params![source_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Ids equal to or starting with `prefix`, for short ids typed by hand
    pub fn find_transcript_ids_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id FROM transcripts
               WHERE id LIKE ? ESCAPE '\'
               ORDER BY id"#,
        )?;

        let pattern = format!("{}%", escape_like(prefix.trim()));
        let rows = stmt.query_map(params![pattern], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Newest first; `query` is a case-insensitive title substring
    pub fn search_transcripts(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TranscriptSummaryRow>> {
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let mut stmt = self.conn.prepare(
            r#"SELECT id, source_id, title, date, summary
               FROM transcripts
               WHERE ?1 IS NULL OR title LIKE ?1 ESCAPE '\'
               ORDER BY date DESC, id ASC
               LIMIT ?2"#,
        )?;

        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok(TranscriptSummaryRow {
                id: row.get(0)?,
                source_id: row.get(1)?,
                title: row.get(2)?,
                date: row.get(3)?,
                summary: row.get(4)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get_attendees(&self, transcript_id: &str) -> Result<Vec<AttendeeRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT email, normalized_email, name
               FROM transcript_attendees
               WHERE transcript_id = ?
               ORDER BY id"#,
        )?;

        let rows = stmt.query_map(params![transcript_id], |row| {
            Ok(AttendeeRow {
                email: row.get(0)?,
                normalized_email: row.get(1)?,
                name: row.get(2)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get_classification(&self, transcript_id: &str) -> Result<Option<ClassificationRow>> {
        self.conn
            .query_row(
                r#"SELECT visibility, classification_reason, is_weekly_exception,
                          normalized_title, attendee_count, external_attendee_count,
                          classified_at
                   FROM transcript_classification
                   WHERE transcript_id = ?"#,
                params![transcript_id],
                |row| {
                    Ok(ClassificationRow {
                        visibility: row.get(0)?,
                        classification_reason: row.get(1)?,
                        is_weekly_exception: row.get(2)?,
                        normalized_title: row.get(3)?,
                        attendee_count: row.get(4)?,
                        external_attendee_count: row.get(5)?,
                        classified_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_project_link(&self, transcript_id: &str) -> Result<Option<ProjectLinkRow>> {
        self.conn
            .query_row(
                r#"SELECT project_id, link_source, updated_at
                   FROM transcript_project_links
                   WHERE transcript_id = ?"#,
                params![transcript_id],
                |row| {
                    Ok(ProjectLinkRow {
                        project_id: row.get(0)?,
                        link_source: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn transcript_audit_events(&self, transcript_id: &str) -> Result<Vec<AuditEventRow>> {
        audit::events_for_entity(&self.conn, "transcript", transcript_id)
    }
}

// ============================================
// ENUMS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectScope {
    Personal,
    Client,
    Global,
}

impl ProjectScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectScope::Personal => "personal",
            ProjectScope::Client => "client",
            ProjectScope::Global => "global",
        }
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "personal" => Ok(ProjectScope::Personal),
            "client" => Ok(ProjectScope::Client),
            "global" => Ok(ProjectScope::Global),
            other => Err(format!("unknown project scope: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptRow {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSummaryRow {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub date: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendeeRow {
    pub email: String,
    pub normalized_email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRow {
    pub visibility: String,
    pub classification_reason: String,
    pub is_weekly_exception: bool,
    pub normalized_title: String,
    pub attendee_count: i64,
    pub external_attendee_count: i64,
    pub classified_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectLinkRow {
    pub project_id: String,
    pub link_source: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientRow {
    pub id: String,
    pub name: String,
    pub normalized_name: String,
    pub owner_user_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectRow {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub scope: String,
    pub owner_user_id: Option<String>,
    pub is_inbox: bool,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_dirs_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/meetroute.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());

        let tables: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE 'transcript%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);

        // schema application is idempotent
        drop(store);
        Store::open(&path).unwrap();
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();
        let result = store.conn().execute(
            "INSERT INTO projects (id, client_id, name, scope, is_inbox, created_at)
             VALUES ('p1', 'missing-client', 'P', 'client', 0, 'now')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_search_transcripts_orders_and_escapes() {
        let store = Store::open_in_memory().unwrap();
        for (id, title, date) in [
            ("t1", "Acme kickoff", "2026-01-01T10:00:00Z"),
            ("t2", "Acme review", "2026-02-01T10:00:00Z"),
            ("t3", "100% roadmap", "2026-03-01T10:00:00Z"),
        ] {
            store
                .conn()
                .execute(
                    "INSERT INTO transcripts (id, source_id, title, content, date, created_at, updated_at)
                     VALUES (?1, ?1, ?2, '', ?3, ?3, ?3)",
                    params![id, title, date],
                )
                .unwrap();
        }

        let all = store.search_transcripts(None, 50).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t2", "t1"]);

        let acme = store.search_transcripts(Some("ACME"), 1).unwrap();
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].id, "t2");

        let percent = store.search_transcripts(Some("0%"), 50).unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].id, "t3");

        assert!(store.get_transcript("missing").unwrap().is_none());
        assert_eq!(
            store.find_transcript_id_by_source("t1").unwrap().as_deref(),
            Some("t1")
        );
        assert_eq!(store.find_transcript_ids_by_prefix("t").unwrap().len(), 3);
        assert_eq!(store.find_transcript_ids_by_prefix("t2").unwrap(), vec!["t2"]);
    }
}
