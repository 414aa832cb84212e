//! Append-only audit trail
//!
//! Events are written on the caller's connection, so inside a transaction
//! they commit or roll back together with the change they describe.

use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    TranscriptIngested,
    TranscriptClassified,
    TranscriptRouted,
    ClientCreated,
    ClientUpdated,
    ClientDeleted,
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    ProjectDomainCreated,
    ProjectDomainDeleted,
    ProjectAliasCreated,
    ProjectAliasDeleted,
    ClientMembershipGranted,
    ProjectMembershipGranted,
    UserRoleUpdated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TranscriptIngested => "transcript.ingested",
            AuditEventType::TranscriptClassified => "transcript.classified",
            AuditEventType::TranscriptRouted => "transcript.routed",
            AuditEventType::ClientCreated => "client.created",
            AuditEventType::ClientUpdated => "client.updated",
            AuditEventType::ClientDeleted => "client.deleted",
            AuditEventType::ProjectCreated => "project.created",
            AuditEventType::ProjectUpdated => "project.updated",
            AuditEventType::ProjectDeleted => "project.deleted",
            AuditEventType::ProjectDomainCreated => "project.domain.created",
            AuditEventType::ProjectDomainDeleted => "project.domain.deleted",
            AuditEventType::ProjectAliasCreated => "project.alias.created",
            AuditEventType::ProjectAliasDeleted => "project.alias.deleted",
            AuditEventType::ClientMembershipGranted => "client.membership.granted",
            AuditEventType::ProjectMembershipGranted => "project.membership.granted",
            AuditEventType::UserRoleUpdated => "user.role.updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditEvent<'a> {
    pub event_type: AuditEventType,
    pub entity_type: &'a str,
    pub entity_id: Option<&'a str>,
    pub actor_user_id: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub payload: Value,
}

impl<'a> AuditEvent<'a> {
    pub fn new(event_type: AuditEventType, entity_type: &'a str, entity_id: &'a str) -> Self {
        Self {
            event_type,
            entity_type,
            entity_id: Some(entity_id),
            actor_user_id: None,
            request_id: None,
            payload: Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, actor_user_id: Option<&'a str>) -> Self {
        self.actor_user_id = actor_user_id;
        self
    }

    pub fn request(mut self, request_id: Option<&'a str>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Insert one event; a failure here must fail the surrounding unit of work
pub fn record(conn: &Connection, created_at: &str, event: &AuditEvent<'_>) -> Result<i64> {
    conn.execute(
        r#"INSERT INTO audit_events
           (actor_user_id, event_type, entity_type, entity_id, request_id, payload, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        params![
            event.actor_user_id,
            event.event_type.as_str(),
            event.entity_type,
            event.entity_id,
            event.request_id,
            serde_json::to_string(&event.payload)?,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditEventRow>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, actor_user_id, event_type, entity_type, entity_id, request_id,
                  payload, created_at
           FROM audit_events
           WHERE entity_type = ? AND entity_id = ?
           ORDER BY id"#,
    )?;

    let rows = stmt.query_map(params![entity_type, entity_id], |row| {
        let payload: String = row.get(6)?;
        Ok(AuditEventRow {
            id: row.get(0)?,
            actor_user_id: row.get(1)?,
            event_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            request_id: row.get(5)?,
            payload: serde_json::from_str(&payload).unwrap_or(Value::String(payload)),
            created_at: row.get(7)?,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEventRow {
    pub id: i64,
    pub actor_user_id: Option<String>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub request_id: Option<String>,
    pub payload: Value,
    pub created_at: String,
}
