//! Client/project catalog, routing rules and access grants
//!
//! Every write commits together with its audit event.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{ClientRow, ProjectRow, ProjectScope, Role, Store};
use crate::audit::{self, AuditEvent, AuditEventType};
use crate::error::{Error, Result};
use crate::normalize::{
    normalize_comparable_text, normalize_domain, normalize_title, normalize_user_id,
};

/// Input for `Store::create_project`
#[derive(Debug, Clone)]
pub struct NewProject<'a> {
    pub client_id: &'a str,
    pub name: &'a str,
    pub scope: ProjectScope,
    pub owner_user_id: Option<&'a str>,
    pub is_inbox: bool,
}

/// Partial update for `Store::update_client`; `None` leaves a field as is
///
/// `owner_user_id: Some(None)` clears the owner.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate<'a> {
    pub name: Option<&'a str>,
    pub owner_user_id: Option<Option<&'a str>>,
}

/// Partial update for `Store::update_project`
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate<'a> {
    pub client_id: Option<&'a str>,
    pub name: Option<&'a str>,
    pub scope: Option<ProjectScope>,
    pub owner_user_id: Option<Option<&'a str>>,
    pub is_inbox: Option<bool>,
}

fn ensure_exists(conn: &Connection, table: &str, entity: &'static str, id: &str) -> Result<()> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?", table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(Error::not_found(entity, id)),
    }
}

fn require_non_empty<'v>(value: &'v str, field: &str) -> Result<&'v str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} is required", field)));
    }
    Ok(trimmed)
}

fn map_client(row: &rusqlite::Row) -> rusqlite::Result<ClientRow> {
    Ok(ClientRow {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        owner_user_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_project(row: &rusqlite::Row) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        scope: row.get(3)?,
        owner_user_id: row.get(4)?,
        is_inbox: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Store {
    // ============================================
    // CLIENTS
    // ============================================

    pub fn create_client(
        &mut self,
        name: &str,
        owner_user_id: Option<&str>,
        actor: Option<&str>,
    ) -> Result<ClientRow> {
        let name = require_non_empty(name, "client name")?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let client = ClientRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            normalized_name: normalize_comparable_text(name),
            owner_user_id: owner_user_id.and_then(normalize_user_id),
            created_at: now.clone(),
        };

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO clients (id, name, normalized_name, owner_user_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                client.id,
                client.name,
                client.normalized_name,
                client.owner_user_id,
                client.created_at
            ],
        )?;
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ClientCreated, "client", &client.id)
                .actor(actor)
                .payload(json!({ "name": client.name })),
        )?;
        tx.commit()?;

        info!(client_id = %client.id, name = %client.name, "client created");
        Ok(client)
    }

    pub fn get_client(&self, id: &str) -> Result<Option<ClientRow>> {
        self.conn
            .query_row(
                r#"SELECT id, name, normalized_name, owner_user_id, created_at
                   FROM clients
                   WHERE id = ?"#,
                params![id],
                map_client,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_clients(&self) -> Result<Vec<ClientRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, name, normalized_name, owner_user_id, created_at
               FROM clients
               ORDER BY name, id"#,
        )?;

        let rows = stmt.query_map([], map_client)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Rename a client or change its owner; a rename re-derives the
    /// normalized name used by the client-inbox lookup
    pub fn update_client(
        &mut self,
        id: &str,
        update: &ClientUpdate<'_>,
        actor: Option<&str>,
    ) -> Result<ClientRow> {
        let name = update
            .name
            .map(|n| require_non_empty(n, "client name"))
            .transpose()?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        let mut client = tx
            .query_row(
                r#"SELECT id, name, normalized_name, owner_user_id, created_at
                   FROM clients
                   WHERE id = ?"#,
                params![id],
                map_client,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("client", id))?;

        let mut changed = serde_json::Map::new();
        if let Some(name) = name {
            client.name = name.to_string();
            client.normalized_name = normalize_comparable_text(name);
            changed.insert("name".into(), json!(client.name));
        }
        if let Some(owner) = update.owner_user_id {
            client.owner_user_id = owner.and_then(normalize_user_id);
            changed.insert("owner_user_id".into(), json!(client.owner_user_id));
        }

        tx.execute(
            "UPDATE clients SET name = ?, normalized_name = ?, owner_user_id = ? WHERE id = ?",
            params![client.name, client.normalized_name, client.owner_user_id, client.id],
        )?;
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ClientUpdated, "client", &client.id)
                .actor(actor)
                .payload(serde_json::Value::Object(changed)),
        )?;
        tx.commit()?;

        info!(client_id = %client.id, name = %client.name, "client updated");
        Ok(client)
    }

    /// Deleting a client removes its projects, their routing rules, memberships
    /// and transcript links
    pub fn delete_client(&mut self, id: &str, actor: Option<&str>) -> Result<()> {
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        let name: Option<String> = tx
            .query_row(
                "DELETE FROM clients WHERE id = ? RETURNING name",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(name) = name else {
            return Err(Error::not_found("client", id));
        };

        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ClientDeleted, "client", id)
                .actor(actor)
                .payload(json!({ "name": name })),
        )?;
        tx.commit()?;

        info!(client_id = id, %name, "client deleted");
        Ok(())
    }

    // ============================================
    // PROJECTS
    // ============================================

    pub fn create_project(&mut self, new: &NewProject<'_>, actor: Option<&str>) -> Result<ProjectRow> {
        let name = require_non_empty(new.name, "project name")?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();

        let tx = conn.transaction()?;
        ensure_exists(&tx, "clients", "client", new.client_id)?;

        let project = ProjectRow {
            id: Uuid::new_v4().to_string(),
            client_id: new.client_id.to_string(),
            name: name.to_string(),
            scope: new.scope.as_str().to_string(),
            owner_user_id: new.owner_user_id.and_then(normalize_user_id),
            is_inbox: new.is_inbox,
            created_at: now.clone(),
        };
        tx.execute(
            r#"INSERT INTO projects (id, client_id, name, scope, owner_user_id, is_inbox, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                project.id,
                project.client_id,
                project.name,
                project.scope,
                project.owner_user_id,
                project.is_inbox,
                project.created_at
            ],
        )?;
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ProjectCreated, "project", &project.id)
                .actor(actor)
                .payload(json!({
                    "client_id": project.client_id,
                    "scope": project.scope,
                    "is_inbox": project.is_inbox,
                })),
        )?;
        tx.commit()?;

        info!(
            project_id = %project.id,
            client_id = %project.client_id,
            scope = %project.scope,
            is_inbox = project.is_inbox,
            "project created"
        );
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<ProjectRow>> {
        self.conn
            .query_row(
                r#"SELECT id, client_id, name, scope, owner_user_id, is_inbox, created_at
                   FROM projects
                   WHERE id = ?"#,
                params![id],
                map_project,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_projects(&self, client_id: Option<&str>) -> Result<Vec<ProjectRow>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT id, client_id, name, scope, owner_user_id, is_inbox, created_at
               FROM projects
               WHERE ?1 IS NULL OR client_id = ?1
               ORDER BY name, id"#,
        )?;

        let rows = stmt.query_map(params![client_id], map_project)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Changes take effect for transcripts ingested afterwards; existing
    /// links are not re-resolved
    pub fn update_project(
        &mut self,
        id: &str,
        update: &ProjectUpdate<'_>,
        actor: Option<&str>,
    ) -> Result<ProjectRow> {
        let name = update
            .name
            .map(|n| require_non_empty(n, "project name"))
            .transpose()?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        let mut project = tx
            .query_row(
                r#"SELECT id, client_id, name, scope, owner_user_id, is_inbox, created_at
                   FROM projects
                   WHERE id = ?"#,
                params![id],
                map_project,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("project", id))?;

        let mut changed = serde_json::Map::new();
        if let Some(client_id) = update.client_id {
            ensure_exists(&tx, "clients", "client", client_id)?;
            project.client_id = client_id.to_string();
            changed.insert("client_id".into(), json!(project.client_id));
        }
        if let Some(name) = name {
            project.name = name.to_string();
            changed.insert("name".into(), json!(project.name));
        }
        if let Some(scope) = update.scope {
            project.scope = scope.as_str().to_string();
            changed.insert("scope".into(), json!(project.scope));
        }
        if let Some(owner) = update.owner_user_id {
            project.owner_user_id = owner.and_then(normalize_user_id);
            changed.insert("owner_user_id".into(), json!(project.owner_user_id));
        }
        if let Some(is_inbox) = update.is_inbox {
            project.is_inbox = is_inbox;
            changed.insert("is_inbox".into(), json!(project.is_inbox));
        }

        tx.execute(
            r#"UPDATE projects
               SET client_id = ?, name = ?, scope = ?, owner_user_id = ?, is_inbox = ?
               WHERE id = ?"#,
            params![
                project.client_id,
                project.name,
                project.scope,
                project.owner_user_id,
                project.is_inbox,
                project.id
            ],
        )?;
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ProjectUpdated, "project", &project.id)
                .actor(actor)
                .payload(serde_json::Value::Object(changed)),
        )?;
        tx.commit()?;

        info!(
            project_id = %project.id,
            client_id = %project.client_id,
            scope = %project.scope,
            is_inbox = project.is_inbox,
            "project updated"
        );
        Ok(project)
    }

    /// Routing rules, memberships and transcript links of the project go
    /// with it; linked transcripts become unrouted
    pub fn delete_project(&mut self, id: &str, actor: Option<&str>) -> Result<()> {
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        let client_id: Option<String> = tx
            .query_row(
                "DELETE FROM projects WHERE id = ? RETURNING client_id",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(client_id) = client_id else {
            return Err(Error::not_found("project", id));
        };

        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ProjectDeleted, "project", id)
                .actor(actor)
                .payload(json!({ "client_id": client_id })),
        )?;
        tx.commit()?;

        info!(project_id = id, %client_id, "project deleted");
        Ok(())
    }

    // ============================================
    // ROUTING RULES
    // ============================================

    /// Route transcripts with an attendee on `domain` to the project
    pub fn add_project_domain(
        &mut self,
        project_id: &str,
        domain: &str,
        actor: Option<&str>,
    ) -> Result<i64> {
        let domain = require_non_empty(domain, "domain")?;
        let normalized = normalize_domain(domain);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("domain is required".to_string()));
        }

        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;
        ensure_exists(&tx, "projects", "project", project_id)?;

        let id: i64 = tx.query_row(
            r#"INSERT INTO project_domains (project_id, domain, normalized_domain, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(project_id, normalized_domain) DO UPDATE SET domain = excluded.domain
               RETURNING id"#,
            params![project_id, domain, normalized, now],
            |row| row.get(0),
        )?;
        let entity_id = id.to_string();
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ProjectDomainCreated, "project_domain", &entity_id)
                .actor(actor)
                .payload(json!({ "project_id": project_id, "normalized_domain": normalized })),
        )?;
        tx.commit()?;

        info!(project_id, domain = %normalized, "project domain added");
        Ok(id)
    }

    pub fn remove_project_domain(&mut self, id: i64, actor: Option<&str>) -> Result<()> {
        self.delete_routing_rule(
            "project_domains",
            "project domain",
            AuditEventType::ProjectDomainDeleted,
            "project_domain",
            id,
            actor,
        )
    }

    /// Route transcripts whose normalized title equals `alias` to the project
    pub fn add_project_alias(
        &mut self,
        project_id: &str,
        alias: &str,
        actor: Option<&str>,
    ) -> Result<i64> {
        let alias = require_non_empty(alias, "alias")?;
        let normalized = normalize_title(alias);

        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;
        ensure_exists(&tx, "projects", "project", project_id)?;

        let id: i64 = tx.query_row(
            r#"INSERT INTO project_aliases (project_id, alias, normalized_alias, created_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(project_id, normalized_alias) DO UPDATE SET alias = excluded.alias
               RETURNING id"#,
            params![project_id, alias, normalized, now],
            |row| row.get(0),
        )?;
        let entity_id = id.to_string();
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::ProjectAliasCreated, "project_alias", &entity_id)
                .actor(actor)
                .payload(json!({ "project_id": project_id, "normalized_alias": normalized })),
        )?;
        tx.commit()?;

        info!(project_id, alias = %normalized, "project alias added");
        Ok(id)
    }

    pub fn remove_project_alias(&mut self, id: i64, actor: Option<&str>) -> Result<()> {
        self.delete_routing_rule(
            "project_aliases",
            "project alias",
            AuditEventType::ProjectAliasDeleted,
            "project_alias",
            id,
            actor,
        )
    }

    fn delete_routing_rule(
        &mut self,
        table: &str,
        entity: &'static str,
        event_type: AuditEventType,
        entity_type: &str,
        id: i64,
        actor: Option<&str>,
    ) -> Result<()> {
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        let project_id: Option<String> = tx
            .query_row(
                &format!("DELETE FROM {} WHERE id = ? RETURNING project_id", table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(project_id) = project_id else {
            return Err(Error::not_found(entity, id.to_string()));
        };

        let entity_id = id.to_string();
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(event_type, entity_type, &entity_id)
                .actor(actor)
                .payload(json!({ "project_id": project_id })),
        )?;
        tx.commit()?;

        info!(id, %project_id, "{} removed", entity);
        Ok(())
    }

    // ============================================
    // ACCESS GRANTS
    // ============================================

    /// Returns false when the membership already existed
    pub fn grant_client_membership(
        &mut self,
        user_id: &str,
        client_id: &str,
        actor: Option<&str>,
    ) -> Result<bool> {
        let user_id = require_non_empty(user_id, "user id")?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;
        ensure_exists(&tx, "clients", "client", client_id)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO client_memberships (user_id, client_id, created_at) VALUES (?, ?, ?)",
            params![user_id, client_id, now],
        )? > 0;
        if inserted {
            audit::record(
                &tx,
                &now,
                &AuditEvent::new(AuditEventType::ClientMembershipGranted, "client", client_id)
                    .actor(actor)
                    .payload(json!({ "user_id": user_id })),
            )?;
        }
        tx.commit()?;

        if inserted {
            info!(user_id, client_id, "client membership granted");
        }
        Ok(inserted)
    }

    /// Returns false when the membership already existed
    pub fn grant_project_membership(
        &mut self,
        user_id: &str,
        project_id: &str,
        actor: Option<&str>,
    ) -> Result<bool> {
        let user_id = require_non_empty(user_id, "user id")?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;
        ensure_exists(&tx, "projects", "project", project_id)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO project_memberships (user_id, project_id, created_at) VALUES (?, ?, ?)",
            params![user_id, project_id, now],
        )? > 0;
        if inserted {
            audit::record(
                &tx,
                &now,
                &AuditEvent::new(AuditEventType::ProjectMembershipGranted, "project", project_id)
                    .actor(actor)
                    .payload(json!({ "user_id": user_id })),
            )?;
        }
        tx.commit()?;

        if inserted {
            info!(user_id, project_id, "project membership granted");
        }
        Ok(inserted)
    }

    pub fn set_user_role(&mut self, user_id: &str, role: Role, actor: Option<&str>) -> Result<()> {
        let user_id = require_non_empty(user_id, "user id")?;
        let (conn, clock) = self.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO user_roles (user_id, role, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at"#,
            params![user_id, role.as_str(), now],
        )?;
        audit::record(
            &tx,
            &now,
            &AuditEvent::new(AuditEventType::UserRoleUpdated, "user", user_id)
                .actor(actor)
                .payload(json!({ "role": role.as_str() })),
        )?;
        tx.commit()?;

        info!(user_id, role = role.as_str(), "user role updated");
        Ok(())
    }

    pub fn user_role(&self, user_id: &str) -> Result<Role> {
        let Some(user_id) = normalize_user_id(user_id) else {
            return Ok(Role::Member);
        };
        let role: Option<String> = self
            .conn
            .query_row(
                "SELECT role FROM user_roles WHERE user_id = ?",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match role.as_deref() {
            Some("admin") => Role::Admin,
            _ => Role::Member,
        })
    }
}
