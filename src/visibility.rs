//! Per-viewer transcript visibility
//!
//! - private: visible only to attendees, matched on normalized email
//! - non_private: visible through the linked project (owner, project member,
//!   member of the project's client); admins see every linked transcript
//! - no classification, or non_private without a link: invisible
//!
//! Every lookup is one query over the whole candidate set.

use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::classify::Visibility;
use crate::error::{Error, Result};
use crate::normalize::{normalize_email, normalize_user_id};
use crate::store::{Role, Store, TranscriptRow, TranscriptSummaryRow};

pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: String,
    pub email: String,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_id: normalize_user_id(&user_id).unwrap_or_default(),
            email: email.into(),
        }
    }
}

/// "Is this user a global admin" lookup
pub trait AdminDirectory {
    fn is_admin(&self, user_id: &str) -> Result<bool>;
}

impl AdminDirectory for Store {
    fn is_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self.user_role(user_id)? == Role::Admin)
    }
}

impl<T: AdminDirectory + ?Sized> AdminDirectory for &T {
    fn is_admin(&self, user_id: &str) -> Result<bool> {
        (**self).is_admin(user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleAccess {
    pub visible_ids: HashSet<String>,
    /// Linked project of each visible non-private transcript
    pub project_by_transcript: HashMap<String, String>,
}

struct LinkedProject {
    transcript_id: String,
    project_id: String,
    client_id: String,
    owner_user_id: Option<String>,
}

pub struct VisibilityEvaluator<'a, A> {
    store: &'a Store,
    admins: A,
}

impl Store {
    /// Evaluator using this store's `user_roles` as the admin directory
    pub fn evaluator(&self) -> VisibilityEvaluator<'_, &Store> {
        VisibilityEvaluator::new(self, self)
    }
}

fn json_ids<'i>(ids: impl IntoIterator<Item = &'i String>) -> Result<String> {
    Ok(serde_json::to_string(&ids.into_iter().collect::<Vec<_>>())?)
}

impl<'a, A: AdminDirectory> VisibilityEvaluator<'a, A> {
    pub fn new(store: &'a Store, admins: A) -> Self {
        Self { store, admins }
    }

    fn conn(&self) -> &Connection {
        self.store.conn()
    }

    pub fn visible_access(&self, viewer: &Viewer, candidate_ids: &[String]) -> Result<VisibleAccess> {
        let mut seen = HashSet::new();
        let candidates: Vec<&String> = candidate_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if candidates.is_empty() {
            return Ok(VisibleAccess::default());
        }

        let (private_ids, non_private_ids) = self.partition(&candidates)?;
        let mut access = VisibleAccess::default();

        if !private_ids.is_empty() {
            access.visible_ids.extend(self.attended(viewer, &private_ids)?);
        }

        if !non_private_ids.is_empty() {
            let links = self.linked_projects(&non_private_ids)?;
            if !links.is_empty() {
                // a blank user id holds no grants
                let granted = match normalize_user_id(&viewer.user_id) {
                    None => Vec::new(),
                    Some(user_id) if self.admins.is_admin(&user_id)? => links,
                    Some(user_id) => self.accessible(&user_id, links)?,
                };
                for link in granted {
                    access.visible_ids.insert(link.transcript_id.clone());
                    access
                        .project_by_transcript
                        .insert(link.transcript_id, link.project_id);
                }
            }
        }

        debug!(
            user_id = %viewer.user_id,
            candidates = candidates.len(),
            private = private_ids.len(),
            non_private = non_private_ids.len(),
            visible = access.visible_ids.len(),
            "visibility evaluated"
        );
        Ok(access)
    }

    pub fn visible_ids(&self, viewer: &Viewer, candidate_ids: &[String]) -> Result<HashSet<String>> {
        Ok(self.visible_access(viewer, candidate_ids)?.visible_ids)
    }

    pub fn can_view(&self, viewer: &Viewer, transcript_id: &str) -> Result<bool> {
        Ok(self
            .visible_ids(viewer, &[transcript_id.to_string()])?
            .contains(transcript_id))
    }

    /// Keeps the input order
    pub fn filter_visible(&self, viewer: &Viewer, ids: &[String]) -> Result<Vec<String>> {
        let visible = self.visible_ids(viewer, ids)?;
        Ok(ids.iter().filter(|id| visible.contains(*id)).cloned().collect())
    }

    /// Title search restricted to what the viewer may see
    ///
    /// The limit applies to the search before filtering, so fewer than
    /// `limit` rows may come back.
    pub fn list_transcripts(
        &self,
        viewer: &Viewer,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<TranscriptSummaryRow>> {
        let rows = self
            .store
            .search_transcripts(query, limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let visible = self.visible_ids(viewer, &ids)?;
        Ok(rows.into_iter().filter(|r| visible.contains(&r.id)).collect())
    }

    /// `None` for missing and for invisible transcripts alike
    pub fn transcript_for(&self, viewer: &Viewer, transcript_id: &str) -> Result<Option<TranscriptRow>> {
        if !self.can_view(viewer, transcript_id)? {
            return Ok(None);
        }
        self.store.get_transcript(transcript_id)
    }

    /// Split candidates by stored visibility; unclassified ids land in neither
    ///
    /// An unknown stored visibility is an error rather than a silent hide.
    fn partition(&self, candidates: &[&String]) -> Result<(Vec<String>, Vec<String>)> {
        let mut stmt = self.conn().prepare(
            r#"SELECT transcript_id, visibility
               FROM transcript_classification
               WHERE transcript_id IN (SELECT value FROM json_each(?1))"#,
        )?;
        let rows = stmt.query_map(params![json_ids(candidates.iter().copied())?], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut private_ids = Vec::new();
        let mut non_private_ids = Vec::new();
        for row in rows {
            let (id, visibility) = row?;
            match visibility.parse::<Visibility>() {
                Ok(Visibility::Private) => private_ids.push(id),
                Ok(Visibility::NonPrivate) => non_private_ids.push(id),
                Err(e) => {
                    return Err(Error::Corrupt(format!(
                        "classification of transcript {}: {}",
                        id, e
                    )))
                }
            }
        }
        Ok((private_ids, non_private_ids))
    }

    fn attended(&self, viewer: &Viewer, private_ids: &[String]) -> Result<Vec<String>> {
        let email = normalize_email(&viewer.email);
        if email.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(
            r#"SELECT DISTINCT transcript_id
               FROM transcript_attendees
               WHERE transcript_id IN (SELECT value FROM json_each(?1))
                 AND normalized_email = ?2"#,
        )?;
        let rows = stmt.query_map(params![json_ids(private_ids)?, email], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Links whose project still exists
    fn linked_projects(&self, non_private_ids: &[String]) -> Result<Vec<LinkedProject>> {
        let mut stmt = self.conn().prepare(
            r#"SELECT l.transcript_id, l.project_id, p.client_id, p.owner_user_id
               FROM transcript_project_links l
               JOIN projects p ON p.id = l.project_id
               WHERE l.transcript_id IN (SELECT value FROM json_each(?1))"#,
        )?;
        let rows = stmt.query_map(params![json_ids(non_private_ids)?], |row| {
            Ok(LinkedProject {
                transcript_id: row.get(0)?,
                project_id: row.get(1)?,
                client_id: row.get(2)?,
                owner_user_id: row.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn accessible(&self, user_id: &str, links: Vec<LinkedProject>) -> Result<Vec<LinkedProject>> {
        let project_ids: HashSet<&String> = links.iter().map(|l| &l.project_id).collect();
        let client_ids: HashSet<&String> = links.iter().map(|l| &l.client_id).collect();

        let member_projects = self.memberships(
            r#"SELECT project_id FROM project_memberships
               WHERE user_id = ?1 AND project_id IN (SELECT value FROM json_each(?2))"#,
            user_id,
            json_ids(project_ids)?,
        )?;
        let member_clients = self.memberships(
            r#"SELECT client_id FROM client_memberships
               WHERE user_id = ?1 AND client_id IN (SELECT value FROM json_each(?2))"#,
            user_id,
            json_ids(client_ids)?,
        )?;

        Ok(links
            .into_iter()
            .filter(|l| {
                l.owner_user_id.as_deref().map(str::trim) == Some(user_id)
                    || member_projects.contains(&l.project_id)
                    || member_clients.contains(&l.client_id)
            })
            .collect())
    }

    fn memberships(&self, sql: &str, user_id: &str, ids: String) -> Result<HashSet<String>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params![user_id, ids], |row| row.get(0))?;
        rows.collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(Into::into)
    }
}
