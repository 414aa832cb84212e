//! Transactional transcript ingestion
//!
//! One call = one `BEGIN IMMEDIATE` transaction covering the transcript row,
//! its attendees, the classification, the project link and the audit events.
//! Any error drops the transaction, which rolls everything back.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{self, AuditEvent, AuditEventType};
use crate::classify::{ClassificationDecision, ClassificationReason, Classifier, Visibility};
use crate::error::{Error, Result};
use crate::normalize::{normalize_attendees, NormalizedAttendee, RoutingSignals};
use crate::resolver::{self, LinkSource, SqliteCatalog};
use crate::source::NormalizedTranscript;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub transcript_id: String,
    pub is_new: bool,
    pub visibility: Visibility,
    pub classification_reason: ClassificationReason,
    pub is_weekly_exception: bool,
    pub project_id: Option<String>,
    pub link_source: Option<LinkSource>,
}

/// Classification fields compared for change detection
#[derive(Debug, PartialEq, Eq)]
struct PriorClassification {
    visibility: String,
    reason: String,
    is_weekly_exception: bool,
}

/// Link fields compared for change detection
#[derive(Debug, PartialEq, Eq)]
struct PriorLink {
    project_id: String,
    link_source: String,
}

pub struct Ingestor {
    classifier: Box<dyn Classifier>,
}

impl Ingestor {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn ingest(
        &self,
        store: &mut Store,
        transcript: &NormalizedTranscript,
        request_id: Option<&str>,
    ) -> Result<IngestOutcome> {
        if transcript.source_id.trim().is_empty() {
            return Err(Error::InvalidInput("source_id is required".to_string()));
        }

        let (conn, clock) = store.parts_mut();
        let now = clock.timestamp();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (transcript_id, is_new) = upsert_transcript(&tx, transcript, &now)?;

        let attendees = normalize_attendees(
            transcript
                .attendees
                .iter()
                .map(|a| (a.email.as_str(), a.name.as_deref())),
        );
        upsert_attendees(&tx, &transcript_id, &attendees, &now)?;

        let prior_classification = read_classification(&tx, &transcript_id)?;
        let emails: Vec<String> = attendees.iter().map(|a| a.normalized_email.clone()).collect();
        let decision = self.classifier.classify(&transcript.title, &emails);
        upsert_classification(&tx, &transcript_id, &decision, &now)?;

        let prior_link = read_link(&tx, &transcript_id)?;
        tx.execute(
            "DELETE FROM transcript_project_links WHERE transcript_id = ?",
            params![transcript_id],
        )?;

        let link = match decision.visibility {
            Visibility::NonPrivate => {
                let signals = RoutingSignals::derive(&transcript.title, &attendees);
                let resolved = resolver::resolve(&SqliteCatalog::new(&tx), &signals)?;
                if let Some(link) = &resolved {
                    tx.execute(
                        r#"INSERT INTO transcript_project_links
                           (transcript_id, project_id, link_source, created_at, updated_at)
                           VALUES (?1, ?2, ?3, ?4, ?4)"#,
                        params![transcript_id, link.project_id, link.link_source.as_str(), now],
                    )?;
                }
                resolved
            }
            // a private transcript never keeps a link
            Visibility::Private => None,
        };

        let classification_changed = prior_classification
            != Some(PriorClassification {
                visibility: decision.visibility.as_str().to_string(),
                reason: decision.reason.as_str().to_string(),
                is_weekly_exception: decision.is_weekly_exception,
            });
        let current_link = link.as_ref().map(|l| PriorLink {
            project_id: l.project_id.clone(),
            link_source: l.link_source.as_str().to_string(),
        });
        let link_changed = prior_link != current_link;

        if is_new {
            audit::record(
                &tx,
                &now,
                &AuditEvent::new(AuditEventType::TranscriptIngested, "transcript", &transcript_id)
                    .request(request_id)
                    .payload(json!({ "source_id": transcript.source_id })),
            )?;
        }
        if is_new || classification_changed {
            audit::record(
                &tx,
                &now,
                &AuditEvent::new(AuditEventType::TranscriptClassified, "transcript", &transcript_id)
                    .request(request_id)
                    .payload(json!({
                        "visibility": decision.visibility.as_str(),
                        "reason": decision.reason.as_str(),
                        "is_weekly_exception": decision.is_weekly_exception,
                    })),
            )?;
        }
        if is_new || link_changed {
            audit::record(
                &tx,
                &now,
                &AuditEvent::new(AuditEventType::TranscriptRouted, "transcript", &transcript_id)
                    .request(request_id)
                    .payload(json!({
                        "project_id": link.as_ref().map(|l| l.project_id.as_str()),
                        "link_source": link.as_ref().map(|l| l.link_source.as_str()),
                    })),
            )?;
        }

        tx.commit()?;

        let outcome = IngestOutcome {
            transcript_id,
            is_new,
            visibility: decision.visibility,
            classification_reason: decision.reason,
            is_weekly_exception: decision.is_weekly_exception,
            project_id: link.as_ref().map(|l| l.project_id.clone()),
            link_source: link.map(|l| l.link_source),
        };

        info!(
            source_id = %transcript.source_id,
            transcript_id = %outcome.transcript_id,
            is_new = outcome.is_new,
            visibility = outcome.visibility.as_str(),
            reason = outcome.classification_reason.as_str(),
            project_id = outcome.project_id.as_deref().unwrap_or("-"),
            link_source = outcome.link_source.map(|s| s.as_str()).unwrap_or("-"),
            "transcript ingested"
        );
        Ok(outcome)
    }
}

/// Returns the transcript id and whether the row was freshly inserted
///
/// A new id is proposed on every call; on conflict the existing row keeps
/// its id, so the proposal only comes back for an insert.
fn upsert_transcript(
    conn: &Connection,
    transcript: &NormalizedTranscript,
    now: &str,
) -> Result<(String, bool)> {
    let proposed_id = Uuid::new_v4().to_string();
    let raw_json = serde_json::to_string(&transcript.raw_json)?;

    let id: String = conn.query_row(
        r#"INSERT INTO transcripts
           (id, source_id, title, content, summary, date, raw_json, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
           ON CONFLICT(source_id) DO UPDATE SET
               title = excluded.title,
               content = excluded.content,
               summary = excluded.summary,
               date = excluded.date,
               raw_json = excluded.raw_json,
               updated_at = excluded.updated_at
           RETURNING id"#,
        params![
            proposed_id,
            transcript.source_id.trim(),
            transcript.title,
            transcript.content,
            transcript.summary,
            transcript.date.to_rfc3339(),
            raw_json,
            now
        ],
        |row| row.get(0),
    )?;

    let is_new = id == proposed_id;
    Ok((id, is_new))
}

fn upsert_attendees(
    conn: &Connection,
    transcript_id: &str,
    attendees: &[NormalizedAttendee],
    now: &str,
) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"INSERT INTO transcript_attendees
           (transcript_id, email, normalized_email, name, created_at)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(transcript_id, normalized_email) DO UPDATE SET
               email = excluded.email,
               name = COALESCE(excluded.name, transcript_attendees.name)"#,
    )?;

    for attendee in attendees {
        stmt.execute(params![
            transcript_id,
            attendee.email,
            attendee.normalized_email,
            attendee.name,
            now
        ])?;
    }
    debug!(transcript_id, count = attendees.len(), "attendees upserted");
    Ok(())
}

fn read_classification(conn: &Connection, transcript_id: &str) -> Result<Option<PriorClassification>> {
    conn.query_row(
        r#"SELECT visibility, classification_reason, is_weekly_exception
           FROM transcript_classification
           WHERE transcript_id = ?"#,
        params![transcript_id],
        |row| {
            Ok(PriorClassification {
                visibility: row.get(0)?,
                reason: row.get(1)?,
                is_weekly_exception: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

fn upsert_classification(
    conn: &Connection,
    transcript_id: &str,
    decision: &ClassificationDecision,
    now: &str,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO transcript_classification
           (transcript_id, visibility, classification_reason, is_weekly_exception,
            normalized_title, attendee_count, external_attendee_count, classified_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
           ON CONFLICT(transcript_id) DO UPDATE SET
               visibility = excluded.visibility,
               classification_reason = excluded.classification_reason,
               is_weekly_exception = excluded.is_weekly_exception,
               normalized_title = excluded.normalized_title,
               attendee_count = excluded.attendee_count,
               external_attendee_count = excluded.external_attendee_count,
               classified_at = excluded.classified_at,
               updated_at = excluded.updated_at"#,
        params![
            transcript_id,
            decision.visibility.as_str(),
            decision.reason.as_str(),
            decision.is_weekly_exception,
            decision.normalized_title,
            decision.attendee_count as i64,
            decision.external_attendee_count as i64,
            now
        ],
    )?;
    Ok(())
}

fn read_link(conn: &Connection, transcript_id: &str) -> Result<Option<PriorLink>> {
    conn.query_row(
        "SELECT project_id, link_source FROM transcript_project_links WHERE transcript_id = ?",
        params![transcript_id],
        |row| {
            Ok(PriorLink {
                project_id: row.get(0)?,
                link_source: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::DomainClassifier;
    use crate::clock::FixedClock;
    use crate::source::AttendeeInput;
    use crate::store::{NewProject, ProjectScope, ProjectUpdate};
    use chrono::{TimeZone, Utc};

    fn store() -> Store {
        Store::open_in_memory()
            .unwrap()
            .with_clock(FixedClock(Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()))
    }

    fn ingestor() -> Ingestor {
        Ingestor::new(Box::new(DomainClassifier::default()))
    }

    fn transcript(source_id: &str, title: &str, emails: &[&str]) -> NormalizedTranscript {
        NormalizedTranscript {
            source_id: source_id.to_string(),
            title: title.to_string(),
            content: "content".to_string(),
            summary: None,
            date: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            raw_json: json!({}),
            attendees: emails
                .iter()
                .map(|e| AttendeeInput {
                    email: e.to_string(),
                    name: None,
                })
                .collect(),
        }
    }

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

    fn event_types(store: &Store, transcript_id: &str) -> Vec<String> {
        store
            .transcript_audit_events(transcript_id)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    /// Classifier that returns whatever visibility the test sets
    struct FixedClassifier(Visibility);

    impl Classifier for FixedClassifier {
        fn classify(&self, title: &str, attendee_emails: &[String]) -> ClassificationDecision {
            ClassificationDecision {
                visibility: self.0,
                reason: match self.0 {
                    Visibility::Private => ClassificationReason::InternalAttendeesOnly,
                    Visibility::NonPrivate => ClassificationReason::ExternalAttendee,
                },
                is_weekly_exception: false,
                normalized_title: title.trim().to_lowercase(),
                attendee_count: attendee_emails.len(),
                external_attendee_count: 0,
            }
        }
    }

    #[test]
    fn test_domain_routing() {
        let mut store = store();
        let client = store.create_client("ClientCo", None, None).unwrap();
        let p1 = project(&mut store, &client.id, "Website", ProjectScope::Client, false);
        store.add_project_domain(&p1, "clientco.com", None).unwrap();

        let outcome = ingestor()
            .ingest(
                &mut store,
                &transcript("circleback:1", "Kickoff", &["alice@clientco.com", "sam@oxy.so"]),
                Some("req-1"),
            )
            .unwrap();

        assert!(outcome.is_new);
        assert_eq!(outcome.visibility, Visibility::NonPrivate);
        assert_eq!(outcome.classification_reason, ClassificationReason::ExternalAttendee);
        assert_eq!(outcome.project_id.as_deref(), Some(p1.as_str()));
        assert_eq!(outcome.link_source, Some(LinkSource::DomainMatch));

        let events = store.transcript_audit_events(&outcome.transcript_id).unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["transcript.ingested", "transcript.classified", "transcript.routed"]
        );
        assert!(events.iter().all(|e| e.request_id.as_deref() == Some("req-1")));
        assert_eq!(events[2].payload["link_source"], "domain_match");
        assert_eq!(events[0].created_at, "2026-03-02T15:00:00.000Z");
    }

    #[test]
    fn test_inbox_and_global_fallbacks() {
        let mut store = store();
        let vendor = store.create_client("unknownvendor", None, None).unwrap();
        let p2 = project(&mut store, &vendor.id, "Vendor inbox", ProjectScope::Client, true);
        let internal = store.create_client("Internal", None, None).unwrap();
        let p3 = project(&mut store, &internal.id, "Triage", ProjectScope::Global, true);

        let inbox = ingestor()
            .ingest(&mut store, &transcript("s:1", "Intro", &["bob@unknownvendor.io"]), None)
            .unwrap();
        assert_eq!(inbox.link_source, Some(LinkSource::ClientInboxFallback));
        assert_eq!(inbox.project_id.as_deref(), Some(p2.as_str()));

        let triage = ingestor()
            .ingest(&mut store, &transcript("s:2", "Intro", &["carol@elsewhere.org"]), None)
            .unwrap();
        assert_eq!(triage.link_source, Some(LinkSource::GlobalTriageFallback));
        assert_eq!(triage.project_id.as_deref(), Some(p3.as_str()));
    }

    #[test]
    fn test_reingest_identical_payload_is_audit_noop() {
        let mut store = store();
        let payload = transcript("s:1", "Kickoff", &["alice@clientco.com"]);

        let first = ingestor().ingest(&mut store, &payload, None).unwrap();
        let second = ingestor().ingest(&mut store, &payload, None).unwrap();

        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.transcript_id, second.transcript_id);
        // unrouted, but the initial "no link" state is still recorded
        assert_eq!(second.project_id, None);
        assert_eq!(
            event_types(&store, &first.transcript_id),
            vec!["transcript.ingested", "transcript.classified", "transcript.routed"]
        );
        assert!(store.get_classification(&first.transcript_id).unwrap().is_some());
    }

    #[test]
    fn test_becoming_private_drops_link() {
        let mut store = store();
        let client = store.create_client("ClientCo", None, None).unwrap();
        let p1 = project(&mut store, &client.id, "Website", ProjectScope::Client, false);
        store.add_project_domain(&p1, "clientco.com", None).unwrap();

        let first = ingestor()
            .ingest(&mut store, &transcript("s:1", "Kickoff", &["alice@clientco.com"]), None)
            .unwrap();
        assert!(store.get_project_link(&first.transcript_id).unwrap().is_some());

        let private = Ingestor::new(Box::new(FixedClassifier(Visibility::Private)));
        let second = private
            .ingest(&mut store, &transcript("s:1", "Kickoff", &["alice@clientco.com"]), None)
            .unwrap();

        assert_eq!(second.visibility, Visibility::Private);
        assert_eq!(second.project_id, None);
        assert_eq!(second.link_source, None);
        assert!(store.get_project_link(&first.transcript_id).unwrap().is_none());

        let events = store.transcript_audit_events(&first.transcript_id).unwrap();
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "transcript.ingested",
                "transcript.classified",
                "transcript.routed",
                "transcript.classified",
                "transcript.routed"
            ]
        );
        assert!(events[4].payload["project_id"].is_null());
    }

    #[test]
    fn test_new_alias_reroutes_on_reingest() {
        let mut store = store();
        let client = store.create_client("Internal", None, None).unwrap();
        let triage = project(&mut store, &client.id, "Triage", ProjectScope::Global, true);
        let planning = project(&mut store, &client.id, "Planning", ProjectScope::Client, false);
        let payload = transcript("s:1", "Roadmap Sync", &["x@partner.io"]);

        let first = ingestor().ingest(&mut store, &payload, None).unwrap();
        assert_eq!(first.project_id.as_deref(), Some(triage.as_str()));

        store.add_project_alias(&planning, "roadmap sync", None).unwrap();
        let second = ingestor().ingest(&mut store, &payload, None).unwrap();
        assert_eq!(second.project_id.as_deref(), Some(planning.as_str()));
        assert_eq!(second.link_source, Some(LinkSource::TitleAlias));

        // classification unchanged, only the route moved
        assert_eq!(
            event_types(&store, &first.transcript_id),
            vec![
                "transcript.ingested",
                "transcript.classified",
                "transcript.routed",
                "transcript.routed"
            ]
        );
    }

    #[test]
    fn test_attendees_deduplicated_and_names_preserved() {
        let mut store = store();
        let mut payload = transcript("s:1", "Kickoff", &[]);
        payload.attendees = vec![
            AttendeeInput { email: "Alice@ClientCo.com".into(), name: Some("Alice".into()) },
            AttendeeInput { email: " alice@clientco.com".into(), name: None },
            AttendeeInput { email: "".into(), name: Some("Ghost".into()) },
            AttendeeInput { email: "not-an-email".into(), name: None },
        ];

        let outcome = ingestor().ingest(&mut store, &payload, None).unwrap();
        let attendees = store.get_attendees(&outcome.transcript_id).unwrap();
        assert_eq!(attendees.len(), 1);
        assert_eq!(attendees[0].normalized_email, "alice@clientco.com");

        // a nameless re-delivery keeps the known name
        payload.attendees = vec![AttendeeInput { email: "alice@clientco.com".into(), name: None }];
        ingestor().ingest(&mut store, &payload, None).unwrap();
        let attendees = store.get_attendees(&outcome.transcript_id).unwrap();
        assert_eq!(attendees[0].name.as_deref(), Some("Alice"));

        let classification = store.get_classification(&outcome.transcript_id).unwrap().unwrap();
        assert_eq!(classification.attendee_count, 1);
    }

    #[test]
    fn test_failure_rolls_back_everything() {
        let mut store = store();
        store
            .conn()
            .execute_batch(
                "PRAGMA foreign_keys = OFF;
                 INSERT INTO project_domains (project_id, domain, normalized_domain, created_at)
                 VALUES ('gone', 'clientco.com', 'clientco.com', 'now');",
            )
            .unwrap();

        let err = ingestor()
            .ingest(&mut store, &transcript("s:1", "Kickoff", &["alice@clientco.com"]), None)
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(store.find_transcript_id_by_source("s:1").unwrap().is_none());
        let leftovers: i64 = store
            .conn()
            .query_row(
                "SELECT (SELECT COUNT(*) FROM transcript_attendees)
                      + (SELECT COUNT(*) FROM transcript_classification)
                      + (SELECT COUNT(*) FROM audit_events)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_blank_source_id_rejected() {
        let mut store = store();
        let err = ingestor()
            .ingest(&mut store, &transcript("  ", "x", &[]), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_disabling_client_inbox_reroutes_to_global_inbox() {
        let mut store = store();
        let vendor = store.create_client("unknownvendor", None, None).unwrap();
        let inbox = project(&mut store, &vendor.id, "Vendor inbox", ProjectScope::Client, true);
        let internal = store.create_client("Internal", None, None).unwrap();
        let triage = project(&mut store, &internal.id, "Triage", ProjectScope::Global, true);
        let call = transcript("circleback:vendor", "Intro", &["bob@unknownvendor.com"]);

        let first = ingestor().ingest(&mut store, &call, None).unwrap();
        assert_eq!(first.project_id.as_deref(), Some(inbox.as_str()));
        assert_eq!(first.link_source, Some(LinkSource::ClientInboxFallback));

        store
            .update_project(
                &inbox,
                &ProjectUpdate {
                    is_inbox: Some(false),
                    ..Default::default()
                },
                Some("admin-1"),
            )
            .unwrap();

        let second = ingestor().ingest(&mut store, &call, None).unwrap();
        assert_eq!(second.project_id.as_deref(), Some(triage.as_str()));
        assert_eq!(second.link_source, Some(LinkSource::GlobalTriageFallback));
        let link = store.get_project_link(&second.transcript_id).unwrap().unwrap();
        assert_eq!(link.link_source, "global_triage_fallback");
    }

    #[test]
    fn test_deleting_project_unroutes_its_transcripts() {
        let mut store = store();
        let client = store.create_client("ClientCo", None, None).unwrap();
        let website = project(&mut store, &client.id, "Website", ProjectScope::Client, false);
        store.add_project_domain(&website, "clientco.com", None).unwrap();

        let outcome = ingestor()
            .ingest(&mut store, &transcript("circleback:1", "Kickoff", &["a@clientco.com"]), None)
            .unwrap();
        assert!(store.get_project_link(&outcome.transcript_id).unwrap().is_some());

        store.delete_project(&website, None).unwrap();
        assert!(store.get_project_link(&outcome.transcript_id).unwrap().is_none());
        assert!(store.get_project(&website).unwrap().is_none());

        // the domain rule went with the project
        let again = ingestor()
            .ingest(&mut store, &transcript("circleback:1", "Kickoff", &["a@clientco.com"]), None)
            .unwrap();
        assert!(!again.is_new);
        assert_eq!(again.link_source, None);
    }
}
