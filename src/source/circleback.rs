//! Circleback source implementation
//!
//! Input: the meeting-notes webhook body, also the format of exported JSON
//! files. Content is rendered as a markdown header followed by one
//! `[m:ss] speaker: text` line per utterance.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{AttendeeInput, NormalizedTranscript, TranscriptSource};
use crate::error::Result;

pub struct CirclebackSource;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CirclebackPayload {
    id: Value,
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    attendees: Vec<CirclebackAttendee>,
    #[serde(default)]
    transcript: Vec<Utterance>,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CirclebackAttendee {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Utterance {
    speaker: String,
    text: String,
    #[serde(default)]
    timestamp: f64,
}

/// `125.7` -> `2:05`
fn format_minutes_seconds(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn format_meeting_date(date: &DateTime<Utc>) -> String {
    date.format("%A, %B %-d, %Y at %-I:%M %p").to_string()
}

/// Circleback ids are numeric, but accept string ids too
fn external_id(id: &Value) -> Option<String> {
    match id {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

impl TranscriptSource for CirclebackSource {
    fn name(&self) -> &str {
        "circleback"
    }

    fn description(&self) -> &str {
        "Circleback meeting-notes webhook"
    }

    fn transform(&self, payload: &Value) -> Result<Option<NormalizedTranscript>> {
        let meeting: CirclebackPayload = serde_json::from_value(payload.clone())?;

        let Some(id) = external_id(&meeting.id) else {
            warn!("circleback payload without usable id, skipping");
            return Ok(None);
        };

        if meeting.transcript.is_empty() {
            warn!(meeting_id = %id, "empty circleback transcript, skipping");
            return Ok(None);
        }

        let people = meeting
            .attendees
            .iter()
            .filter_map(|a| a.name.as_deref())
            .collect::<Vec<_>>()
            .join(", ");

        let body = meeting
            .transcript
            .iter()
            .map(|u| {
                format!(
                    "[{}] {}: {}",
                    format_minutes_seconds(u.timestamp),
                    u.speaker,
                    u.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let content = format!(
            "# {}\nDate: {}\nDuration: {}\nPeople: {}\n\n{}",
            meeting.name,
            format_meeting_date(&meeting.created_at),
            format_minutes_seconds(meeting.duration),
            people,
            body
        );

        let attendees = meeting
            .attendees
            .into_iter()
            .filter_map(|a| {
                a.email.map(|email| AttendeeInput {
                    email,
                    name: a.name,
                })
            })
            .collect();

        Ok(Some(NormalizedTranscript {
            source_id: format!("circleback:{}", id),
            title: meeting.name,
            content,
            summary: meeting.notes,
            date: meeting.created_at,
            raw_json: payload.clone(),
            attendees,
        }))
    }
}
