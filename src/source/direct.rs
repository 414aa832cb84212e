//! Pass-through source for payloads already in ingestion shape

use serde_json::Value;

use super::{NormalizedTranscript, TranscriptSource};
use crate::error::{Error, Result};

pub struct DirectSource;

impl TranscriptSource for DirectSource {
    fn name(&self) -> &str {
        "direct"
    }

    fn description(&self) -> &str {
        "Pre-normalized transcript JSON"
    }

    fn transform(&self, payload: &Value) -> Result<Option<NormalizedTranscript>> {
        let transcript: NormalizedTranscript = serde_json::from_value(payload.clone())?;
        if transcript.source_id.trim().is_empty() {
            return Err(Error::InvalidInput("source_id is required".to_string()));
        }
        Ok(Some(transcript))
    }
}
