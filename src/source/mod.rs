//! Transcript source adapters and registry
//!
//! A source turns one raw payload (webhook body, exported JSON file) into the
//! ingestion input. Sources never touch the store.
//!
//! Sources:
//! - direct: payload already is a `NormalizedTranscript`
//! - circleback: Circleback meeting-notes webhook

mod circleback;
mod direct;

pub use circleback::CirclebackSource;
pub use direct::DirectSource;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeInput {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Input of one ingestion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedTranscript {
    /// Idempotency key, e.g. `circleback:123`
    pub source_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default = "empty_object")]
    pub raw_json: Value,
    #[serde(default)]
    pub attendees: Vec<AttendeeInput>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

pub trait TranscriptSource: Send + Sync {
    /// Registry key, also the `--source` value on the command line
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// `Ok(None)` means the payload carries nothing worth ingesting
    fn transform(&self, payload: &Value) -> Result<Option<NormalizedTranscript>>;
}

/// Registry of enabled sources
pub struct SourceRegistry {
    sources: Vec<Box<dyn TranscriptSource>>,
}

impl SourceRegistry {
    pub fn new(config: &Config) -> Self {
        let mut registry = Self { sources: vec![] };

        if config.is_source_enabled("direct") {
            registry.register(Box::new(DirectSource));
        }

        if config.is_source_enabled("circleback") {
            registry.register(Box::new(CirclebackSource));
        }

        registry
    }

    pub fn register(&mut self, source: Box<dyn TranscriptSource>) {
        self.sources.push(source);
    }

    pub fn all_sources(&self) -> Vec<&dyn TranscriptSource> {
        self.sources.iter().map(|s| s.as_ref()).collect()
    }

    pub fn get_source(&self, name: &str) -> Option<&dyn TranscriptSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    #[test]
    fn test_registry_respects_disabled_sources() {
        let mut config = Config::default();
        let registry = SourceRegistry::new(&config);
        let names: Vec<_> = registry.all_sources().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["direct", "circleback"]);

        config
            .sources
            .insert("circleback".to_string(), SourceConfig { enabled: false });
        let registry = SourceRegistry::new(&config);
        assert!(registry.get_source("circleback").is_none());
        assert!(registry.get_source("direct").is_some());
    }
}
