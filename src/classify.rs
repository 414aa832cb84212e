//! Transcript visibility classification
//!
//! The ingestion core only depends on the `Classifier` contract. The decision
//! rule itself belongs to the product; `DomainClassifier` is the rule the
//! binary ships with (weekly-exception titles, then internal vs. external
//! attendee domains).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ClassificationConfig;
use crate::normalize::{extract_email_domain, normalize_domain, normalize_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    NonPrivate,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::NonPrivate => "non_private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "non_private" => Ok(Visibility::NonPrivate),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    WeeklyException,
    ExternalAttendee,
    InternalAttendeesOnly,
    NoAttendees,
}

impl ClassificationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationReason::WeeklyException => "weekly_exception",
            ClassificationReason::ExternalAttendee => "external_attendee",
            ClassificationReason::InternalAttendeesOnly => "internal_attendees_only",
            ClassificationReason::NoAttendees => "no_attendees",
        }
    }
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output contract of a classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationDecision {
    pub visibility: Visibility,
    pub reason: ClassificationReason,
    pub is_weekly_exception: bool,
    pub normalized_title: String,
    pub attendee_count: usize,
    pub external_attendee_count: usize,
}

pub trait Classifier: Send + Sync {
    /// `attendee_emails` are already normalized and deduplicated
    fn classify(&self, title: &str, attendee_emails: &[String]) -> ClassificationDecision;
}

/// Built-in internal domains, always kept even when the config adds more
pub const DEFAULT_INTERNAL_DOMAINS: &[&str] = &["oxy.so", "oxy.co"];

pub const DEFAULT_WEEKLY_EXCEPTION_TITLE: &str = "oxy <> weekly planning";

#[derive(Debug, Clone)]
pub struct DomainClassifier {
    internal_domains: Vec<String>,
    weekly_titles: Vec<String>,
}

impl DomainClassifier {
    pub fn new<D, T>(internal_domains: D, weekly_titles: T) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut domains: Vec<String> = Vec::new();
        for domain in DEFAULT_INTERNAL_DOMAINS
            .iter()
            .map(|d| d.to_string())
            .chain(internal_domains.into_iter().map(|d| normalize_domain(d.as_ref())))
        {
            if !domain.is_empty() && !domains.contains(&domain) {
                domains.push(domain);
            }
        }

        let weekly_titles = weekly_titles
            .into_iter()
            .map(|t| normalize_title(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            internal_domains: domains,
            weekly_titles,
        }
    }

    pub fn from_config(config: &ClassificationConfig) -> Self {
        Self::new(&config.internal_domains, &config.weekly_exception_titles)
    }

    pub fn internal_domains(&self) -> &[String] {
        &self.internal_domains
    }

    pub fn is_internal_domain(&self, domain: &str) -> bool {
        let normalized = normalize_domain(domain);
        self.internal_domains.iter().any(|d| *d == normalized)
    }

    fn is_weekly_title(&self, normalized_title: &str) -> bool {
        self.weekly_titles.iter().any(|t| t == normalized_title)
    }
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), [DEFAULT_WEEKLY_EXCEPTION_TITLE])
    }
}

impl Classifier for DomainClassifier {
    fn classify(&self, title: &str, attendee_emails: &[String]) -> ClassificationDecision {
        let normalized_title = normalize_title(title);
        let attendee_count = attendee_emails.len();

        if self.is_weekly_title(&normalized_title) {
            return ClassificationDecision {
                visibility: Visibility::NonPrivate,
                reason: ClassificationReason::WeeklyException,
                is_weekly_exception: true,
                normalized_title,
                attendee_count,
                external_attendee_count: 0,
            };
        }

        if attendee_emails.is_empty() {
            return ClassificationDecision {
                visibility: Visibility::Private,
                reason: ClassificationReason::NoAttendees,
                is_weekly_exception: false,
                normalized_title,
                attendee_count: 0,
                external_attendee_count: 0,
            };
        }

        let external_attendee_count = attendee_emails
            .iter()
            .filter_map(|email| extract_email_domain(email))
            .filter(|domain| !self.is_internal_domain(domain))
            .count();

        if external_attendee_count > 0 {
            ClassificationDecision {
                visibility: Visibility::NonPrivate,
                reason: ClassificationReason::ExternalAttendee,
                is_weekly_exception: false,
                normalized_title,
                attendee_count,
                external_attendee_count,
            }
        } else {
            ClassificationDecision {
                visibility: Visibility::Private,
                reason: ClassificationReason::InternalAttendeesOnly,
                is_weekly_exception: false,
                normalized_title,
                attendee_count,
                external_attendee_count: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_weekly_exception_wins_over_attendees() {
        let classifier = DomainClassifier::default();
        let decision = classifier.classify(
            " Oxy <> Weekly Planning ",
            &emails(&["a@oxy.so", "b@oxy.co"]),
        );
        assert_eq!(decision.visibility, Visibility::NonPrivate);
        assert_eq!(decision.reason, ClassificationReason::WeeklyException);
        assert!(decision.is_weekly_exception);
        assert_eq!(decision.attendee_count, 2);
        assert_eq!(decision.external_attendee_count, 0);
    }

    #[test]
    fn test_weekly_title_requires_exact_match() {
        let classifier = DomainClassifier::default();
        let decision =
            classifier.classify("Oxy <> Weekly Planning - Notes", &emails(&["a@oxy.so"]));
        assert_eq!(decision.reason, ClassificationReason::InternalAttendeesOnly);
        assert!(!decision.is_weekly_exception);
    }

    #[test]
    fn test_no_attendees_is_private() {
        let decision = DomainClassifier::default().classify("Standup", &[]);
        assert_eq!(decision.visibility, Visibility::Private);
        assert_eq!(decision.reason, ClassificationReason::NoAttendees);
    }

    #[test]
    fn test_external_attendee_is_non_private() {
        let decision = DomainClassifier::default().classify(
            "Kickoff",
            &emails(&["a@oxy.so", "alice@clientco.com", "bob@vendor.io"]),
        );
        assert_eq!(decision.visibility, Visibility::NonPrivate);
        assert_eq!(decision.reason, ClassificationReason::ExternalAttendee);
        assert_eq!(decision.attendee_count, 3);
        assert_eq!(decision.external_attendee_count, 2);
        assert_eq!(decision.normalized_title, "kickoff");
    }

    #[test]
    fn test_configured_domains_extend_defaults() {
        let classifier = DomainClassifier::new(["@Partner.io"], Vec::<String>::new());
        assert!(classifier.is_internal_domain("OXY.SO"));
        assert!(classifier.is_internal_domain("partner.io"));

        let decision = classifier.classify("1:1", &emails(&["x@partner.io", "y@oxy.co"]));
        assert_eq!(decision.visibility, Visibility::Private);
        assert_eq!(decision.reason, ClassificationReason::InternalAttendeesOnly);
    }

    #[test]
    fn test_visibility_parse_round_trip() {
        assert_eq!("private".parse::<Visibility>().unwrap(), Visibility::Private);
        assert_eq!(
            "non_private".parse::<Visibility>().unwrap(),
            Visibility::NonPrivate
        );
        assert!("public".parse::<Visibility>().is_err());
    }
}
