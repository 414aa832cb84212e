//! Normalization helpers shared by ingestion, routing and visibility
//!
//! Every comparison against `normalized_*` columns goes through these
//! functions, both when catalog rows are written and when they are looked up.

/// Trim + lowercase
pub fn normalize_comparable_text(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn normalize_email(email: &str) -> String {
    normalize_comparable_text(email)
}

pub fn normalize_title(title: &str) -> String {
    normalize_comparable_text(title)
}

pub fn normalize_domain(domain: &str) -> String {
    let normalized = normalize_comparable_text(domain);
    match normalized.strip_prefix('@') {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

/// Domain part of an email, split at the last `@`
pub fn extract_email_domain(email: &str) -> Option<String> {
    let normalized = normalize_email(email);
    let at = normalized.rfind('@')?;
    if at < 1 || at == normalized.len() - 1 {
        return None;
    }
    Some(normalize_domain(&normalized[at + 1..]))
}

/// First label of the domain: `acme.co.uk` -> `acme`
pub fn extract_domain_root(domain: &str) -> String {
    let normalized = normalize_domain(domain);
    match normalized.split('.').next() {
        Some(root) => root.to_string(),
        None => normalized,
    }
}

/// Escape `LIKE` wildcards so a value can be used as a literal prefix
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// User ids are compared trimmed and case-sensitive; blank means no user
pub fn normalize_user_id(user_id: &str) -> Option<String> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAttendee {
    pub email: String,
    pub normalized_email: String,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub domain_root: Option<String>,
}

/// Returns `None` for attendees that cannot be matched on (no usable email)
pub fn normalize_attendee(email: &str, name: Option<&str>) -> Option<NormalizedAttendee> {
    let normalized_email = normalize_email(email);
    if normalized_email.is_empty() || !normalized_email.contains('@') {
        return None;
    }

    let domain = extract_email_domain(&normalized_email);
    let domain_root = domain.as_deref().map(extract_domain_root);

    Some(NormalizedAttendee {
        email: email.trim().to_string(),
        normalized_email,
        name: name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
        domain,
        domain_root,
    })
}

/// Normalize a raw attendee list, dropping malformed entries and merging
/// duplicates by normalized email (first occurrence wins, a later duplicate
/// may still fill in a missing name)
pub fn normalize_attendees<'a, I>(attendees: I) -> Vec<NormalizedAttendee>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut result: Vec<NormalizedAttendee> = Vec::new();
    for (email, name) in attendees {
        let Some(attendee) = normalize_attendee(email, name) else {
            continue;
        };
        match result
            .iter_mut()
            .find(|a| a.normalized_email == attendee.normalized_email)
        {
            Some(existing) => {
                if existing.name.is_none() {
                    existing.name = attendee.name;
                }
            }
            None => result.push(attendee),
        }
    }
    result
}

/// Inputs to the project-link cascade, derived from a transcript
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingSignals {
    pub normalized_title: String,
    /// Deduplicated, in attendee order
    pub domains: Vec<String>,
    /// Deduplicated, in domain order; empty roots are dropped
    pub domain_roots: Vec<String>,
}

impl RoutingSignals {
    pub fn derive(title: &str, attendees: &[NormalizedAttendee]) -> Self {
        let mut domains: Vec<String> = Vec::new();
        for domain in attendees.iter().filter_map(|a| a.domain.as_deref()) {
            if !domain.is_empty() && !domains.iter().any(|d| d == domain) {
                domains.push(domain.to_string());
            }
        }

        let mut domain_roots: Vec<String> = Vec::new();
        for root in domains.iter().map(|d| extract_domain_root(d)) {
            if !root.is_empty() && !domain_roots.contains(&root) {
                domain_roots.push(root);
            }
        }

        Self {
            normalized_title: normalize_title(title),
            domains,
            domain_roots,
        }
    }
}
