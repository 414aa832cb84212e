//! SQLite schema definition
//!
//! - Catalog: clients, projects, project_domains, project_aliases
//! - Access grants: client_memberships, project_memberships, user_roles
//! - Transcripts and their derived rows: attendees, classification, project link
//! - Append-only audit_events

pub const SCHEMA: &str = r#"
-- ============================================
-- CATALOG
-- ============================================

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,                   -- UUID
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL,         -- trim + lowercase, matched against domain roots
    owner_user_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,                   -- UUID
    client_id TEXT NOT NULL,
    name TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT 'client'
        CHECK (scope IN ('personal', 'client', 'global')),
    owner_user_id TEXT,
    is_inbox BOOLEAN NOT NULL DEFAULT FALSE, -- fallback destination for its client (or globally)
    created_at TEXT NOT NULL,
    FOREIGN KEY(client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_domains (
    id INTEGER PRIMARY KEY,
    project_id TEXT NOT NULL,
    domain TEXT NOT NULL,
    normalized_domain TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(project_id, normalized_domain),
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_aliases (
    id INTEGER PRIMARY KEY,
    project_id TEXT NOT NULL,
    alias TEXT NOT NULL,
    normalized_alias TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(project_id, normalized_alias),
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- ============================================
-- ACCESS GRANTS
-- ============================================

CREATE TABLE IF NOT EXISTS client_memberships (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    client_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, client_id),
    FOREIGN KEY(client_id) REFERENCES clients(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS project_memberships (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, project_id),
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id TEXT PRIMARY KEY,
    role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('admin', 'member')),
    updated_at TEXT NOT NULL
);

-- ============================================
-- TRANSCRIPTS
-- ============================================

CREATE TABLE IF NOT EXISTS transcripts (
    id TEXT PRIMARY KEY,                   -- UUID, stable across re-ingestion
    source_id TEXT NOT NULL UNIQUE,        -- idempotency key, e.g. 'circleback:123'
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    date TEXT NOT NULL,
    raw_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transcript_attendees (
    id INTEGER PRIMARY KEY,
    transcript_id TEXT NOT NULL,
    email TEXT NOT NULL,
    normalized_email TEXT NOT NULL,
    name TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(transcript_id, normalized_email),
    FOREIGN KEY(transcript_id) REFERENCES transcripts(id) ON DELETE CASCADE
);

-- Derived, recomputed on every ingestion
CREATE TABLE IF NOT EXISTS transcript_classification (
    transcript_id TEXT PRIMARY KEY,
    visibility TEXT NOT NULL CHECK (visibility IN ('private', 'non_private')),
    classification_reason TEXT NOT NULL,
    is_weekly_exception BOOLEAN NOT NULL DEFAULT FALSE,
    normalized_title TEXT NOT NULL,
    attendee_count INTEGER NOT NULL DEFAULT 0,
    external_attendee_count INTEGER NOT NULL DEFAULT 0,
    classified_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(transcript_id) REFERENCES transcripts(id) ON DELETE CASCADE
);

-- At most one per transcript, only for non_private transcripts
CREATE TABLE IF NOT EXISTS transcript_project_links (
    transcript_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    link_source TEXT NOT NULL CHECK (link_source IN (
        'domain_match', 'title_alias', 'client_inbox_fallback', 'global_triage_fallback'
    )),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY(transcript_id) REFERENCES transcripts(id) ON DELETE CASCADE,
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

-- ============================================
-- AUDIT
-- ============================================

CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY,
    actor_user_id TEXT,
    event_type TEXT NOT NULL,              -- 'transcript.ingested', 'project.created', ...
    entity_type TEXT NOT NULL,
    entity_id TEXT,
    request_id TEXT,
    payload TEXT NOT NULL DEFAULT '{}',    -- JSON
    created_at TEXT NOT NULL
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_clients_normalized_name ON clients(normalized_name);
CREATE INDEX IF NOT EXISTS idx_projects_client ON projects(client_id);
CREATE INDEX IF NOT EXISTS idx_projects_inbox ON projects(scope, is_inbox) WHERE is_inbox = TRUE;
CREATE INDEX IF NOT EXISTS idx_project_domains_domain ON project_domains(normalized_domain);
CREATE INDEX IF NOT EXISTS idx_project_aliases_alias ON project_aliases(normalized_alias);

CREATE INDEX IF NOT EXISTS idx_client_memberships_user ON client_memberships(user_id);
CREATE INDEX IF NOT EXISTS idx_project_memberships_user ON project_memberships(user_id);

CREATE INDEX IF NOT EXISTS idx_transcripts_date ON transcripts(date DESC);
CREATE INDEX IF NOT EXISTS idx_attendees_email ON transcript_attendees(normalized_email);
CREATE INDEX IF NOT EXISTS idx_links_project ON transcript_project_links(project_id);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_events(entity_type, entity_id);
"#;
