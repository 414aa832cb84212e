//! Error types for the ingestion and visibility core

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Store unreachable, statement failed, or a constraint other than an
    /// expected upsert conflict was violated
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row referenced by another row is missing
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored value no longer parses into its domain type
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("project", "p1");
        assert_eq!(err.to_string(), "project not found: p1");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_database_error_is_not_not_found() {
        let err = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("Database error"));
    }
}
