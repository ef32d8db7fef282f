use std::path::PathBuf;

use thiserror::Error;

/// Failures of the durable slot backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("slot {key} holds an undecodable payload: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The slot exists but its bytes are not a readable payload. Callers
    /// treat this like a snapshot that fails to parse.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Errors surfaced to the caller of any console operation.
///
/// Every variant is recoverable: the presenter turns it into a transient
/// notice and the user resubmits.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),
}

impl ConsoleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable tag the front-end switches on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(StorageError::Serialization(err))
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ConsoleError::validation("x").kind(), "validation");
        assert_eq!(ConsoleError::not_found("maintenance", 7).kind(), "not_found");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: ConsoleError = StorageError::io("/tmp/x.json", io).into();
        assert_eq!(err.kind(), "persistence");
        assert!(err.to_string().contains("/tmp/x.json"));
    }

    #[test]
    fn corrupt_slot_is_distinguishable() {
        let err = StorageError::Corrupt {
            key: "maintenanceData".to_string(),
            reason: "invalid utf-8".to_string(),
        };
        assert!(err.is_corrupt());
        assert!(!StorageError::InvalidKey("..".to_string()).is_corrupt());
        assert_eq!(ConsoleError::from(err).kind(), "persistence");
    }

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = ConsoleError::not_found("maintenance", 42);
        assert_eq!(err.to_string(), "maintenance not found (id=42)");
    }
}
