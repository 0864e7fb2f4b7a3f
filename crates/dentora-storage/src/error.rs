//! Storage error types shared by every backend.

use dentora_core::CoreError;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Attempted to create an entity that already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: String, id: String },

    /// The entity data is invalid.
    #[error("Invalid entity: {message}")]
    InvalidEntity { message: String },

    /// The operation conflicts with the entity's current state.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `InvalidEntity` error.
    #[must_use]
    pub fn invalid_entity(message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CoreError> for StorageError {
    fn from(err: CoreError) -> Self {
        if err.is_conflict() {
            Self::conflict(err.to_string())
        } else if err.is_client_error() {
            Self::invalid_entity(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = StorageError::not_found("patient", "b7f1");
        assert_eq!(err.to_string(), "patient not found: b7f1");
    }

    #[test]
    fn test_core_transition_maps_to_conflict() {
        let core = CoreError::invalid_transition("budget", "deleted", "active");
        let err: StorageError = core.into();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_core_validation_maps_to_invalid() {
        let core = CoreError::validation("email", "missing '@'");
        let err: StorageError = core.into();
        assert!(matches!(err, StorageError::InvalidEntity { .. }));
    }
}
