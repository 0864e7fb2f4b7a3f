use thiserror::Error;

/// Core error types for Dentora domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("{entity} cannot be {action} while {status}")]
    InvalidTransition {
        entity: String,
        action: String,
        status: String,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new Validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidDate error
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate(message.into())
    }

    /// Create a new InvalidTimeRange error
    pub fn invalid_time_range(message: impl Into<String>) -> Self {
        Self::InvalidTimeRange(message.into())
    }

    /// Create a new InvalidTransition error
    pub fn invalid_transition(
        entity: impl Into<String>,
        action: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            action: action.into(),
            status: status.into(),
        }
    }

    /// Create a new Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Check if this error maps to a 409 Conflict response
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::Conflict(_))
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::InvalidDate(_)
                | Self::InvalidTimeRange(_)
                | Self::InvalidTransition { .. }
                | Self::Conflict(_)
        )
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = CoreError::validation("email", "missing '@'");
        assert_eq!(err.to_string(), "Invalid value for email: missing '@'");
        assert!(err.is_client_error());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = CoreError::invalid_transition("budget", "deleted", "active");
        assert_eq!(err.to_string(), "budget cannot be deleted while active");
        assert!(err.is_conflict());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_conflict_error() {
        let err = CoreError::conflict("an empty budget cannot be activated");
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "an empty budget cannot be activated");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("{ nope }").unwrap_err();
        let core_err: CoreError = json_err.into();
        assert!(matches!(core_err, CoreError::Json(_)));
        assert!(!core_err.is_client_error());
    }
}
