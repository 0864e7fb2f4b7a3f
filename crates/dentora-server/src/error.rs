//! HTTP error type and the mappings from domain and storage errors.
//!
//! Every failure leaving a handler is an `ApiError`; the response body is
//! always `{"error": {"code": "...", "message": "..."}}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use dentora_core::CoreError;
use dentora_docs::DocsError;
use dentora_notifications::NotificationError;
use dentora_storage::StorageError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation",
            message: message.into(),
        }
    }

    /// Validation failure naming the offending field.
    pub fn invalid_field(field: &str, message: impl std::fmt::Display) -> Self {
        Self::validation(format!("Invalid value for {field}: {message}"))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "conflict",
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal details go to the log, not the client.
        let message = if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.message, "internal server error");
            "internal server error".to_string()
        } else {
            self.message
        };
        let body = json!({
            "error": {
                "code": self.code,
                "message": message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::not_found(err.to_string()),
            StorageError::AlreadyExists { .. } | StorageError::Conflict { .. } => {
                Self::conflict(err.to_string())
            }
            StorageError::InvalidEntity { .. } => Self::validation(err.to_string()),
            StorageError::Connection { .. } | StorageError::Internal { .. } => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        if err.is_conflict() {
            Self::conflict(err.to_string())
        } else if err.is_client_error() {
            Self::validation(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound(_) => Self::not_found(err.to_string()),
            NotificationError::NotPending => {
                Self::conflict("notification is no longer pending")
            }
            NotificationError::InvalidConfig(_)
            | NotificationError::TemplateNotFound(_)
            | NotificationError::MissingRecipient(_) => Self::validation(err.to_string()),
            NotificationError::SendFailed(_) | NotificationError::Internal(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<DocsError> for ApiError {
    fn from(err: DocsError) -> Self {
        match err {
            DocsError::Unscheduled => Self::conflict(err.to_string()),
            DocsError::InvalidInput(_) => Self::validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: ApiError = StorageError::not_found("patient", "b7f1").into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");

        let err: ApiError = StorageError::conflict("budget is active").into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = StorageError::invalid_entity("bad email").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = StorageError::internal("db on fire").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = CoreError::invalid_transition("budget", "deleted", "active").into();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err: ApiError = CoreError::validation("email", "missing '@'").into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_field_message() {
        let err = ApiError::invalid_field("birth_date", "must not be in the future");
        assert_eq!(
            err.message,
            "Invalid value for birth_date: must not be in the future"
        );
    }
}
