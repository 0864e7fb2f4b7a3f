use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Recipient has no address for the {0} channel")]
    MissingRecipient(&'static str),

    #[error("Notification is not pending")]
    NotPending,

    #[error("Internal error: {0}")]
    Internal(String),
}
