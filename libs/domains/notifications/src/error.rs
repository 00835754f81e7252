//! Error types for the notifications domain.

use thiserror::Error;

use crate::commands::CommandKind;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Malformed identifier or email address, rejected at construction.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Notification type string does not match a known type.
    #[error("Invalid notification type: {0}")]
    InvalidNotificationType(String),

    /// No preferences stored for the given user.
    #[error("Notification preferences not found for user: {0}")]
    PreferencesNotFound(String),

    /// No notification request stored under the given id.
    #[error("Notification request not found: {0}")]
    RequestNotFound(String),

    /// Commit or rollback failure from the backing store.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Email provider configuration or connection error. Delivery failures
    /// are not errors; they come back as a `false` send result.
    #[error("Email provider error: {0}")]
    Provider(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    Template(String),

    /// Failure handing an event to the external broker.
    #[error("Event publish error: {0}")]
    Publish(String),

    /// No handler registered for a dispatched command.
    #[error("No handler registered for command: {0}")]
    NoHandlerFound(CommandKind),

    /// A command may have exactly one handler; a second registration is a
    /// configuration error.
    #[error("Multiple handlers registered for command: {0}")]
    MultipleHandlersForCommand(CommandKind),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for NotificationError {
    fn from(err: redis::RedisError) -> Self {
        NotificationError::Publish(err.to_string())
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}
