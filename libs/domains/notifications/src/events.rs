//! Domain events: facts the service consumes from other services and facts
//! it publishes about its own behavior.
//!
//! Every event carries shared metadata (`event_id`, `correlation_id`,
//! `source_service`, `timestamp`) flattened into its wire payload, plus an
//! `event_type` tag so payloads are self-describing on the broker.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation;

/// Tag stamped on every event this service creates.
pub const SOURCE_SERVICE: &str = "notification";

/// Metadata shared by every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: Uuid,
    pub correlation_id: String,
    pub source_service: String,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    /// Fresh metadata. Picks up the ambient correlation id when created
    /// inside a bus dispatch scope, so events inherit the correlation of
    /// their cause.
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            correlation_id: correlation::current_or_new(),
            source_service: SOURCE_SERVICE.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Metadata with an explicit correlation id.
    pub fn with_correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::new()
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Incoming events (consumed from other services)
// ============================================================================

/// The user service asked for an email-verification message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEmailVerificationRequested {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub userid: String,
    pub username: String,
    pub email: String,
    pub verify_token: String,
}

/// A new user registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegistered {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub userid: String,
    pub username: String,
    pub email: String,
}

/// A user requested a password reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequested {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub userid: String,
    pub email: String,
    pub reset_token: String,
}

// ============================================================================
// Outgoing events (published by this service)
// ============================================================================

/// Notification preferences were created for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesCreated {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub userid: String,
    pub notification_email: String,
    pub preferences: HashMap<String, bool>,
}

/// Notification preferences were updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesUpdated {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub userid: String,
    pub notification_email: String,
    pub preferences: HashMap<String, bool>,
}

/// A notification was delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub notification_id: String,
    pub userid: String,
    pub notification_type: String,
}

/// A delivery attempt failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailed {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub notification_id: String,
    pub userid: String,
    pub notification_type: String,
    pub error_message: String,
    pub retry_count: u32,
}

// ============================================================================
// Event envelope
// ============================================================================

/// All events the bus knows how to dispatch, tagged with their wire names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Event {
    #[serde(rename = "user.email_verification_requested")]
    UserEmailVerificationRequested(UserEmailVerificationRequested),
    #[serde(rename = "user.registered")]
    UserRegistered(UserRegistered),
    #[serde(rename = "user.password_reset_requested")]
    PasswordResetRequested(PasswordResetRequested),
    #[serde(rename = "notification.preferences_created")]
    PreferencesCreated(PreferencesCreated),
    #[serde(rename = "notification.preferences_updated")]
    PreferencesUpdated(PreferencesUpdated),
    #[serde(rename = "notification.sent")]
    NotificationSent(NotificationSent),
    #[serde(rename = "notification.failed")]
    NotificationFailed(NotificationFailed),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UserEmailVerificationRequested(_) => EventKind::UserEmailVerificationRequested,
            Event::UserRegistered(_) => EventKind::UserRegistered,
            Event::PasswordResetRequested(_) => EventKind::PasswordResetRequested,
            Event::PreferencesCreated(_) => EventKind::PreferencesCreated,
            Event::PreferencesUpdated(_) => EventKind::PreferencesUpdated,
            Event::NotificationSent(_) => EventKind::NotificationSent,
            Event::NotificationFailed(_) => EventKind::NotificationFailed,
        }
    }

    /// Wire name, matching the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::UserEmailVerificationRequested(_) => "user.email_verification_requested",
            Event::UserRegistered(_) => "user.registered",
            Event::PasswordResetRequested(_) => "user.password_reset_requested",
            Event::PreferencesCreated(_) => "notification.preferences_created",
            Event::PreferencesUpdated(_) => "notification.preferences_updated",
            Event::NotificationSent(_) => "notification.sent",
            Event::NotificationFailed(_) => "notification.failed",
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Event::UserEmailVerificationRequested(e) => &e.meta,
            Event::UserRegistered(e) => &e.meta,
            Event::PasswordResetRequested(e) => &e.meta,
            Event::PreferencesCreated(e) => &e.meta,
            Event::PreferencesUpdated(e) => &e.meta,
            Event::NotificationSent(e) => &e.meta,
            Event::NotificationFailed(e) => &e.meta,
        }
    }
}

/// Discriminant used as the handler-registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserEmailVerificationRequested,
    UserRegistered,
    PasswordResetRequested,
    PreferencesCreated,
    PreferencesUpdated,
    NotificationSent,
    NotificationFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::UserEmailVerificationRequested => "UserEmailVerificationRequested",
            EventKind::UserRegistered => "UserRegistered",
            EventKind::PasswordResetRequested => "PasswordResetRequested",
            EventKind::PreferencesCreated => "PreferencesCreated",
            EventKind::PreferencesUpdated => "PreferencesUpdated",
            EventKind::NotificationSent => "NotificationSent",
            EventKind::NotificationFailed => "NotificationFailed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_event_wire_format_round_trip() {
        let payload = serde_json::json!({
            "event_type": "user.registered",
            "event_id": "7f1e0d2c9b8a7f6e5d4c3b2a19080706",
            "correlation_id": "c0ffee00c0ffee00c0ffee00c0ffee00",
            "source_service": "user",
            "timestamp": "2026-01-15T09:30:00Z",
            "userid": "a1b2c3d4e5f6789012345678901234ab",
            "username": "marge",
            "email": "marge@example.com",
        });

        let event: Event = serde_json::from_value(payload).unwrap();
        match &event {
            Event::UserRegistered(e) => {
                assert_eq!(e.username, "marge");
                assert_eq!(e.meta.source_service, "user");
            }
            other => panic!("expected UserRegistered, got {other:?}"),
        }

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event_type"], "user.registered");
        assert_eq!(encoded["email"], "marge@example.com");
    }

    #[test]
    fn test_outgoing_event_carries_meta() {
        let event = Event::NotificationSent(NotificationSent {
            meta: EventMeta::new(),
            notification_id: "0123456789abcdef0123456789abcdef".to_string(),
            userid: "a1b2c3d4e5f6789012345678901234ab".to_string(),
            notification_type: "welcome".to_string(),
        });

        assert_eq!(event.event_type(), "notification.sent");
        assert_eq!(event.meta().source_service, SOURCE_SERVICE);

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event_type"], "notification.sent");
        assert!(encoded["event_id"].is_string());
        assert!(encoded["correlation_id"].is_string());
    }

    #[test]
    fn test_event_ids_are_unique() {
        assert_ne!(EventMeta::new().event_id, EventMeta::new().event_id);
    }
}
