//! Domain model for the notifications service.
//!
//! Two aggregates live here: `NotificationPreferences` (one record per
//! user, gating which notification types get delivered) and
//! `NotificationRequest` (one record per send, carrying the send/retry
//! state machine). Both accumulate domain events as a side effect of
//! behavior; the unit of work drains those queues after each transaction.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::error::{NotificationError, NotificationResult};
use crate::events::{
    Event, EventMeta, NotificationFailed, NotificationSent, PreferencesCreated, PreferencesUpdated,
};

/// Default cap on delivery attempts for one notification request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Template variables attached to a notification request.
pub type TemplateVars = HashMap<String, serde_json::Value>;

// ============================================================================
// Value Objects
// ============================================================================

fn is_hex_identifier(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Opaque identifier for a user, issued by the external user service.
///
/// Always a 32-character lowercase hexadecimal string; anything else is
/// rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserID(String);

impl UserID {
    pub fn new(value: impl Into<String>) -> NotificationResult<Self> {
        let value = value.into();
        if !is_hex_identifier(&value) {
            return Err(NotificationError::Validation(format!(
                "invalid user id {value:?}: expected 32 lowercase hex characters"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a notification request. Same 32-hex shape as `UserID`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationID(String);

impl NotificationID {
    pub fn new(value: impl Into<String>) -> NotificationResult<Self> {
        let value = value.into();
        if !is_hex_identifier(&value) {
            return Err(NotificationError::Validation(format!(
                "invalid notification id {value:?}: expected 32 lowercase hex characters"
            )));
        }
        Ok(Self(value))
    }

    /// Mint a fresh identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated email address for notification delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEmail(String);

impl NotificationEmail {
    pub fn new(value: impl Into<String>) -> NotificationResult<Self> {
        let value = value.into();
        if !value.validate_email() {
            return Err(NotificationError::Validation(format!(
                "invalid email address: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user notification toggles. Everything defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceSettings {
    pub email_verification: bool,
    pub password_reset: bool,
    pub welcome: bool,
    pub security_alert: bool,
}

impl Default for PreferenceSettings {
    fn default() -> Self {
        Self {
            email_verification: true,
            password_reset: true,
            welcome: true,
            security_alert: true,
        }
    }
}

impl PreferenceSettings {
    /// Build settings from the wire-level map; missing keys default to true.
    pub fn from_map(map: &HashMap<String, bool>) -> Self {
        let enabled = |nt: NotificationType| map.get(nt.as_str()).copied().unwrap_or(true);
        Self {
            email_verification: enabled(NotificationType::EmailVerification),
            password_reset: enabled(NotificationType::PasswordReset),
            welcome: enabled(NotificationType::Welcome),
            security_alert: enabled(NotificationType::SecurityAlert),
        }
    }

    pub fn to_map(&self) -> HashMap<String, bool> {
        HashMap::from([
            (NotificationType::EmailVerification.as_str().to_string(), self.email_verification),
            (NotificationType::PasswordReset.as_str().to_string(), self.password_reset),
            (NotificationType::Welcome.as_str().to_string(), self.welcome),
            (NotificationType::SecurityAlert.as_str().to_string(), self.security_alert),
        ])
    }

    pub fn is_enabled(&self, notification_type: NotificationType) -> bool {
        match notification_type {
            NotificationType::EmailVerification => self.email_verification,
            NotificationType::PasswordReset => self.password_reset,
            NotificationType::Welcome => self.welcome,
            NotificationType::SecurityAlert => self.security_alert,
        }
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Types of notifications this service delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    EmailVerification,
    PasswordReset,
    Welcome,
    SecurityAlert,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::EmailVerification,
        NotificationType::PasswordReset,
        NotificationType::Welcome,
        NotificationType::SecurityAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::EmailVerification => "email_verification",
            NotificationType::PasswordReset => "password_reset",
            NotificationType::Welcome => "welcome",
            NotificationType::SecurityAlert => "security_alert",
        }
    }

    /// Parse the wire name; unknown strings fail before any request is
    /// created.
    pub fn parse(value: &str) -> NotificationResult<Self> {
        match value {
            "email_verification" => Ok(NotificationType::EmailVerification),
            "password_reset" => Ok(NotificationType::PasswordReset),
            "welcome" => Ok(NotificationType::Welcome),
            "security_alert" => Ok(NotificationType::SecurityAlert),
            other => Err(NotificationError::InvalidNotificationType(other.to_string())),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Delivery status of a notification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Retrying,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Retrying => "retrying",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// NotificationPreferences aggregate
// ============================================================================

/// Aggregate root for a user's notification preferences.
///
/// Invariant: one preferences record per user. The event queue is transient
/// and never persisted; it is cleared on load and drained by the unit of
/// work after each transaction.
#[derive(Debug, Clone)]
pub struct NotificationPreferences {
    userid: UserID,
    notification_email: NotificationEmail,
    preferences: PreferenceSettings,
    events: VecDeque<Event>,
}

impl NotificationPreferences {
    /// Factory for new preferences; raises `PreferencesCreated`.
    pub fn create(
        userid: &str,
        notification_email: &str,
        preferences: &HashMap<String, bool>,
    ) -> NotificationResult<Self> {
        let userid = UserID::new(userid)?;
        let notification_email = NotificationEmail::new(notification_email)?;
        let settings = PreferenceSettings::from_map(preferences);

        let mut created = Self {
            userid,
            notification_email,
            preferences: settings,
            events: VecDeque::new(),
        };
        created.record(Event::PreferencesCreated(PreferencesCreated {
            meta: EventMeta::new(),
            userid: created.userid.to_string(),
            notification_email: created.notification_email.to_string(),
            preferences: settings.to_map(),
        }));
        Ok(created)
    }

    /// Replace the settings; raises `PreferencesUpdated`.
    pub fn update_preferences(&mut self, new_preferences: &HashMap<String, bool>) {
        self.preferences = PreferenceSettings::from_map(new_preferences);
        self.record(Event::PreferencesUpdated(PreferencesUpdated {
            meta: EventMeta::new(),
            userid: self.userid.to_string(),
            notification_email: self.notification_email.to_string(),
            preferences: self.preferences.to_map(),
        }));
    }

    /// Replace the delivery address.
    pub fn update_email(&mut self, new_email: &str) -> NotificationResult<()> {
        self.notification_email = NotificationEmail::new(new_email)?;
        Ok(())
    }

    pub fn is_notification_enabled(&self, notification_type: NotificationType) -> bool {
        self.preferences.is_enabled(notification_type)
    }

    pub fn userid(&self) -> &UserID {
        &self.userid
    }

    pub fn notification_email(&self) -> &NotificationEmail {
        &self.notification_email
    }

    pub fn preferences(&self) -> &PreferenceSettings {
        &self.preferences
    }

    fn record(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn pop_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub(crate) fn clear_events(&mut self) {
        self.events.clear();
    }
}

// ============================================================================
// NotificationRequest entity
// ============================================================================

/// A single notification to be delivered, tracking its lifecycle from
/// creation through delivery attempts.
///
/// Status machine: `pending -> {sent | failed}`; `failed -> retrying`;
/// `retrying -> {sent | failed}`. `sent` is terminal. `retry_count` only
/// advances through `increment_retry`.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    notification_id: NotificationID,
    userid: UserID,
    notification_type: NotificationType,
    recipient_email: NotificationEmail,
    subject: String,
    content: String,
    template_vars: TemplateVars,
    status: NotificationStatus,
    retry_count: u32,
    created_at: DateTime<Utc>,
    events: VecDeque<Event>,
}

impl NotificationRequest {
    /// Factory for a new request: status `pending`, zero retries.
    pub fn create(
        notification_id: &str,
        userid: &str,
        notification_type: NotificationType,
        recipient_email: &str,
        subject: &str,
        content: &str,
        template_vars: TemplateVars,
    ) -> NotificationResult<Self> {
        Ok(Self {
            notification_id: NotificationID::new(notification_id)?,
            userid: UserID::new(userid)?,
            notification_type,
            recipient_email: NotificationEmail::new(recipient_email)?,
            subject: subject.to_string(),
            content: content.to_string(),
            template_vars,
            status: NotificationStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            events: VecDeque::new(),
        })
    }

    /// Mark the notification as delivered; raises `NotificationSent`.
    pub fn mark_as_sent(&mut self) {
        self.status = NotificationStatus::Sent;
        self.record(Event::NotificationSent(NotificationSent {
            meta: EventMeta::new(),
            notification_id: self.notification_id.to_string(),
            userid: self.userid.to_string(),
            notification_type: self.notification_type.to_string(),
        }));
    }

    /// Mark the notification as failed; raises `NotificationFailed`
    /// carrying the retry count at the time of the failure. Does not touch
    /// `retry_count`.
    pub fn mark_as_failed(&mut self, error_message: &str) {
        self.status = NotificationStatus::Failed;
        self.record(Event::NotificationFailed(NotificationFailed {
            meta: EventMeta::new(),
            notification_id: self.notification_id.to_string(),
            userid: self.userid.to_string(),
            notification_type: self.notification_type.to_string(),
            error_message: error_message.to_string(),
            retry_count: self.retry_count,
        }));
    }

    /// Advance the retry counter and move to `retrying`. Raises no event.
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
        self.status = NotificationStatus::Retrying;
    }

    /// Whether another attempt is allowed. Looks only at the counter;
    /// callers pair this with a status check when deciding to retry.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    pub fn notification_id(&self) -> &NotificationID {
        &self.notification_id
    }

    pub fn userid(&self) -> &UserID {
        &self.userid
    }

    pub fn notification_type(&self) -> NotificationType {
        self.notification_type
    }

    pub fn recipient_email(&self) -> &NotificationEmail {
        &self.recipient_email
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn template_vars(&self) -> &TemplateVars {
        &self.template_vars
    }

    pub fn status(&self) -> NotificationStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn record(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn pop_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub(crate) fn clear_events(&mut self) {
        self.events.clear();
    }
}
