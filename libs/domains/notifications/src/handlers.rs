//! Application handlers: orchestration of aggregates, repositories and the
//! injected capabilities.
//!
//! Each command has exactly one handler; events have zero or more. The
//! orchestration bodies are free functions so event handlers can reuse them
//! the same way the command handlers do — an incoming `UserRegistered`
//! event and a `CreatePreferences` command run the identical code path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use crate::bus::{CommandHandler, EventHandler};
use crate::commands::{Command, CreatePreferences, SendNotification, UpdatePreferences};
use crate::error::{NotificationError, NotificationResult};
use crate::events::Event;
use crate::model::{
    NotificationID, NotificationPreferences, NotificationRequest, NotificationStatus,
    NotificationType, TemplateVars, UserID, DEFAULT_MAX_RETRIES,
};
use crate::providers::EmailProvider;
use crate::publisher::EventPublisher;
use crate::uow::UnitOfWork;

/// Settings the orchestration layer needs for building outbound content.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Base URL links in emails point at.
    pub frontend_url: String,
    /// Human-readable service name used in email copy.
    pub service_name: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            service_name: "Notification Service".to_string(),
        }
    }
}

// ============================================================================
// Shared orchestration
// ============================================================================

pub(crate) async fn create_preferences(
    cmd: &CreatePreferences,
    uow: &mut UnitOfWork,
) -> NotificationResult<()> {
    let preferences =
        NotificationPreferences::create(&cmd.userid, &cmd.notification_email, &cmd.preferences)?;
    uow.preferences.add(preferences);
    uow.commit().await?;

    info!(userid = %cmd.userid, "Created notification preferences");
    Ok(())
}

/// The send orchestration: preference gate, request creation, immediate
/// retry loop, one commit covering all attempts.
pub(crate) async fn send_notification(
    cmd: &SendNotification,
    uow: &mut UnitOfWork,
    email_provider: &dyn EmailProvider,
) -> NotificationResult<()> {
    // Unknown type strings fail before any request exists.
    let notification_type = NotificationType::parse(&cmd.notification_type)?;
    let userid = UserID::new(&cmd.userid)?;

    // Preference gate: a disabled type aborts silently, before persistence.
    if let Some(preferences) = uow.preferences.get(&userid).await? {
        if !preferences.is_notification_enabled(notification_type) {
            info!(
                userid = %cmd.userid,
                notification_type = %notification_type,
                "Notification type disabled for user, skipping"
            );
            return Ok(());
        }
    }

    let notification_id = NotificationID::generate();
    let request = NotificationRequest::create(
        notification_id.as_str(),
        &cmd.userid,
        notification_type,
        &cmd.recipient_email,
        &cmd.subject,
        &cmd.content,
        cmd.template_vars.clone(),
    )?;
    let request = uow.requests.add(request);

    while request.can_retry(DEFAULT_MAX_RETRIES) {
        let delivered = email_provider
            .send_email(&cmd.recipient_email, &cmd.subject, &cmd.content, &cmd.template_vars)
            .await?;

        if delivered {
            request.mark_as_sent();
            info!(
                notification_id = %request.notification_id(),
                notification_type = %notification_type,
                "Notification sent"
            );
            break;
        }

        request.increment_retry();
        request.mark_as_failed("failed to send email");
        error!(
            notification_id = %request.notification_id(),
            retry_count = %request.retry_count(),
            "Failed to send notification"
        );
    }

    // One transaction covers every attempt above.
    uow.commit().await
}

// ============================================================================
// Command handlers
// ============================================================================

pub struct CreatePreferencesHandler;

#[async_trait]
impl CommandHandler for CreatePreferencesHandler {
    async fn handle(&self, command: Command, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Command::CreatePreferences(cmd) = command else {
            return Err(NotificationError::Internal(
                "CreatePreferencesHandler received a different command".to_string(),
            ));
        };
        create_preferences(&cmd, uow).await
    }
}

pub struct UpdatePreferencesHandler;

#[async_trait]
impl CommandHandler for UpdatePreferencesHandler {
    async fn handle(&self, command: Command, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Command::UpdatePreferences(cmd) = command else {
            return Err(NotificationError::Internal(
                "UpdatePreferencesHandler received a different command".to_string(),
            ));
        };
        update_preferences(&cmd, uow).await
    }
}

async fn update_preferences(cmd: &UpdatePreferences, uow: &mut UnitOfWork) -> NotificationResult<()> {
    let userid = UserID::new(&cmd.userid)?;
    let Some(preferences) = uow.preferences.get(&userid).await? else {
        error!(userid = %cmd.userid, "Cannot update non-existent preferences");
        return Err(NotificationError::PreferencesNotFound(cmd.userid.clone()));
    };

    preferences.update_email(&cmd.notification_email)?;
    preferences.update_preferences(&cmd.preferences);
    uow.commit().await?;

    info!(userid = %cmd.userid, "Updated notification preferences");
    Ok(())
}

pub struct SendNotificationHandler {
    email_provider: Arc<dyn EmailProvider>,
}

impl SendNotificationHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>) -> Self {
        Self { email_provider }
    }
}

#[async_trait]
impl CommandHandler for SendNotificationHandler {
    async fn handle(&self, command: Command, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Command::SendNotification(cmd) = command else {
            return Err(NotificationError::Internal(
                "SendNotificationHandler received a different command".to_string(),
            ));
        };
        send_notification(&cmd, uow, self.email_provider.as_ref()).await
    }
}

pub struct RetryFailedNotificationHandler {
    email_provider: Arc<dyn EmailProvider>,
}

impl RetryFailedNotificationHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>) -> Self {
        Self { email_provider }
    }
}

#[async_trait]
impl CommandHandler for RetryFailedNotificationHandler {
    async fn handle(&self, command: Command, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Command::RetryFailedNotification(cmd) = command else {
            return Err(NotificationError::Internal(
                "RetryFailedNotificationHandler received a different command".to_string(),
            ));
        };

        let notification_id = NotificationID::new(&cmd.notification_id)?;
        let resend = {
            let Some(request) = uow.requests.get(&notification_id).await? else {
                return Err(NotificationError::RequestNotFound(cmd.notification_id.clone()));
            };

            if request.status() != NotificationStatus::Failed {
                warn!(
                    notification_id = %cmd.notification_id,
                    status = %request.status(),
                    "Notification is not in failed state, skipping retry"
                );
                return Ok(());
            }

            SendNotification {
                userid: request.userid().to_string(),
                notification_type: request.notification_type().to_string(),
                recipient_email: request.recipient_email().to_string(),
                subject: request.subject().to_string(),
                content: request.content().to_string(),
                template_vars: request.template_vars().clone(),
            }
        };

        send_notification(&resend, uow, self.email_provider.as_ref()).await
    }
}

// ============================================================================
// Event handlers
// ============================================================================

/// `UserRegistered` -> create default preferences with every type enabled.
pub struct UserRegisteredHandler;

#[async_trait]
impl EventHandler for UserRegisteredHandler {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Event::UserRegistered(event) = event else {
            return Err(NotificationError::Internal(
                "UserRegisteredHandler received a different event".to_string(),
            ));
        };

        let cmd = CreatePreferences {
            userid: event.userid,
            notification_email: event.email,
            preferences: NotificationType::ALL
                .iter()
                .map(|nt| (nt.as_str().to_string(), true))
                .collect(),
        };
        create_preferences(&cmd, uow).await
    }
}

/// `UserEmailVerificationRequested` -> verification email.
pub struct EmailVerificationRequestedHandler {
    email_provider: Arc<dyn EmailProvider>,
    config: HandlerConfig,
}

impl EmailVerificationRequestedHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>, config: HandlerConfig) -> Self {
        Self { email_provider, config }
    }
}

#[async_trait]
impl EventHandler for EmailVerificationRequestedHandler {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Event::UserEmailVerificationRequested(event) = event else {
            return Err(NotificationError::Internal(
                "EmailVerificationRequestedHandler received a different event".to_string(),
            ));
        };

        let verification_link = format!(
            "{}/auth/verify-email?token={}",
            self.config.frontend_url, event.verify_token
        );
        let cmd = SendNotification {
            userid: event.userid,
            notification_type: NotificationType::EmailVerification.to_string(),
            recipient_email: event.email,
            subject: "Please verify your email address".to_string(),
            content: "email_verification".to_string(),
            template_vars: TemplateVars::from([
                ("username".to_string(), json!(event.username)),
                ("verification_link".to_string(), json!(verification_link)),
                ("service_name".to_string(), json!(self.config.service_name)),
            ]),
        };
        send_notification(&cmd, uow, self.email_provider.as_ref()).await
    }
}

/// `PasswordResetRequested` -> reset email.
pub struct PasswordResetRequestedHandler {
    email_provider: Arc<dyn EmailProvider>,
    config: HandlerConfig,
}

impl PasswordResetRequestedHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>, config: HandlerConfig) -> Self {
        Self { email_provider, config }
    }
}

#[async_trait]
impl EventHandler for PasswordResetRequestedHandler {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Event::PasswordResetRequested(event) = event else {
            return Err(NotificationError::Internal(
                "PasswordResetRequestedHandler received a different event".to_string(),
            ));
        };

        let reset_link = format!(
            "{}/auth/reset-password?token={}",
            self.config.frontend_url, event.reset_token
        );
        let cmd = SendNotification {
            userid: event.userid,
            notification_type: NotificationType::PasswordReset.to_string(),
            recipient_email: event.email,
            subject: "Password Reset Request".to_string(),
            content: "password_reset".to_string(),
            template_vars: TemplateVars::from([
                ("reset_link".to_string(), json!(reset_link)),
                ("service_name".to_string(), json!(self.config.service_name)),
            ]),
        };
        send_notification(&cmd, uow, self.email_provider.as_ref()).await
    }
}

/// `PreferencesCreated` -> welcome email.
pub struct PreferencesCreatedHandler {
    email_provider: Arc<dyn EmailProvider>,
    config: HandlerConfig,
}

impl PreferencesCreatedHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>, config: HandlerConfig) -> Self {
        Self { email_provider, config }
    }
}

#[async_trait]
impl EventHandler for PreferencesCreatedHandler {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Event::PreferencesCreated(event) = event else {
            return Err(NotificationError::Internal(
                "PreferencesCreatedHandler received a different event".to_string(),
            ));
        };

        info!(
            userid = %event.userid,
            notification_email = %event.notification_email,
            "New notification preferences created, sending welcome email"
        );

        let cmd = SendNotification {
            userid: event.userid,
            notification_type: NotificationType::Welcome.to_string(),
            recipient_email: event.notification_email,
            subject: format!("Welcome to {}", self.config.service_name),
            content: "welcome".to_string(),
            template_vars: TemplateVars::from([(
                "service_name".to_string(),
                json!(self.config.service_name),
            )]),
        };
        send_notification(&cmd, uow, self.email_provider.as_ref()).await
    }
}

/// `PreferencesUpdated` -> security-alert email about the change.
pub struct PreferencesUpdatedHandler {
    email_provider: Arc<dyn EmailProvider>,
    config: HandlerConfig,
}

impl PreferencesUpdatedHandler {
    pub fn new(email_provider: Arc<dyn EmailProvider>, config: HandlerConfig) -> Self {
        Self { email_provider, config }
    }
}

#[async_trait]
impl EventHandler for PreferencesUpdatedHandler {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()> {
        let Event::PreferencesUpdated(event) = event else {
            return Err(NotificationError::Internal(
                "PreferencesUpdatedHandler received a different event".to_string(),
            ));
        };

        let cmd = SendNotification {
            userid: event.userid,
            notification_type: NotificationType::SecurityAlert.to_string(),
            recipient_email: event.notification_email,
            subject: "Your Notification Preferences Have Been Updated".to_string(),
            content: "security_alert".to_string(),
            template_vars: TemplateVars::from([
                (
                    "alert_message".to_string(),
                    json!("Your notification preferences have been successfully updated."),
                ),
                ("service_name".to_string(), json!(self.config.service_name)),
            ]),
        };
        send_notification(&cmd, uow, self.email_provider.as_ref()).await
    }
}

/// Generic forwarder: one handler instance publishes every outgoing event
/// type to the external broker, keyed purely off the event's runtime kind.
pub struct PublishToExternalServices {
    publisher: Arc<dyn EventPublisher>,
}

impl PublishToExternalServices {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventHandler for PublishToExternalServices {
    async fn handle(&self, event: Event, _uow: &mut UnitOfWork) -> NotificationResult<()> {
        info!(event = %event.kind(), "Publishing event to external services");
        self.publisher.publish_event(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventMeta, NotificationSent};
    use crate::providers::MockEmailProvider;
    use crate::publisher::MockEventPublisher;
    use crate::store::{InMemoryPreferencesStore, InMemoryRequestStore, PreferencesStore, RequestStore};
    use std::collections::HashMap;

    const USER: &str = "a1b2c3d4e5f6789012345678901234ab";

    fn uow_with_stores() -> (UnitOfWork, Arc<InMemoryPreferencesStore>, Arc<InMemoryRequestStore>) {
        let preferences_store = Arc::new(InMemoryPreferencesStore::default());
        let request_store = Arc::new(InMemoryRequestStore::default());
        (
            UnitOfWork::new(preferences_store.clone(), request_store.clone()),
            preferences_store,
            request_store,
        )
    }

    fn send_command(notification_type: &str) -> SendNotification {
        SendNotification {
            userid: USER.to_string(),
            notification_type: notification_type.to_string(),
            recipient_email: "user@example.com".to_string(),
            subject: "subject".to_string(),
            content: "body".to_string(),
            template_vars: TemplateVars::new(),
        }
    }

    #[tokio::test]
    async fn test_disabled_type_skips_send_and_persists_nothing() {
        let (mut uow, preferences_store, request_store) = uow_with_stores();
        let preferences = NotificationPreferences::create(
            USER,
            "user@example.com",
            &HashMap::from([("welcome".to_string(), false)]),
        )
        .unwrap();
        preferences_store.save(&preferences).await.unwrap();

        let mut provider = MockEmailProvider::new();
        provider.expect_send_email().never();

        send_notification(&send_command("welcome"), &mut uow, &provider)
            .await
            .unwrap();

        let userid = UserID::new(USER).unwrap();
        assert!(request_store.history(&userid, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_fails_before_creating_a_request() {
        let (mut uow, _, request_store) = uow_with_stores();

        let mut provider = MockEmailProvider::new();
        provider.expect_send_email().never();

        let err = send_notification(&send_command("carrier_pigeon"), &mut uow, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidNotificationType(_)));

        let userid = UserID::new(USER).unwrap();
        assert!(request_store.history(&userid, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_send_persists_sent_request() {
        let (mut uow, _, request_store) = uow_with_stores();

        let mut provider = MockEmailProvider::new();
        provider
            .expect_send_email()
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        send_notification(&send_command("welcome"), &mut uow, &provider)
            .await
            .unwrap();

        let userid = UserID::new(USER).unwrap();
        let history = request_store.history(&userid, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), NotificationStatus::Sent);
        assert_eq!(history[0].retry_count(), 0);
    }

    #[tokio::test]
    async fn test_update_unknown_user_is_not_found() {
        let (mut uow, _, _) = uow_with_stores();
        let cmd = UpdatePreferences {
            userid: USER.to_string(),
            notification_email: "user@example.com".to_string(),
            preferences: HashMap::new(),
        };

        let err = update_preferences(&cmd, &mut uow).await.unwrap_err();
        assert!(matches!(err, NotificationError::PreferencesNotFound(_)));
    }

    #[tokio::test]
    async fn test_publish_handler_forwards_to_publisher() {
        let (mut uow, _, _) = uow_with_stores();

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish_event()
            .times(1)
            .returning(|_| Ok(()));

        let handler = PublishToExternalServices::new(Arc::new(publisher));
        let event = Event::NotificationSent(NotificationSent {
            meta: EventMeta::new(),
            notification_id: "0123456789abcdef0123456789abcdef".to_string(),
            userid: USER.to_string(),
            notification_type: "welcome".to_string(),
        });

        handler.handle(event, &mut uow).await.unwrap();
    }
}
