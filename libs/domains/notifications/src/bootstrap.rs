//! Bus wiring: the command and event handler tables.

use std::sync::Arc;

use crate::bus::{HandlerRegistry, MessageBus};
use crate::commands::CommandKind;
use crate::error::NotificationResult;
use crate::events::EventKind;
use crate::handlers::{
    CreatePreferencesHandler, EmailVerificationRequestedHandler, HandlerConfig,
    PasswordResetRequestedHandler, PreferencesCreatedHandler, PreferencesUpdatedHandler,
    PublishToExternalServices, RetryFailedNotificationHandler, SendNotificationHandler,
    UpdatePreferencesHandler, UserRegisteredHandler,
};
use crate::providers::EmailProvider;
use crate::publisher::EventPublisher;
use crate::store::{PreferencesStore, RequestStore};

/// Build the fully wired message bus.
///
/// Every command gets its single handler; incoming user events feed the
/// send orchestration; the two terminal notification events share one
/// forwarding handler to the external publisher.
pub fn message_bus(
    preferences_store: Arc<dyn PreferencesStore>,
    request_store: Arc<dyn RequestStore>,
    email_provider: Arc<dyn EmailProvider>,
    publisher: Arc<dyn EventPublisher>,
    config: HandlerConfig,
) -> NotificationResult<MessageBus> {
    let mut registry = HandlerRegistry::new();

    registry.register_command(CommandKind::CreatePreferences, Arc::new(CreatePreferencesHandler))?;
    registry.register_command(CommandKind::UpdatePreferences, Arc::new(UpdatePreferencesHandler))?;
    registry.register_command(
        CommandKind::SendNotification,
        Arc::new(SendNotificationHandler::new(email_provider.clone())),
    )?;
    registry.register_command(
        CommandKind::RetryFailedNotification,
        Arc::new(RetryFailedNotificationHandler::new(email_provider.clone())),
    )?;

    registry.register_event(EventKind::UserRegistered, Arc::new(UserRegisteredHandler));
    registry.register_event(
        EventKind::UserEmailVerificationRequested,
        Arc::new(EmailVerificationRequestedHandler::new(
            email_provider.clone(),
            config.clone(),
        )),
    );
    registry.register_event(
        EventKind::PasswordResetRequested,
        Arc::new(PasswordResetRequestedHandler::new(
            email_provider.clone(),
            config.clone(),
        )),
    );
    registry.register_event(
        EventKind::PreferencesCreated,
        Arc::new(PreferencesCreatedHandler::new(
            email_provider.clone(),
            config.clone(),
        )),
    );
    registry.register_event(
        EventKind::PreferencesUpdated,
        Arc::new(PreferencesUpdatedHandler::new(email_provider, config)),
    );

    let publish = Arc::new(PublishToExternalServices::new(publisher));
    registry.register_event(EventKind::NotificationSent, publish.clone());
    registry.register_event(EventKind::NotificationFailed, publish);

    Ok(MessageBus::new(registry, preferences_store, request_store))
}
