//! Notifications Domain
//!
//! Command/event dispatch core of the notification service: a message bus
//! routes commands and events to handlers, handlers orchestrate the
//! `NotificationPreferences` and `NotificationRequest` aggregates through a
//! unit of work, and domain events raised along the way are drained and
//! dispatched in turn until nothing new is raised.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Entrypoint      │  ← commands / incoming user events
//! └────────┬─────────┘
//!          │ handle(message)
//! ┌────────▼─────────┐
//! │   MessageBus     │  ← routes to handlers, drains raised events
//! └────────┬─────────┘
//!          │ fresh scope per dispatch
//! ┌────────▼─────────┐
//! │   UnitOfWork     │  ← repositories + event collection, commit/rollback
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐     ┌──────────────────┐
//! │  Stores (trait)  │     │ EmailProvider /  │
//! │                  │     │ EventPublisher   │  ← injected capabilities
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{bootstrap, Command, CreatePreferences};
//!
//! let bus = bootstrap::message_bus(preferences_store, request_store,
//!     email_provider, publisher, HandlerConfig::default())?;
//!
//! bus.handle(Command::CreatePreferences(CreatePreferences {
//!     userid,
//!     notification_email,
//!     preferences,
//! })).await?;
//! ```

pub mod bootstrap;
pub mod bus;
pub mod commands;
pub mod correlation;
pub mod error;
pub mod events;
pub mod handlers;
pub mod model;
pub mod providers;
pub mod publisher;
pub mod queries;
pub mod store;
pub mod templates;
pub mod uow;

// Re-export commonly used types
pub use bus::{CommandHandler, EventHandler, HandlerRegistry, Message, MessageBus};
pub use commands::{
    Command, CommandKind, CreatePreferences, RetryFailedNotification, SendNotification,
    UpdatePreferences,
};
pub use error::{NotificationError, NotificationResult};
pub use events::{Event, EventKind, EventMeta};
pub use handlers::HandlerConfig;
pub use model::{
    NotificationEmail, NotificationID, NotificationPreferences, NotificationRequest,
    NotificationStatus, NotificationType, PreferenceSettings, TemplateVars, UserID,
    DEFAULT_MAX_RETRIES,
};
pub use providers::{EmailProvider, SmtpConfig, SmtpProvider};
pub use publisher::{EventPublisher, RedisStreamPublisher};
pub use store::{
    InMemoryPreferencesStore, InMemoryRequestStore, PreferencesStore, RequestStore,
};
pub use templates::TemplateEngine;
pub use uow::UnitOfWork;
