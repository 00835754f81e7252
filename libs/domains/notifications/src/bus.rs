//! Command/event message bus.
//!
//! Single entry point `handle`: routes a command to its one handler or an
//! event to its zero-or-more handlers, then drains the domain events their
//! unit of work collected and dispatches those in turn. The drain loop is
//! an explicit FIFO work queue (breadth-first) rather than recursion, so
//! chain depth is bounded by queue length and termination is observable.
//!
//! Command handler errors propagate to the caller. Event handler errors are
//! caught, logged, and isolated per handler; events are fire-and-forget.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::commands::{Command, CommandKind};
use crate::correlation;
use crate::error::{NotificationError, NotificationResult};
use crate::events::{Event, EventKind};
use crate::store::{PreferencesStore, RequestStore};
use crate::uow::UnitOfWork;

/// A unit dispatched through the bus: a state-changing command or a
/// notification of a past occurrence.
#[derive(Debug, Clone)]
pub enum Message {
    Command(Command),
    Event(Event),
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

/// Handles one command kind within a fresh unit-of-work scope.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command, uow: &mut UnitOfWork) -> NotificationResult<()>;
}

/// Handles one event kind within a fresh unit-of-work scope.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Event, uow: &mut UnitOfWork) -> NotificationResult<()>;
}

/// Immutable-after-startup mapping from message kinds to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<CommandKind, Arc<dyn CommandHandler>>,
    events: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a command kind. Commands must have exactly
    /// one handler; a second registration is a configuration error.
    pub fn register_command(
        &mut self,
        kind: CommandKind,
        handler: Arc<dyn CommandHandler>,
    ) -> NotificationResult<()> {
        if self.commands.contains_key(&kind) {
            return Err(NotificationError::MultipleHandlersForCommand(kind));
        }
        self.commands.insert(kind, handler);
        Ok(())
    }

    /// Register a handler for an event kind. Handlers run in registration
    /// order.
    pub fn register_event(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.events.entry(kind).or_default().push(handler);
    }

    fn command_handler(&self, kind: CommandKind) -> NotificationResult<&Arc<dyn CommandHandler>> {
        self.commands
            .get(&kind)
            .ok_or(NotificationError::NoHandlerFound(kind))
    }

    fn event_handlers(&self, kind: EventKind) -> &[Arc<dyn EventHandler>] {
        self.events.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The bus. Safe to share across concurrent `handle` calls: each dispatch
/// gets its own unit-of-work instance, and the registry is read-only after
/// startup.
pub struct MessageBus {
    registry: HandlerRegistry,
    preferences_store: Arc<dyn PreferencesStore>,
    request_store: Arc<dyn RequestStore>,
}

impl MessageBus {
    pub fn new(
        registry: HandlerRegistry,
        preferences_store: Arc<dyn PreferencesStore>,
        request_store: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            registry,
            preferences_store,
            request_store,
        }
    }

    fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(self.preferences_store.clone(), self.request_store.clone())
    }

    /// Dispatch a message and every domain event it transitively causes.
    ///
    /// Returns once the work queue is empty, i.e. when no handler raised
    /// anything new. A command error aborts and propagates; event handler
    /// errors are logged and swallowed.
    pub async fn handle(&self, message: impl Into<Message>) -> NotificationResult<()> {
        let mut queue: VecDeque<Message> = VecDeque::new();
        queue.push_back(message.into());

        while let Some(message) = queue.pop_front() {
            match message {
                Message::Command(command) => {
                    let raised = self.handle_command(command).await?;
                    queue.extend(raised.into_iter().map(Message::Event));
                }
                Message::Event(event) => {
                    let raised = self.handle_event(event).await;
                    queue.extend(raised.into_iter().map(Message::Event));
                }
            }
        }
        Ok(())
    }

    async fn handle_command(&self, command: Command) -> NotificationResult<Vec<Event>> {
        let kind = command.kind();
        let handler = self.registry.command_handler(kind)?;
        debug!(command = %kind, "Handling command");

        let mut uow = self.begin();
        let correlation_id = correlation::current_or_new();
        correlation::scope(correlation_id, handler.handle(command, &mut uow)).await?;
        Ok(uow.collect_new_events())
    }

    async fn handle_event(&self, event: Event) -> Vec<Event> {
        let kind = event.kind();
        let mut raised = Vec::new();

        for handler in self.registry.event_handlers(kind) {
            debug!(event = %kind, "Handling event");
            let mut uow = self.begin();
            let correlation_id = event.meta().correlation_id.clone();
            let outcome =
                correlation::scope(correlation_id, handler.handle(event.clone(), &mut uow)).await;

            match outcome {
                Ok(()) => raised.extend(uow.collect_new_events()),
                Err(err) => {
                    // Isolated: remaining handlers still run, nothing
                    // propagates to the caller.
                    error!(event = %kind, error = %err, "Event handler failed");
                }
            }
        }
        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::RetryFailedNotification;
    use crate::events::{EventMeta, UserRegistered};
    use crate::store::{InMemoryPreferencesStore, InMemoryRequestStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopCommandHandler;

    #[async_trait]
    impl CommandHandler for NoopCommandHandler {
        async fn handle(&self, _command: Command, _uow: &mut UnitOfWork) -> NotificationResult<()> {
            Ok(())
        }
    }

    struct CountingEventHandler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for CountingEventHandler {
        async fn handle(&self, _event: Event, _uow: &mut UnitOfWork) -> NotificationResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NotificationError::Internal("induced failure".to_string()));
            }
            Ok(())
        }
    }

    fn bus(registry: HandlerRegistry) -> MessageBus {
        MessageBus::new(
            registry,
            Arc::new(InMemoryPreferencesStore::default()),
            Arc::new(InMemoryRequestStore::default()),
        )
    }

    fn user_registered() -> Event {
        Event::UserRegistered(UserRegistered {
            meta: EventMeta::new(),
            userid: "a1b2c3d4e5f6789012345678901234ab".to_string(),
            username: "marge".to_string(),
            email: "marge@example.com".to_string(),
        })
    }

    #[tokio::test]
    async fn test_unregistered_command_is_an_error() {
        let bus = bus(HandlerRegistry::new());
        let command = Command::RetryFailedNotification(RetryFailedNotification {
            notification_id: "0123456789abcdef0123456789abcdef".to_string(),
        });

        let err = bus.handle(command).await.unwrap_err();
        assert!(matches!(err, NotificationError::NoHandlerFound(_)));
    }

    #[test]
    fn test_duplicate_command_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_command(CommandKind::SendNotification, Arc::new(NoopCommandHandler))
            .unwrap();

        let err = registry
            .register_command(CommandKind::SendNotification, Arc::new(NoopCommandHandler))
            .unwrap_err();
        assert!(matches!(
            err,
            NotificationError::MultipleHandlersForCommand(CommandKind::SendNotification)
        ));
    }

    #[tokio::test]
    async fn test_event_with_no_handlers_is_a_noop() {
        let bus = bus(HandlerRegistry::new());
        bus.handle(user_registered()).await.unwrap();
    }

    #[tokio::test]
    async fn test_event_handler_failure_is_isolated() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut registry = HandlerRegistry::new();
        registry.register_event(
            EventKind::UserRegistered,
            Arc::new(CountingEventHandler {
                calls: first.clone(),
                fail: true,
            }),
        );
        registry.register_event(
            EventKind::UserRegistered,
            Arc::new(CountingEventHandler {
                calls: second.clone(),
                fail: false,
            }),
        );

        let bus = bus(registry);
        // The first handler fails, the second still runs, nothing propagates.
        bus.handle(user_registered()).await.unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
