//! Commands: instructions to change state, each handled by exactly one
//! handler.
//!
//! Commands carry raw wire-level values (plain strings, maps); validation
//! into value objects happens inside the aggregates when the command is
//! handled.

use std::collections::HashMap;
use std::fmt;

use crate::model::TemplateVars;

/// Create initial notification preferences for a user.
#[derive(Debug, Clone)]
pub struct CreatePreferences {
    pub userid: String,
    pub notification_email: String,
    pub preferences: HashMap<String, bool>,
}

/// Update existing notification preferences.
#[derive(Debug, Clone)]
pub struct UpdatePreferences {
    pub userid: String,
    pub notification_email: String,
    pub preferences: HashMap<String, bool>,
}

/// Send a notification to a user.
#[derive(Debug, Clone)]
pub struct SendNotification {
    pub userid: String,
    pub notification_type: String,
    pub recipient_email: String,
    pub subject: String,
    /// Literal body, or the name of a registered template.
    pub content: String,
    pub template_vars: TemplateVars,
}

/// Re-run delivery for a previously failed notification.
#[derive(Debug, Clone)]
pub struct RetryFailedNotification {
    pub notification_id: String,
}

/// All commands the bus knows how to dispatch.
#[derive(Debug, Clone)]
pub enum Command {
    CreatePreferences(CreatePreferences),
    UpdatePreferences(UpdatePreferences),
    SendNotification(SendNotification),
    RetryFailedNotification(RetryFailedNotification),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreatePreferences(_) => CommandKind::CreatePreferences,
            Command::UpdatePreferences(_) => CommandKind::UpdatePreferences,
            Command::SendNotification(_) => CommandKind::SendNotification,
            Command::RetryFailedNotification(_) => CommandKind::RetryFailedNotification,
        }
    }
}

/// Discriminant used as the handler-registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreatePreferences,
    UpdatePreferences,
    SendNotification,
    RetryFailedNotification,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::CreatePreferences => "CreatePreferences",
            CommandKind::UpdatePreferences => "UpdatePreferences",
            CommandKind::SendNotification => "SendNotification",
            CommandKind::RetryFailedNotification => "RetryFailedNotification",
        };
        f.write_str(name)
    }
}
