//! Email provider implementations.
//!
//! The `EmailProvider` trait is the capability handlers use to deliver
//! notifications. Delivery failure is a `false` result, not an error;
//! errors are reserved for configuration and connection problems.

mod smtp;

pub use smtp::{SmtpConfig, SmtpProvider};

use async_trait::async_trait;

use crate::error::NotificationResult;
use crate::model::TemplateVars;

/// Trait for email sending capabilities.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Attempt delivery. `content` is either a literal body or the name of
    /// a registered template rendered with `template_vars`.
    ///
    /// Returns `Ok(true)` when the message was accepted, `Ok(false)` when
    /// delivery failed. `Err` means the provider itself is misconfigured or
    /// unreachable in a way a retry loop should not paper over.
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        content: &str,
        template_vars: &TemplateVars,
    ) -> NotificationResult<bool>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
