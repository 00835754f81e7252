//! SMTP email provider built on lettre.
//!
//! Works against local development servers (MailHog/Mailpit) without TLS or
//! credentials, and against real relays with both.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, error, info};

use super::EmailProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::model::TemplateVars;
use crate::templates::TemplateEngine;

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
    /// Optional for dev servers like Mailpit.
    pub username: Option<String>,
    pub password: Option<String>,
    /// False for local dev servers.
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    /// Configuration from environment variables, defaulting to a local
    /// MailHog/Mailpit setup.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1025),
            from_email: std::env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "Notification Service".to_string()),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

/// SMTP provider. Transport errors during a send count as delivery failure
/// (`Ok(false)`); configuration problems surface when the transport is
/// built.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: TemplateEngine,
    config: SmtpConfig,
}

impl SmtpProvider {
    pub fn new(config: SmtpConfig, templates: TemplateEngine) -> NotificationResult<Self> {
        let transport = Self::build_transport(&config)?;
        Ok(Self {
            transport,
            templates,
            config,
        })
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| {
                    NotificationError::Provider(format!("Failed to create SMTP relay: {e}"))
                })?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(
        &self,
        to_email: &str,
        subject: &str,
        html_body: String,
    ) -> NotificationResult<Message> {
        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| NotificationError::Provider(format!("Invalid from address: {e}")))?;

        let to: Mailbox = to_email
            .parse()
            .map_err(|e| NotificationError::Provider(format!("Invalid to address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html_body),
            )
            .map_err(|e| NotificationError::Provider(format!("Failed to build email message: {e}")))
    }

    /// Verify the SMTP connection is usable.
    pub async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::Provider(format!("SMTP health check failed: {e}")))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        content: &str,
        template_vars: &TemplateVars,
    ) -> NotificationResult<bool> {
        debug!(
            to = %to_email,
            subject = %subject,
            host = %self.config.host,
            port = %self.config.port,
            "Sending email via SMTP"
        );

        let body = self.templates.render_or_literal(content, template_vars)?;
        let message = self.build_message(to_email, subject, body)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(to = %to_email, subject = %subject, "Email sent via SMTP");
                Ok(true)
            }
            Err(e) => {
                error!(to = %to_email, error = %e, "Failed to send email via SMTP");
                Ok(false)
            }
        }
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}
