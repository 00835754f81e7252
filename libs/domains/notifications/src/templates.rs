//! Email template rendering.
//!
//! Handlebars-based engine with the service's built-in templates. A
//! notification's `content` field either names one of these templates or is
//! a literal body.

use handlebars::Handlebars;

use crate::error::{NotificationError, NotificationResult};
use crate::model::TemplateVars;

const EMAIL_VERIFICATION_TEMPLATE: &str = r#"<html>
<body>
<h2>Email Verification Required</h2>
<p>Hi {{username}},</p>
<p>Please verify your email address by clicking the link below:</p>
<p><a href="{{verification_link}}">Verify Email</a></p>
<p>Best regards,<br>The {{service_name}} Team</p>
</body>
</html>"#;

const PASSWORD_RESET_TEMPLATE: &str = r#"<html>
<body>
<h2>Password Reset Request</h2>
<p>Hi,</p>
<p>You requested a password reset. Click the link below to reset your password:</p>
<p><a href="{{reset_link}}">Reset Password</a></p>
<p>If you didn't request this, please ignore this email.</p>
<p>Best regards,<br>The {{service_name}} Team</p>
</body>
</html>"#;

const WELCOME_TEMPLATE: &str = r#"<html>
<body>
<h2>Welcome to {{service_name}}!</h2>
<p>Hi,</p>
<p>Welcome to our platform! We're excited to have you on board.</p>
<p>Best regards,<br>The {{service_name}} Team</p>
</body>
</html>"#;

const SECURITY_ALERT_TEMPLATE: &str = r#"<html>
<body>
<h2>Security Alert</h2>
<p>Hi,</p>
<p>{{alert_message}}</p>
<p>If this wasn't you, please contact support immediately.</p>
<p>Best regards,<br>The {{service_name}} Team</p>
</body>
</html>"#;

/// Template engine with the built-in notification templates registered.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();

        for (name, template) in [
            ("email_verification", EMAIL_VERIFICATION_TEMPLATE),
            ("password_reset", PASSWORD_RESET_TEMPLATE),
            ("welcome", WELCOME_TEMPLATE),
            ("security_alert", SECURITY_ALERT_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    NotificationError::Template(format!("Failed to register {name}: {e}"))
                })?;
        }

        Ok(Self { handlebars })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Render a registered template with the given variables.
    pub fn render(&self, name: &str, vars: &TemplateVars) -> NotificationResult<String> {
        Ok(self.handlebars.render(name, vars)?)
    }

    /// Render `content` as a template when it names one and variables were
    /// provided; otherwise treat it as a literal body.
    pub fn render_or_literal(
        &self,
        content: &str,
        vars: &TemplateVars,
    ) -> NotificationResult<String> {
        if !vars.is_empty() && self.has_template(content) {
            self.render(content, vars)
        } else {
            Ok(content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_builtin_templates_registered() {
        let engine = TemplateEngine::new().unwrap();
        for name in ["email_verification", "password_reset", "welcome", "security_alert"] {
            assert!(engine.has_template(name), "missing template {name}");
        }
    }

    #[test]
    fn test_render_email_verification() {
        let engine = TemplateEngine::new().unwrap();
        let vars = TemplateVars::from([
            ("username".to_string(), json!("marge")),
            ("verification_link".to_string(), json!("https://app.example.com/verify/t0k3n")),
            ("service_name".to_string(), json!("Example")),
        ]);

        let body = engine.render("email_verification", &vars).unwrap();
        assert!(body.contains("Hi marge"));
        assert!(body.contains("https://app.example.com/verify/t0k3n"));
    }

    #[test]
    fn test_render_or_literal_passes_literal_content_through() {
        let engine = TemplateEngine::new().unwrap();
        let body = engine
            .render_or_literal("Just a plain body", &TemplateVars::new())
            .unwrap();
        assert_eq!(body, "Just a plain body");
    }

    #[test]
    fn test_render_or_literal_renders_named_template() {
        let engine = TemplateEngine::new().unwrap();
        let vars = TemplateVars::from([
            ("alert_message".to_string(), json!("Your preferences changed.")),
            ("service_name".to_string(), json!("Example")),
        ]);

        let body = engine.render_or_literal("security_alert", &vars).unwrap();
        assert!(body.contains("Your preferences changed."));
    }
}
