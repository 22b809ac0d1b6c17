//! Outbound email
//!
//! Sends transactional emails via the Resend API. Every sender is
//! fire-and-forget: callers spawn these off the request path and a delivery
//! failure never fails the triggering request.

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; empty disables sending
    pub resend_api_key: String,
    /// From address for emails
    pub email_from: String,
    /// Frontend base URL used to build links
    pub frontend_url: String,
}

/// Transactional email service
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Check if email sending is enabled
    pub fn is_enabled(&self) -> bool {
        !self.config.resend_api_key.is_empty()
    }

    /// Send an email via Resend API
    async fn send_email(&self, to: &str, subject: &str, html: &str) {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping: {}", subject);
            return;
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header(
                "Authorization",
                format!("Bearer {}", self.config.resend_api_key),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Email sent");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "Failed to send email");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send email");
            }
        }
    }

    /// Send the email verification link after sign-up
    pub async fn send_email_verification(&self, to: &str, verification_key: &str) {
        let link = format!(
            "{}/validate-email/{}",
            self.config.frontend_url, verification_key
        );

        let html = format!(
            r#"<p>Welcome!</p>
<p>Please confirm your email address by clicking the link below.</p>
<p><a href="{link}">Verify your email</a></p>
<p>If you did not create an account, you can ignore this email.</p>"#,
        );

        self.send_email(to, "Verify your email address", &html).await;
    }

    /// Send the password reset link
    pub async fn send_password_reset(&self, to: &str, reset_key: &str) {
        let link = format!("{}/reset/{}", self.config.frontend_url, reset_key);

        let html = format!(
            r#"<p>We received a request to reset your password.</p>
<p><a href="{link}">Choose a new password</a></p>
<p>If you did not request this, you can ignore this email and your password
will stay the same.</p>"#,
        );

        self.send_email(to, "Reset your password", &html).await;
    }

    /// Send a group invitation to a new (stub) account
    pub async fn send_group_invite(&self, to: &str, group_name: &str, invite_key: &str) {
        let link = format!("{}/invite/{}", self.config.frontend_url, invite_key);

        let html = format!(
            r#"<p>You have been invited to join <strong>{group_name}</strong>.</p>
<p><a href="{link}">Accept the invitation</a></p>"#,
        );

        self.send_email(to, &format!("You've been invited to {group_name}"), &html)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_api_key() {
        let service = EmailService::new(EmailConfig {
            resend_api_key: String::new(),
            email_from: "Huddle <noreply@localhost>".to_string(),
            frontend_url: "http://localhost:8080".to_string(),
        });
        assert!(!service.is_enabled());
    }
}
