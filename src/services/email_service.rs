use reqwest::Client;
use serde_json::json;

use crate::errors::{AppError, Result};
use crate::models::purpose::OtpPurpose;

/// Outbound mail over the provider's JSON API. The renderer itself is a
/// collaborator; this service only shapes `{recipients, subject, html, text,
/// tags}` payloads and reports delivery failures as internal errors.
#[derive(Clone)]
pub struct EmailService {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl EmailService {
    pub fn new(api_url: String, api_key: String, from: String) -> Self {
        Self {
            client: Client::new(),
            api_url,
            api_key,
            from,
        }
    }

    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
        tags: &[&str],
    ) -> Result<()> {
        let payload = json!({
            "from": self.from,
            "recipients": [recipient],
            "subject": subject,
            "html_body": html_body,
            "text_body": text_body,
            "tags": tags,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::internal(format!("Email API error: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Email delivery failed with status: {}",
                response.status()
            )))
        }
    }

    /// The initial code delivery. Failures here propagate to the caller,
    /// who needs to know the code never went out.
    pub async fn send_otp_code(&self, email: &str, purpose: OtpPurpose, code: &str) -> Result<()> {
        let subject = match purpose {
            OtpPurpose::SignupVerify => "Confirm your email address",
            OtpPurpose::EmailVerify => "Verify your email address",
            OtpPurpose::ResetPassword => "Reset your password",
            OtpPurpose::ChangePassword => "Confirm your password change",
            OtpPurpose::ChangeEmail => "Confirm your new email address",
            OtpPurpose::Other => "Your verification code",
        };

        let html = format!(
            "<p>Your verification code is <strong>{}</strong>.</p>\
             <p>It expires in 10 minutes. If you didn't request this, you can ignore this email.</p>",
            code
        );
        let text = format!(
            "Your verification code is {}. It expires in 10 minutes.",
            code
        );

        self.send(email, subject, &html, &text, &["otp", purpose.tag()])
            .await
    }

    // The confirmations below are secondary: the mutation already
    // committed, so callers log failures instead of surfacing them.

    pub async fn send_password_changed(&self, email: &str) -> Result<()> {
        self.send(
            email,
            "Your password was changed",
            "<p>Your account password was just changed. If this wasn't you, reset it immediately.</p>",
            "Your account password was just changed. If this wasn't you, reset it immediately.",
            &["security", "password-changed"],
        )
        .await
    }

    pub async fn send_email_changed(&self, old_email: &str, new_email: &str) -> Result<()> {
        let html = format!(
            "<p>The email on your account was changed to <strong>{}</strong>. \
             If this wasn't you, contact support.</p>",
            new_email
        );
        let text = format!(
            "The email on your account was changed to {}. If this wasn't you, contact support.",
            new_email
        );
        self.send(old_email, "Your account email was changed", &html, &text, &["security", "email-changed"])
            .await
    }

    pub async fn send_welcome(&self, email: &str, name: &str) -> Result<()> {
        let html = format!("<p>Welcome, {}! Your account is ready.</p>", name);
        let text = format!("Welcome, {}! Your account is ready.", name);
        self.send(email, "Welcome aboard", &html, &text, &["onboarding"])
            .await
    }

    pub async fn send_new_device(&self, email: &str, description: &str) -> Result<()> {
        let html = format!(
            "<p>New sign-in detected from <strong>{}</strong>. \
             If this wasn't you, change your password now.</p>",
            description
        );
        let text = format!(
            "New sign-in detected from {}. If this wasn't you, change your password now.",
            description
        );
        self.send(email, "New sign-in detected", &html, &text, &["security", "new-device"])
            .await
    }
}
