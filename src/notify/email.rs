//! SMTP email channel (STARTTLS + login)

use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::NotificationChannel;
use crate::config::EmailSettings;
use crate::error::{EngineError, EngineResult};

/// SMTP command timeout
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailChannel {
    settings: EmailSettings,
    cooldown: Duration,
}

impl EmailChannel {
    pub fn from_settings(settings: &EmailSettings, cooldown: Duration) -> Self {
        if settings.enabled {
            let missing = settings.missing_keys();
            if !missing.is_empty() {
                crate::log_warn!(
                    "Email notifications enabled but configuration incomplete; missing: {}",
                    missing.join(", ")
                );
            }
        }

        Self {
            settings: settings.clone(),
            cooldown,
        }
    }

    fn build_message(&self, subject: &str, body: &str) -> EngineResult<Message> {
        let from = parse_mailbox(self.settings.from_address.as_deref(), "smtp_from_address")?;
        let to = parse_mailbox(self.settings.to_address.as_deref(), "smtp_to_address")?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| EngineError::config(format!("Failed to build email: {}", e)))
    }

    fn build_transport(&self) -> EngineResult<AsyncSmtpTransport<Tokio1Executor>> {
        let server = required(self.settings.smtp_server.as_deref(), "smtp_server")?;
        let username = required(self.settings.smtp_username.as_deref(), "smtp_username")?;
        let password = required(self.settings.smtp_password.as_deref(), "smtp_password")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| EngineError::config(format!("Invalid SMTP relay '{}': {}", server, e)))?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(transport)
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> EngineResult<&'a str> {
    value.ok_or_else(|| EngineError::config(format!("{} is not set", key)))
}

fn parse_mailbox(value: Option<&str>, key: &str) -> EngineResult<Mailbox> {
    required(value, key)?
        .parse()
        .map_err(|e| EngineError::config(format!("{} is not a valid address: {}", key, e)))
}

impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn is_configured(&self) -> bool {
        self.settings.enabled && self.settings.missing_keys().is_empty()
    }

    fn min_send_interval(&self) -> Option<Duration> {
        Some(self.cooldown)
    }

    fn send<'a>(
        &'a self,
        subject: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let message = self.build_message(subject, body)?;
            let transport = self.build_transport()?;

            transport
                .send(message)
                .await
                .map_err(|e| EngineError::network(format!("SMTP send failed: {}", e)))?;

            crate::log_stderr!(
                "Email notification sent to {}",
                self.settings.to_address.as_deref().unwrap_or_default()
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> EmailSettings {
        EmailSettings {
            enabled: true,
            smtp_server: Some("smtp.example.net".to_string()),
            smtp_port: 587,
            smtp_username: Some("netguard".to_string()),
            smtp_password: Some("secret".to_string()),
            from_address: Some("netguard@example.net".to_string()),
            to_address: Some("admin@example.net".to_string()),
        }
    }

    #[test]
    fn configured_only_when_enabled_and_complete() {
        let cooldown = Duration::from_secs(300);
        assert!(EmailChannel::from_settings(&complete(), cooldown).is_configured());

        let mut disabled = complete();
        disabled.enabled = false;
        assert!(!EmailChannel::from_settings(&disabled, cooldown).is_configured());

        let mut partial = complete();
        partial.smtp_password = None;
        assert!(!EmailChannel::from_settings(&partial, cooldown).is_configured());
    }

    #[test]
    fn message_uses_configured_addresses() {
        let channel = EmailChannel::from_settings(&complete(), Duration::from_secs(300));
        let message = channel.build_message("NetGuard Alert", "body").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: admin@example.net"));
        assert!(raw.contains("Subject: NetGuard Alert"));
    }

    #[test]
    fn bad_address_is_a_configuration_error() {
        let mut settings = complete();
        settings.to_address = Some("not an address".to_string());
        let channel = EmailChannel::from_settings(&settings, Duration::from_secs(300));
        let err = channel.build_message("s", "b").unwrap_err();
        assert_eq!(err.kind(), "CONFIGURATION");
    }
}
