//! Telegram bot channel

use reqwest::Client;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;

use super::NotificationChannel;
use crate::config::{TelegramSettings, TELEGRAM_HTTP_TIMEOUT};
use crate::error::{EngineError, EngineResult};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramChannel {
    client: Client,
    api_base: String,
    settings: TelegramSettings,
}

impl TelegramChannel {
    pub fn from_settings(settings: &TelegramSettings) -> EngineResult<Self> {
        if settings.enabled && (settings.bot_token.is_none() || settings.chat_id.is_none()) {
            crate::log_warn!(
                "Telegram notifications enabled but {} is missing",
                "telegram_bot_token or telegram_chat_id"
            );
        }

        let client = Client::builder()
            .timeout(TELEGRAM_HTTP_TIMEOUT)
            .build()
            .map_err(|e| EngineError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            settings: settings.clone(),
        })
    }

    /// Point the channel at another Bot API host
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self, token: &str) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            token
        )
    }
}

/// Escape text for `parse_mode=HTML`
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn is_configured(&self) -> bool {
        self.settings.enabled
            && self.settings.bot_token.is_some()
            && self.settings.chat_id.is_some()
    }

    fn send<'a>(
        &'a self,
        subject: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let (Some(token), Some(chat_id)) =
                (self.settings.bot_token.as_deref(), self.settings.chat_id.as_deref())
            else {
                return Err(EngineError::config("Telegram channel is not configured"));
            };

            let text = format!("<b>{}</b>\n\n{}", escape_html(subject), escape_html(body));

            let response = self
                .client
                .post(self.endpoint(token))
                .json(&json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                }))
                .send()
                .await
                .map_err(|e| EngineError::network(format!("Telegram request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::network(format!(
                    "Telegram sendMessage failed with {}: {}",
                    status, body
                )));
            }

            crate::log_stderr!("Telegram notification sent to chat {}", chat_id);
            Ok(())
        })
    }
}
