//! Configuration for the NetGuard engine
//!
//! Defaults live here as constants. Runtime values are read once at start from a
//! [`SettingsProvider`] into [`Settings`], which is then handed to each component.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

// ====== Scan loop ======

/// Default polling interval in seconds
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;

/// Minimum polling interval in seconds
pub const MIN_SCAN_INTERVAL_SECS: u64 = 10;

/// Maximum polling interval in seconds
pub const MAX_SCAN_INTERVAL_SECS: u64 = 86_400;

/// Upper bound for one discovery sweep
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;

/// Upper bound for profiling a single device
pub const DEFAULT_PROFILE_TIMEOUT_SECS: u64 = 60;

/// Known devices unseen for longer than this are shown as inactive
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

// ====== Alerts ======

/// Minimum gap between two alerts of the same (device, type) pair
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 3600;

// ====== Dispatch ======

/// Minimum gap between two transmitted emails
pub const DEFAULT_EMAIL_COOLDOWN_SECS: u64 = 300;

/// Attempts per channel per alert
pub const DEFAULT_DISPATCH_MAX_ATTEMPTS: u32 = 3;

/// Upper bound for attempts per channel per alert
pub const MAX_DISPATCH_ATTEMPTS: u32 = 10;

/// Fixed delay between attempts on the same channel
pub const DEFAULT_DISPATCH_RETRY_DELAY_SECS: u64 = 5;

/// Overall budget for delivering one alert across all channels
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 60;

/// Upper bound for any duration setting (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 86_400;

/// HTTP timeout for chat-bot calls
pub const TELEGRAM_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default SMTP submission port
pub const DEFAULT_SMTP_PORT: u16 = 587;

// ====== Profiling ======

/// Ports tried by the connect probe, with the service usually behind them
pub const PROFILE_PROBE_PORTS: &[(u16, &str)] = &[
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (80, "http"),
    (443, "https"),
    (445, "microsoft-ds"),
    (515, "printer"),
    (631, "ipp"),
    (3389, "ms-wbt-server"),
    (5000, "upnp"),
    (8080, "http-proxy"),
    (9100, "jetdirect"),
];

/// Per-port connect timeout
pub const PROFILE_PROBE_TIMEOUT: Duration = Duration::from_millis(400);

/// Key/value source for settings (environment, database row, test map)
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// Reads `key` from the environment variable `KEY`
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key.to_ascii_uppercase())
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// In-memory settings
#[derive(Debug, Default, Clone)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_ascii_lowercase(), value.into());
        self
    }
}

impl SettingsProvider for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(&key.to_ascii_lowercase())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// SMTP channel settings
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_server: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
}

impl EmailSettings {
    /// Names of required keys that are unset
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.smtp_server.is_none() {
            missing.push("smtp_server");
        }
        if self.smtp_username.is_none() {
            missing.push("smtp_username");
        }
        if self.smtp_password.is_none() {
            missing.push("smtp_password");
        }
        if self.from_address.is_none() {
            missing.push("smtp_from_address");
        }
        if self.to_address.is_none() {
            missing.push("smtp_to_address");
        }
        missing
    }
}

/// Chat-bot channel settings
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelegramSettings {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// Engine settings, resolved once at process start
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub scan_target: String,
    pub scan_interval_secs: u64,
    pub scan_timeout_secs: u64,
    pub profile_timeout_secs: u64,
    pub stale_after_secs: u64,
    pub alert_cooldown_secs: u64,
    pub email_cooldown_secs: u64,
    pub dispatch_max_attempts: u32,
    pub dispatch_retry_delay_secs: u64,
    pub dispatch_timeout_secs: u64,
    pub email: EmailSettings,
    pub telegram: TelegramSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            scan_target: String::new(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            profile_timeout_secs: DEFAULT_PROFILE_TIMEOUT_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            alert_cooldown_secs: DEFAULT_ALERT_COOLDOWN_SECS,
            email_cooldown_secs: DEFAULT_EMAIL_COOLDOWN_SECS,
            dispatch_max_attempts: DEFAULT_DISPATCH_MAX_ATTEMPTS,
            dispatch_retry_delay_secs: DEFAULT_DISPATCH_RETRY_DELAY_SECS,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            email: EmailSettings {
                smtp_port: DEFAULT_SMTP_PORT,
                ..EmailSettings::default()
            },
            telegram: TelegramSettings::default(),
        }
    }
}

impl Settings {
    /// Read every setting from `provider`, rejecting malformed numbers, zero cooldowns
    /// and durations longer than a year.
    pub fn resolve(provider: &dyn SettingsProvider) -> EngineResult<Self> {
        let scan_interval_secs = parse_u64(
            provider,
            "scan_interval_secs",
            DEFAULT_SCAN_INTERVAL_SECS,
            MAX_DURATION_SECS,
        )?
        .clamp(MIN_SCAN_INTERVAL_SECS, MAX_SCAN_INTERVAL_SECS);

        let settings = Self {
            db_path: provider.get("db_path").map(PathBuf::from),
            scan_target: provider.get_or("scan_target", ""),
            scan_interval_secs,
            scan_timeout_secs: parse_duration(
                provider,
                "scan_timeout_secs",
                DEFAULT_SCAN_TIMEOUT_SECS,
            )?,
            profile_timeout_secs: parse_duration(
                provider,
                "profile_timeout_secs",
                DEFAULT_PROFILE_TIMEOUT_SECS,
            )?,
            stale_after_secs: parse_u64(
                provider,
                "stale_after_secs",
                DEFAULT_STALE_AFTER_SECS,
                MAX_DURATION_SECS,
            )?,
            alert_cooldown_secs: parse_duration(
                provider,
                "alert_cooldown_secs",
                DEFAULT_ALERT_COOLDOWN_SECS,
            )?,
            email_cooldown_secs: parse_duration(
                provider,
                "email_cooldown_secs",
                DEFAULT_EMAIL_COOLDOWN_SECS,
            )?,
            dispatch_max_attempts: parse_positive(
                provider,
                "dispatch_max_attempts",
                u64::from(DEFAULT_DISPATCH_MAX_ATTEMPTS),
                u64::from(u32::MAX),
            )?
            .min(u64::from(MAX_DISPATCH_ATTEMPTS)) as u32,
            dispatch_retry_delay_secs: parse_u64(
                provider,
                "dispatch_retry_delay_secs",
                DEFAULT_DISPATCH_RETRY_DELAY_SECS,
                MAX_DURATION_SECS,
            )?,
            dispatch_timeout_secs: parse_duration(
                provider,
                "dispatch_timeout_secs",
                DEFAULT_DISPATCH_TIMEOUT_SECS,
            )?,
            email: EmailSettings {
                enabled: parse_bool(provider, "enable_email_notifications", false),
                smtp_server: provider.get("smtp_server"),
                smtp_port: parse_port(provider, "smtp_port", DEFAULT_SMTP_PORT)?,
                smtp_username: provider.get("smtp_username"),
                smtp_password: provider.get("smtp_password"),
                from_address: provider.get("smtp_from_address"),
                to_address: provider.get("smtp_to_address"),
            },
            telegram: TelegramSettings {
                enabled: parse_bool(provider, "enable_telegram_notifications", false),
                bot_token: provider.get("telegram_bot_token"),
                chat_id: provider.get("telegram_chat_id"),
            },
        };

        Ok(settings)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_secs(self.profile_timeout_secs)
    }

    pub fn email_cooldown(&self) -> Duration {
        Duration::from_secs(self.email_cooldown_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        signed_seconds(self.stale_after_secs)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        signed_seconds(self.alert_cooldown_secs)
    }
}

/// Saturates at [`MAX_DURATION_SECS`] for values set directly on the struct
fn signed_seconds(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs.min(MAX_DURATION_SECS)).unwrap_or(i64::MAX);
    chrono::Duration::seconds(secs)
}

fn parse_u64(
    provider: &dyn SettingsProvider,
    key: &str,
    default: u64,
    max: u64,
) -> EngineResult<u64> {
    let Some(raw) = provider.get(key) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        EngineError::config(format!(
            "{} must be a non-negative integer, got '{}'",
            key, raw
        ))
    })?;
    if value > max {
        return Err(EngineError::config(format!(
            "{} must be at most {}, got {}",
            key, max, value
        )));
    }
    Ok(value)
}

fn parse_positive(
    provider: &dyn SettingsProvider,
    key: &str,
    default: u64,
    max: u64,
) -> EngineResult<u64> {
    let value = parse_u64(provider, key, default, max)?;
    if value == 0 {
        return Err(EngineError::config(format!("{} must be greater than zero", key)));
    }
    Ok(value)
}

/// A positive number of seconds, at most one year
fn parse_duration(provider: &dyn SettingsProvider, key: &str, default: u64) -> EngineResult<u64> {
    parse_positive(provider, key, default, MAX_DURATION_SECS)
}

fn parse_port(provider: &dyn SettingsProvider, key: &str, default: u16) -> EngineResult<u16> {
    match provider.get(key) {
        Some(raw) => raw
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                EngineError::config(format!("{} must be a TCP port, got '{}'", key, raw))
            }),
        None => Ok(default),
    }
}

fn parse_bool(provider: &dyn SettingsProvider, key: &str, default: bool) -> bool {
    match provider.get(key) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::resolve(&MapSettings::new()).expect("empty settings resolve");
        assert_eq!(settings.scan_interval_secs, DEFAULT_SCAN_INTERVAL_SECS);
        assert_eq!(settings.alert_cooldown_secs, 3600);
        assert_eq!(settings.email_cooldown_secs, 300);
        assert_eq!(settings.dispatch_max_attempts, 3);
        assert_eq!(settings.email.smtp_port, 587);
        assert!(!settings.email.enabled);
        assert!(!settings.telegram.enabled);
    }

    #[test]
    fn invalid_cooldown_is_a_configuration_error() {
        let provider = MapSettings::new().with("alert_cooldown_secs", "soon");
        let err = Settings::resolve(&provider).expect_err("non-numeric cooldown must fail");
        assert_eq!(err.kind(), "CONFIGURATION");
        assert!(err.to_string().contains("alert_cooldown_secs"));

        let provider = MapSettings::new().with("email_cooldown_secs", "0");
        let err = Settings::resolve(&provider).expect_err("zero cooldown must fail");
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let provider = MapSettings::new().with("alert_cooldown_secs", "10000000000000000");
        let err = Settings::resolve(&provider).expect_err("huge cooldown must fail");
        assert_eq!(err.kind(), "CONFIGURATION");
        assert!(err.to_string().contains("alert_cooldown_secs"));

        let provider = MapSettings::new().with("stale_after_secs", u64::MAX.to_string());
        let err = Settings::resolve(&provider).expect_err("u64::MAX must fail");
        assert!(err.to_string().contains("stale_after_secs"));

        let provider = MapSettings::new().with("alert_cooldown_secs", "31536000");
        let settings = Settings::resolve(&provider).expect("one year is accepted");
        assert_eq!(settings.alert_cooldown(), chrono::Duration::days(365));
    }

    #[test]
    fn duration_accessors_saturate() {
        let settings = Settings {
            stale_after_secs: u64::MAX,
            alert_cooldown_secs: u64::MAX,
            ..Settings::default()
        };
        assert_eq!(settings.stale_after(), chrono::Duration::days(365));
        assert_eq!(settings.alert_cooldown(), chrono::Duration::days(365));
    }

    #[test]
    fn dispatch_attempts_are_capped() {
        let provider = MapSettings::new().with("dispatch_max_attempts", "50");
        let settings = Settings::resolve(&provider).unwrap();
        assert_eq!(settings.dispatch_max_attempts, MAX_DISPATCH_ATTEMPTS);

        let provider = MapSettings::new().with("dispatch_max_attempts", "99999999999");
        assert!(Settings::resolve(&provider).is_err());
    }

    #[test]
    fn interval_is_clamped() {
        let provider = MapSettings::new().with("scan_interval_secs", "1");
        let settings = Settings::resolve(&provider).unwrap();
        assert_eq!(settings.scan_interval_secs, MIN_SCAN_INTERVAL_SECS);
    }

    #[test]
    fn booleans_and_channel_keys_are_read() {
        let provider = MapSettings::new()
            .with("enable_email_notifications", "yes")
            .with("smtp_server", "mail.example.net")
            .with("enable_telegram_notifications", "TRUE")
            .with("telegram_bot_token", "123:abc")
            .with("telegram_chat_id", "42");
        let settings = Settings::resolve(&provider).unwrap();
        assert!(settings.email.enabled);
        assert!(settings.telegram.enabled);
        assert_eq!(settings.telegram.chat_id.as_deref(), Some("42"));
        assert_eq!(
            settings.email.missing_keys(),
            vec![
                "smtp_username",
                "smtp_password",
                "smtp_from_address",
                "smtp_to_address"
            ]
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let provider = MapSettings::new().with("smtp_server", "   ");
        assert_eq!(provider.get("smtp_server"), None);
        assert_eq!(provider.get_or("smtp_server", "fallback"), "fallback");
    }
}
