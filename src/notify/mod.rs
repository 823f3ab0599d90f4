//! Notification dispatch
//!
//! A [`Dispatcher`] holds a homogeneous list of [`NotificationChannel`]s. For one
//! alert it skips channels that are not configured, honours each channel's
//! minimum send interval, then runs the remaining channels as separate tasks
//! with bounded retries under one shared deadline.

pub mod email;
pub mod telegram;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::alerts::render;
use crate::clock::SharedClock;
use crate::config::Settings;
use crate::database::AlertRecord;
use crate::error::{EngineError, EngineResult};

pub use email::EmailChannel;
pub use telegram::TelegramChannel;

/// One delivery channel. `send` resolves to `Err` on any transport failure.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Enabled and every required credential present
    fn is_configured(&self) -> bool;

    /// Minimum gap between two successful sends on this channel
    fn min_send_interval(&self) -> Option<Duration> {
        None
    }

    fn send<'a>(
        &'a self,
        subject: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>>;
}

/// Bounded retry: attempts per channel, fixed delay, and an overall per-alert deadline
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.dispatch_max_attempts.max(1),
            delay: Duration::from_secs(settings.dispatch_retry_delay_secs),
            deadline: Duration::from_secs(settings.dispatch_timeout_secs),
        }
    }
}

/// Per-channel outcome of one dispatch
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchResult {
    pub channel_outcomes: BTreeMap<String, bool>,
    /// Channels skipped because their send interval had not elapsed
    pub throttled: Vec<String>,
}

impl DispatchResult {
    pub fn any_delivered(&self) -> bool {
        self.channel_outcomes.values().any(|ok| *ok)
    }

    /// `Notifications sent - email: ✓, telegram: ✗`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .channel_outcomes
            .iter()
            .map(|(name, ok)| format!("{}: {}", name, if *ok { "✓" } else { "✗" }))
            .collect();
        format!("Notifications sent - {}", parts.join(", "))
    }
}

pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    clock: SharedClock,
    retry: RetryPolicy,
    last_sent: Mutex<HashMap<&'static str, DateTime<Utc>>>,
}

impl Dispatcher {
    pub fn new(
        channels: Vec<Arc<dyn NotificationChannel>>,
        clock: SharedClock,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            channels,
            clock,
            retry,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Email and Telegram channels built from settings
    pub fn from_settings(settings: &Settings, clock: SharedClock) -> EngineResult<Self> {
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![
            Arc::new(EmailChannel::from_settings(
                &settings.email,
                settings.email_cooldown(),
            )),
            Arc::new(TelegramChannel::from_settings(&settings.telegram)?),
        ];
        Ok(Self::new(channels, clock, RetryPolicy::from_settings(settings)))
    }

    /// Names of channels that would be attempted
    pub fn configured_channels(&self) -> Vec<&'static str> {
        self.channels
            .iter()
            .filter(|c| c.is_configured())
            .map(|c| c.name())
            .collect()
    }

    /// Deliver one alert through every configured channel.
    /// Fails with a configuration error when no channel is configured.
    pub async fn dispatch(&self, alert: &AlertRecord) -> EngineResult<DispatchResult> {
        let configured: Vec<Arc<dyn NotificationChannel>> = self
            .channels
            .iter()
            .filter(|c| c.is_configured())
            .cloned()
            .collect();

        if configured.is_empty() {
            return Err(EngineError::config(
                "no notification channel is enabled and fully configured",
            ));
        }

        let mut result = DispatchResult::default();
        let now = self.clock.now();

        let mut ready = Vec::with_capacity(configured.len());
        {
            let last_sent = self.last_sent.lock().await;
            for channel in configured {
                if let (Some(interval), Some(previous)) =
                    (channel.min_send_interval(), last_sent.get(channel.name()))
                {
                    let elapsed = (now - *previous).to_std().unwrap_or(Duration::ZERO);
                    if elapsed < interval {
                        crate::log_debug!(
                            "{} throttled for alert #{} ({:?} of {:?} elapsed)",
                            channel.name(),
                            alert.id,
                            elapsed,
                            interval
                        );
                        result.throttled.push(channel.name().to_string());
                        result.channel_outcomes.insert(channel.name().to_string(), false);
                        continue;
                    }
                }
                ready.push(channel);
            }
        }

        let (subject, body) = render::notification(alert);
        let subject = Arc::new(subject);
        let body = Arc::new(body);

        let mut handles = Vec::with_capacity(ready.len());
        for channel in ready {
            let name = channel.name();
            let subject = Arc::clone(&subject);
            let body = Arc::clone(&body);
            let retry = self.retry;
            handles.push((
                name,
                tokio::spawn(async move { send_with_retry(channel, &subject, &body, retry).await }),
            ));
        }

        let deadline = tokio::time::Instant::now() + self.retry.deadline;
        for (name, mut handle) in handles {
            let delivered = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(delivered)) => delivered,
                Ok(Err(e)) => {
                    crate::log_warn!("{} task for alert #{} failed: {}", name, alert.id, e);
                    false
                }
                Err(_) => {
                    handle.abort();
                    crate::log_warn!(
                        "{} gave up on alert #{} after {:?}",
                        name,
                        alert.id,
                        self.retry.deadline
                    );
                    false
                }
            };

            if delivered {
                self.last_sent.lock().await.insert(name, self.clock.now());
            }
            result.channel_outcomes.insert(name.to_string(), delivered);
        }

        Ok(result)
    }
}

async fn send_with_retry(
    channel: Arc<dyn NotificationChannel>,
    subject: &str,
    body: &str,
    retry: RetryPolicy,
) -> bool {
    for attempt in 1..=retry.max_attempts {
        match channel.send(subject, body).await {
            Ok(()) => {
                crate::log_debug!("{} delivered on attempt {}", channel.name(), attempt);
                return true;
            }
            Err(e) => {
                crate::log_warn!(
                    "{} send attempt {}/{} failed: {}",
                    channel.name(),
                    attempt,
                    retry.max_attempts,
                    e
                );
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::{AlertSeverity, AlertType};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
        interval: Option<Duration>,
    }

    impl NotificationChannel for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn min_send_interval(&self) -> Option<Duration> {
            self.interval
        }

        fn send<'a>(
            &'a self,
            _subject: &'a str,
            _body: &'a str,
        ) -> Pin<Box<dyn Future<Output = EngineResult<()>> + Send + 'a>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failures_before_success {
                    Err(EngineError::network("connection refused"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn alert() -> AlertRecord {
        AlertRecord {
            id: 1,
            device_mac: "aa:bb:cc:dd:ee:ff".to_string(),
            alert_type: AlertType::NewDevice,
            detected_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            details: "New device detected:".to_string(),
            severity: AlertSeverity::Medium,
            resolved: false,
            resolved_at: None,
            resolution_notes: None,
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::ZERO,
            deadline: Duration::from_secs(5),
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())
    }

    fn only(flaky: &Arc<Flaky>, clock: ManualClock, retry: RetryPolicy) -> Dispatcher {
        let channel: Arc<dyn NotificationChannel> = flaky.clone();
        Dispatcher::new(vec![channel], Arc::new(clock), retry)
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let flaky = Arc::new(Flaky {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
            interval: None,
        });
        let dispatcher = only(&flaky, clock(), quick_retry(3));

        let result = dispatcher.dispatch(&alert()).await.unwrap();
        assert_eq!(result.channel_outcomes.get("flaky"), Some(&true));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let flaky = Arc::new(Flaky {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            interval: None,
        });
        let dispatcher = only(&flaky, clock(), quick_retry(3));

        let result = dispatcher.dispatch(&alert()).await.unwrap();
        assert!(!result.any_delivered());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.summary(), "Notifications sent - flaky: ✗");
    }

    #[tokio::test]
    async fn send_interval_throttles_until_elapsed() {
        let clock = clock();
        let flaky = Arc::new(Flaky {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
            interval: Some(Duration::from_secs(300)),
        });
        let dispatcher = only(&flaky, clock.clone(), quick_retry(1));

        assert!(dispatcher.dispatch(&alert()).await.unwrap().any_delivered());

        clock.advance(chrono::Duration::seconds(120));
        let throttled = dispatcher.dispatch(&alert()).await.unwrap();
        assert!(!throttled.any_delivered());
        assert_eq!(throttled.throttled, vec!["flaky".to_string()]);

        clock.advance(chrono::Duration::seconds(181));
        assert!(dispatcher.dispatch(&alert()).await.unwrap().any_delivered());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_caps_total_retry_time() {
        let flaky = Arc::new(Flaky {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            interval: None,
        });
        let retry = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            deadline: Duration::from_secs(7),
        };
        let dispatcher = only(&flaky, clock(), retry);

        let result = dispatcher.dispatch(&alert()).await.unwrap();
        assert_eq!(result.channel_outcomes.get("flaky"), Some(&false));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }
}
