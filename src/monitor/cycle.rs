//! One scan cycle: Discovery -> Reconcile -> Evaluate -> Dispatch -> MarkResolved

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::alerts::AlertEngine;
use crate::clock::SharedClock;
use crate::config::Settings;
use crate::database::Database;
use crate::error::{EngineError, EngineResult};
use crate::network::{DeviceProfiler, NetworkProfiler};
use crate::notify::Dispatcher;
use crate::registry::{DeviceRegistry, ReconcileReport};
use crate::scanner::{DiscoverySource, NeighborTableDiscovery};

/// Outcome of one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovery_timed_out: bool,
    pub reconcile: ReconcileReport,
    pub new_device_alerts: usize,
    pub threat_alerts: usize,
    pub dispatched: usize,
    pub resolved: usize,
    pub undelivered: usize,
    /// Set when dispatch was skipped because no channel is usable
    pub configuration_error: Option<String>,
}

pub struct CycleRunner {
    discovery: Arc<dyn DiscoverySource>,
    registry: DeviceRegistry,
    alerts: AlertEngine,
    dispatcher: Dispatcher,
    clock: SharedClock,
    scan_target: String,
    scan_timeout: Duration,
    /// Held for the whole cycle; a second caller waits instead of interleaving
    guard: Mutex<()>,
}

impl CycleRunner {
    pub fn new(
        db: Database,
        discovery: Arc<dyn DiscoverySource>,
        profiler: Arc<dyn DeviceProfiler>,
        dispatcher: Dispatcher,
        clock: SharedClock,
        settings: &Settings,
    ) -> Self {
        Self {
            discovery,
            registry: DeviceRegistry::new(db.clone(), profiler, Arc::clone(&clock), settings),
            alerts: AlertEngine::new(db, Arc::clone(&clock), settings),
            dispatcher,
            clock,
            scan_target: settings.scan_target.clone(),
            scan_timeout: settings.scan_timeout(),
            guard: Mutex::new(()),
        }
    }

    /// Production wiring: neighbour-table discovery, network profiler, email + Telegram
    pub fn from_settings(
        db: Database,
        settings: &Settings,
        clock: SharedClock,
    ) -> EngineResult<Self> {
        let dispatcher = Dispatcher::from_settings(settings, Arc::clone(&clock))?;
        let configured = dispatcher.configured_channels();
        if configured.is_empty() {
            crate::log_warn!("No notification channel configured; alerts will stay unresolved");
        } else {
            crate::log_stderr!("Notification channels: {}", configured.join(", "));
        }

        Ok(Self::new(
            db,
            Arc::new(NeighborTableDiscovery::new()),
            Arc::new(NetworkProfiler::new()),
            dispatcher,
            clock,
            settings,
        ))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Run one full cycle. Only storage failures during evaluation or
    /// resolution abort it; everything else degrades and is reported.
    pub async fn run_cycle(&self) -> EngineResult<CycleReport> {
        let _guard = self.guard.lock().await;
        let started_at = self.clock.now();
        crate::log_debug!("Cycle started at {}", started_at);

        let (observations, discovery_timed_out) = match tokio::time::timeout(
            self.scan_timeout,
            self.discovery.scan(&self.scan_target, self.scan_timeout),
        )
        .await
        {
            Ok(observations) => (observations, false),
            Err(_) => {
                crate::log_warn!(
                    "Discovery exceeded {:?}; continuing with an empty batch",
                    self.scan_timeout
                );
                (Vec::new(), true)
            }
        };

        let reconcile = self.registry.reconcile(&observations).await;

        let new_device_alerts = self.alerts.evaluate_new_devices()?.len();
        let threat_alerts = self.alerts.evaluate_threat_activity(started_at)?.len();

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            discovery_timed_out,
            reconcile,
            new_device_alerts,
            threat_alerts,
            dispatched: 0,
            resolved: 0,
            undelivered: 0,
            configuration_error: None,
        };

        self.dispatch_pending(&mut report).await?;

        report.finished_at = self.clock.now();
        crate::log_stderr!(
            "Cycle finished: {} observed, {} new, {} alerts raised, {} resolved, {} undelivered",
            report.reconcile.observed,
            report.reconcile.created,
            report.new_device_alerts + report.threat_alerts,
            report.resolved,
            report.undelivered
        );
        Ok(report)
    }

    async fn dispatch_pending(&self, report: &mut CycleReport) -> EngineResult<()> {
        for alert in self.alerts.unresolved()? {
            let result = match self.dispatcher.dispatch(&alert).await {
                Ok(result) => result,
                Err(EngineError::Configuration(message)) => {
                    crate::log_warn!("Dispatch skipped: {}", message);
                    report.configuration_error = Some(message);
                    break;
                }
                Err(e) => {
                    crate::log_warn!("Dispatch of alert #{} failed: {}", alert.id, e);
                    report.undelivered += 1;
                    continue;
                }
            };

            report.dispatched += 1;
            if result.any_delivered() {
                if self.alerts.mark_resolved(alert.id, &result.summary())? {
                    report.resolved += 1;
                }
            } else {
                crate::log_warn!(
                    "Alert #{} not delivered on any channel; retrying next cycle",
                    alert.id
                );
                report.undelivered += 1;
            }
        }
        Ok(())
    }
}
