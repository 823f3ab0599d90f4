use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::AlertEngine;
use crate::clock::{SharedClock, SystemClock};
use crate::config::Settings;
use crate::database::Database;
use crate::models::{DeviceState, ThreatLevel};
use crate::monitor::{spawn_shutdown_listener, CycleLock, CycleRunner, Monitor};
use crate::network::NetworkProfiler;
use crate::registry::DeviceRegistry;

/// Settings and store shared by every command
pub(crate) struct AppContext {
    pub settings: Settings,
    pub db: Database,
    pub clock: SharedClock,
}

impl AppContext {
    pub(crate) fn open(settings: Settings) -> Result<Self> {
        let path = settings
            .db_path
            .clone()
            .unwrap_or_else(Database::default_path);
        let db = Database::new(path.clone())
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self {
            settings,
            db,
            clock: Arc::new(SystemClock),
        })
    }

    fn registry(&self) -> DeviceRegistry {
        DeviceRegistry::new(
            self.db.clone(),
            Arc::new(NetworkProfiler::new()),
            Arc::clone(&self.clock),
            &self.settings,
        )
    }

    fn alerts(&self) -> AlertEngine {
        AlertEngine::new(self.db.clone(), Arc::clone(&self.clock), &self.settings)
    }

    fn runner(&self) -> Result<CycleRunner> {
        CycleRunner::from_settings(self.db.clone(), &self.settings, Arc::clone(&self.clock))
            .context("Failed to set up notification channels")
    }

    fn lock(&self) -> Result<Option<CycleLock>> {
        if self.db.is_in_memory() {
            return Ok(None);
        }
        let path = CycleLock::path_for(self.db.path());
        CycleLock::acquire(&path)
            .map(Some)
            .context("Another netguard cycle runner holds the database lock")
    }
}

fn print_json<T: Serialize>(value: &T, what: &str) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", what))?
    );
    Ok(())
}

pub(crate) async fn handle_run(ctx: AppContext) -> Result<()> {
    crate::log_stderr!("NetGuard v{} starting", env!("CARGO_PKG_VERSION"));
    let _lock = ctx.lock()?;

    let runner = Arc::new(ctx.runner()?);
    let monitor = Monitor::new(runner, ctx.settings.scan_interval());
    let listener = spawn_shutdown_listener(monitor.running_flag());

    let cycles = monitor.run(None).await;
    listener.abort();
    crate::log_stderr!("NetGuard stopped after {} cycle(s)", cycles);
    Ok(())
}

pub(crate) async fn handle_scan_once(ctx: AppContext) -> Result<()> {
    let _lock = ctx.lock()?;
    let runner = ctx.runner()?;
    let report = runner.run_cycle().await.context("Scan cycle aborted")?;
    print_json(&report, "cycle report")
}

pub(crate) fn handle_list(ctx: AppContext, state: DeviceState) -> Result<()> {
    let devices = ctx
        .registry()
        .list_by_state(state)
        .with_context(|| format!("Failed to list {} devices", state))?;
    print_json(&devices, "device list")
}

pub(crate) fn handle_promote(ctx: AppContext, mac: &str) -> Result<()> {
    let record = ctx
        .registry()
        .promote(mac)
        .with_context(|| format!("Failed to promote {}", mac))?;
    print_json(&record, "device")
}

pub(crate) fn handle_demote(
    ctx: AppContext,
    mac: &str,
    level: ThreatLevel,
    notes: Option<&str>,
) -> Result<()> {
    let record = ctx
        .registry()
        .demote_or_update(mac, level, notes)
        .with_context(|| format!("Failed to demote {}", mac))?;
    print_json(&record, "device")
}

pub(crate) fn handle_delete(ctx: AppContext, mac: &str) -> Result<()> {
    let state = ctx
        .registry()
        .delete(mac)
        .with_context(|| format!("Failed to delete {}", mac))?;
    print_json(
        &serde_json::json!({ "mac": mac, "deleted_from": state.as_str() }),
        "delete result",
    )
}

pub(crate) fn handle_alerts(ctx: AppContext, all: bool) -> Result<()> {
    let alerts = ctx.alerts().list(!all).context("Failed to list alerts")?;
    print_json(&alerts, "alert list")
}

pub(crate) fn handle_history(ctx: AppContext, mac: &str, limit: usize) -> Result<()> {
    let entries = ctx
        .registry()
        .history(mac, limit)
        .with_context(|| format!("Failed to read discovery history of {}", mac))?;
    print_json(&entries, "discovery history")
}
