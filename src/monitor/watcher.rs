//! Polling loop
//!
//! Runs one cycle per interval until stopped. Cycles never overlap: the next
//! one starts only after the previous finished and the interval elapsed. The
//! wait is split into one-second slices so a stop request is honoured quickly.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::cycle::CycleRunner;

pub struct Monitor {
    runner: Arc<CycleRunner>,
    interval: Duration,
    is_running: Arc<AtomicBool>,
    cycle_count: Arc<AtomicU32>,
}

impl Monitor {
    pub fn new(runner: Arc<CycleRunner>, interval: Duration) -> Self {
        Self {
            runner,
            interval,
            is_running: Arc::new(AtomicBool::new(false)),
            cycle_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Flag shared with signal handlers; storing `false` stops the loop
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.is_running)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if self.is_running.swap(false, Ordering::SeqCst) {
            crate::log_stderr!("[MONITOR] Stop requested");
        }
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// Loop until stopped or `max_cycles` cycles have run. Returns the number of
    /// cycles run by this call.
    pub async fn run(&self, max_cycles: Option<u32>) -> u32 {
        if self.is_running.swap(true, Ordering::SeqCst) {
            crate::log_warn!("[MONITOR] Already running");
            return 0;
        }

        crate::log_stderr!("[MONITOR] Started with interval {:?}", self.interval);
        let mut ran = 0u32;

        while self.is_running() {
            match self.runner.run_cycle().await {
                Ok(report) => {
                    if let Some(message) = &report.configuration_error {
                        crate::log_debug!("[MONITOR] Cycle ran without notifications: {}", message);
                    }
                }
                Err(e) => crate::log_error!("[MONITOR] Cycle aborted: {}", e),
            }

            ran += 1;
            self.cycle_count.fetch_add(1, Ordering::SeqCst);

            if max_cycles.is_some_and(|max| ran >= max) {
                break;
            }

            self.sleep_interval().await;
        }

        self.is_running.store(false, Ordering::SeqCst);
        crate::log_stderr!("[MONITOR] Stopped after {} cycle(s)", ran);
        ran
    }

    async fn sleep_interval(&self) {
        let slice = Duration::from_secs(1);
        let mut remaining = self.interval;
        while !remaining.is_zero() && self.is_running() {
            let step = remaining.min(slice);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            crate::log_error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                crate::log_error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Clear `flag` once a shutdown signal arrives
pub fn spawn_shutdown_listener(flag: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        crate::log_stderr!("[MONITOR] Shutdown signal received; finishing current cycle");
        flag.store(false, Ordering::SeqCst);
    })
}
