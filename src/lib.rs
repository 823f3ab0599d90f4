//! NetGuard core engine
//!
//! Inventories devices on the local network and alerts on what it finds:
//! - Discovery sweeps reconciled into three disjoint device sets
//!   (known, pending review, threat)
//! - Best-effort profiling of new devices (reverse DNS, OUI vendor, open ports)
//! - Deduplicated alerts with a per-(device, type) cooldown
//! - Notification dispatch over email and Telegram with bounded retries
//! - SQLite persistence and a polling loop with graceful shutdown

pub mod alerts;
pub mod app;
pub mod cli;
pub mod clock;
mod command_handlers;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod network;
pub mod notify;
pub mod registry;
pub mod scanner;

pub use alerts::AlertEngine;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{EnvSettings, MapSettings, Settings, SettingsProvider};
pub use database::{AlertRecord, AlertSeverity, AlertType, Database, DiscoveryEntry};
pub use error::{EngineError, EngineResult};
pub use models::*;
pub use monitor::{CycleLock, CycleReport, CycleRunner, Monitor};
pub use network::{DeviceProfiler, NetworkProfiler};
pub use notify::{
    DispatchResult, Dispatcher, EmailChannel, NotificationChannel, RetryPolicy, TelegramChannel,
};
pub use registry::{DeviceRegistry, ReconcileReport};
pub use scanner::{DiscoverySource, NeighborTableDiscovery, StaticDiscovery};

// Re-export logging macros for use across crate
pub use crate::logging::macros;
