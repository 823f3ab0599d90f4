//! Cycle composition, polling loop and process lock

pub mod cycle;
pub mod lock;
pub mod watcher;

pub use cycle::{CycleReport, CycleRunner};
pub use lock::CycleLock;
pub use watcher::{shutdown_signal, spawn_shutdown_listener, Monitor};
