//! Structured logging for the NetGuard daemon
//!
//! Human-readable lines go to stderr, JSON lines go to a daily rotating file:
//! `~/.config/netguard/logs/netguard.log.YYYY-MM-DD` (Linux/macOS) or
//! `%LOCALAPPDATA%/netguard/logs/` (Windows).

pub mod macros;

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "netguard.log";

/// Initialize the logging system
///
/// Level defaults to INFO; set `RUST_LOG` (e.g. `RUST_LOG=netguard=debug`) to change it.
pub fn init_logging() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .compact();

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .json();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = init_result {
        // A test harness or embedding host may already own the global subscriber.
        if e.to_string().contains("already been set") {
            return Ok(log_dir);
        }
        return Err(Box::new(e));
    }

    tracing::info!("Logging initialized. Log directory: {}", log_dir.display());

    Ok(log_dir)
}

/// Stderr-only logging for one-shot CLI commands
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

fn get_log_directory() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or("Could not find local data directory")?
            .join("netguard")
    } else {
        dirs::config_dir()
            .ok_or("Could not find config directory")?
            .join("netguard")
    };

    Ok(base_dir.join("logs"))
}

/// Path of today's log file
pub fn get_current_log_file() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = get_log_directory()?;
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    Ok(log_dir.join(format!("{}.{}", LOG_FILE_PREFIX, today)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_namespaced() {
        let log_dir = get_log_directory().expect("Should get log directory");
        assert!(log_dir.to_string_lossy().contains("netguard"));
        assert!(log_dir.ends_with("logs"));
    }

    #[test]
    fn current_log_file_carries_date_suffix() {
        let file = get_current_log_file().expect("Should get log file");
        let name = file.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("netguard.log."));
    }
}
