use anyhow::{Context, Result};

use crate::cli::{parse_cli_args, usage_text, version_text, CliCommand};
use crate::command_handlers::{
    handle_alerts, handle_delete, handle_demote, handle_history, handle_list, handle_promote,
    handle_run, handle_scan_once, AppContext,
};
use crate::config::{EnvSettings, Settings};
use crate::logging;

/// Run the app by parsing CLI-style args and dispatching the command.
pub async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let command = parse_cli_args(args)?;
    init_logging_for(&command);
    execute_command(command).await
}

/// The daemon gets the rotating JSON file; one-shot commands log to stderr only.
fn init_logging_for(command: &CliCommand) {
    if !matches!(command, CliCommand::Run) {
        logging::init_console_logging();
        return;
    }
    match logging::init_logging() {
        Ok(_) => {
            if let Ok(file) = logging::get_current_log_file() {
                crate::log_debug!("Writing structured log to {}", file.display());
            }
        }
        Err(e) => eprintln!("[WARN] Failed to initialize structured logging: {}", e),
    }
}

/// Execute a pre-parsed command with settings from the environment.
pub async fn execute_command(command: CliCommand) -> Result<()> {
    if matches!(command, CliCommand::Help | CliCommand::Version) {
        return execute_with_settings(command, Settings::default()).await;
    }

    let settings = Settings::resolve(&EnvSettings).context("Invalid configuration")?;
    execute_with_settings(command, settings).await
}

/// Execute a pre-parsed command against explicit settings.
pub async fn execute_with_settings(command: CliCommand, settings: Settings) -> Result<()> {
    let ctx = match command {
        CliCommand::Help => {
            println!("{}", usage_text());
            return Ok(());
        }
        CliCommand::Version => {
            println!("{}", version_text());
            return Ok(());
        }
        _ => AppContext::open(settings)?,
    };

    match command {
        CliCommand::Help | CliCommand::Version => Ok(()),
        CliCommand::Run => handle_run(ctx).await,
        CliCommand::ScanOnce => handle_scan_once(ctx).await,
        CliCommand::List { state } => handle_list(ctx, state),
        CliCommand::Promote { mac } => handle_promote(ctx, &mac),
        CliCommand::Demote { mac, level, notes } => {
            handle_demote(ctx, &mac, level, notes.as_deref())
        }
        CliCommand::Delete { mac } => handle_delete(ctx, &mac),
        CliCommand::Alerts { all } => handle_alerts(ctx, all),
        CliCommand::History { mac, limit } => handle_history(ctx, &mac, limit),
    }
}
