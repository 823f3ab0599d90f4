use anyhow::Result;

use crate::models::{DeviceState, ThreatLevel};

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, PartialEq, Eq)]
pub enum CliCommand {
    Run,
    ScanOnce,
    List {
        state: DeviceState,
    },
    Promote {
        mac: String,
    },
    Demote {
        mac: String,
        level: ThreatLevel,
        notes: Option<String>,
    },
    Delete {
        mac: String,
    },
    Alerts {
        all: bool,
    },
    History {
        mac: String,
        limit: usize,
    },
    Help,
    Version,
}

pub fn version_text() -> String {
    format!("netguard {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    format!(
        "{version}
NetGuard: device lifecycle and alerting for the local network

Usage:
  netguard [run]
  netguard scan-once
  netguard list <known|pending|threat>
  netguard promote <MAC>
  netguard demote <MAC> [--level <low|medium|high>] [--notes <TEXT>]
  netguard delete <MAC>
  netguard alerts [--all]
  netguard history <MAC> [--limit <N>]
  netguard --help
  netguard --version

Options:
      --level <LEVEL>  Demote: threat level (default: medium)
      --notes <TEXT>   Demote: operator notes
      --all            Alerts: include resolved alerts
      --limit <N>      History: number of sightings (default: {default_limit})
  -h, --help           Show this help text
  -V, --version        Show version

Settings are read from the environment (SCAN_INTERVAL_SECS, SMTP_SERVER,
TELEGRAM_BOT_TOKEN, ...). RUST_LOG controls log verbosity.",
        version = version_text(),
        default_limit = DEFAULT_HISTORY_LIMIT
    )
}

fn usage_error(message: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}\n\n{}", message, usage_text())
}

fn parse_limit(raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            usage_error(format!(
                "Invalid value for --limit: '{}'. Expected a positive integer.",
                raw
            ))
        })
}

/// Value of `--flag VALUE` or `--flag=VALUE`
fn flag_value<I, S>(flag: &str, arg: &str, iter: &mut I) -> Result<Option<String>>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    if arg == flag {
        let value = iter
            .next()
            .ok_or_else(|| usage_error(format!("Missing value for {}.", flag)))?;
        return Ok(Some(value.as_ref().to_string()));
    }

    match arg.split_once('=') {
        Some((name, value)) if name == flag => {
            if value.is_empty() {
                return Err(usage_error(format!("Missing value for {}.", flag)));
            }
            Ok(Some(value.to_string()))
        }
        _ => Ok(None),
    }
}

pub fn parse_cli_args<I, S>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut command: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();
    let mut level: Option<ThreatLevel> = None;
    let mut notes: Option<String> = None;
    let mut limit: Option<usize> = None;
    let mut all = false;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref().to_string();
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-V" | "--version" => return Ok(CliCommand::Version),
            "--all" => all = true,
            _ if arg.starts_with("--level") => match flag_value("--level", &arg, &mut iter)? {
                Some(raw) => {
                    level = Some(raw.parse::<ThreatLevel>().map_err(|_| {
                        usage_error(format!(
                            "Invalid value for --level: '{}'. Expected low, medium or high.",
                            raw
                        ))
                    })?);
                }
                None => return Err(usage_error(format!("Unknown argument: {}", arg))),
            },
            _ if arg.starts_with("--notes") => match flag_value("--notes", &arg, &mut iter)? {
                Some(raw) => notes = Some(raw),
                None => return Err(usage_error(format!("Unknown argument: {}", arg))),
            },
            _ if arg.starts_with("--limit") => match flag_value("--limit", &arg, &mut iter)? {
                Some(raw) => limit = Some(parse_limit(&raw)?),
                None => return Err(usage_error(format!("Unknown argument: {}", arg))),
            },
            _ if arg.starts_with('-') => {
                return Err(usage_error(format!("Unknown argument: {}", arg)));
            }
            _ if command.is_none() => command = Some(arg),
            _ => positional.push(arg),
        }
    }

    let command = command.unwrap_or_else(|| "run".to_string());

    let demote_only = level.is_some() || notes.is_some();
    if demote_only && command != "demote" {
        return Err(usage_error("--level/--notes are only valid with demote."));
    }
    if all && command != "alerts" {
        return Err(usage_error("--all is only valid with alerts."));
    }
    if limit.is_some() && command != "history" {
        return Err(usage_error("--limit is only valid with history."));
    }

    let single = |what: &str| -> Result<String> {
        match positional.as_slice() {
            [value] => Ok(value.clone()),
            [] => Err(usage_error(format!("{} requires a {}.", command, what))),
            _ => Err(usage_error(format!(
                "Too many arguments for {}: {}",
                command,
                positional.join(" ")
            ))),
        }
    };
    let none = || -> Result<()> {
        if positional.is_empty() {
            Ok(())
        } else {
            Err(usage_error(format!(
                "Unexpected argument for {}: {}",
                command,
                positional.join(" ")
            )))
        }
    };

    match command.as_str() {
        "run" => none().map(|_| CliCommand::Run),
        "scan-once" => none().map(|_| CliCommand::ScanOnce),
        "list" => {
            let raw = single("state (known, pending or threat)")?;
            let state = raw.parse::<DeviceState>().map_err(|_| {
                usage_error(format!(
                    "Invalid state: '{}'. Expected known, pending or threat.",
                    raw
                ))
            })?;
            Ok(CliCommand::List { state })
        }
        "promote" => Ok(CliCommand::Promote {
            mac: single("MAC address")?,
        }),
        "demote" => Ok(CliCommand::Demote {
            mac: single("MAC address")?,
            level: level.unwrap_or(ThreatLevel::Medium),
            notes,
        }),
        "delete" => Ok(CliCommand::Delete {
            mac: single("MAC address")?,
        }),
        "alerts" => none().map(|_| CliCommand::Alerts { all }),
        "history" => Ok(CliCommand::History {
            mac: single("MAC address")?,
            limit: limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        }),
        other => Err(usage_error(format!("Unknown command: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_help_flag() {
        let parsed = parse_cli_args(["netguard", "--help"]).expect("help args should parse");
        assert_eq!(parsed, CliCommand::Help);
    }

    #[test]
    fn parse_version_flag() {
        let parsed = parse_cli_args(["netguard", "-V"]).expect("version args should parse");
        assert_eq!(parsed, CliCommand::Version);
    }

    #[test]
    fn parse_default_run_command() {
        let parsed = parse_cli_args(["netguard"]).expect("default args should parse");
        assert_eq!(parsed, CliCommand::Run);
    }

    #[test]
    fn parse_list_state() {
        let parsed = parse_cli_args(["netguard", "list", "pending"]).expect("list should parse");
        assert_eq!(
            parsed,
            CliCommand::List {
                state: DeviceState::PendingReview
            }
        );
    }

    #[test]
    fn parse_demote_with_options() {
        let parsed = parse_cli_args([
            "netguard",
            "demote",
            "AA-BB-CC-DD-EE-FF",
            "--level=high",
            "--notes",
            "unknown camera",
        ])
        .expect("demote should parse");
        assert_eq!(
            parsed,
            CliCommand::Demote {
                mac: "AA-BB-CC-DD-EE-FF".to_string(),
                level: ThreatLevel::High,
                notes: Some("unknown camera".to_string()),
            }
        );
    }

    #[test]
    fn demote_defaults_to_medium() {
        let parsed = parse_cli_args(["netguard", "demote", "aa:bb:cc:dd:ee:ff"]).unwrap();
        assert!(matches!(
            parsed,
            CliCommand::Demote {
                level: ThreatLevel::Medium,
                notes: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_history_limit() {
        let parsed = parse_cli_args(["netguard", "history", "aa:bb:cc:dd:ee:ff", "--limit", "5"])
            .expect("history should parse");
        assert_eq!(
            parsed,
            CliCommand::History {
                mac: "aa:bb:cc:dd:ee:ff".to_string(),
                limit: 5
            }
        );
    }

    #[test]
    fn alerts_all_flag() {
        assert_eq!(
            parse_cli_args(["netguard", "alerts", "--all"]).unwrap(),
            CliCommand::Alerts { all: true }
        );
        assert_eq!(
            parse_cli_args(["netguard", "alerts"]).unwrap(),
            CliCommand::Alerts { all: false }
        );
    }

    #[test]
    fn promote_requires_mac() {
        let err = parse_cli_args(["netguard", "promote"]).expect_err("missing MAC should fail");
        assert!(err.to_string().contains("promote requires a MAC address"));
    }

    #[test]
    fn level_rejected_outside_demote() {
        let err = parse_cli_args(["netguard", "promote", "aa:bb:cc:dd:ee:ff", "--level", "low"])
            .expect_err("promote should reject --level");
        assert!(err.to_string().contains("only valid with demote"));
    }

    #[test]
    fn invalid_limit_errors() {
        let err = parse_cli_args(["netguard", "history", "aa:bb:cc:dd:ee:ff", "--limit", "0"])
            .expect_err("zero limit should fail");
        assert!(err.to_string().contains("Expected a positive integer"));
    }

    #[test]
    fn parse_unknown_argument_errors() {
        let err = parse_cli_args(["netguard", "--unknown"]).expect_err("unknown flag should fail");
        assert!(err.to_string().contains("Unknown argument"));
    }

    #[test]
    fn parse_unknown_command_errors() {
        let err = parse_cli_args(["netguard", "scan-forever"]).expect_err("unknown command");
        assert!(err.to_string().contains("Unknown command: scan-forever"));
    }
}
