use std::future::Future;
use std::net::IpAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use netguard::app::execute_with_settings;
use netguard::cli::{parse_cli_args, CliCommand};
use netguard::config::MapSettings;
use netguard::{
    CycleLock, Database, DeviceProfile, DeviceProfiler, DeviceRegistry, DeviceState, EngineResult,
    MacAddress, Observation, Settings, SystemClock, ThreatLevel,
};

struct EmptyProfiler;

impl DeviceProfiler for EmptyProfiler {
    fn profile<'a>(
        &'a self,
        _ip: IpAddr,
        _mac: &'a MacAddress,
    ) -> Pin<Box<dyn Future<Output = EngineResult<DeviceProfile>> + Send + 'a>> {
        Box::pin(async { Ok(DeviceProfile::default()) })
    }
}

fn settings_for(db_path: &Path) -> Settings {
    Settings {
        db_path: Some(db_path.to_path_buf()),
        ..Settings::default()
    }
}

async fn seed(db_path: &Path, macs: &[&str]) {
    let db = Database::new(db_path.to_path_buf()).expect("database should open");
    let registry = DeviceRegistry::new(
        db,
        Arc::new(EmptyProfiler),
        Arc::new(SystemClock),
        &Settings::default(),
    );
    let batch: Vec<Observation> = macs
        .iter()
        .enumerate()
        .map(|(i, mac)| Observation::new(format!("172.16.0.{}", i + 10).parse().unwrap(), *mac))
        .collect();
    registry.reconcile(&batch).await;
}

fn reopen(db_path: &Path) -> DeviceRegistry {
    DeviceRegistry::new(
        Database::new(db_path.to_path_buf()).unwrap(),
        Arc::new(EmptyProfiler),
        Arc::new(SystemClock),
        &Settings::default(),
    )
}

#[tokio::test]
async fn operator_commands_move_devices_between_sets() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("netguard.db");
    seed(&db_path, &["00:11:32:10:00:01", "00:11:32:10:00:02"]).await;

    let promote = parse_cli_args(["netguard", "promote", "00-11-32-10-00-01"]).unwrap();
    execute_with_settings(promote, settings_for(&db_path))
        .await
        .expect("promote should succeed");

    let demote = parse_cli_args([
        "netguard",
        "demote",
        "00:11:32:10:00:02",
        "--level",
        "low",
    ])
    .unwrap();
    execute_with_settings(demote, settings_for(&db_path))
        .await
        .expect("demote should succeed");

    // Demoting a device already in Threat updates its level in place
    let raise = parse_cli_args([
        "netguard",
        "demote",
        "00:11:32:10:00:02",
        "--level",
        "high",
        "--notes",
        "scans every port",
    ])
    .unwrap();
    execute_with_settings(raise, settings_for(&db_path))
        .await
        .expect("second demote should update the threat");

    let registry = reopen(&db_path);
    let known = registry.get("00:11:32:10:00:01").unwrap().unwrap();
    assert_eq!(known.state, DeviceState::Known);
    let threat = registry.get("00:11:32:10:00:02").unwrap().unwrap();
    assert_eq!(threat.state, DeviceState::Threat);
    assert_eq!(threat.threat_level, Some(ThreatLevel::High));
    assert_eq!(threat.notes.as_deref(), Some("scans every port"));

    let delete = parse_cli_args(["netguard", "delete", "00:11:32:10:00:01"]).unwrap();
    execute_with_settings(delete, settings_for(&db_path))
        .await
        .expect("delete should succeed");
    assert!(reopen(&db_path).get("00:11:32:10:00:01").unwrap().is_none());
}

#[tokio::test]
async fn listing_commands_succeed_on_existing_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("netguard.db");
    seed(&db_path, &["00:11:32:20:00:01"]).await;

    for args in [
        vec!["netguard", "list", "pending"],
        vec!["netguard", "alerts", "--all"],
        vec!["netguard", "history", "00:11:32:20:00:01", "--limit", "5"],
    ] {
        let command = parse_cli_args(args.clone()).unwrap();
        execute_with_settings(command, settings_for(&db_path))
            .await
            .unwrap_or_else(|e| panic!("{:?} failed: {:#}", args, e));
    }
}

#[tokio::test]
async fn scan_once_refuses_to_run_while_locked() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("netguard.db");
    Database::new(db_path.clone()).unwrap();

    let _held = CycleLock::acquire(&CycleLock::path_for(&db_path)).unwrap();
    let err = execute_with_settings(CliCommand::ScanOnce, settings_for(&db_path))
        .await
        .expect_err("second runner must not start");
    assert!(format!("{:#}", err).contains("already in use"));
}

#[test]
fn settings_resolve_from_a_provider() {
    let provider = MapSettings::new()
        .with("scan_interval_secs", "5")
        .with("alert_cooldown_secs", "600")
        .with("enable_telegram_notifications", "yes")
        .with("telegram_bot_token", "123:abc")
        .with("telegram_chat_id", "42");

    let settings = Settings::resolve(&provider).unwrap();
    assert_eq!(settings.scan_interval_secs, 10);
    assert_eq!(settings.alert_cooldown_secs, 600);
    assert!(settings.telegram.enabled);

    let bad = MapSettings::new().with("alert_cooldown_secs", "0");
    let err = Settings::resolve(&bad).unwrap_err();
    assert_eq!(err.kind(), "CONFIGURATION");
    assert!(err.to_string().contains("alert_cooldown_secs"));
}

#[test]
fn mac_arguments_are_kept_verbatim_for_the_registry() {
    let parsed = parse_cli_args(["netguard", "history", "AA-BB-CC-DD-EE-FF"]).unwrap();
    assert_eq!(
        parsed,
        CliCommand::History {
            mac: "AA-BB-CC-DD-EE-FF".to_string(),
            limit: 20,
        }
    );
}
