//! Alert engine
//!
//! Turns registry state into alerts. The dedup check and the insert for each
//! (device, type) pair run in one savepoint, so at most one unresolved alert per
//! pair exists and a repeat inside the cooldown window is never created.

pub mod render;

use chrono::{DateTime, Utc};

use crate::clock::{to_storage_precision, SharedClock};
use crate::config::Settings;
use crate::database::{self as db, AlertRecord, AlertSeverity, AlertType, Database, NewAlert};
use crate::error::EngineResult;
use crate::models::DeviceState;

pub struct AlertEngine {
    db: Database,
    clock: SharedClock,
    cooldown: chrono::Duration,
}

impl AlertEngine {
    pub fn new(db: Database, clock: SharedClock, settings: &Settings) -> Self {
        Self {
            db,
            clock,
            cooldown: settings.alert_cooldown(),
        }
    }

    pub fn cooldown(&self) -> chrono::Duration {
        self.cooldown
    }

    /// One NewDevice alert per profiled pending device, subject to dedup and cooldown
    pub fn evaluate_new_devices(&self) -> EngineResult<Vec<AlertRecord>> {
        let now = self.clock.now();
        let conn = self.db.lock()?;

        let mut created = Vec::new();
        for device in db::list_devices(&conn, DeviceState::PendingReview)? {
            if !device.is_profiled() {
                continue;
            }

            let alert = NewAlert {
                device_mac: device.mac.to_string(),
                alert_type: AlertType::NewDevice,
                details: render::new_device_details(&device),
                severity: AlertSeverity::Medium,
            };

            if let Some(record) = db::create_alert_deduped(&conn, &alert, now, self.cooldown)? {
                crate::log_stderr!("Raised new-device alert #{} for {}", record.id, device.mac);
                created.push(record);
            }
        }

        Ok(created)
    }

    /// One ThreatActivity alert per threat device seen at or after `observed_since`
    pub fn evaluate_threat_activity(
        &self,
        observed_since: DateTime<Utc>,
    ) -> EngineResult<Vec<AlertRecord>> {
        let now = self.clock.now();
        // last_seen comes back from storage at millisecond precision
        let observed_since = to_storage_precision(observed_since);
        let conn = self.db.lock()?;

        let mut created = Vec::new();
        for device in db::list_devices(&conn, DeviceState::Threat)? {
            if device.last_seen < observed_since {
                continue;
            }

            let alert = NewAlert {
                device_mac: device.mac.to_string(),
                alert_type: AlertType::ThreatActivity,
                details: render::threat_activity_details(&device),
                severity: device
                    .threat_level
                    .map(AlertSeverity::from)
                    .unwrap_or(AlertSeverity::Medium),
            };

            if let Some(record) = db::create_alert_deduped(&conn, &alert, now, self.cooldown)? {
                crate::log_warn!(
                    "Raised threat-activity alert #{} for {} ({})",
                    record.id,
                    device.mac,
                    record.severity
                );
                created.push(record);
            }
        }

        Ok(created)
    }

    /// Resolve an alert; true if this call flipped it, false if it already was resolved
    pub fn mark_resolved(&self, id: i64, outcome_summary: &str) -> EngineResult<bool> {
        let now = self.clock.now();
        let conn = self.db.lock()?;
        let flipped = db::resolve_alert(&conn, id, outcome_summary, now)?;
        if flipped {
            crate::log_stderr!("Alert #{} resolved: {}", id, outcome_summary);
        }
        Ok(flipped)
    }

    pub fn unresolved(&self) -> EngineResult<Vec<AlertRecord>> {
        self.list(true)
    }

    pub fn list(&self, unresolved_only: bool) -> EngineResult<Vec<AlertRecord>> {
        let conn = self.db.lock()?;
        db::list_alerts(&conn, unresolved_only)
    }

    pub fn get(&self, id: i64) -> EngineResult<Option<AlertRecord>> {
        let conn = self.db.lock()?;
        db::get_alert(&conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::models::{DeviceRecord, MacAddress, ThreatLevel};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn seed(db: &Database, mac: &str, state: DeviceState, at: DateTime<Utc>, profiled: bool) {
        let conn = db.lock().unwrap();
        db::insert_device(
            &conn,
            &DeviceRecord {
                mac: MacAddress::parse(mac).unwrap(),
                state,
                last_ip: Some("10.9.9.9".to_string()),
                hostname: None,
                vendor: None,
                device_type: None,
                open_ports: Vec::new(),
                first_seen: at,
                last_seen: at,
                notes: None,
                threat_level: (state == DeviceState::Threat).then_some(ThreatLevel::High),
                profiled_at: profiled.then_some(at),
                is_active: true,
            },
        )
        .unwrap();
    }

    fn engine() -> (AlertEngine, Database, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap());
        let db = Database::in_memory().unwrap();
        let engine = AlertEngine::new(db.clone(), Arc::new(clock.clone()), &Settings::default());
        (engine, db, clock)
    }

    #[test]
    fn unprofiled_pending_devices_wait_for_profile() {
        let (engine, db, clock) = engine();
        seed(&db, "aa:aa:aa:00:00:01", DeviceState::PendingReview, clock.now(), false);
        seed(&db, "aa:aa:aa:00:00:02", DeviceState::PendingReview, clock.now(), true);

        let alerts = engine.evaluate_new_devices().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].device_mac, "aa:aa:aa:00:00:02");
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);

        assert!(engine.evaluate_new_devices().unwrap().is_empty());
    }

    #[test]
    fn threat_severity_follows_threat_level_and_window() {
        let (engine, db, clock) = engine();
        let start = clock.now();
        let earlier = start - chrono::Duration::minutes(10);
        seed(&db, "bb:bb:bb:00:00:01", DeviceState::Threat, earlier, true);
        seed(&db, "bb:bb:bb:00:00:02", DeviceState::Threat, start, true);

        let alerts = engine.evaluate_threat_activity(start).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].device_mac, "bb:bb:bb:00:00:02");
        assert_eq!(alerts[0].severity, AlertSeverity::High);
    }

    #[test]
    fn sighting_in_same_millisecond_as_window_start_counts() {
        let (engine, db, clock) = engine();
        let window_start = clock.now() + chrono::Duration::microseconds(700);
        let seen = clock.now() + chrono::Duration::microseconds(900);
        seed(&db, "bb:bb:bb:00:00:03", DeviceState::Threat, seen, true);

        let alerts = engine.evaluate_threat_activity(window_start).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].device_mac, "bb:bb:bb:00:00:03");
    }

    #[test]
    fn mark_resolved_is_idempotent() {
        let (engine, db, clock) = engine();
        seed(&db, "aa:aa:aa:00:00:03", DeviceState::PendingReview, clock.now(), true);
        let alert = engine.evaluate_new_devices().unwrap().remove(0);

        assert!(engine.mark_resolved(alert.id, "Notifications sent - email: ✓").unwrap());
        assert!(!engine.mark_resolved(alert.id, "second call").unwrap());

        let stored = engine.get(alert.id).unwrap().unwrap();
        assert!(stored.resolved);
        assert_eq!(
            stored.resolution_notes.as_deref(),
            Some("Notifications sent - email: ✓")
        );
        assert!(engine.unresolved().unwrap().is_empty());
    }
}
