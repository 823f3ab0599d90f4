//! Device registry
//!
//! Owns set membership (Known / PendingReview / Threat) and the per-device
//! record. Each observation is reconciled in its own savepoint, so a storage
//! failure on one MAC does not touch the rest of the sweep. Profiling runs
//! outside the database lock and merges its result in a second savepoint.

use rusqlite::Connection;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::config::Settings;
use crate::database::{self as db, with_savepoint, Database, DiscoveryEntry};
use crate::error::{EngineError, EngineResult};
use crate::models::{DeviceRecord, DeviceState, MacAddress, Observation, ThreatLevel};
use crate::network::DeviceProfiler;

/// Counters for one reconciled batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub observed: usize,
    pub created: usize,
    pub updated: usize,
    pub profiled: usize,
    pub profile_failures: usize,
    pub invalid_macs: usize,
    pub storage_failures: usize,
    pub marked_inactive: usize,
}

/// What the index said about one observation before it was applied
struct Sighting {
    state: DeviceState,
    created: bool,
    needs_profile: bool,
}

pub struct DeviceRegistry {
    db: Database,
    profiler: Arc<dyn DeviceProfiler>,
    clock: SharedClock,
    profile_timeout: Duration,
    stale_after: chrono::Duration,
}

impl DeviceRegistry {
    pub fn new(
        db: Database,
        profiler: Arc<dyn DeviceProfiler>,
        clock: SharedClock,
        settings: &Settings,
    ) -> Self {
        Self {
            db,
            profiler,
            clock,
            profile_timeout: settings.profile_timeout(),
            stale_after: settings.stale_after(),
        }
    }

    /// Apply one discovery batch. Never fails as a whole; per-observation
    /// problems are counted in the report.
    pub async fn reconcile(&self, observations: &[Observation]) -> ReconcileReport {
        let mut report = ReconcileReport {
            observed: observations.len(),
            ..ReconcileReport::default()
        };

        for observation in observations {
            let mac = match MacAddress::parse(&observation.mac) {
                Some(mac) if mac.is_device_address() => mac,
                _ => {
                    crate::log_warn!(
                        "Skipping observation with unusable MAC '{}' at {}",
                        observation.mac,
                        observation.ip
                    );
                    report.invalid_macs += 1;
                    continue;
                }
            };

            let sighting = match self.record_sighting(&mac, observation.ip) {
                Ok(sighting) => sighting,
                Err(e) => {
                    crate::log_error!("Failed to reconcile {} at {}: {}", mac, observation.ip, e);
                    report.storage_failures += 1;
                    continue;
                }
            };

            if sighting.created {
                crate::log_stderr!("New device {} at {} added for review", mac, observation.ip);
                report.created += 1;
            } else {
                crate::log_debug!("Heartbeat for {} device {}", sighting.state, mac);
                report.updated += 1;
            }

            if sighting.needs_profile {
                match self.profile_device(&mac, observation.ip).await {
                    Ok(true) => report.profiled += 1,
                    Ok(false) => report.profile_failures += 1,
                    Err(e) => {
                        crate::log_error!("Failed to store profile for {}: {}", mac, e);
                        report.storage_failures += 1;
                    }
                }
            }
        }

        match self.mark_stale() {
            Ok(count) => report.marked_inactive = count,
            Err(e) => crate::log_error!("Failed to update known-device activity: {}", e),
        }

        report
    }

    /// Classify and apply one observation inside a single savepoint
    fn record_sighting(&self, mac: &MacAddress, ip: IpAddr) -> EngineResult<Sighting> {
        let now = self.clock.now();
        let ip = ip.to_string();
        let conn = self.db.lock()?;

        with_savepoint(&conn, "reconcile_observation", |conn| {
            let sighting = match db::classify(conn, mac)? {
                Some(state) => {
                    db::touch_device(conn, state, mac, &ip, now)?;
                    let needs_profile = state == DeviceState::PendingReview
                        && db::get_device_in(conn, state, mac)?
                            .map(|record| !record.is_profiled())
                            .unwrap_or(false);
                    Sighting {
                        state,
                        created: false,
                        needs_profile,
                    }
                }
                None => {
                    db::insert_device(conn, &Self::new_pending_record(mac, &ip, now))?;
                    Sighting {
                        state: DeviceState::PendingReview,
                        created: true,
                        needs_profile: true,
                    }
                }
            };

            db::log_discovery(conn, mac, &ip, sighting.state, now)?;
            Ok(sighting)
        })
    }

    fn new_pending_record(
        mac: &MacAddress,
        ip: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> DeviceRecord {
        DeviceRecord {
            mac: *mac,
            state: DeviceState::PendingReview,
            last_ip: Some(ip.to_string()),
            hostname: None,
            vendor: None,
            device_type: None,
            open_ports: Vec::new(),
            first_seen: now,
            last_seen: now,
            notes: None,
            threat_level: None,
            profiled_at: None,
            is_active: true,
        }
    }

    /// Run the profiler under its timeout and merge the result.
    /// Ok(false) means the attempt failed and the device stays unprofiled.
    async fn profile_device(&self, mac: &MacAddress, ip: IpAddr) -> EngineResult<bool> {
        let profile =
            match tokio::time::timeout(self.profile_timeout, self.profiler.profile(ip, mac)).await {
                Ok(Ok(profile)) => profile.normalized(),
                Ok(Err(e)) => {
                    crate::log_warn!("Profiling {} at {} failed: {}", mac, ip, e);
                    return Ok(false);
                }
                Err(_) => {
                    crate::log_warn!(
                        "Profiling {} at {} timed out after {:?}",
                        mac,
                        ip,
                        self.profile_timeout
                    );
                    return Ok(false);
                }
            };

        let now = self.clock.now();
        let conn = self.db.lock()?;
        with_savepoint(&conn, "merge_profile", |conn| {
            db::merge_profile(conn, DeviceState::PendingReview, mac, &profile, now)
        })?;

        Ok(true)
    }

    fn mark_stale(&self) -> EngineResult<usize> {
        let cutoff = self.clock.now() - self.stale_after;
        let conn = self.db.lock()?;
        with_savepoint(&conn, "mark_stale", |conn| db::mark_stale_known(conn, cutoff))
    }

    /// Move a device from `from` into `to`, letting `update` adjust the record
    fn transition(
        &self,
        raw_mac: &str,
        from: &[DeviceState],
        from_label: &str,
        to: DeviceState,
        update: impl FnOnce(&mut DeviceRecord),
    ) -> EngineResult<DeviceRecord> {
        let mac = parse_operator_mac(raw_mac, from_label)?;
        let conn = self.db.lock()?;

        let record = with_savepoint(&conn, "transition", |conn| {
            let state = match db::classify(conn, &mac)? {
                Some(state) if from.contains(&state) => state,
                _ => return Err(EngineError::device_not_found(&mac, from_label)),
            };
            move_indexed(conn, &mac, state, to, update)
        })?;

        crate::log_stderr!("Device {} moved to {}", mac, to);
        Ok(record)
    }

    /// PendingReview -> Known
    pub fn promote(&self, mac: &str) -> EngineResult<DeviceRecord> {
        self.transition(
            mac,
            &[DeviceState::PendingReview],
            "pending",
            DeviceState::Known,
            |record| {
                record.threat_level = None;
                record.is_active = true;
            },
        )
    }

    /// PendingReview or Known -> Threat
    pub fn demote(
        &self,
        mac: &str,
        level: ThreatLevel,
        notes: Option<&str>,
    ) -> EngineResult<DeviceRecord> {
        self.transition(
            mac,
            &[DeviceState::PendingReview, DeviceState::Known],
            "pending or known",
            DeviceState::Threat,
            |record| apply_threat(record, level, notes),
        )
    }

    /// Demote into Threat, or update level and notes if the device is already
    /// there. The membership check and the write share one savepoint.
    pub fn demote_or_update(
        &self,
        raw_mac: &str,
        level: ThreatLevel,
        notes: Option<&str>,
    ) -> EngineResult<DeviceRecord> {
        let mac = parse_operator_mac(raw_mac, "any set")?;
        let conn = self.db.lock()?;

        let (from, record) = with_savepoint(&conn, "demote_or_update", |conn| {
            let state = db::classify(conn, &mac)?
                .ok_or_else(|| EngineError::device_not_found(&mac, "any set"))?;
            let record = match state {
                DeviceState::Threat => {
                    db::update_threat(conn, &mac, level, notes)?;
                    db::get_device_in(conn, DeviceState::Threat, &mac)?
                        .ok_or_else(|| EngineError::device_not_found(&mac, "threat"))?
                }
                _ => move_indexed(conn, &mac, state, DeviceState::Threat, |record| {
                    apply_threat(record, level, notes)
                })?,
            };
            Ok((state, record))
        })?;

        if from == DeviceState::Threat {
            crate::log_stderr!("Threat device {} updated to {}", mac, level.as_str());
        } else {
            crate::log_stderr!("Device {} moved to {}", mac, DeviceState::Threat);
        }
        Ok(record)
    }

    /// Remove a device from whichever set holds it
    pub fn delete(&self, raw_mac: &str) -> EngineResult<DeviceState> {
        let mac = parse_operator_mac(raw_mac, "any set")?;
        let conn = self.db.lock()?;

        let removed = with_savepoint(&conn, "delete_device", |conn| db::delete_device(conn, &mac))?;
        match removed {
            Some(state) => {
                crate::log_stderr!("Device {} deleted from {}", mac, state);
                Ok(state)
            }
            None => Err(EngineError::device_not_found(&mac, "any set")),
        }
    }

    /// Change level and notes of a device already in Threat
    pub fn update_threat(
        &self,
        raw_mac: &str,
        level: ThreatLevel,
        notes: Option<&str>,
    ) -> EngineResult<DeviceRecord> {
        let mac = parse_operator_mac(raw_mac, "threat")?;
        let conn = self.db.lock()?;

        with_savepoint(&conn, "update_threat", |conn| {
            if db::update_threat(conn, &mac, level, notes)? == 0 {
                return Err(EngineError::device_not_found(&mac, "threat"));
            }
            db::get_device_in(conn, DeviceState::Threat, &mac)?
                .ok_or_else(|| EngineError::device_not_found(&mac, "threat"))
        })
    }

    pub fn list_by_state(&self, state: DeviceState) -> EngineResult<Vec<DeviceRecord>> {
        let conn = self.db.lock()?;
        db::list_devices(&conn, state)
    }

    pub fn get(&self, raw_mac: &str) -> EngineResult<Option<DeviceRecord>> {
        let Some(mac) = MacAddress::parse(raw_mac) else {
            return Ok(None);
        };
        let conn = self.db.lock()?;
        db::get_device(&conn, &mac)
    }

    /// Recent sightings of one device
    pub fn history(&self, raw_mac: &str, limit: usize) -> EngineResult<Vec<DiscoveryEntry>> {
        let mac = parse_operator_mac(raw_mac, "discovery log")?;
        let conn = self.db.lock()?;
        db::discovery_history(&conn, &mac, limit)
    }
}

/// Re-home an indexed device; runs inside the caller's savepoint
fn move_indexed(
    conn: &Connection,
    mac: &MacAddress,
    from: DeviceState,
    to: DeviceState,
    update: impl FnOnce(&mut DeviceRecord),
) -> EngineResult<DeviceRecord> {
    let mut record = db::get_device_in(conn, from, mac)?.ok_or_else(|| {
        EngineError::storage(format!("{} is indexed as {} but has no row", mac, from))
    })?;
    record.state = to;
    update(&mut record);

    db::move_device(conn, &record, from)?;
    Ok(record)
}

fn apply_threat(record: &mut DeviceRecord, level: ThreatLevel, notes: Option<&str>) {
    record.threat_level = Some(level);
    if let Some(notes) = notes {
        record.notes = Some(notes.to_string());
    }
}

fn parse_operator_mac(raw: &str, expected: &str) -> EngineResult<MacAddress> {
    MacAddress::parse(raw).ok_or_else(|| EngineError::device_not_found(raw.trim(), expected))
}
