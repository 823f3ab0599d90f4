//! Database query functions
//!
//! Device-set and alert operations over a borrowed connection. Callers compose
//! them inside [`with_savepoint`] so each logical operation commits or rolls
//! back as a unit.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::*;
use crate::clock::{from_db_timestamp, to_db_timestamp};
use crate::error::{EngineError, EngineResult};
use crate::models::{DeviceProfile, DeviceRecord, DeviceState, MacAddress, OpenPort};

const DEVICE_COLUMNS: &str = "mac, last_ip, hostname, vendor, device_type, open_ports, \
     first_seen, last_seen, notes, threat_level, profiled_at, is_active";

const ALERT_COLUMNS: &str = "id, device_mac, alert_type, detected_at, details, severity, \
     is_resolved, resolved_at, resolution_notes";

/// Run `f` inside a named savepoint; any error rolls the savepoint back.
pub fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> EngineResult<T>,
) -> EngineResult<T> {
    conn.execute_batch(&format!("SAVEPOINT {}", name))?;

    let rollback = || {
        let _ = conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
            name
        ));
    };

    match f(conn) {
        Ok(value) => match conn.execute_batch(&format!("RELEASE SAVEPOINT {}", name)) {
            Ok(()) => Ok(value),
            Err(e) => {
                rollback();
                Err(e.into())
            }
        },
        Err(e) => {
            rollback();
            Err(e)
        }
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_db_timestamp(&raw).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{}'", raw)))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.as_deref().and_then(from_db_timestamp))
}

fn device_from_row(row: &Row<'_>, state: DeviceState) -> rusqlite::Result<DeviceRecord> {
    let raw_mac: String = row.get(0)?;
    let mac = MacAddress::parse(&raw_mac)
        .ok_or_else(|| conversion_error(0, format!("bad MAC '{}'", raw_mac)))?;

    let ports_json: String = row.get(5)?;
    let open_ports: Vec<OpenPort> = serde_json::from_str(&ports_json).unwrap_or_default();

    let threat_level: Option<String> = row.get(9)?;
    let is_active: i64 = row.get(11)?;

    Ok(DeviceRecord {
        mac,
        state,
        last_ip: row.get(1)?,
        hostname: row.get(2)?,
        vendor: row.get(3)?,
        device_type: row.get(4)?,
        open_ports,
        first_seen: timestamp_at(row, 6)?,
        last_seen: timestamp_at(row, 7)?,
        notes: row.get(8)?,
        threat_level: threat_level.and_then(|t| t.parse().ok()),
        profiled_at: optional_timestamp_at(row, 10)?,
        is_active: is_active != 0,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let alert_type: String = row.get(2)?;
    let severity: String = row.get(5)?;
    let is_resolved: i64 = row.get(6)?;

    Ok(AlertRecord {
        id: row.get(0)?,
        device_mac: row.get(1)?,
        alert_type: alert_type.parse().map_err(|e: String| conversion_error(2, e))?,
        detected_at: timestamp_at(row, 3)?,
        details: row.get(4)?,
        severity: severity.parse().map_err(|e: String| conversion_error(5, e))?,
        resolved: is_resolved != 0,
        resolved_at: optional_timestamp_at(row, 7)?,
        resolution_notes: row.get(8)?,
    })
}

// ====== Device sets ======

/// Which set a MAC belongs to, if any
pub fn classify(conn: &Connection, mac: &MacAddress) -> EngineResult<Option<DeviceState>> {
    let state: Option<String> = conn
        .query_row(
            "SELECT state FROM device_index WHERE mac = ?1",
            params![mac.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    state
        .map(|s| {
            s.parse::<DeviceState>().map_err(|e| {
                EngineError::storage(format!("device_index corrupt for {}: {}", mac, e))
            })
        })
        .transpose()
}

/// Insert a record into the table of `record.state` and register it in the index
pub fn insert_device(conn: &Connection, record: &DeviceRecord) -> EngineResult<()> {
    let ports = serde_json::to_string(&record.open_ports)
        .map_err(|e| EngineError::storage(format!("Failed to encode open ports: {}", e)))?;

    conn.execute(
        "INSERT INTO device_index (mac, state) VALUES (?1, ?2)",
        params![record.mac.to_string(), record.state.as_str()],
    )?;

    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            record.state.table(),
            DEVICE_COLUMNS
        ),
        params![
            record.mac.to_string(),
            record.last_ip,
            record.hostname,
            record.vendor,
            record.device_type,
            ports,
            to_db_timestamp(record.first_seen),
            to_db_timestamp(record.last_seen),
            record.notes,
            record.threat_level.map(|t| t.as_str()),
            record.profiled_at.map(to_db_timestamp),
            record.is_active as i64,
        ],
    )?;

    Ok(())
}

/// Fetch a record from one specific set
pub fn get_device_in(
    conn: &Connection,
    state: DeviceState,
    mac: &MacAddress,
) -> EngineResult<Option<DeviceRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM {} WHERE mac = ?1", DEVICE_COLUMNS, state.table()),
            params![mac.to_string()],
            |row| device_from_row(row, state),
        )
        .optional()?;
    Ok(record)
}

/// Fetch a record from whichever set holds it
pub fn get_device(conn: &Connection, mac: &MacAddress) -> EngineResult<Option<DeviceRecord>> {
    match classify(conn, mac)? {
        Some(state) => get_device_in(conn, state, mac),
        None => Ok(None),
    }
}

/// Heartbeat: refresh IP and last-seen, mark active
pub fn touch_device(
    conn: &Connection,
    state: DeviceState,
    mac: &MacAddress,
    ip: &str,
    now: DateTime<Utc>,
) -> EngineResult<usize> {
    let updated = conn.execute(
        &format!(
            "UPDATE {} SET last_ip = ?2, last_seen = ?3, is_active = 1 WHERE mac = ?1",
            state.table()
        ),
        params![mac.to_string(), ip, to_db_timestamp(now)],
    )?;
    Ok(updated)
}

/// Merge a profile into a record; missing values keep what is stored.
/// Stamps `profiled_at` so the device is not profiled again.
pub fn merge_profile(
    conn: &Connection,
    state: DeviceState,
    mac: &MacAddress,
    profile: &DeviceProfile,
    now: DateTime<Utc>,
) -> EngineResult<usize> {
    let ports = profile
        .open_ports
        .as_ref()
        .filter(|ports| !ports.is_empty())
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| EngineError::storage(format!("Failed to encode open ports: {}", e)))?;

    let updated = conn.execute(
        &format!(
            r#"
            UPDATE {} SET
                hostname = COALESCE(?2, hostname),
                vendor = COALESCE(?3, vendor),
                device_type = COALESCE(?4, device_type),
                open_ports = COALESCE(?5, open_ports),
                profiled_at = ?6
            WHERE mac = ?1
            "#,
            state.table()
        ),
        params![
            mac.to_string(),
            profile.hostname,
            profile.vendor,
            profile.device_type,
            ports,
            to_db_timestamp(now),
        ],
    )?;
    Ok(updated)
}

/// Remove `record.mac` from `from` and insert `record` into `record.state`.
/// Fails with NotFound (and writes nothing) when the MAC is not in `from`.
pub fn move_device(
    conn: &Connection,
    record: &DeviceRecord,
    from: DeviceState,
) -> EngineResult<()> {
    let mac = record.mac.to_string();

    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE mac = ?1", from.table()),
        params![mac],
    )?;
    if removed == 0 {
        return Err(EngineError::device_not_found(&record.mac, from));
    }

    conn.execute(
        "DELETE FROM device_index WHERE mac = ?1 AND state = ?2",
        params![mac, from.as_str()],
    )?;

    insert_device(conn, record)
}

/// Remove a device from whichever set holds it; returns that set
pub fn delete_device(conn: &Connection, mac: &MacAddress) -> EngineResult<Option<DeviceState>> {
    let Some(state) = classify(conn, mac)? else {
        return Ok(None);
    };

    conn.execute(
        &format!("DELETE FROM {} WHERE mac = ?1", state.table()),
        params![mac.to_string()],
    )?;
    conn.execute(
        "DELETE FROM device_index WHERE mac = ?1",
        params![mac.to_string()],
    )?;

    Ok(Some(state))
}

/// All devices of one set, most recently seen first
pub fn list_devices(conn: &Connection, state: DeviceState) -> EngineResult<Vec<DeviceRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY last_seen DESC, mac",
        DEVICE_COLUMNS,
        state.table()
    ))?;

    let devices = stmt
        .query_map([], |row| device_from_row(row, state))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(devices)
}

/// Update level and (when given) notes of a device already in Threat
pub fn update_threat(
    conn: &Connection,
    mac: &MacAddress,
    level: crate::models::ThreatLevel,
    notes: Option<&str>,
) -> EngineResult<usize> {
    let updated = conn.execute(
        "UPDATE threat_devices SET threat_level = ?2, notes = COALESCE(?3, notes) WHERE mac = ?1",
        params![mac.to_string(), level.as_str(), notes],
    )?;
    Ok(updated)
}

/// Clear `is_active` on known devices last seen before `cutoff`
pub fn mark_stale_known(conn: &Connection, cutoff: DateTime<Utc>) -> EngineResult<usize> {
    let updated = conn.execute(
        "UPDATE known_devices SET is_active = 0 WHERE is_active = 1 AND last_seen < ?1",
        params![to_db_timestamp(cutoff)],
    )?;
    Ok(updated)
}

// ====== Discovery log ======

pub fn log_discovery(
    conn: &Connection,
    mac: &MacAddress,
    ip: &str,
    state: DeviceState,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    conn.execute(
        "INSERT INTO discovery_log (mac, ip, seen_at, state) VALUES (?1, ?2, ?3, ?4)",
        params![mac.to_string(), ip, to_db_timestamp(now), state.as_str()],
    )?;
    Ok(())
}

/// Most recent sightings of one device
pub fn discovery_history(
    conn: &Connection,
    mac: &MacAddress,
    limit: usize,
) -> EngineResult<Vec<DiscoveryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT mac, ip, seen_at, state FROM discovery_log
         WHERE mac = ?1 ORDER BY seen_at DESC, id DESC LIMIT ?2",
    )?;

    let entries = stmt
        .query_map(params![mac.to_string(), limit as i64], |row| {
            Ok(DiscoveryEntry {
                mac: row.get(0)?,
                ip: row.get(1)?,
                seen_at: timestamp_at(row, 2)?,
                state: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ====== Alerts ======

/// True when an unresolved alert of the pair exists, or one was raised at or after `cutoff`
pub fn alert_blocked(
    conn: &Connection,
    device_mac: &str,
    alert_type: AlertType,
    cutoff: DateTime<Utc>,
) -> EngineResult<bool> {
    let blocked: i64 = conn.query_row(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM alerts
            WHERE device_mac = ?1 AND alert_type = ?2
              AND (is_resolved = 0 OR detected_at >= ?3)
        )
        "#,
        params![device_mac, alert_type.as_str(), to_db_timestamp(cutoff)],
        |row| row.get(0),
    )?;
    Ok(blocked != 0)
}

/// Create an alert unless dedup or cooldown forbids it; check and insert share one savepoint
pub fn create_alert_deduped(
    conn: &Connection,
    alert: &NewAlert,
    now: DateTime<Utc>,
    cooldown: chrono::Duration,
) -> EngineResult<Option<AlertRecord>> {
    with_savepoint(conn, "create_alert", |conn| {
        if alert_blocked(conn, &alert.device_mac, alert.alert_type, now - cooldown)? {
            return Ok(None);
        }

        conn.execute(
            r#"
            INSERT INTO alerts (device_mac, alert_type, detected_at, details, severity)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                alert.device_mac,
                alert.alert_type.as_str(),
                to_db_timestamp(now),
                alert.details,
                alert.severity.as_str(),
            ],
        )?;

        get_alert(conn, conn.last_insert_rowid())
    })
}

pub fn get_alert(conn: &Connection, id: i64) -> EngineResult<Option<AlertRecord>> {
    let alert = conn
        .query_row(
            &format!("SELECT {} FROM alerts WHERE id = ?1", ALERT_COLUMNS),
            params![id],
            alert_from_row,
        )
        .optional()?;
    Ok(alert)
}

/// Flip an alert to resolved. Returns false when it already was.
pub fn resolve_alert(
    conn: &Connection,
    id: i64,
    notes: &str,
    now: DateTime<Utc>,
) -> EngineResult<bool> {
    with_savepoint(conn, "resolve_alert", |conn| {
        let resolved: Option<i64> = conn
            .query_row(
                "SELECT is_resolved FROM alerts WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match resolved {
            None => Err(EngineError::alert_not_found(id)),
            Some(flag) if flag != 0 => Ok(false),
            Some(_) => {
                conn.execute(
                    r#"
                    UPDATE alerts SET is_resolved = 1, resolved_at = ?2, resolution_notes = ?3
                    WHERE id = ?1 AND is_resolved = 0
                    "#,
                    params![id, to_db_timestamp(now), notes],
                )?;
                Ok(true)
            }
        }
    })
}

/// Alerts in creation order
pub fn list_alerts(conn: &Connection, unresolved_only: bool) -> EngineResult<Vec<AlertRecord>> {
    let sql = if unresolved_only {
        format!(
            "SELECT {} FROM alerts WHERE is_resolved = 0 ORDER BY detected_at, id",
            ALERT_COLUMNS
        )
    } else {
        format!("SELECT {} FROM alerts ORDER BY detected_at, id", ALERT_COLUMNS)
    };

    let mut stmt = conn.prepare(&sql)?;
    let alerts = stmt
        .query_map([], alert_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(alerts)
}
