//! Database schema definitions
//!
//! Three device tables share one column layout. `device_index` maps every
//! canonical MAC to the single set it belongs to; the primary key on `mac`
//! makes double membership impossible.

use rusqlite::Connection;

use crate::error::EngineResult;
use crate::models::DeviceState;

fn device_table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            mac TEXT PRIMARY KEY NOT NULL,
            last_ip TEXT,
            hostname TEXT,
            vendor TEXT,
            device_type TEXT,
            open_ports TEXT NOT NULL DEFAULT '[]',
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            notes TEXT,
            threat_level TEXT,
            profiled_at TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_last_seen ON {table}(last_seen);
        "#,
        table = table
    )
}

/// Create all database tables
pub fn create_tables(conn: &Connection) -> EngineResult<()> {
    for state in DeviceState::ALL {
        conn.execute_batch(&device_table_ddl(state.table()))?;
    }

    conn.execute_batch(
        r#"
        -- Single classification index: one row per canonical MAC
        CREATE TABLE IF NOT EXISTS device_index (
            mac TEXT PRIMARY KEY NOT NULL,
            state TEXT NOT NULL CHECK (state IN ('known', 'pending', 'threat'))
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_mac TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            details TEXT NOT NULL,
            severity TEXT NOT NULL,
            is_resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            resolution_notes TEXT
        );

        -- Every sighting, whatever the state
        CREATE TABLE IF NOT EXISTS discovery_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mac TEXT NOT NULL,
            ip TEXT NOT NULL,
            seen_at TEXT NOT NULL,
            state TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_pair ON alerts(device_mac, alert_type, detected_at);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_one_unresolved
            ON alerts(device_mac, alert_type) WHERE is_resolved = 0;
        CREATE INDEX IF NOT EXISTS idx_discovery_log_mac ON discovery_log(mac, seen_at);
        "#,
    )?;

    // Databases created before profiling state was tracked
    for state in DeviceState::ALL {
        ensure_column(conn, state.table(), "profiled_at", "TEXT")?;
        ensure_column(conn, state.table(), "is_active", "INTEGER NOT NULL DEFAULT 1")?;
    }

    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> EngineResult<()> {
    let exists = conn
        .prepare(&format!("PRAGMA table_info({})", table))?
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .any(|name| name == column);

    if !exists {
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
            [],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get::<_, i32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).expect("Failed to create tables");

        for table in [
            "known_devices",
            "pending_devices",
            "threat_devices",
            "device_index",
            "alerts",
            "discovery_log",
        ] {
            assert!(table_exists(&conn, table), "{} should exist", table);
        }

        // Idempotent
        create_tables(&conn).expect("Second create should be a no-op");
    }

    #[test]
    fn test_index_rejects_second_membership() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        conn.execute(
            "INSERT INTO device_index (mac, state) VALUES ('aa:bb:cc:dd:ee:ff', 'known')",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO device_index (mac, state) VALUES ('aa:bb:cc:dd:ee:ff', 'threat')",
            [],
        );
        assert!(second.is_err());
    }

    #[test]
    fn test_only_one_unresolved_alert_per_pair() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        let insert = "INSERT INTO alerts (device_mac, alert_type, detected_at, details, severity)
                      VALUES ('aa:bb:cc:dd:ee:ff', 'new_device', ?1, 'x', 'medium')";
        conn.execute(insert, ["2026-01-01T00:00:00.000Z"]).unwrap();
        assert!(conn.execute(insert, ["2026-01-01T02:00:00.000Z"]).is_err());

        conn.execute("UPDATE alerts SET is_resolved = 1", []).unwrap();
        conn.execute(insert, ["2026-01-01T02:00:00.000Z"]).unwrap();
    }

    #[test]
    fn test_legacy_device_tables_gain_profiling_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE pending_devices (
                mac TEXT PRIMARY KEY NOT NULL,
                last_ip TEXT,
                hostname TEXT,
                vendor TEXT,
                device_type TEXT,
                open_ports TEXT NOT NULL DEFAULT '[]',
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                notes TEXT,
                threat_level TEXT
            );
            "#,
        )
        .unwrap();

        create_tables(&conn).expect("Legacy schema migration should succeed");

        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(pending_devices)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(columns.iter().any(|c| c == "profiled_at"));
        assert!(columns.iter().any(|c| c == "is_active"));
    }
}
