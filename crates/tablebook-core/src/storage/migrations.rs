//! Database schema migrations for tablebook.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{params, Connection, Result as SqliteResult};

use crate::settings::{default_time_slots, AdminSettings};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 3;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: reservations, the singleton settings row and the sync log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS reservations (
            id                   TEXT PRIMARY KEY,
            date                 TEXT NOT NULL,
            time                 TEXT NOT NULL,
            name                 TEXT NOT NULL,
            email                TEXT NOT NULL,
            phone                TEXT NOT NULL,
            guests               INTEGER NOT NULL CHECK (guests > 0),
            notes                TEXT,
            google_event_id      TEXT,
            imported_from_google INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS admin_settings (
            id                   INTEGER PRIMARY KEY CHECK (id = 1),
            google_connected     INTEGER NOT NULL DEFAULT 0,
            google_refresh_token TEXT,
            google_email         TEXT,
            time_slots           TEXT NOT NULL,
            max_guests_per_day   INTEGER NOT NULL,
            auto_sync_enabled    INTEGER NOT NULL DEFAULT 0,
            auto_sync_interval   INTEGER NOT NULL,
            last_sync_timestamp  TEXT,
            last_sync_status     TEXT NOT NULL DEFAULT 'none',
            sync_error           TEXT
        );

        CREATE TABLE IF NOT EXISTS sync_logs (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            status              TEXT NOT NULL,
            reservations_synced INTEGER NOT NULL DEFAULT 0,
            error_message       TEXT,
            sync_timestamp      TEXT NOT NULL
        );",
    )?;

    let defaults = AdminSettings::default();
    let slots: Vec<String> = default_time_slots()
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect();
    let slots_json = serde_json::to_string(&slots)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    tx.execute(
        "INSERT OR IGNORE INTO admin_settings
            (id, time_slots, max_guests_per_day, auto_sync_enabled, auto_sync_interval)
         VALUES (1, ?1, ?2, ?3, ?4)",
        params![
            slots_json,
            defaults.max_guests_per_day,
            defaults.auto_sync_enabled,
            defaults.auto_sync_interval_minutes,
        ],
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: indexes for the per-date capacity sum and the outbound queue.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_reservations_date ON reservations(date);
         CREATE INDEX IF NOT EXISTS idx_reservations_pending
            ON reservations(imported_from_google, google_event_id);
         CREATE INDEX IF NOT EXISTS idx_reservations_event ON reservations(google_event_id);
         CREATE INDEX IF NOT EXISTS idx_sync_logs_timestamp ON sync_logs(sync_timestamp);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

/// Migration v3: cross-process sync lease, outbound cursor, deleted-event
/// tombstones, and one reservation per calendar event.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE admin_settings ADD COLUMN sync_started_at TEXT;
         ALTER TABLE admin_settings ADD COLUMN outbound_cursor TEXT;

         CREATE TABLE IF NOT EXISTS deleted_events (
            google_event_id TEXT PRIMARY KEY,
            deleted_at      TEXT NOT NULL
         );

         DROP INDEX IF EXISTS idx_reservations_event;
         CREATE UNIQUE INDEX IF NOT EXISTS idx_reservations_event
            ON reservations(google_event_id) WHERE google_event_id IS NOT NULL;",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()?;
    Ok(())
}
