//! Credential store over the singleton `admin_settings` row.

use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Row};

use super::reservations::{format_timestamp, parse_timestamp};
use super::Database;
use crate::error::DatabaseError;
use crate::settings::{AdminSettings, LastSyncStatus, SettingsUpdate};

/// Load/update access to the admin settings row.
///
/// There is exactly one row; callers never pass an id. Updates are
/// last-writer-wins at column granularity.
pub trait SettingsStore: Send + Sync {
    fn settings(&self) -> Result<AdminSettings, DatabaseError>;

    fn update_settings(&self, update: &SettingsUpdate) -> Result<(), DatabaseError>;

    /// Take the sync run lease unless another holder claimed it after
    /// `stale_before`. Returns whether this caller now holds it.
    fn claim_sync_lease(
        &self,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Release the lease taken at `claimed_at`. A lease that has since been
    /// taken over by someone else is left alone.
    fn release_sync_lease(&self, claimed_at: DateTime<Utc>) -> Result<(), DatabaseError>;
}

fn row_to_settings(row: &Row<'_>) -> rusqlite::Result<AdminSettings> {
    let slots_json: String = row.get(3)?;
    let slots: Vec<String> = serde_json::from_str(&slots_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let time_slots = slots
        .iter()
        .map(|s| NaiveTime::parse_from_str(s, "%H:%M"))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    let last_sync: Option<String> = row.get(7)?;
    let status: String = row.get(8)?;
    let outbound_cursor: Option<String> = row.get(10)?;

    Ok(AdminSettings {
        google_connected: row.get(0)?,
        google_refresh_token: row.get(1)?,
        google_email: row.get(2)?,
        time_slots,
        max_guests_per_day: row.get(4)?,
        auto_sync_enabled: row.get(5)?,
        auto_sync_interval_minutes: row.get(6)?,
        last_sync_timestamp: last_sync.as_deref().map(|s| parse_timestamp(7, s)).transpose()?,
        last_sync_status: LastSyncStatus::parse(&status).unwrap_or_default(),
        sync_error: row.get(9)?,
        outbound_cursor: outbound_cursor.as_deref().map(|s| parse_timestamp(10, s)).transpose()?,
    })
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

/// Column/value pairs for every field the update sets.
fn assignments(update: &SettingsUpdate) -> Result<Vec<(&'static str, Value)>, DatabaseError> {
    let mut sets = Vec::new();

    if let Some(connected) = update.google_connected {
        sets.push(("google_connected", Value::Integer(i64::from(connected))));
    }
    if let Some(token) = &update.google_refresh_token {
        sets.push(("google_refresh_token", opt_text(token)));
    }
    if let Some(email) = &update.google_email {
        sets.push(("google_email", opt_text(email)));
    }
    if let Some(slots) = &update.time_slots {
        let raw: Vec<String> = slots.iter().map(|t| t.format("%H:%M").to_string()).collect();
        let json = serde_json::to_string(&raw).map_err(|e| DatabaseError::CorruptValue {
            column: "time_slots",
            message: e.to_string(),
        })?;
        sets.push(("time_slots", Value::Text(json)));
    }
    if let Some(max) = update.max_guests_per_day {
        sets.push(("max_guests_per_day", Value::Integer(i64::from(max))));
    }
    if let Some(enabled) = update.auto_sync_enabled {
        sets.push(("auto_sync_enabled", Value::Integer(i64::from(enabled))));
    }
    if let Some(interval) = update.auto_sync_interval_minutes {
        sets.push(("auto_sync_interval", Value::Integer(i64::from(interval))));
    }
    if let Some(ts) = &update.last_sync_timestamp {
        sets.push(("last_sync_timestamp", opt_text(&ts.map(format_timestamp))));
    }
    if let Some(status) = update.last_sync_status {
        sets.push(("last_sync_status", Value::Text(status.as_str().to_string())));
    }
    if let Some(error) = &update.sync_error {
        sets.push(("sync_error", opt_text(error)));
    }
    if let Some(cursor) = &update.outbound_cursor {
        sets.push(("outbound_cursor", opt_text(&cursor.map(format_timestamp))));
    }

    Ok(sets)
}

impl SettingsStore for Database {
    fn settings(&self) -> Result<AdminSettings, DatabaseError> {
        Ok(self.conn()?.query_row(
            "SELECT google_connected, google_refresh_token, google_email, time_slots,
                    max_guests_per_day, auto_sync_enabled, auto_sync_interval,
                    last_sync_timestamp, last_sync_status, sync_error, outbound_cursor
             FROM admin_settings WHERE id = 1",
            [],
            row_to_settings,
        )?)
    }

    fn update_settings(&self, update: &SettingsUpdate) -> Result<(), DatabaseError> {
        let sets = assignments(update)?;
        if sets.is_empty() {
            return Ok(());
        }

        // One statement, so the touched columns change together.
        let clause = sets
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE admin_settings SET {clause} WHERE id = 1");

        self.conn()?
            .execute(&sql, params_from_iter(sets.into_iter().map(|(_, v)| v)))?;
        Ok(())
    }

    fn claim_sync_lease(
        &self,
        claimed_at: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn()?.execute(
            "UPDATE admin_settings SET sync_started_at = ?1
             WHERE id = 1 AND (sync_started_at IS NULL OR sync_started_at < ?2)",
            params![format_timestamp(claimed_at), format_timestamp(stale_before)],
        )?;
        Ok(changed == 1)
    }

    fn release_sync_lease(&self, claimed_at: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "UPDATE admin_settings SET sync_started_at = NULL
             WHERE id = 1 AND sync_started_at = ?1",
            params![format_timestamp(claimed_at)],
        )?;
        Ok(())
    }
}
