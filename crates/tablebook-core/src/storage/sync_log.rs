//! Append-only audit log of sync runs.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::reservations::{format_timestamp, parse_timestamp};
use super::Database;
use crate::error::DatabaseError;
use crate::settings::LastSyncStatus;

/// One recorded sync attempt. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub status: LastSyncStatus,
    pub reservations_synced: u32,
    pub error_message: Option<String>,
    pub sync_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncLogEntry {
    pub status: LastSyncStatus,
    pub reservations_synced: u32,
    pub error_message: Option<String>,
    pub sync_timestamp: DateTime<Utc>,
}

pub trait SyncLogStore: Send + Sync {
    fn append_sync_log(&self, entry: &NewSyncLogEntry) -> Result<SyncLogEntry, DatabaseError>;

    /// Most recent entries first.
    fn recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>, DatabaseError>;
}

impl SyncLogStore for Database {
    fn append_sync_log(&self, entry: &NewSyncLogEntry) -> Result<SyncLogEntry, DatabaseError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_logs (status, reservations_synced, error_message, sync_timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.status.as_str(),
                entry.reservations_synced,
                entry.error_message,
                format_timestamp(entry.sync_timestamp),
            ],
        )?;

        Ok(SyncLogEntry {
            id: conn.last_insert_rowid(),
            status: entry.status,
            reservations_synced: entry.reservations_synced,
            error_message: entry.error_message.clone(),
            sync_timestamp: entry.sync_timestamp,
        })
    }

    fn recent_sync_logs(&self, limit: usize) -> Result<Vec<SyncLogEntry>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, status, reservations_synced, error_message, sync_timestamp
             FROM sync_logs
             ORDER BY sync_timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let status: String = row.get(1)?;
            let ts: String = row.get(4)?;
            Ok(SyncLogEntry {
                id: row.get(0)?,
                status: LastSyncStatus::parse(&status).unwrap_or_default(),
                reservations_synced: row.get(2)?,
                error_message: row.get(3)?,
                sync_timestamp: parse_timestamp(4, &ts)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
