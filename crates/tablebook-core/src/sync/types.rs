//! Core types for calendar synchronization.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, OAuthError};
use crate::reservation::{hhmm, NewReservation};

/// Summary prefix that marks a calendar event as a reservation.
pub const RESERVATION_PREFIX: &str = "Reservation: ";

/// Message stored in `sync_error` when the provider rejects the refresh token.
pub const TOKEN_EXPIRED_MESSAGE: &str = "Token expired, reconnection required";

/// Start or end of a calendar event as the Calendar v3 API returns it.
/// Timed events carry `dateTime`, all-day events carry `date`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// A calendar event fetched from the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: Option<EventTime>,
}

impl ExternalEvent {
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some("cancelled")
    }
}

/// Reservation fields recovered from an [`ExternalEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReservation {
    pub event_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub guests: u32,
    pub notes: Option<String>,
}

impl ParsedReservation {
    /// Insert payload for an imported record. Imports are flagged so they are
    /// never pushed back to the calendar.
    pub fn into_new_reservation(self) -> NewReservation {
        NewReservation {
            date: self.date,
            time: self.time,
            name: self.name,
            email: self.email,
            phone: self.phone,
            guests: self.guests,
            notes: self.notes,
            google_event_id: Some(self.event_id),
            imported_from_google: true,
        }
    }
}

/// Calendar API errors. Per-item failures are logged and the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Calendar request timed out")]
    Timeout,

    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),
}

impl CalendarError {
    /// The event no longer exists at the provider.
    pub fn is_gone(&self) -> bool {
        matches!(self, CalendarError::Api { status: 404 | 410, .. })
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CalendarError::Timeout
        } else if err.is_decode() {
            CalendarError::InvalidResponse(err.to_string())
        } else {
            CalendarError::Network(err.to_string())
        }
    }
}

/// Run-level sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Not connected, or the provider rejected the refresh token. Needs an
    /// admin to reconnect.
    #[error("{0}")]
    ReconnectionNeeded(String),

    /// Network or provider failure. Retried on the next run.
    #[error("Temporary sync failure: {0}")]
    Transient(String),

    #[error("Sync run exceeded {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Sync already in progress")]
    AlreadyRunning,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl SyncError {
    pub fn needs_reconnection(&self) -> bool {
        matches!(self, SyncError::ReconnectionNeeded(_))
    }
}

impl From<OAuthError> for SyncError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::TokenExpired => SyncError::ReconnectionNeeded(TOKEN_EXPIRED_MESSAGE.to_string()),
            other => SyncError::Transient(other.to_string()),
        }
    }
}

impl From<CalendarError> for SyncError {
    fn from(err: CalendarError) -> Self {
        SyncError::Transient(err.to_string())
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    /// Interval loop. Honors `auto_sync_enabled`.
    Scheduled,
    /// Staff action. Runs even when auto-sync is off.
    Manual,
}

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

/// Outcome reported to whoever triggered a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnection_needed: Option<bool>,
}

impl SyncRunResult {
    pub fn completed(synced: u32, imported: u32) -> Self {
        Self {
            success: true,
            synced_count: Some(synced),
            imported_count: Some(imported),
            ..Default::default()
        }
    }

    /// Scheduled run while auto-sync is disabled.
    pub fn skipped() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(err: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            reconnection_needed: err.needs_reconnection().then_some(true),
            ..Default::default()
        }
    }
}
