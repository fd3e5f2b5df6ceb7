//! Admin settings: the singleton record holding the Google connection state,
//! capacity configuration and the outcome of the last sync run.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Outcome of the most recent sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastSyncStatus {
    Success,
    Error,
    #[default]
    None,
}

impl LastSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LastSyncStatus::Success => "success",
            LastSyncStatus::Error => "error",
            LastSyncStatus::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(LastSyncStatus::Success),
            "error" => Some(LastSyncStatus::Error),
            "none" => Some(LastSyncStatus::None),
            _ => None,
        }
    }
}

/// The `admin_settings` row (id = 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSettings {
    pub google_connected: bool,
    #[serde(skip_serializing)]
    pub google_refresh_token: Option<String>,
    pub google_email: Option<String>,
    #[serde(with = "slots")]
    pub time_slots: Vec<NaiveTime>,
    pub max_guests_per_day: u32,
    pub auto_sync_enabled: bool,
    pub auto_sync_interval_minutes: u32,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_sync_status: LastSyncStatus,
    pub sync_error: Option<String>,
    /// Outbound only looks at reservations created at or after this
    /// instant when `sync.outbound_since_last_sync` is on.
    #[serde(default)]
    pub outbound_cursor: Option<DateTime<Utc>>,
}

impl AdminSettings {
    /// Connected and holding a refresh token. A row that claims to be
    /// connected without a token is treated as disconnected.
    pub fn is_connected(&self) -> bool {
        self.google_connected && self.google_refresh_token.is_some()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        if self.google_connected {
            self.google_refresh_token.as_deref()
        } else {
            None
        }
    }

    pub fn has_time_slot(&self, time: NaiveTime) -> bool {
        self.time_slots.contains(&time)
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            google_connected: false,
            google_refresh_token: None,
            google_email: None,
            time_slots: default_time_slots(),
            max_guests_per_day: 50,
            auto_sync_enabled: false,
            auto_sync_interval_minutes: 60,
            last_sync_timestamp: None,
            last_sync_status: LastSyncStatus::None,
            sync_error: None,
            outbound_cursor: None,
        }
    }
}

/// Evening service from 17:00 to 21:30 in half-hour steps.
pub fn default_time_slots() -> Vec<NaiveTime> {
    (0..10)
        .filter_map(|i| NaiveTime::from_hms_opt(17 + i / 2, (i % 2) * 30, 0))
        .collect()
}

/// Column-level partial update of [`AdminSettings`].
///
/// Only `Some` fields are written, so the connect flow, the sync status
/// writer and the capacity editor never overwrite each other's fields.
/// Nested `Option`s distinguish "leave alone" from "set to NULL".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub google_connected: Option<bool>,
    pub google_refresh_token: Option<Option<String>>,
    pub google_email: Option<Option<String>>,
    pub time_slots: Option<Vec<NaiveTime>>,
    pub max_guests_per_day: Option<u32>,
    pub auto_sync_enabled: Option<bool>,
    pub auto_sync_interval_minutes: Option<u32>,
    pub last_sync_timestamp: Option<Option<DateTime<Utc>>>,
    pub last_sync_status: Option<LastSyncStatus>,
    pub sync_error: Option<Option<String>>,
    pub outbound_cursor: Option<Option<DateTime<Utc>>>,
}

impl SettingsUpdate {
    /// Fields written when an account finishes the OAuth consent flow.
    pub fn connected(refresh_token: String, email: Option<String>) -> Self {
        Self {
            google_connected: Some(true),
            google_refresh_token: Some(Some(refresh_token)),
            google_email: Some(email),
            sync_error: Some(None),
            ..Default::default()
        }
    }

    /// Fields written when the account is disconnected by the admin.
    pub fn disconnected() -> Self {
        Self {
            google_connected: Some(false),
            google_refresh_token: Some(None),
            google_email: Some(None),
            sync_error: Some(None),
            ..Default::default()
        }
    }

    /// Fields written when the provider rejects the refresh token.
    pub fn token_rejected(message: impl Into<String>) -> Self {
        Self {
            google_connected: Some(false),
            sync_error: Some(Some(message.into())),
            ..Default::default()
        }
    }

    /// Fields written at the end of every sync run.
    pub fn sync_outcome(at: DateTime<Utc>, status: LastSyncStatus, error: Option<String>) -> Self {
        Self {
            last_sync_timestamp: Some(Some(at)),
            last_sync_status: Some(status),
            sync_error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Reject admin edits that would leave the booking form unusable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_guests_per_day == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "max_guests_per_day".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.auto_sync_interval_minutes == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "auto_sync_interval_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if matches!(&self.time_slots, Some(slots) if slots.is_empty()) {
            return Err(ValidationError::InvalidValue {
                field: "time_slots".to_string(),
                message: "at least one slot is required".to_string(),
            });
        }
        Ok(())
    }
}

mod slots {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(slots: &[NaiveTime], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(slots.iter().map(|t| t.format("%H:%M").to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<NaiveTime>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|raw| NaiveTime::parse_from_str(raw, "%H:%M").map_err(serde::de::Error::custom))
            .collect()
    }
}
