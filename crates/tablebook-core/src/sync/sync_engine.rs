//! Two-way sync between the reservation store and Google Calendar.
//!
//! The local store is the source of truth. Outbound pushes reservations that
//! have no event yet; inbound imports reservation-shaped events that are not
//! already represented locally. Both directions are idempotent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::booking::validate_edit;
use crate::error::{CoreError, OAuthError};
use crate::integrations::{CalendarApi, TokenRefresher};
use crate::reservation::{Reservation, ReservationPatch};
use crate::settings::{AdminSettings, SettingsUpdate};
use crate::storage::{ReservationStore, SettingsStore, SyncConfig};
use crate::sync::dedup::DedupIndex;
use crate::sync::event_codec::parse_external_event;
use crate::sync::types::{SyncError, TOKEN_EXPIRED_MESSAGE};

pub const NOT_CONNECTED_MESSAGE: &str = "Google Calendar not connected";

/// Counts from one complete outbound + inbound pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub synced: u32,
    pub imported: u32,
}

/// Sync orchestrator. Holds no state of its own between calls.
pub struct SyncEngine {
    reservations: Arc<dyn ReservationStore>,
    settings: Arc<dyn SettingsStore>,
    calendar: Arc<dyn CalendarApi>,
    oauth: Arc<dyn TokenRefresher>,
    config: SyncConfig,
    tz: Tz,
}

impl SyncEngine {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        settings: Arc<dyn SettingsStore>,
        calendar: Arc<dyn CalendarApi>,
        oauth: Arc<dyn TokenRefresher>,
        config: SyncConfig,
        tz: Tz,
    ) -> Self {
        Self {
            reservations,
            settings,
            calendar,
            oauth,
            config,
            tz,
        }
    }

    pub fn settings_store(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Exchange the stored refresh token for an access token.
    ///
    /// This is the only place that reacts to [`OAuthError::TokenExpired`]: it
    /// marks the account disconnected and records the reason before
    /// reporting that reconnection is needed.
    pub async fn access_token(&self, settings: &AdminSettings) -> Result<String, SyncError> {
        let Some(refresh_token) = settings.refresh_token() else {
            // Keep reporting why the account was dropped, if we know.
            let reason = settings
                .sync_error
                .clone()
                .unwrap_or_else(|| NOT_CONNECTED_MESSAGE.to_string());
            return Err(SyncError::ReconnectionNeeded(reason));
        };

        match self.oauth.refresh_access_token(refresh_token).await {
            Ok(token) => Ok(token.token),
            Err(OAuthError::TokenExpired) => {
                tracing::warn!("refresh token rejected, disconnecting Google Calendar");
                self.settings
                    .update_settings(&SettingsUpdate::token_rejected(TOKEN_EXPIRED_MESSAGE))?;
                Err(SyncError::ReconnectionNeeded(TOKEN_EXPIRED_MESSAGE.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Push every pending reservation to the calendar. Returns how many
    /// events were created.
    ///
    /// With `outbound_since_last_sync` on, only records created at or after
    /// the stored cursor are considered. The cursor then moves to the start
    /// of this pass, or to the oldest record that failed to push, whichever
    /// is earlier, so a failed record is retried on the next run.
    pub async fn sync_outbound(&self, access_token: &str, settings: &AdminSettings) -> Result<u32, SyncError> {
        let pass_started = Utc::now();
        let since = if self.config.outbound_since_last_sync {
            settings.outbound_cursor
        } else {
            None
        };

        let pending = self.reservations.pending_outbound(since)?;
        let mut synced = 0;
        let mut oldest_failed: Option<DateTime<Utc>> = None;

        for candidate in pending {
            // Re-read right before the remote call; another run may have
            // pushed or deleted it since the batch was selected.
            let Some(current) = self.reservations.get(&candidate.id)? else {
                continue;
            };
            if !current.is_pending_outbound() {
                continue;
            }

            let event_id = match self.calendar.create_event(access_token, &current).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(reservation = %current.id, error = %e, "outbound sync failed");
                    oldest_failed = Some(oldest_failed.map_or(current.created_at, |t| t.min(current.created_at)));
                    continue;
                }
            };

            if self.reservations.set_google_event_id(&current.id, &event_id)? {
                synced += 1;
            } else {
                // Lost the race to another writer; drop our duplicate event.
                tracing::warn!(reservation = %current.id, event = %event_id, "reservation already mirrored, removing duplicate event");
                if let Err(e) = self.calendar.delete_event(access_token, &event_id).await {
                    tracing::warn!(event = %event_id, error = %e, "failed to remove duplicate event");
                }
            }
        }

        if self.config.outbound_since_last_sync {
            let cursor = oldest_failed.map_or(pass_started, |t| t.min(pass_started));
            self.settings.update_settings(&SettingsUpdate {
                outbound_cursor: Some(Some(cursor)),
                ..Default::default()
            })?;
        }

        tracing::info!(synced, "outbound sync finished");
        Ok(synced)
    }

    /// Import reservation events that are not represented locally. Returns
    /// how many records were created.
    pub async fn sync_inbound(&self, access_token: &str) -> Result<u32, SyncError> {
        let events = self.calendar.list_events(access_token).await?;

        let snapshot = self.reservations.list()?;
        let mut index = DedupIndex::new(&snapshot, self.config.near_match_window_days)
            .with_deleted(self.reservations.deleted_event_ids()?);
        let mut imported = 0;

        for event in &events {
            let Some(parsed) = parse_external_event(event, self.tz) else {
                continue;
            };

            if let Some(kind) = index.check(&parsed) {
                tracing::debug!(event = %parsed.event_id, ?kind, "skipping duplicate event");
                continue;
            }

            let event_id = parsed.event_id.clone();
            match self.reservations.insert(&parsed.into_new_reservation()) {
                Ok(record) => {
                    index.record(&record);
                    imported += 1;
                }
                Err(e) => {
                    tracing::warn!(event = %event_id, error = %e, "failed to import event");
                }
            }
        }

        tracing::info!(listed = events.len(), imported, "inbound sync finished");
        Ok(imported)
    }

    /// Token refresh, then outbound, then inbound.
    pub async fn run(&self, settings: &AdminSettings) -> Result<SyncCounts, SyncError> {
        let token = self.access_token(settings).await?;
        let synced = self.sync_outbound(&token, settings).await?;
        let imported = self.sync_inbound(&token).await?;
        Ok(SyncCounts { synced, imported })
    }

    /// Access token for a best-effort mirror call, or `None` when the
    /// calendar is unavailable.
    async fn mirror_token(&self) -> Option<String> {
        let settings = match self.settings.settings() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not load settings for calendar mirror");
                return None;
            }
        };
        if !settings.is_connected() {
            return None;
        }
        match self.access_token(&settings).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "calendar mirror skipped");
                None
            }
        }
    }

    /// Delete a reservation locally, then remove its calendar event if it has
    /// one. The local delete stands even when the remote call fails.
    pub async fn delete_reservation(&self, id: &str) -> Result<Reservation, CoreError> {
        let removed = self.reservations.delete(id)?.ok_or_else(|| CoreError::NotFound {
            entity: "reservation",
            id: id.to_string(),
        })?;

        if let Some(event_id) = removed.google_event_id.as_deref() {
            if let Some(token) = self.mirror_token().await {
                if let Err(e) = self.calendar.delete_event(&token, event_id).await {
                    tracing::warn!(reservation = %removed.id, event = %event_id, error = %e, "calendar delete failed");
                }
            }
        }

        tracing::info!(id = %removed.id, "reservation deleted");
        Ok(removed)
    }

    /// Apply a staff edit locally, then patch the calendar event if there is
    /// one. The local write stands even when the remote call fails.
    pub async fn update_reservation(&self, id: &str, patch: &ReservationPatch) -> Result<Reservation, CoreError> {
        let not_found = || CoreError::NotFound {
            entity: "reservation",
            id: id.to_string(),
        };

        let existing = self.reservations.get(id)?.ok_or_else(not_found)?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let settings = self.settings.settings()?;
        validate_edit(self.reservations.as_ref(), &settings, &existing, patch)?;
        let updated = self.reservations.update(id, patch)?.ok_or_else(not_found)?;

        if let Some(event_id) = updated.google_event_id.as_deref() {
            if let Some(token) = self.mirror_token().await {
                if let Err(e) = self.calendar.update_event(&token, event_id, &updated).await {
                    tracing::warn!(reservation = %updated.id, event = %event_id, error = %e, "calendar update failed");
                }
            }
        }

        tracing::info!(id = %updated.id, "reservation updated");
        Ok(updated)
    }
}
