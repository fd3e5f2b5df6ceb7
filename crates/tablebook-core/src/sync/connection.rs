//! Connecting and disconnecting the restaurant's Google account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, DatabaseError, OAuthError};
use crate::integrations::oauth::TokenSet;
use crate::integrations::TokenRefresher;
use crate::settings::{LastSyncStatus, SettingsUpdate};
use crate::storage::SettingsStore;
use crate::sync::types::TOKEN_EXPIRED_MESSAGE;

/// Snapshot of the connection for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub email: Option<String>,
    pub auto_sync_enabled: bool,
    pub auto_sync_interval_minutes: u32,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_sync_status: LastSyncStatus,
    pub sync_error: Option<String>,
    /// The account was dropped because of a failure, not by an admin.
    pub reconnection_needed: bool,
}

pub fn connection_status(store: &dyn SettingsStore) -> Result<ConnectionStatus, DatabaseError> {
    let settings = store.settings()?;
    let connected = settings.is_connected();
    Ok(ConnectionStatus {
        connected,
        email: settings.google_email.clone(),
        auto_sync_enabled: settings.auto_sync_enabled,
        auto_sync_interval_minutes: settings.auto_sync_interval_minutes,
        last_sync_timestamp: settings.last_sync_timestamp,
        last_sync_status: settings.last_sync_status,
        reconnection_needed: !connected && settings.sync_error.as_deref() == Some(TOKEN_EXPIRED_MESSAGE),
        sync_error: settings.sync_error,
    })
}

/// Store the outcome of a completed consent flow.
pub fn connect(store: &dyn SettingsStore, tokens: &TokenSet, email: Option<String>) -> Result<(), CoreError> {
    let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
        OAuthError::TokenExchangeFailed("Google did not return a refresh token".to_string())
    })?;

    store.update_settings(&SettingsUpdate::connected(refresh_token, email.clone()))?;
    tracing::info!(email = email.as_deref().unwrap_or("unknown"), "Google Calendar connected");
    Ok(())
}

/// Revoke the stored token (best effort) and clear the connection.
pub async fn disconnect(store: &dyn SettingsStore, oauth: &dyn TokenRefresher) -> Result<(), CoreError> {
    let settings = store.settings()?;

    if let Some(token) = settings.google_refresh_token.as_deref() {
        if let Err(e) = oauth.revoke_token(token).await {
            tracing::warn!(error = %e, "token revocation failed, clearing locally anyway");
        }
    }

    store.update_settings(&SettingsUpdate::disconnected())?;
    tracing::info!("Google Calendar disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::sync::sync_engine::NOT_CONNECTED_MESSAGE;
    use crate::sync::test_support::FakeOAuth;

    fn tokens(refresh: Option<&str>) -> TokenSet {
        TokenSet {
            access_token: "at".to_string(),
            refresh_token: refresh.map(String::from),
            expires_at: None,
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    #[test]
    fn connect_clears_previous_error() {
        let db = Database::open_memory().unwrap();
        db.update_settings(&SettingsUpdate::token_rejected(TOKEN_EXPIRED_MESSAGE)).unwrap();
        assert!(connection_status(&db).unwrap().reconnection_needed);

        connect(&db, &tokens(Some("rt")), Some("host@restaurant.example".to_string())).unwrap();

        let status = connection_status(&db).unwrap();
        assert!(status.connected);
        assert!(!status.reconnection_needed);
        assert_eq!(status.sync_error, None);
        assert_eq!(status.email.as_deref(), Some("host@restaurant.example"));
        assert_eq!(db.settings().unwrap().google_refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn connect_requires_refresh_token() {
        let db = Database::open_memory().unwrap();
        let err = connect(&db, &tokens(None), None).unwrap_err();
        assert!(matches!(err, CoreError::OAuth(OAuthError::TokenExchangeFailed(_))));
        assert!(!connection_status(&db).unwrap().connected);
    }

    #[tokio::test]
    async fn disconnect_revokes_and_clears() {
        let db = Database::open_memory().unwrap();
        connect(&db, &tokens(Some("rt")), None).unwrap();
        let oauth = FakeOAuth::ok();

        disconnect(&db, &oauth).await.unwrap();

        assert_eq!(*oauth.revoked.lock().unwrap(), vec!["rt".to_string()]);
        let settings = db.settings().unwrap();
        assert!(!settings.google_connected);
        assert_eq!(settings.google_refresh_token, None);
        assert!(!connection_status(&db).unwrap().reconnection_needed);
    }

    #[tokio::test]
    async fn failed_run_after_disconnect_is_not_a_reconnection() {
        let db = Database::open_memory().unwrap();
        connect(&db, &tokens(Some("rt")), None).unwrap();
        disconnect(&db, &FakeOAuth::ok()).await.unwrap();

        db.update_settings(&SettingsUpdate::sync_outcome(
            Utc::now(),
            LastSyncStatus::Error,
            Some(NOT_CONNECTED_MESSAGE.to_string()),
        ))
        .unwrap();

        let status = connection_status(&db).unwrap();
        assert!(!status.connected);
        assert_eq!(status.sync_error.as_deref(), Some(NOT_CONNECTED_MESSAGE));
        assert!(!status.reconnection_needed);
    }
}
