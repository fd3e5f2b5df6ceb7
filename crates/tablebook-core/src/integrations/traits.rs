use async_trait::async_trait;

use crate::error::OAuthError;
use crate::integrations::oauth::AccessToken;
use crate::reservation::Reservation;
use crate::sync::types::{CalendarError, ExternalEvent};

/// Event operations on the restaurant's calendar.
///
/// Implementations are stateless between calls; the caller passes a fresh
/// access token each time.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Create the event mirroring `reservation` and return its id.
    async fn create_event(
        &self,
        access_token: &str,
        reservation: &Reservation,
    ) -> Result<String, CalendarError>;

    /// Overwrite the mirrored fields of an existing event.
    async fn update_event(
        &self,
        access_token: &str,
        event_id: &str,
        reservation: &Reservation,
    ) -> Result<(), CalendarError>;

    /// Delete an event. An event that is already gone counts as deleted.
    async fn delete_event(&self, access_token: &str, event_id: &str) -> Result<(), CalendarError>;

    /// All single-instance events on the calendar.
    async fn list_events(&self, access_token: &str) -> Result<Vec<ExternalEvent>, CalendarError>;
}

/// Exchanges a stored refresh token for short-lived access tokens.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Fails with [`OAuthError::TokenExpired`] only when the provider
    /// rejects the grant; everything else is [`OAuthError::Transient`].
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessToken, OAuthError>;

    /// Revoke a token at the provider.
    async fn revoke_token(&self, token: &str) -> Result<(), OAuthError>;
}
