//! External service integrations: Google OAuth and Google Calendar.

pub mod google;
pub mod oauth;
pub mod traits;

pub use google::GoogleCalendarClient;
pub use oauth::{AccessToken, GoogleOAuth, OAuthConfig, TokenSet};
pub use traits::{CalendarApi, TokenRefresher};
