//! OAuth2 Authorization Code flow against Google for a single staff account.
//!
//! 1. Opens browser to authorization URL
//! 2. Listens on localhost for the callback and checks the CSRF state
//! 3. Exchanges the code for an access token (+ refresh token)
//!
//! Persisting the refresh token is the caller's job (see
//! [`crate::sync::connection`]).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::traits::TokenRefresher;
use crate::error::OAuthError;
use crate::storage::GoogleConfig;

pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";
pub const USERINFO_EMAIL_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email";

/// How long `authorize` waits for the browser to come back.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>, // Unix timestamp
    pub token_type: String,
    pub scope: Option<String>,
}

/// Access token produced by a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub userinfo_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
    pub request_timeout: Duration,
}

impl OAuthConfig {
    pub fn from_google(google: &GoogleConfig) -> Self {
        Self {
            client_id: google.client_id.clone(),
            client_secret: google.client_secret.clone(),
            auth_url: google.auth_url.clone(),
            token_url: google.token_url.clone(),
            revoke_url: google.revoke_url.clone(),
            userinfo_url: google.userinfo_url.clone(),
            scopes: vec![
                CALENDAR_EVENTS_SCOPE.to_string(),
                USERINFO_EMAIL_SCOPE.to_string(),
            ],
            redirect_port: google.redirect_port,
            request_timeout: google.request_timeout(),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    /// Consent URL. `access_type=offline` and `prompt=consent` make Google
    /// return a refresh token on every connect.
    pub fn auth_url_full(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(&scopes),
            urlencoding::encode(state),
        )
    }

    fn ensure_credentials(&self) -> Result<(), OAuthError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(OAuthError::CredentialsNotConfigured {
                service: "google".to_string(),
            });
        }
        Ok(())
    }

    fn http_client(&self) -> Result<Client, OAuthError> {
        Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| OAuthError::Transient(e.to_string()))
    }
}

pub fn generate_csrf_state() -> Result<String, OAuthError> {
    use base64::prelude::*;
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| OAuthError::AuthorizationFailed(format!("Failed to generate random state: {e}")))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Run the full OAuth2 flow: open browser -> listen for callback -> exchange code.
pub async fn authorize(config: &OAuthConfig) -> Result<TokenSet, OAuthError> {
    config.ensure_credentials()?;

    let state = generate_csrf_state()?;
    let auth_url = config.auth_url_full(&state);

    let listener = TcpListener::bind(("127.0.0.1", config.redirect_port))
        .await
        .map_err(|e| {
            OAuthError::AuthorizationFailed(format!(
                "Failed to bind OAuth callback port {}: {e}",
                config.redirect_port
            ))
        })?;

    if let Err(e) = open::that(&auth_url) {
        tracing::warn!(error = %e, "could not open browser, visit the URL manually");
    }
    tracing::info!(url = %auth_url, "waiting for Google consent");

    let code = tokio::time::timeout(CALLBACK_TIMEOUT, wait_for_callback(&listener, &state)).await??;
    drop(listener);

    exchange_code(config, &code).await
}

async fn wait_for_callback(listener: &TcpListener, expected_state: &str) -> Result<String, OAuthError> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| OAuthError::InvalidCallback(e.to_string()))?;

        let mut buf = [0u8; 8192];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| OAuthError::InvalidCallback(e.to_string()))?;
        if n == 0 {
            continue;
        }
        let request = String::from_utf8_lossy(&buf[..n]);

        // Browsers also ask for /favicon.ico and the like.
        let Some(params) = callback_params(&request) else {
            send_html(&mut stream, "404 Not Found", "Not found").await;
            continue;
        };

        let outcome = check_callback(&params, expected_state);
        match &outcome {
            Ok(_) => send_html(&mut stream, "200 OK", "Authentication successful! You can close this tab.").await,
            Err(e) => send_html(&mut stream, "400 Bad Request", &e.to_string()).await,
        }
        return outcome;
    }
}

/// Query parameters of a `GET /callback?...` request line.
fn callback_params(request: &str) -> Option<HashMap<String, String>> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let url = url::Url::parse(&format!("http://localhost{}", parts.next()?)).ok()?;
    if url.path() != "/callback" {
        return None;
    }
    Some(url.query_pairs().into_owned().collect())
}

fn check_callback(params: &HashMap<String, String>, expected_state: &str) -> Result<String, OAuthError> {
    if let Some(error) = params.get("error") {
        return Err(OAuthError::AuthorizationFailed(error.clone()));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(OAuthError::InvalidCallback("state mismatch".to_string()));
    }
    params
        .get("code")
        .cloned()
        .ok_or_else(|| OAuthError::InvalidCallback("no code in callback".to_string()))
}

async fn send_html(stream: &mut tokio::net::TcpStream, status: &str, message: &str) {
    let body = format!("<!doctype html><html><body><h2>Tablebook</h2><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

async fn post_token_form(config: &OAuthConfig, params: &[(&str, &str)]) -> Result<serde_json::Value, OAuthError> {
    let resp = config
        .http_client()?
        .post(&config.token_url)
        .form(params)
        .send()
        .await
        .map_err(|e| OAuthError::Transient(e.to_string()))?;

    let status = resp.status();
    resp.json::<serde_json::Value>()
        .await
        .map_err(|e| OAuthError::Transient(format!("token endpoint returned {status}: {e}")))
}

fn expires_at(body: &serde_json::Value) -> Option<i64> {
    body.get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|ei| chrono::Utc::now().timestamp() + ei)
}

/// Exchange authorization code for tokens.
pub async fn exchange_code(config: &OAuthConfig, code: &str) -> Result<TokenSet, OAuthError> {
    config.ensure_credentials()?;
    let redirect_uri = config.redirect_uri();
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri.as_str()),
    ];

    let body = post_token_form(config, &params)
        .await
        .map_err(|e| OAuthError::TokenExchangeFailed(e.to_string()))?;

    if let Some(error) = body.get("error") {
        return Err(OAuthError::TokenExchangeFailed(error.to_string()));
    }

    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OAuthError::TokenExchangeFailed("missing access_token".to_string()))?;

    Ok(TokenSet {
        access_token: access_token.to_string(),
        refresh_token: body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from),
        expires_at: expires_at(&body),
        token_type: body["token_type"].as_str().unwrap_or("Bearer").to_string(),
        scope: body.get("scope").and_then(|v| v.as_str()).map(String::from),
    })
}

/// Refresh an access token using a refresh token.
///
/// `invalid_grant` (expired, revoked or otherwise rejected grant) is the only
/// answer that maps to [`OAuthError::TokenExpired`].
pub async fn refresh_access_token(config: &OAuthConfig, refresh: &str) -> Result<AccessToken, OAuthError> {
    config.ensure_credentials()?;
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];

    let body = post_token_form(config, &params).await?;

    if let Some(error) = body.get("error") {
        if error.as_str() == Some("invalid_grant") {
            return Err(OAuthError::TokenExpired);
        }
        return Err(OAuthError::Transient(format!("OAuth refresh error: {error}")));
    }

    let token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OAuthError::Transient("missing access_token in refresh response".to_string()))?;

    Ok(AccessToken {
        token: token.to_string(),
        expires_at: expires_at(&body),
    })
}

/// Email address of the account that granted access.
pub async fn fetch_account_email(config: &OAuthConfig, access_token: &str) -> Result<Option<String>, OAuthError> {
    let resp = config
        .http_client()?
        .get(&config.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| OAuthError::Transient(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(OAuthError::Transient(format!("userinfo returned {}", resp.status())));
    }

    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| OAuthError::Transient(e.to_string()))?;
    Ok(body.get("email").and_then(|v| v.as_str()).map(String::from))
}

/// Revoke a token at the provider. A token the provider no longer knows
/// counts as revoked.
pub async fn revoke_token(config: &OAuthConfig, token: &str) -> Result<(), OAuthError> {
    let resp = config
        .http_client()?
        .post(&config.revoke_url)
        .form(&[("token", token)])
        .send()
        .await
        .map_err(|e| OAuthError::Transient(e.to_string()))?;

    let status = resp.status();
    if status.is_success() || status == reqwest::StatusCode::BAD_REQUEST {
        Ok(())
    } else {
        Err(OAuthError::Transient(format!("revoke returned {status}")))
    }
}

/// [`TokenRefresher`] backed by Google's token endpoint.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    config: OAuthConfig,
}

impl GoogleOAuth {
    pub fn new(config: OAuthConfig) -> Self {
        Self { config }
    }

    pub fn from_google(google: &GoogleConfig) -> Self {
        Self::new(OAuthConfig::from_google(google))
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }
}

#[async_trait]
impl TokenRefresher for GoogleOAuth {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessToken, OAuthError> {
        refresh_access_token(&self.config, refresh_token).await
    }

    async fn revoke_token(&self, token: &str) -> Result<(), OAuthError> {
        revoke_token(&self.config, token).await
    }
}
