//! TOML-based application configuration.
//!
//! Holds deployment settings that do not belong in the database:
//! - Restaurant time zone used for calendar events
//! - Google OAuth client credentials and API endpoints
//! - Sync tuning (dedup window, timeouts, page cap)
//!
//! Configuration is stored at `~/.config/tablebook/config.toml`.
//! `TABLEBOOK_GOOGLE_CLIENT_ID` / `TABLEBOOK_GOOGLE_CLIENT_SECRET` override
//! the stored client credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;

/// Restaurant-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantConfig {
    /// IANA time zone name, e.g. `Europe/Berlin`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Overrides the default database location.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Google OAuth + Calendar API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_revoke_url")]
    pub revoke_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout for every provider call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Sync engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Imported events whose name and time match an existing reservation
    /// within this many days are treated as duplicates.
    #[serde(default = "default_near_match_window_days")]
    pub near_match_window_days: u32,
    /// Only push reservations created after the last successful sync.
    #[serde(default)]
    pub outbound_since_last_sync: bool,
    /// Upper bound for a whole sync run.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Maximum number of event pages fetched per inbound import.
    #[serde(default = "default_max_list_pages")]
    pub max_list_pages: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tablebook/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub restaurant: RestaurantConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_timezone() -> String {
    "Europe/Berlin".into()
}
fn default_redirect_port() -> u16 {
    19821
}
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".into()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}
fn default_revoke_url() -> String {
    "https://oauth2.googleapis.com/revoke".into()
}
fn default_userinfo_url() -> String {
    "https://www.googleapis.com/oauth2/v2/userinfo".into()
}
fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_near_match_window_days() -> u32 {
    1
}
fn default_run_timeout_secs() -> u64 {
    120
}
fn default_max_list_pages() -> u32 {
    10
}

impl Default for RestaurantConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            database_path: None,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_port: default_redirect_port(),
            calendar_id: default_calendar_id(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            revoke_url: default_revoke_url(),
            userinfo_url: default_userinfo_url(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GoogleConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            near_match_window_days: default_near_match_window_days(),
            outbound_since_last_sync: false,
            run_timeout_secs: default_run_timeout_secs(),
            max_list_pages: default_max_list_pages(),
        }
    }
}

impl SyncConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => serde_json::Value::Number(
                        value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?
                            .into(),
                    ),
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<Config>(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                cfg
            }
            Err(e) => {
                return Err(ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TABLEBOOK_GOOGLE_CLIENT_ID") {
            self.google.client_id = id;
        }
        if let Ok(secret) = std::env::var("TABLEBOOK_GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = secret;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        if self.google.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "google.request_timeout_secs".into(),
                message: "must be positive".into(),
            });
        }
        if self.sync.run_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sync.run_timeout_secs".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// The restaurant's time zone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.restaurant
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "restaurant.timezone".into(),
                message: e.to_string(),
            })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key without saving.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_value(key, value)?;
        self.save()
    }
}
