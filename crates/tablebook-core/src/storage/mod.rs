mod config;
pub mod database;
pub mod migrations;
pub mod reservations;
pub mod settings_store;
pub mod sync_log;

pub use config::{Config, GoogleConfig, RestaurantConfig, SyncConfig};
pub use database::Database;
pub use reservations::{InsertOutcome, ReservationStore};
pub use settings_store::SettingsStore;
pub use sync_log::{NewSyncLogEntry, SyncLogEntry, SyncLogStore};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/tablebook[-dev]/` based on TABLEBOOK_ENV.
///
/// Set TABLEBOOK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TABLEBOOK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tablebook-dev")
    } else {
        base_dir.join("tablebook")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
