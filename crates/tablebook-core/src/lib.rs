//! # Tablebook Core Library
//!
//! Core business logic for Tablebook, a restaurant reservation book that
//! mirrors itself to the restaurant's Google Calendar. Every operation is
//! available through the standalone `tablebook-cli` binary.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite-backed reservations, the singleton settings row and
//!   the sync log, plus TOML-based configuration
//! - **Booking**: form validation and capacity-checked creation
//! - **Integrations**: Google OAuth and the Calendar v3 events API
//! - **Sync**: outbound push, deduplicating inbound import, token-expiry
//!   handling and the single-flight auto-sync scheduler
//!
//! ## Key Components
//!
//! - [`Database`]: reservation, settings and sync log persistence
//! - [`Config`]: application configuration management
//! - [`SyncEngine`]: the sync orchestrator
//! - [`AutoSyncScheduler`]: gated, time-bounded sync runs

pub mod availability;
pub mod booking;
pub mod error;
pub mod integrations;
pub mod reservation;
pub mod settings;
pub mod storage;
pub mod sync;

pub use availability::{compute_availability, Availability};
pub use booking::{create_reservation, validate_booking};
pub use error::{ConfigError, CoreError, DatabaseError, OAuthError, ValidationError};
pub use reservation::{NewReservation, Reservation, ReservationPatch};
pub use settings::{AdminSettings, LastSyncStatus, SettingsUpdate};
pub use storage::{Config, Database};
pub use sync::{AutoSyncScheduler, SyncEngine, SyncRunResult, SyncTrigger};
