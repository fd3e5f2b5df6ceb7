//! Google Calendar synchronization layer.
//!
//! Provides two-way sync between the local reservation store and the
//! restaurant's Google Calendar, plus the scheduler that drives it.

pub mod connection;
pub mod dedup;
pub mod event_codec;
pub mod scheduler;
pub mod sync_engine;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{connect, connection_status, disconnect, ConnectionStatus};
pub use dedup::{DedupIndex, DuplicateKind};
pub use event_codec::{parse_external_event, reservation_to_event_body};
pub use scheduler::AutoSyncScheduler;
pub use sync_engine::{SyncCounts, SyncEngine};
pub use types::{
    CalendarError, ExternalEvent, ParsedReservation, RunState, SyncError, SyncRunResult, SyncTrigger,
};
