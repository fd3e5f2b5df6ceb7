//! Sync subcommand for the Google Calendar mirror.
//!
//! `now` runs one manual sync and waits for it. `daemon` keeps the
//! scheduler running on the configured interval until interrupted.

use clap::Subcommand;
use tablebook_core::storage::SyncLogStore;
use tablebook_core::sync::{self, SyncTrigger};

use super::{block_on, open, print_json, scheduler, CliResult};

/// Sync actions for Google Calendar.
#[derive(Subcommand)]
pub enum SyncAction {
    /// Push pending reservations and import calendar bookings now
    Now {
        /// Output the run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show connection and last-sync status
    Status,
    /// Show recent sync runs, newest first
    Log {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Run scheduled syncs until interrupted (Ctrl-C)
    Daemon,
}

/// Run the sync command.
pub fn run(action: SyncAction) -> CliResult {
    match action {
        SyncAction::Now { json } => run_now(json),
        SyncAction::Status => {
            let (_, db) = open()?;
            print_json(&sync::connection_status(db.as_ref())?)
        }
        SyncAction::Log { limit } => show_log(limit),
        SyncAction::Daemon => run_daemon(),
    }
}

fn run_now(json: bool) -> CliResult {
    let (_, scheduler) = scheduler()?;
    let result = block_on(scheduler.run_now(SyncTrigger::Manual))?;

    if json {
        print_json(&result)?;
    } else if result.success {
        println!(
            "Sync complete: {} pushed, {} imported",
            result.synced_count.unwrap_or(0),
            result.imported_count.unwrap_or(0)
        );
    } else if result.reconnection_needed == Some(true) {
        println!("Google Calendar needs to be reconnected: run `tablebook-cli auth google login`");
    }

    if result.success {
        Ok(())
    } else {
        Err(result.error.unwrap_or_else(|| "sync failed".to_string()).into())
    }
}

fn show_log(limit: usize) -> CliResult {
    let (_, db) = open()?;
    let entries = db.recent_sync_logs(limit)?;
    if entries.is_empty() {
        println!("No sync runs recorded");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<7} {:>4} reservations{}",
            entry.sync_timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.status.as_str(),
            entry.reservations_synced,
            entry
                .error_message
                .map(|e| format!("  ({e})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn run_daemon() -> CliResult {
    let (_, scheduler) = scheduler()?;
    println!("Auto-sync daemon started, press Ctrl-C to stop");
    let stopped = block_on(async {
        tokio::select! {
            _ = scheduler.run_every() => Ok(()),
            signal = tokio::signal::ctrl_c() => signal,
        }
    })?;
    stopped?;
    println!("Auto-sync daemon stopped");
    Ok(())
}
