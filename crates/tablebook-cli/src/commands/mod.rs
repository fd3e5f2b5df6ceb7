pub mod auth;
pub mod availability;
pub mod config;
pub mod reservation;
pub mod settings;
pub mod sync;

use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tablebook_core::{AutoSyncScheduler, Config, Database};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Drive an async core operation to completion.
pub fn block_on<F: Future>(future: F) -> Result<F::Output, std::io::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

/// Configuration and the database it points at.
pub fn open() -> Result<(Config, Arc<Database>), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open_configured(&config)?);
    Ok((config, db))
}

/// Scheduler over the configured database, for commands that talk to Google.
pub fn scheduler() -> Result<(Arc<Database>, Arc<AutoSyncScheduler>), Box<dyn std::error::Error>> {
    let (config, db) = open()?;
    let scheduler = AutoSyncScheduler::for_google(&config, db.clone())?;
    Ok((db, Arc::new(scheduler)))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{raw}' is not a YYYY-MM-DD date"))
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    tablebook_core::reservation::parse_time_slot(raw).map_err(|e| e.to_string())
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
