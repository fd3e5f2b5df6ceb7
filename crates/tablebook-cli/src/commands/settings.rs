//! Admin settings commands: booking slots, daily capacity and auto-sync.

use chrono::NaiveTime;
use clap::Subcommand;
use tablebook_core::storage::SettingsStore;
use tablebook_core::SettingsUpdate;

use super::{open, parse_time, print_json, CliResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show the current admin settings
    Show,
    /// Change one or more admin settings
    Set {
        /// Maximum guests across all reservations on one day
        #[arg(long)]
        max_guests: Option<u32>,
        /// Comma-separated booking slots (e.g. "17:00,17:30,18:00")
        #[arg(long, value_delimiter = ',', value_parser = parse_time)]
        time_slots: Option<Vec<NaiveTime>>,
        /// Enable or disable scheduled sync
        #[arg(long)]
        auto_sync: Option<bool>,
        /// Minutes between scheduled sync runs
        #[arg(long)]
        interval: Option<u32>,
    },
}

pub fn run(action: SettingsAction) -> CliResult {
    let (_, db) = open()?;
    match action {
        SettingsAction::Show => {
            print_json(&db.settings()?)?;
        }
        SettingsAction::Set {
            max_guests,
            time_slots,
            auto_sync,
            interval,
        } => {
            let update = SettingsUpdate {
                max_guests_per_day: max_guests,
                time_slots: time_slots.map(|mut slots| {
                    slots.sort();
                    slots.dedup();
                    slots
                }),
                auto_sync_enabled: auto_sync,
                auto_sync_interval_minutes: interval,
                ..Default::default()
            };
            if update.is_empty() {
                return Err("nothing to update".into());
            }
            update.validate()?;
            db.update_settings(&update)?;
            println!("ok");
        }
    }
    Ok(())
}
