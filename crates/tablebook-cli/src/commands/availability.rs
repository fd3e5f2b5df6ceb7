use chrono::NaiveDate;
use clap::Args;
use tablebook_core::compute_availability;
use tablebook_core::storage::SettingsStore;

use super::{open, parse_date, print_json, CliResult};

#[derive(Args)]
pub struct AvailabilityArgs {
    /// Date (YYYY-MM-DD)
    #[arg(value_parser = parse_date)]
    date: NaiveDate,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: AvailabilityArgs) -> CliResult {
    let (_, db) = open()?;
    let settings = db.settings()?;
    let availability = compute_availability(db.as_ref(), &settings, args.date)?;

    if args.json {
        print_json(&availability)?;
    } else {
        println!(
            "{}: {} of {} seats left ({} booked)",
            availability.date, availability.remaining, availability.total, availability.booked
        );
    }
    Ok(())
}
