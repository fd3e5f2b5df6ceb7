//! Reservation management commands for CLI.

use chrono::{NaiveDate, NaiveTime};
use clap::Subcommand;
use tablebook_core::reservation::format_time_slot;
use tablebook_core::storage::{ReservationStore, SettingsStore};
use tablebook_core::{create_reservation, NewReservation, Reservation, ReservationPatch};

use super::{block_on, open, parse_date, parse_time, print_json, scheduler, CliResult};

#[derive(Subcommand)]
pub enum ReservationAction {
    /// Book a table (checked against the daily capacity)
    Create {
        /// Date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        /// Time slot (HH:MM)
        #[arg(long, value_parser = parse_time)]
        time: NaiveTime,
        /// Guest name
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        /// Party size
        #[arg(long)]
        guests: u32,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List reservations
    List {
        /// Only this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one reservation
    Show {
        /// Reservation ID
        id: String,
    },
    /// Edit a reservation and mirror the change to Google Calendar
    Update {
        /// Reservation ID
        id: String,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveTime>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        guests: Option<u32>,
        /// New notes (empty string clears them)
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete a reservation and its calendar event
    Delete {
        /// Reservation ID
        id: String,
    },
}

pub fn run(action: ReservationAction) -> CliResult {
    match action {
        ReservationAction::Create {
            date,
            time,
            name,
            email,
            phone,
            guests,
            notes,
        } => {
            let (_, db) = open()?;
            let settings = db.settings()?;
            let request = NewReservation::booking(date, time, name, email, phone, guests, notes);
            let reservation = create_reservation(db.as_ref(), &settings, request)?;
            println!("Reservation created: {}", reservation.id);
            print_json(&reservation)?;
        }
        ReservationAction::List { date, json } => {
            let (_, db) = open()?;
            let reservations = match date {
                Some(date) => db.list_by_date(date)?,
                None => db.list()?,
            };
            if json {
                print_json(&reservations)?;
            } else if reservations.is_empty() {
                println!("No reservations");
            } else {
                for r in &reservations {
                    println!("{}", summary_line(r));
                }
            }
        }
        ReservationAction::Show { id } => {
            let (_, db) = open()?;
            let reservation = db
                .get(&id)?
                .ok_or_else(|| format!("reservation not found: {id}"))?;
            print_json(&reservation)?;
        }
        ReservationAction::Update {
            id,
            date,
            time,
            name,
            email,
            phone,
            guests,
            notes,
        } => {
            let patch = ReservationPatch {
                date,
                time,
                name,
                email,
                phone,
                guests,
                notes: notes.map(|n| if n.trim().is_empty() { None } else { Some(n) }),
            };
            if patch.is_empty() {
                return Err("nothing to update".into());
            }
            let (_, scheduler) = scheduler()?;
            let updated = block_on(scheduler.engine().update_reservation(&id, &patch))??;
            println!("Reservation updated: {}", updated.id);
            print_json(&updated)?;
        }
        ReservationAction::Delete { id } => {
            let (_, scheduler) = scheduler()?;
            let removed = block_on(scheduler.engine().delete_reservation(&id))??;
            println!("Reservation deleted: {}", removed.id);
        }
    }
    Ok(())
}

fn summary_line(r: &Reservation) -> String {
    let origin = if r.imported_from_google {
        " [google]"
    } else if r.google_event_id.is_some() {
        " [synced]"
    } else {
        ""
    };
    format!(
        "{}  {} {}  {:<24} {:>3} guests{}",
        r.id,
        r.date,
        format_time_slot(r.time),
        r.name,
        r.guests,
        origin
    )
}
