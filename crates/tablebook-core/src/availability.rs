//! Remaining seat capacity per date.
//!
//! Always computed from the store: capacity changes whenever a reservation
//! is created, edited or deleted, and a cached figure would allow
//! overbooking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::settings::AdminSettings;
use crate::storage::ReservationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub date: NaiveDate,
    pub total: u32,
    pub booked: u32,
    pub remaining: u32,
}

impl Availability {
    pub fn from_totals(date: NaiveDate, total: u32, booked: u32) -> Self {
        Self {
            date,
            total,
            booked,
            remaining: total.saturating_sub(booked),
        }
    }

    pub fn can_seat(&self, guests: u32) -> bool {
        guests <= self.remaining
    }
}

/// Capacity left on `date` given the configured daily maximum.
pub fn compute_availability(
    store: &dyn ReservationStore,
    settings: &AdminSettings,
    date: NaiveDate,
) -> Result<Availability, DatabaseError> {
    availability_excluding(store, settings, date, None)
}

/// Like [`compute_availability`] but ignoring one reservation, for edits
/// where the record's own seats must not count against it.
pub fn availability_excluding(
    store: &dyn ReservationStore,
    settings: &AdminSettings,
    date: NaiveDate,
    exclude_id: Option<&str>,
) -> Result<Availability, DatabaseError> {
    let booked = store.booked_guests(date, exclude_id)?;
    Ok(Availability::from_totals(date, settings.max_guests_per_day, booked))
}
