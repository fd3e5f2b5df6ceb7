//! Booking-form boundary: validation and capacity-checked creation.
//!
//! Everything here runs before the sync engine ever sees a reservation.
//! A booking that passes is written locally; pushing it to the calendar is
//! the sync engine's job and never rolls the write back.

use crate::availability::availability_excluding;
use crate::error::{CoreError, ValidationError};
use crate::reservation::{format_time_slot, NewReservation, Reservation, ReservationPatch};
use crate::settings::AdminSettings;
use crate::storage::{InsertOutcome, ReservationStore};

/// Upper bound for a single party.
pub const MAX_PARTY_SIZE: u32 = 100;

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn check_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::InvalidValue {
            field: "email".to_string(),
            message: format!("'{email}' is not an email address"),
        }),
    }
}

fn check_guests(guests: u32) -> Result<(), ValidationError> {
    if guests == 0 || guests > MAX_PARTY_SIZE {
        return Err(ValidationError::InvalidValue {
            field: "guests".to_string(),
            message: format!("must be between 1 and {MAX_PARTY_SIZE}"),
        });
    }
    Ok(())
}

/// Field-level checks for a form booking. Capacity is checked on insert.
pub fn validate_booking(settings: &AdminSettings, new: &NewReservation) -> Result<(), ValidationError> {
    require("name", &new.name)?;
    require("email", &new.email)?;
    require("phone", &new.phone)?;
    check_email(&new.email)?;
    check_guests(new.guests)?;
    if !settings.has_time_slot(new.time) {
        return Err(ValidationError::UnknownTimeSlot(format_time_slot(new.time)));
    }
    Ok(())
}

/// Validate and insert a form booking within the day's capacity.
pub fn create_reservation(
    store: &dyn ReservationStore,
    settings: &AdminSettings,
    mut new: NewReservation,
) -> Result<Reservation, CoreError> {
    validate_booking(settings, &new)?;

    new.name = new.name.trim().to_string();
    new.email = new.email.trim().to_string();
    new.phone = new.phone.trim().to_string();
    new.google_event_id = None;
    new.imported_from_google = false;

    match store.insert_within_capacity(&new, settings.max_guests_per_day)? {
        InsertOutcome::Inserted(reservation) => {
            tracing::info!(
                id = %reservation.id,
                date = %reservation.date,
                guests = reservation.guests,
                "reservation created"
            );
            Ok(reservation)
        }
        InsertOutcome::Full { remaining } => Err(ValidationError::CapacityExceeded {
            date: new.date,
            requested: new.guests,
            remaining,
        }
        .into()),
    }
}

/// Validate a staff edit against the record it modifies.
///
/// Capacity is re-checked when the date or party size changes, excluding
/// the record's own current seats.
pub fn validate_edit(
    store: &dyn ReservationStore,
    settings: &AdminSettings,
    existing: &Reservation,
    patch: &ReservationPatch,
) -> Result<(), CoreError> {
    if let Some(name) = &patch.name {
        require("name", name)?;
    }
    if let Some(email) = &patch.email {
        require("email", email)?;
        check_email(email)?;
    }
    if let Some(phone) = &patch.phone {
        require("phone", phone)?;
    }
    if let Some(guests) = patch.guests {
        check_guests(guests)?;
    }
    if let Some(time) = patch.time {
        if time != existing.time && !settings.has_time_slot(time) {
            return Err(ValidationError::UnknownTimeSlot(format_time_slot(time)).into());
        }
    }

    let updated = patch.apply_to(existing);
    let seats_grow = updated.date != existing.date || updated.guests > existing.guests;
    if seats_grow {
        let availability =
            availability_excluding(store, settings, updated.date, Some(&existing.id))?;
        if !availability.can_seat(updated.guests) {
            return Err(ValidationError::CapacityExceeded {
                date: updated.date,
                requested: updated.guests,
                remaining: availability.remaining,
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::compute_availability;
    use crate::storage::Database;
    use chrono::{NaiveDate, NaiveTime};

    fn july_4() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
    }

    fn seven_pm() -> NaiveTime {
        NaiveTime::from_hms_opt(19, 0, 0).unwrap()
    }

    fn request(name: &str, guests: u32) -> NewReservation {
        NewReservation::booking(july_4(), seven_pm(), name, "guest@example.com", "555-0100", guests, None)
    }

    fn settings(max: u32) -> AdminSettings {
        AdminSettings {
            max_guests_per_day: max,
            ..Default::default()
        }
    }

    #[test]
    fn capacity_scenario_rejects_three_accepts_two() {
        let db = Database::open_memory().unwrap();
        let settings = settings(20);
        create_reservation(&db, &settings, request("Big party", 18)).unwrap();

        let err = create_reservation(&db, &settings, request("Late", 3)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::CapacityExceeded {
                requested: 3,
                remaining: 2,
                ..
            })
        ));

        create_reservation(&db, &settings, request("Pair", 2)).unwrap();
        let availability = compute_availability(&db, &settings, july_4()).unwrap();
        assert_eq!(availability.remaining, 0);
    }

    #[test]
    fn rejects_missing_fields_and_bad_slot() {
        let db = Database::open_memory().unwrap();
        let settings = settings(20);

        let mut blank_name = request("  ", 2);
        blank_name.name = "  ".to_string();
        assert!(matches!(
            create_reservation(&db, &settings, blank_name),
            Err(CoreError::Validation(ValidationError::MissingField("name")))
        ));

        let mut bad_email = request("Alice", 2);
        bad_email.email = "alice".to_string();
        assert!(create_reservation(&db, &settings, bad_email).is_err());

        let mut off_slot = request("Alice", 2);
        off_slot.time = NaiveTime::from_hms_opt(15, 10, 0).unwrap();
        assert!(matches!(
            create_reservation(&db, &settings, off_slot),
            Err(CoreError::Validation(ValidationError::UnknownTimeSlot(_)))
        ));

        assert!(create_reservation(&db, &settings, request("Nobody", 0)).is_err());
        assert!(db.list().unwrap().is_empty());
    }

    #[test]
    fn form_bookings_are_never_marked_imported() {
        let db = Database::open_memory().unwrap();
        let mut req = request("Alice", 2);
        req.imported_from_google = true;
        req.google_event_id = Some("forged".to_string());
        let created = create_reservation(&db, &settings(20), req).unwrap();
        assert!(created.is_pending_outbound());
    }

    #[test]
    fn edit_growing_party_is_checked_against_others_only() {
        let db = Database::open_memory().unwrap();
        let settings = settings(20);
        let mine = create_reservation(&db, &settings, request("Mine", 10)).unwrap();
        create_reservation(&db, &settings, request("Other", 8)).unwrap();

        let grow_ok = ReservationPatch {
            guests: Some(12),
            ..Default::default()
        };
        validate_edit(&db, &settings, &mine, &grow_ok).unwrap();

        let grow_too_much = ReservationPatch {
            guests: Some(13),
            ..Default::default()
        };
        assert!(validate_edit(&db, &settings, &mine, &grow_too_much).is_err());

        let shrink = ReservationPatch {
            guests: Some(4),
            ..Default::default()
        };
        validate_edit(&db, &settings, &mine, &shrink).unwrap();
    }
}
