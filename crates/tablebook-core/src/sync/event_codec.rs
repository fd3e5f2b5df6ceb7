//! Encoding/decoding between reservations and calendar events.
//!
//! The calendar copy carries reservation data as free text: the summary is
//! `Reservation: {name}` and the description holds `Key: value` lines. All
//! knowledge of that format lives here.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde_json::json;

use crate::reservation::{Reservation, NO_INFORMATION};
use crate::sync::types::{ExternalEvent, ParsedReservation, RESERVATION_PREFIX};

/// Every reservation event spans this many hours.
pub const EVENT_DURATION_HOURS: i64 = 2;

const LOCAL_DATE_TIME: &str = "%Y-%m-%dT%H:%M:%S";

// ============================================================================
// Reservation -> Event
// ============================================================================

pub fn event_summary(name: &str) -> String {
    format!("{RESERVATION_PREFIX}{name}")
}

pub fn event_description(reservation: &Reservation) -> String {
    format!(
        "Guests: {}\nPhone: {}\nEmail: {}\nNotes: {}",
        reservation.guests,
        reservation.phone,
        reservation.email,
        reservation.notes.as_deref().unwrap_or("None"),
    )
}

/// JSON body for an events insert or patch.
///
/// Start and end are sent as local wall-clock times with an explicit
/// `timeZone`, so the provider resolves DST for the restaurant's zone.
pub fn reservation_to_event_body(reservation: &Reservation, tz: Tz) -> serde_json::Value {
    let start = reservation.date.and_time(reservation.time);
    let end = start + Duration::hours(EVENT_DURATION_HOURS);

    json!({
        "summary": event_summary(&reservation.name),
        "description": event_description(reservation),
        "start": {
            "dateTime": start.format(LOCAL_DATE_TIME).to_string(),
            "timeZone": tz.name(),
        },
        "end": {
            "dateTime": end.format(LOCAL_DATE_TIME).to_string(),
            "timeZone": tz.name(),
        },
        "extendedProperties": {
            "private": {
                "tablebook_reservation_id": reservation.id,
            }
        },
    })
}

// ============================================================================
// Event -> Reservation
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct DescriptionFields {
    guests: Option<u32>,
    phone: Option<String>,
    email: Option<String>,
    notes: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_description(description: &str) -> DescriptionFields {
    let mut fields = DescriptionFields::default();

    for line in description.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "guests" => {
                let digits: String = value.trim().chars().take_while(char::is_ascii_digit).collect();
                fields.guests = digits.parse().ok().filter(|g| *g > 0);
            }
            "phone" => fields.phone = non_empty(value),
            "email" => fields.email = non_empty(value),
            "notes" => {
                fields.notes = non_empty(value).filter(|n| !n.eq_ignore_ascii_case("none"));
            }
            _ => {}
        }
    }

    fields
}

/// Resolve a `dateTime` to wall-clock time in `tz`.
///
/// The provider normally returns an RFC 3339 timestamp with offset; a bare
/// local timestamp is read as already being in `tz`.
fn local_start(raw: &str, tz: Tz) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz).naive_local());
    }
    let naive = NaiveDateTime::parse_from_str(raw, LOCAL_DATE_TIME).ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.naive_local())
}

/// Extract a reservation from a calendar event.
///
/// Returns `None` for events that are not reservations: wrong summary
/// prefix, cancelled, or all-day. Missing description fields fall back to
/// placeholders instead of rejecting the event.
pub fn parse_external_event(event: &ExternalEvent, tz: Tz) -> Option<ParsedReservation> {
    if event.is_cancelled() {
        return None;
    }

    let name = event
        .summary
        .as_deref()?
        .strip_prefix(RESERVATION_PREFIX)
        .and_then(non_empty)?;

    let start = local_start(event.start.date_time.as_deref()?, tz)?;
    let time = NaiveTime::from_hms_opt(start.hour(), start.minute(), 0)?;

    let fields = event
        .description
        .as_deref()
        .map(parse_description)
        .unwrap_or_default();

    Some(ParsedReservation {
        event_id: event.id.clone(),
        date: start.date(),
        time,
        name,
        email: fields.email.unwrap_or_else(|| NO_INFORMATION.to_string()),
        phone: fields.phone.unwrap_or_else(|| NO_INFORMATION.to_string()),
        guests: fields.guests.unwrap_or(1),
        notes: fields.notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::EventTime;
    use chrono::{NaiveDate, Utc};

    fn berlin() -> Tz {
        chrono_tz::Europe::Berlin
    }

    fn event(summary: &str, start: &str, description: Option<&str>) -> ExternalEvent {
        ExternalEvent {
            id: "evt-1".to_string(),
            status: Some("confirmed".to_string()),
            summary: Some(summary.to_string()),
            description: description.map(String::from),
            start: EventTime {
                date_time: Some(start.to_string()),
                ..Default::default()
            },
            end: None,
        }
    }

    fn bob() -> Reservation {
        Reservation {
            id: "r-bob".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
            phone: "555-0101".to_string(),
            guests: 4,
            notes: None,
            google_event_id: None,
            imported_from_google: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn outbound_body_for_bob() {
        let body = reservation_to_event_body(&bob(), berlin());

        assert_eq!(body["summary"], "Reservation: Bob");
        assert_eq!(body["start"]["dateTime"], "2024-08-10T20:00:00");
        assert_eq!(body["end"]["dateTime"], "2024-08-10T22:00:00");
        assert_eq!(body["start"]["timeZone"], "Europe/Berlin");
        assert_eq!(
            body["description"],
            "Guests: 4\nPhone: 555-0101\nEmail: bob@example.com\nNotes: None"
        );
    }

    #[test]
    fn late_booking_ends_next_day() {
        let mut late = bob();
        late.time = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let body = reservation_to_event_body(&late, berlin());
        assert_eq!(body["end"]["dateTime"], "2024-08-11T01:00:00");
    }

    #[test]
    fn parses_full_description() {
        let parsed = parse_external_event(
            &event(
                "Reservation: Alice",
                "2024-07-04T19:00:00+02:00",
                Some("Guests: 3\nPhone: 555-0100\nEmail: alice@example.com\nNotes: Window seat"),
            ),
            berlin(),
        )
        .unwrap();

        assert_eq!(parsed.name, "Alice");
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 7, 4).unwrap());
        assert_eq!(parsed.time, NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(parsed.guests, 3);
        assert_eq!(parsed.phone, "555-0100");
        assert_eq!(parsed.email, "alice@example.com");
        assert_eq!(parsed.notes.as_deref(), Some("Window seat"));
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let parsed = parse_external_event(
            &event("Reservation: Carol", "2024-07-04T19:30:00+02:00", Some("Notes: None")),
            berlin(),
        )
        .unwrap();

        assert_eq!(parsed.guests, 1);
        assert_eq!(parsed.phone, NO_INFORMATION);
        assert_eq!(parsed.email, NO_INFORMATION);
        assert_eq!(parsed.notes, None);

        let bare = parse_external_event(&event("Reservation: Dan", "2024-07-04T19:30:00+02:00", None), berlin());
        assert_eq!(bare.unwrap().guests, 1);
    }

    #[test]
    fn converts_utc_start_to_restaurant_time() {
        let parsed = parse_external_event(
            &event("Reservation: Eve", "2024-07-04T17:00:00Z", None),
            berlin(),
        )
        .unwrap();
        assert_eq!(parsed.time, NaiveTime::from_hms_opt(19, 0, 0).unwrap());

        let local = parse_external_event(&event("Reservation: Eve", "2024-07-04T18:30:00", None), berlin()).unwrap();
        assert_eq!(local.time, NaiveTime::from_hms_opt(18, 30, 0).unwrap());
    }

    #[test]
    fn ignores_non_reservation_events() {
        let tz = berlin();
        assert!(parse_external_event(&event("Dentist", "2024-07-04T10:00:00+02:00", None), tz).is_none());
        assert!(parse_external_event(&event("Reservation: ", "2024-07-04T10:00:00+02:00", None), tz).is_none());

        let mut cancelled = event("Reservation: Frank", "2024-07-04T19:00:00+02:00", None);
        cancelled.status = Some("cancelled".to_string());
        assert!(parse_external_event(&cancelled, tz).is_none());

        let mut all_day = event("Reservation: Grace", "", None);
        all_day.start = EventTime {
            date: NaiveDate::from_ymd_opt(2024, 7, 4),
            ..Default::default()
        };
        assert!(parse_external_event(&all_day, tz).is_none());
    }

    #[test]
    fn outbound_description_parses_back() {
        let mut r = bob();
        r.notes = Some("Birthday".to_string());
        let fields = parse_description(&event_description(&r));
        assert_eq!(fields.guests, Some(4));
        assert_eq!(fields.email.as_deref(), Some("bob@example.com"));
        assert_eq!(fields.notes.as_deref(), Some("Birthday"));
    }
}
