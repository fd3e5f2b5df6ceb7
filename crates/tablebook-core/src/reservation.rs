//! Reservation records and the inputs that create or modify them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Placeholder for contact fields that an imported calendar event did not carry.
pub const NO_INFORMATION: &str = "No information";

/// A table reservation. The local store is the source of truth; the Google
/// Calendar copy is a mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub guests: u32,
    pub notes: Option<String>,
    /// Event this reservation is mirrored to. `None` means not pushed yet.
    pub google_event_id: Option<String>,
    /// Set for records created from a calendar event. Such records are never
    /// pushed back out.
    pub imported_from_google: bool,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether outbound sync still has to create an event for this record.
    pub fn is_pending_outbound(&self) -> bool {
        self.google_event_id.is_none() && !self.imported_from_google
    }
}

/// Fields for a reservation about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub guests: u32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub google_event_id: Option<String>,
    #[serde(default)]
    pub imported_from_google: bool,
}

impl NewReservation {
    /// A booking submitted through the reservation form.
    pub fn booking(
        date: NaiveDate,
        time: NaiveTime,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        guests: u32,
        notes: Option<String>,
    ) -> Self {
        Self {
            date,
            time,
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            guests,
            notes: normalize_notes(notes),
            google_event_id: None,
            imported_from_google: false,
        }
    }
}

/// Partial edit of an existing reservation. `None` leaves a field untouched;
/// `notes: Some(None)` clears the notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPatch {
    pub date: Option<NaiveDate>,
    #[serde(default, with = "hhmm::option")]
    pub time: Option<NaiveTime>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub guests: Option<u32>,
    pub notes: Option<Option<String>>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the patch to a copy of `reservation`.
    pub fn apply_to(&self, reservation: &Reservation) -> Reservation {
        let mut updated = reservation.clone();
        if let Some(date) = self.date {
            updated.date = date;
        }
        if let Some(time) = self.time {
            updated.time = time;
        }
        if let Some(name) = &self.name {
            updated.name = name.clone();
        }
        if let Some(email) = &self.email {
            updated.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            updated.phone = phone.clone();
        }
        if let Some(guests) = self.guests {
            updated.guests = guests;
        }
        if let Some(notes) = &self.notes {
            updated.notes = normalize_notes(notes.clone());
        }
        updated
    }
}

/// Parse an `HH:MM` time slot.
pub fn parse_time_slot(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ValidationError::InvalidValue {
        field: "time".to_string(),
        message: format!("'{value}' is not an HH:MM time"),
    })
}

/// Format a time as an `HH:MM` slot.
pub fn format_time_slot(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Serde adapter storing `NaiveTime` as `"HH:MM"`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_some(&t.format("%H:%M").to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
