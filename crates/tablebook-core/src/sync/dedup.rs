//! Duplicate detection for imported calendar events.
//!
//! An event is skipped when it is already represented locally, or was
//! deleted locally. Checks run in order: deleted event, same event id,
//! exact (date, time, name), then the same name and
//! time within a window of days. The last tier catches records whose date
//! drifted by a day through time zone conversion.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveTime};

use crate::reservation::Reservation;
use crate::sync::types::ParsedReservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// The reservation linked to this event was deleted here.
    Deleted,
    /// A reservation already carries this event id.
    SameEvent,
    /// Same date, time and name.
    Exact,
    /// Same name and time, date within the window.
    NearMatch,
}

#[derive(Debug, Clone)]
struct Key {
    date: NaiveDate,
    time: NaiveTime,
    name: String,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Snapshot of existing reservations for one import batch.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    deleted: HashSet<String>,
    event_ids: HashSet<String>,
    keys: Vec<Key>,
    window_days: i64,
}

impl DedupIndex {
    pub fn new(existing: &[Reservation], window_days: u32) -> Self {
        let mut index = Self {
            deleted: HashSet::new(),
            event_ids: HashSet::new(),
            keys: Vec::with_capacity(existing.len()),
            window_days: i64::from(window_days),
        };
        for reservation in existing {
            index.record(reservation);
        }
        index
    }

    /// Skip events whose local reservation was deleted.
    pub fn with_deleted(mut self, event_ids: HashSet<String>) -> Self {
        self.deleted = event_ids;
        self
    }

    /// Add a record imported earlier in the same batch.
    pub fn record(&mut self, reservation: &Reservation) {
        if let Some(event_id) = &reservation.google_event_id {
            self.event_ids.insert(event_id.clone());
        }
        self.keys.push(Key {
            date: reservation.date,
            time: reservation.time,
            name: normalize_name(&reservation.name),
        });
    }

    pub fn check(&self, parsed: &ParsedReservation) -> Option<DuplicateKind> {
        if self.deleted.contains(&parsed.event_id) {
            return Some(DuplicateKind::Deleted);
        }
        if self.event_ids.contains(&parsed.event_id) {
            return Some(DuplicateKind::SameEvent);
        }

        let name = normalize_name(&parsed.name);
        let same_slot = |k: &&Key| k.time == parsed.time && k.name == name;

        if self.keys.iter().filter(same_slot).any(|k| k.date == parsed.date) {
            return Some(DuplicateKind::Exact);
        }

        let near = self
            .keys
            .iter()
            .filter(same_slot)
            .any(|k| (k.date - parsed.date).num_days().abs() <= self.window_days);
        near.then_some(DuplicateKind::NearMatch)
    }
}
