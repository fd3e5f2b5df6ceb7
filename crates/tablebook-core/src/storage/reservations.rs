//! Reservation repository over the `reservations` table.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::Database;
use crate::error::DatabaseError;
use crate::reservation::{NewReservation, Reservation, ReservationPatch};

/// Result of a capacity-checked insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Reservation),
    /// Not enough seats left; nothing was written.
    Full { remaining: u32 },
}

/// CRUD and sync queries over reservations.
pub trait ReservationStore: Send + Sync {
    /// Insert a record, assigning its id and creation time.
    fn insert(&self, new: &NewReservation) -> Result<Reservation, DatabaseError>;

    /// Insert only if the day's booked guests plus `new.guests` stay within
    /// `max_guests`. The check and the write happen in one transaction.
    fn insert_within_capacity(
        &self,
        new: &NewReservation,
        max_guests: u32,
    ) -> Result<InsertOutcome, DatabaseError>;

    fn get(&self, id: &str) -> Result<Option<Reservation>, DatabaseError>;

    /// All reservations ordered by date and time.
    fn list(&self) -> Result<Vec<Reservation>, DatabaseError>;

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, DatabaseError>;

    fn find_by_event_id(&self, event_id: &str) -> Result<Option<Reservation>, DatabaseError>;

    /// Sum of guests booked on `date`, optionally ignoring one reservation.
    fn booked_guests(&self, date: NaiveDate, exclude_id: Option<&str>) -> Result<u32, DatabaseError>;

    /// Reservations that still need an outbound event: no event id and not
    /// imported. `created_since` (inclusive) narrows the batch on recurring
    /// runs.
    fn pending_outbound(
        &self,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reservation>, DatabaseError>;

    /// Record the event a reservation was pushed to. Only fills an empty
    /// slot; returns `false` if the record is gone or already linked.
    fn set_google_event_id(&self, id: &str, event_id: &str) -> Result<bool, DatabaseError>;

    /// Apply a partial edit. Returns the updated record, or `None` if missing.
    fn update(&self, id: &str, patch: &ReservationPatch) -> Result<Option<Reservation>, DatabaseError>;

    /// Delete a record, returning what was deleted. A linked record leaves a
    /// tombstone for its event id so the event is not imported back.
    fn delete(&self, id: &str) -> Result<Option<Reservation>, DatabaseError>;

    /// Event ids of deleted reservations.
    fn deleted_event_ids(&self) -> Result<HashSet<String>, DatabaseError>;
}

const COLUMNS: &str = "id, date, time, name, email, phone, guests, notes, \
                       google_event_id, imported_from_google, created_at";

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_reservation(row: &Row<'_>) -> rusqlite::Result<Reservation> {
    let date: String = row.get(1)?;
    let time: String = row.get(2)?;
    let created_at: String = row.get(10)?;

    Ok(Reservation {
        id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        time: NaiveTime::parse_from_str(&time, "%H:%M")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        guests: row.get(6)?,
        notes: row.get(7)?,
        google_event_id: row.get(8)?,
        imported_from_google: row.get(9)?,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

fn fetch_one(conn: &Connection, id: &str) -> rusqlite::Result<Option<Reservation>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM reservations WHERE id = ?1"),
        params![id],
        row_to_reservation,
    )
    .optional()
}

fn fetch_many(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, row_to_reservation)?;
    rows.collect()
}

fn new_record(new: &NewReservation) -> Reservation {
    Reservation {
        id: Uuid::new_v4().to_string(),
        date: new.date,
        time: new.time,
        name: new.name.clone(),
        email: new.email.clone(),
        phone: new.phone.clone(),
        guests: new.guests,
        notes: new.notes.clone(),
        google_event_id: new.google_event_id.clone(),
        imported_from_google: new.imported_from_google,
        created_at: Utc::now(),
    }
}

fn insert_row(conn: &Connection, reservation: &Reservation) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO reservations ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            reservation.id,
            reservation.date.format("%Y-%m-%d").to_string(),
            reservation.time.format("%H:%M").to_string(),
            reservation.name,
            reservation.email,
            reservation.phone,
            reservation.guests,
            reservation.notes,
            reservation.google_event_id,
            reservation.imported_from_google,
            format_timestamp(reservation.created_at),
        ],
    )?;
    Ok(())
}

fn sum_guests(
    conn: &Connection,
    date: NaiveDate,
    exclude_id: Option<&str>,
) -> Result<u32, DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(guests), 0) FROM reservations
         WHERE date = ?1 AND (?2 IS NULL OR id != ?2)",
        params![date.format("%Y-%m-%d").to_string(), exclude_id],
        |row| row.get(0),
    )?;
    u32::try_from(total).map_err(|_| DatabaseError::CorruptValue {
        column: "guests",
        message: format!("guest total {total} out of range"),
    })
}

impl ReservationStore for Database {
    fn insert(&self, new: &NewReservation) -> Result<Reservation, DatabaseError> {
        let reservation = new_record(new);
        let conn = self.conn()?;
        insert_row(&conn, &reservation)?;
        Ok(reservation)
    }

    fn insert_within_capacity(
        &self,
        new: &NewReservation,
        max_guests: u32,
    ) -> Result<InsertOutcome, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let booked = sum_guests(&tx, new.date, None)?;
        let remaining = max_guests.saturating_sub(booked);
        if new.guests > remaining {
            return Ok(InsertOutcome::Full { remaining });
        }

        let reservation = new_record(new);
        insert_row(&tx, &reservation)?;
        tx.commit()?;
        Ok(InsertOutcome::Inserted(reservation))
    }

    fn get(&self, id: &str) -> Result<Option<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        Ok(fetch_one(&conn, id)?)
    }

    fn list(&self) -> Result<Vec<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        Ok(fetch_many(
            &conn,
            &format!("SELECT {COLUMNS} FROM reservations ORDER BY date, time, created_at"),
            [],
        )?)
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        Ok(fetch_many(
            &conn,
            &format!("SELECT {COLUMNS} FROM reservations WHERE date = ?1 ORDER BY time, created_at"),
            params![date.format("%Y-%m-%d").to_string()],
        )?)
    }

    fn find_by_event_id(&self, event_id: &str) -> Result<Option<Reservation>, DatabaseError> {
        Ok(self
            .conn()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM reservations WHERE google_event_id = ?1 LIMIT 1"),
                params![event_id],
                row_to_reservation,
            )
            .optional()?)
    }

    fn booked_guests(&self, date: NaiveDate, exclude_id: Option<&str>) -> Result<u32, DatabaseError> {
        let conn = self.conn()?;
        sum_guests(&conn, date, exclude_id)
    }

    fn pending_outbound(
        &self,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        let rows = match created_since {
            Some(since) => fetch_many(
                &conn,
                &format!(
                    "SELECT {COLUMNS} FROM reservations
                     WHERE google_event_id IS NULL AND imported_from_google = 0
                       AND created_at >= ?1
                     ORDER BY created_at"
                ),
                params![format_timestamp(since)],
            )?,
            None => fetch_many(
                &conn,
                &format!(
                    "SELECT {COLUMNS} FROM reservations
                     WHERE google_event_id IS NULL AND imported_from_google = 0
                     ORDER BY created_at"
                ),
                [],
            )?,
        };
        Ok(rows)
    }

    fn set_google_event_id(&self, id: &str, event_id: &str) -> Result<bool, DatabaseError> {
        let changed = self.conn()?.execute(
            "UPDATE reservations SET google_event_id = ?2
             WHERE id = ?1 AND google_event_id IS NULL",
            params![id, event_id],
        )?;
        Ok(changed == 1)
    }

    fn update(&self, id: &str, patch: &ReservationPatch) -> Result<Option<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let Some(existing) = fetch_one(&tx, id)? else {
            return Ok(None);
        };
        let updated = patch.apply_to(&existing);

        tx.execute(
            "UPDATE reservations
             SET date = ?2, time = ?3, name = ?4, email = ?5, phone = ?6, guests = ?7, notes = ?8
             WHERE id = ?1",
            params![
                id,
                updated.date.format("%Y-%m-%d").to_string(),
                updated.time.format("%H:%M").to_string(),
                updated.name,
                updated.email,
                updated.phone,
                updated.guests,
                updated.notes,
            ],
        )?;
        tx.commit()?;

        Ok(Some(updated))
    }

    fn delete(&self, id: &str) -> Result<Option<Reservation>, DatabaseError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let existing = fetch_one(&tx, id)?;
        if let Some(removed) = &existing {
            tx.execute("DELETE FROM reservations WHERE id = ?1", params![id])?;
            if let Some(event_id) = &removed.google_event_id {
                tx.execute(
                    "INSERT OR REPLACE INTO deleted_events (google_event_id, deleted_at)
                     VALUES (?1, ?2)",
                    params![event_id, format_timestamp(Utc::now())],
                )?;
            }
        }
        tx.commit()?;

        Ok(existing)
    }

    fn deleted_event_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT google_event_id FROM deleted_events")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking(name: &str, day: u32, guests: u32) -> NewReservation {
        NewReservation::booking(
            NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            name,
            format!("{}@example.com", name.to_lowercase()),
            "555-0100",
            guests,
            None,
        )
    }

    #[test]
    fn insert_and_get() {
        let db = Database::open_memory().unwrap();
        let created = db.insert(&booking("Alice", 4, 2)).unwrap();
        let fetched = db.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(fetched.is_pending_outbound());
    }

    #[test]
    fn booked_guests_sums_one_date_and_honors_exclusion() {
        let db = Database::open_memory().unwrap();
        let a = db.insert(&booking("Alice", 4, 8)).unwrap();
        db.insert(&booking("Bob", 4, 10)).unwrap();
        db.insert(&booking("Carol", 5, 6)).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(db.booked_guests(date, None).unwrap(), 18);
        assert_eq!(db.booked_guests(date, Some(&a.id)).unwrap(), 10);
        assert_eq!(
            db.booked_guests(NaiveDate::from_ymd_opt(2024, 7, 6).unwrap(), None).unwrap(),
            0
        );
    }

    #[test]
    fn insert_within_capacity_refuses_overbooking() {
        let db = Database::open_memory().unwrap();
        db.insert(&booking("Alice", 4, 18)).unwrap();

        let outcome = db.insert_within_capacity(&booking("Bob", 4, 3), 20).unwrap();
        assert_eq!(outcome, InsertOutcome::Full { remaining: 2 });

        let outcome = db.insert_within_capacity(&booking("Bob", 4, 2), 20).unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(db.booked_guests(date, None).unwrap(), 20);
    }

    #[test]
    fn pending_outbound_excludes_imported_and_linked() {
        let db = Database::open_memory().unwrap();
        let local = db.insert(&booking("Local", 4, 2)).unwrap();

        let mut imported = booking("Imported", 4, 2);
        imported.imported_from_google = true;
        db.insert(&imported).unwrap();

        let linked = db.insert(&booking("Linked", 4, 2)).unwrap();
        db.set_google_event_id(&linked.id, "evt-1").unwrap();

        let pending = db.pending_outbound(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, local.id);
    }

    #[test]
    fn pending_outbound_since_filters_older_records() {
        let db = Database::open_memory().unwrap();
        let old = db.insert(&booking("Old", 4, 2)).unwrap();
        let cutoff = old.created_at + Duration::microseconds(1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let new = db.insert(&booking("New", 4, 2)).unwrap();

        let pending = db.pending_outbound(Some(cutoff)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, new.id);

        let inclusive = db.pending_outbound(Some(old.created_at)).unwrap();
        assert_eq!(inclusive.len(), 2);
    }

    #[test]
    fn set_google_event_id_only_fills_empty_slot() {
        let db = Database::open_memory().unwrap();
        let r = db.insert(&booking("Alice", 4, 2)).unwrap();
        assert!(db.set_google_event_id(&r.id, "evt-1").unwrap());
        assert!(!db.set_google_event_id(&r.id, "evt-2").unwrap());
        assert_eq!(
            db.get(&r.id).unwrap().unwrap().google_event_id.as_deref(),
            Some("evt-1")
        );
        assert_eq!(db.find_by_event_id("evt-1").unwrap().unwrap().id, r.id);
    }

    #[test]
    fn update_and_delete() {
        let db = Database::open_memory().unwrap();
        let r = db.insert(&booking("Alice", 4, 2)).unwrap();

        let patch = ReservationPatch {
            guests: Some(5),
            notes: Some(Some("birthday".to_string())),
            ..Default::default()
        };
        let updated = db.update(&r.id, &patch).unwrap().unwrap();
        assert_eq!(updated.guests, 5);
        assert_eq!(db.get(&r.id).unwrap().unwrap().notes.as_deref(), Some("birthday"));

        assert!(db.update("missing", &patch).unwrap().is_none());

        let deleted = db.delete(&r.id).unwrap().unwrap();
        assert_eq!(deleted.id, r.id);
        assert!(db.get(&r.id).unwrap().is_none());
        assert!(db.delete(&r.id).unwrap().is_none());
        assert!(db.deleted_event_ids().unwrap().is_empty());
    }

    #[test]
    fn deleting_a_linked_record_leaves_a_tombstone() {
        let db = Database::open_memory().unwrap();
        let r = db.insert(&booking("Alice", 4, 2)).unwrap();
        db.set_google_event_id(&r.id, "evt-gone").unwrap();

        db.delete(&r.id).unwrap();
        let ids = db.deleted_event_ids().unwrap();
        assert!(ids.contains("evt-gone"));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn event_id_is_unique_across_reservations() {
        let db = Database::open_memory().unwrap();
        let mut first = booking("Alice", 4, 2);
        first.google_event_id = Some("evt-1".to_string());
        first.imported_from_google = true;
        db.insert(&first).unwrap();

        let mut second = booking("Alice again", 5, 2);
        second.google_event_id = Some("evt-1".to_string());
        second.imported_from_google = true;
        assert!(db.insert(&second).is_err());

        // Unlinked records are not constrained.
        db.insert(&booking("Bob", 4, 2)).unwrap();
        db.insert(&booking("Carol", 4, 2)).unwrap();
        assert_eq!(db.list().unwrap().len(), 3);
    }
}
