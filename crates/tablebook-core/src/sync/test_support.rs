//! In-memory stand-ins for the calendar and token services.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::OAuthError;
use crate::integrations::oauth::AccessToken;
use crate::integrations::{CalendarApi, TokenRefresher};
use crate::reservation::Reservation;
use crate::settings::SettingsUpdate;
use crate::storage::{Database, ReservationStore, SettingsStore, SyncConfig, SyncLogStore};
use crate::sync::event_codec::{event_description, event_summary, reservation_to_event_body};
use crate::sync::sync_engine::SyncEngine;
use crate::sync::types::{CalendarError, EventTime, ExternalEvent};

/// Calendar that keeps its events in memory. Created events show up in
/// later listings, like the real thing.
#[derive(Default)]
pub struct FakeCalendar {
    pub events: Mutex<Vec<ExternalEvent>>,
    pub created: Mutex<Vec<Reservation>>,
    pub updated: Mutex<Vec<(String, Reservation)>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_create_for: Mutex<HashSet<String>>,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub list_delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeCalendar {
    pub fn with_events(events: Vec<ExternalEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created.lock().unwrap().iter().map(|r| r.name.clone()).collect()
    }
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn create_event(&self, _token: &str, reservation: &Reservation) -> Result<String, CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_for.lock().unwrap().contains(&reservation.name) {
            return Err(CalendarError::Api {
                status: 500,
                body: "backendError".to_string(),
            });
        }

        let id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let body = reservation_to_event_body(reservation, chrono_tz::Europe::Berlin);
        self.events.lock().unwrap().push(ExternalEvent {
            id: id.clone(),
            status: Some("confirmed".to_string()),
            summary: Some(event_summary(&reservation.name)),
            description: Some(event_description(reservation)),
            start: EventTime {
                date_time: body["start"]["dateTime"].as_str().map(String::from),
                time_zone: Some("Europe/Berlin".to_string()),
                ..Default::default()
            },
            end: None,
        });
        self.created.lock().unwrap().push(reservation.clone());
        Ok(id)
    }

    async fn update_event(&self, _token: &str, event_id: &str, reservation: &Reservation) -> Result<(), CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.updated
            .lock()
            .unwrap()
            .push((event_id.to_string(), reservation.clone()));
        Ok(())
    }

    async fn delete_event(&self, _token: &str, event_id: &str) -> Result<(), CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CalendarError::Network("connection reset".to_string()));
        }
        self.deleted.lock().unwrap().push(event_id.to_string());
        self.events.lock().unwrap().retain(|e| e.id != event_id);
        Ok(())
    }

    async fn list_events(&self, _token: &str) -> Result<Vec<ExternalEvent>, CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(CalendarError::Timeout);
        }
        Ok(self.events.lock().unwrap().clone())
    }
}

/// Token service with a fixed answer.
pub struct FakeOAuth {
    outcome: Result<AccessToken, OAuthError>,
    pub refresh_calls: AtomicUsize,
    pub revoked: Mutex<Vec<String>>,
}

impl FakeOAuth {
    pub fn ok() -> Self {
        Self {
            outcome: Ok(AccessToken {
                token: "access".to_string(),
                expires_at: Some(Utc::now().timestamp() + 3600),
            }),
            refresh_calls: AtomicUsize::new(0),
            revoked: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: OAuthError) -> Self {
        Self {
            outcome: Err(err),
            ..Self::ok()
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeOAuth {
    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<AccessToken, OAuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }

    async fn revoke_token(&self, token: &str) -> Result<(), OAuthError> {
        self.revoked.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub calendar: Arc<FakeCalendar>,
    pub oauth: Arc<FakeOAuth>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(calendar: FakeCalendar, oauth: FakeOAuth) -> Self {
        Self::with_config(calendar, oauth, SyncConfig::default())
    }

    pub fn with_config(calendar: FakeCalendar, oauth: FakeOAuth, config: SyncConfig) -> Self {
        Self::on_database(Arc::new(Database::open_memory().unwrap()), calendar, oauth, config)
    }

    /// Harness over an existing handle, e.g. a second connection to one file.
    pub fn on_database(db: Arc<Database>, calendar: FakeCalendar, oauth: FakeOAuth, config: SyncConfig) -> Self {
        let calendar = Arc::new(calendar);
        let oauth = Arc::new(oauth);

        let reservations: Arc<dyn ReservationStore> = db.clone();
        let settings: Arc<dyn SettingsStore> = db.clone();
        let engine = Arc::new(SyncEngine::new(
            reservations,
            settings,
            calendar.clone(),
            oauth.clone(),
            config,
            chrono_tz::Europe::Berlin,
        ));

        Self {
            db,
            calendar,
            oauth,
            engine,
        }
    }

    pub fn connect(&self) {
        self.db
            .update_settings(&SettingsUpdate::connected(
                "refresh".to_string(),
                Some("host@restaurant.example".to_string()),
            ))
            .unwrap();
    }

    pub fn logs(&self) -> Arc<dyn SyncLogStore> {
        self.db.clone()
    }
}
