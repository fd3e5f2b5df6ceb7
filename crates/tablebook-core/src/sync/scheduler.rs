//! Auto-sync scheduler.
//!
//! Runs move through `Idle -> Running -> {Success, Failed}`. At most one run
//! is in flight across every process sharing the database: an in-process
//! flag gates this scheduler and a lease in the settings row gates the
//! others. An overlapping trigger returns immediately. Every run that
//! reaches the calendar step leaves a sync log row and updates the status
//! fields in the settings row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::integrations::{GoogleCalendarClient, GoogleOAuth};
use crate::settings::{LastSyncStatus, SettingsUpdate};
use crate::storage::{Config, Database, NewSyncLogEntry, ReservationStore, SettingsStore, SyncLogStore};
use crate::sync::sync_engine::{SyncCounts, SyncEngine};
use crate::sync::types::{RunState, SyncError, SyncRunResult, SyncTrigger};

const FALLBACK_INTERVAL_MINUTES: u32 = 60;

/// Extra time past the run timeout before another process may take over a
/// lease whose holder never released it.
const LEASE_GRACE: Duration = Duration::from_secs(30);

/// Releases the run gate and the database lease when dropped, even if the
/// run task is aborted.
struct RunGuard {
    flag: Arc<AtomicBool>,
    lease: Option<(Arc<dyn SettingsStore>, DateTime<Utc>)>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some((store, claimed_at)) = self.lease.take() {
            if let Err(e) = store.release_sync_lease(claimed_at) {
                tracing::warn!(error = %e, "failed to release sync lease");
            }
        }
        self.flag.store(false, Ordering::Release);
    }
}

pub struct AutoSyncScheduler {
    engine: Arc<SyncEngine>,
    settings: Arc<dyn SettingsStore>,
    logs: Arc<dyn SyncLogStore>,
    run_timeout: Duration,
    running: Arc<AtomicBool>,
    state: Mutex<RunState>,
    last_result: Mutex<Option<SyncRunResult>>,
}

impl AutoSyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        settings: Arc<dyn SettingsStore>,
        logs: Arc<dyn SyncLogStore>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            settings,
            logs,
            run_timeout,
            running: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunState::Idle),
            last_result: Mutex::new(None),
        }
    }

    /// Wire the Google-backed engine and scheduler over one database.
    pub fn for_google(config: &Config, db: Arc<Database>) -> Result<Self, CoreError> {
        let tz = config.timezone()?;
        let calendar = GoogleCalendarClient::new(&config.google, &config.sync, tz)?;
        let oauth = GoogleOAuth::from_google(&config.google);

        let reservations: Arc<dyn ReservationStore> = db.clone();
        let settings: Arc<dyn SettingsStore> = db.clone();
        let engine = SyncEngine::new(
            reservations,
            settings.clone(),
            Arc::new(calendar),
            Arc::new(oauth),
            config.sync.clone(),
            tz,
        );

        Ok(Self::new(Arc::new(engine), settings, db, config.sync.run_timeout()))
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_result(&self) -> Option<SyncRunResult> {
        self.last_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Take the in-process gate, then the shared lease.
    fn acquire(&self) -> Result<RunGuard, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let mut guard = RunGuard {
            flag: self.running.clone(),
            lease: None,
        };

        let claimed_at = Utc::now();
        let hold = chrono::Duration::from_std(self.run_timeout + LEASE_GRACE)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        if !self.settings.claim_sync_lease(claimed_at, claimed_at - hold)? {
            return Err(SyncError::AlreadyRunning);
        }
        guard.lease = Some((self.settings.clone(), claimed_at));
        Ok(guard)
    }

    /// Run a sync to completion and report the outcome.
    pub async fn run_now(&self, trigger: SyncTrigger) -> SyncRunResult {
        match self.acquire() {
            Ok(guard) => self.execute(trigger, guard).await,
            Err(err) => {
                tracing::info!(?trigger, error = %err, "sync not started");
                SyncRunResult::failed(&err)
            }
        }
    }

    /// Start a run in the background and return at once. Returns `false`
    /// when a run is already in flight. Poll [`Self::state`] for progress.
    pub fn trigger(self: &Arc<Self>, trigger: SyncTrigger) -> bool {
        let guard = match self.acquire() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::info!(?trigger, error = %err, "sync not started");
                return false;
            }
        };
        self.set_state(RunState::Running);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(trigger, guard).await;
        });
        true
    }

    /// Scheduled runs forever, re-reading the interval before every wait.
    pub async fn run_every(&self) {
        loop {
            self.run_now(SyncTrigger::Scheduled).await;
            let minutes = self.interval_minutes();
            tracing::debug!(minutes, "next scheduled sync");
            tokio::time::sleep(Duration::from_secs(u64::from(minutes) * 60)).await;
        }
    }

    fn interval_minutes(&self) -> u32 {
        match self.settings.settings() {
            Ok(s) if s.auto_sync_interval_minutes > 0 => s.auto_sync_interval_minutes,
            Ok(_) => FALLBACK_INTERVAL_MINUTES,
            Err(e) => {
                tracing::warn!(error = %e, "could not read sync interval");
                FALLBACK_INTERVAL_MINUTES
            }
        }
    }

    async fn execute(&self, trigger: SyncTrigger, guard: RunGuard) -> SyncRunResult {
        self.set_state(RunState::Running);
        let started_at = Utc::now();
        tracing::info!(?trigger, "sync started");

        let outcome = match tokio::time::timeout(self.run_timeout, self.attempt(trigger)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SyncError::Timeout {
                timeout_secs: self.run_timeout.as_secs(),
            }),
        };

        let result = match outcome {
            Ok(None) => {
                tracing::info!("auto-sync disabled, scheduled run skipped");
                SyncRunResult::skipped()
            }
            Ok(Some(counts)) => {
                self.record(started_at, LastSyncStatus::Success, counts.synced + counts.imported, None);
                tracing::info!(synced = counts.synced, imported = counts.imported, "sync finished");
                SyncRunResult::completed(counts.synced, counts.imported)
            }
            Err(err) => {
                self.record(started_at, LastSyncStatus::Error, 0, Some(err.to_string()));
                tracing::warn!(error = %err, "sync failed");
                SyncRunResult::failed(&err)
            }
        };

        self.set_state(if result.success {
            RunState::Success
        } else {
            RunState::Failed
        });
        *self.last_result.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
        drop(guard);
        result
    }

    /// `Ok(None)` means the run was a no-op.
    async fn attempt(&self, trigger: SyncTrigger) -> Result<Option<SyncCounts>, SyncError> {
        let settings = self.settings.settings()?;
        if trigger == SyncTrigger::Scheduled && !settings.auto_sync_enabled {
            return Ok(None);
        }
        self.engine.run(&settings).await.map(Some)
    }

    /// Write the log row and status fields, stamped with the run's start.
    /// A failure here is logged and does not change the run's outcome.
    fn record(&self, started_at: DateTime<Utc>, status: LastSyncStatus, count: u32, error: Option<String>) {
        let entry = NewSyncLogEntry {
            status,
            reservations_synced: count,
            error_message: error.clone(),
            sync_timestamp: started_at,
        };
        if let Err(e) = self.logs.append_sync_log(&entry) {
            tracing::warn!(error = %e, "failed to append sync log");
        }
        if let Err(e) = self
            .settings
            .update_settings(&SettingsUpdate::sync_outcome(started_at, status, error))
        {
            tracing::warn!(error = %e, "failed to record sync status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuthError;
    use crate::reservation::NewReservation;
    use crate::storage::SyncConfig;
    use crate::sync::test_support::{FakeCalendar, FakeOAuth, Harness};
    use crate::sync::types::TOKEN_EXPIRED_MESSAGE;
    use chrono::{NaiveDate, NaiveTime};

    fn scheduler(h: &Harness, timeout: Duration) -> Arc<AutoSyncScheduler> {
        Arc::new(AutoSyncScheduler::new(
            h.engine.clone(),
            h.engine.settings_store().clone(),
            h.logs(),
            timeout,
        ))
    }

    fn bob() -> NewReservation {
        NewReservation::booking(
            NaiveDate::from_ymd_opt(2024, 8, 10).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            "Bob",
            "bob@example.com",
            "555-0101",
            4,
            None,
        )
    }

    #[tokio::test]
    async fn manual_run_succeeds_and_logs() {
        let h = Harness::new(FakeCalendar::default(), FakeOAuth::ok());
        h.connect();
        h.db.insert(&bob()).unwrap();
        let s = scheduler(&h, Duration::from_secs(30));

        assert_eq!(s.state(), RunState::Idle);
        let result = s.run_now(SyncTrigger::Manual).await;
        assert!(result.success);
        assert_eq!(result.synced_count, Some(1));
        assert_eq!(result.imported_count, Some(0));
        assert_eq!(s.state(), RunState::Success);

        let settings = h.db.settings().unwrap();
        assert_eq!(settings.last_sync_status, LastSyncStatus::Success);
        assert!(settings.last_sync_timestamp.is_some());
        assert_eq!(settings.sync_error, None);

        let logs = h.db.recent_sync_logs(5).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].reservations_synced, 1);
    }

    #[tokio::test]
    async fn scheduled_run_is_noop_when_disabled() {
        let h = Harness::new(FakeCalendar::default(), FakeOAuth::ok());
        h.connect();
        let s = scheduler(&h, Duration::from_secs(30));

        let result = s.run_now(SyncTrigger::Scheduled).await;
        assert!(result.success);
        assert_eq!(result.synced_count, None);
        assert_eq!(s.state(), RunState::Success);
        assert_eq!(h.oauth.refresh_calls(), 0);
        assert!(h.db.recent_sync_logs(5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_token_needs_reconnection_then_short_circuits() {
        let h = Harness::new(FakeCalendar::default(), FakeOAuth::failing(OAuthError::TokenExpired));
        h.connect();
        let s = scheduler(&h, Duration::from_secs(30));

        let first = s.run_now(SyncTrigger::Manual).await;
        assert!(!first.success);
        assert_eq!(first.reconnection_needed, Some(true));
        assert_eq!(s.state(), RunState::Failed);

        let settings = h.db.settings().unwrap();
        assert!(!settings.google_connected);
        assert_eq!(settings.sync_error.as_deref(), Some(TOKEN_EXPIRED_MESSAGE));
        assert_eq!(settings.last_sync_status, LastSyncStatus::Error);

        let second = s.run_now(SyncTrigger::Manual).await;
        assert_eq!(second.reconnection_needed, Some(true));
        assert_eq!(second.error.as_deref(), Some(TOKEN_EXPIRED_MESSAGE));

        h.db
            .update_settings(&SettingsUpdate {
                auto_sync_enabled: Some(true),
                ..Default::default()
            })
            .unwrap();
        let scheduled = s.run_now(SyncTrigger::Scheduled).await;
        assert!(!scheduled.success);
        assert_eq!(scheduled.reconnection_needed, Some(true));
        assert_eq!(scheduled.error.as_deref(), Some(TOKEN_EXPIRED_MESSAGE));

        assert_eq!(h.oauth.refresh_calls(), 1);
        assert_eq!(h.calendar.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_trigger_is_rejected() {
        let calendar = FakeCalendar::default();
        *calendar.list_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let h = Harness::new(calendar, FakeOAuth::ok());
        h.connect();
        let s = scheduler(&h, Duration::from_secs(60));

        assert!(s.trigger(SyncTrigger::Manual));
        assert_eq!(s.state(), RunState::Running);
        assert!(!s.trigger(SyncTrigger::Manual));

        let overlapping = s.run_now(SyncTrigger::Manual).await;
        assert_eq!(overlapping.error.as_deref(), Some("Sync already in progress"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(s.state(), RunState::Success);
        assert!(!s.is_running());
        assert_eq!(h.db.recent_sync_logs(5).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_blocks_a_run_from_another_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tablebook.db");
        let calendar = FakeCalendar::default();
        *calendar.list_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let first = Harness::on_database(
            Arc::new(Database::open_at(&path).unwrap()),
            calendar,
            FakeOAuth::ok(),
            SyncConfig::default(),
        );
        let second = Harness::on_database(
            Arc::new(Database::open_at(&path).unwrap()),
            FakeCalendar::default(),
            FakeOAuth::ok(),
            SyncConfig::default(),
        );
        first.connect();
        let s1 = scheduler(&first, Duration::from_secs(60));
        let s2 = scheduler(&second, Duration::from_secs(60));

        assert!(s1.trigger(SyncTrigger::Manual));
        let blocked = s2.run_now(SyncTrigger::Manual).await;
        assert!(!blocked.success);
        assert_eq!(blocked.error.as_deref(), Some("Sync already in progress"));
        assert!(!s2.is_running());
        assert_eq!(second.calendar.calls(), 0);
        assert!(second.db.recent_sync_logs(5).unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(s1.state(), RunState::Success);

        let after = s2.run_now(SyncTrigger::Manual).await;
        assert!(after.success);
        assert_eq!(second.db.recent_sync_logs(5).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_is_bounded_by_timeout() {
        let calendar = FakeCalendar::default();
        *calendar.list_delay.lock().unwrap() = Some(Duration::from_secs(600));
        let h = Harness::new(calendar, FakeOAuth::ok());
        h.connect();
        let s = scheduler(&h, Duration::from_secs(120));

        let result = s.run_now(SyncTrigger::Manual).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Sync run exceeded 120s"));
        assert_eq!(s.state(), RunState::Failed);
        assert!(!s.is_running());
        assert_eq!(h.db.settings().unwrap().last_sync_status, LastSyncStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn run_every_rereads_interval() {
        let h = Harness::new(FakeCalendar::default(), FakeOAuth::ok());
        h.connect();
        h.db
            .update_settings(&SettingsUpdate {
                auto_sync_enabled: Some(true),
                auto_sync_interval_minutes: Some(10),
                ..Default::default()
            })
            .unwrap();
        let s = scheduler(&h, Duration::from_secs(60));

        let looping = s.clone();
        let handle = tokio::spawn(async move { looping.run_every().await });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.db.recent_sync_logs(10).unwrap().len(), 1);

        h.db
            .update_settings(&SettingsUpdate {
                auto_sync_interval_minutes: Some(1),
                ..Default::default()
            })
            .unwrap();

        // The first wait was read as 10 minutes; afterwards runs every minute.
        tokio::time::sleep(Duration::from_secs(9 * 60 - 30)).await;
        assert_eq!(h.db.recent_sync_logs(10).unwrap().len(), 2);
        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(h.db.recent_sync_logs(10).unwrap().len(), 4);

        handle.abort();
    }
}
