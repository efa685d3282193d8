/// Live closing loops.
pub mod drains;
/// Festival phases and transitions.
pub mod lifecycle;
mod sse;
/// Phase timers.
pub mod timers;

use std::{sync::Arc, time::Duration};

use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    dao::{festival_store::FestivalStore, models::FestivalEntity},
    error::ServiceError,
    services::{
        collaborators::{
            ActiveWorkQuery, AdmissionGate, AdmissionRegistry, LogNotifier, Notifier,
            StoreActiveWork,
        },
        dedup_guard::EventDedupGuard,
    },
};

pub use self::sse::SseHub;
use self::{
    drains::DrainRegistry,
    lifecycle::{FestivalPhase, LifecycleEvent, transition},
    timers::TimerRegistry,
};

/// Application state shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;
/// Slot holding the store currently installed by the supervisor.
pub type StoreSlot = Arc<RwLock<Option<Arc<dyn FestivalStore>>>>;
/// Upper bound of one gated transition.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a gated phase transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The record was advanced and saved.
    Applied {
        from: FestivalPhase,
        festival: FestivalEntity,
    },
    /// The festival is gone or already past the expected phase; nothing was written.
    Skipped,
}

/// Central application state: store handle, lifecycle registries and collaborators.
pub struct AppState {
    store: StoreSlot,
    degraded: watch::Sender<bool>,
    sse: SseHub,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
    timers: Arc<TimerRegistry>,
    drains: Arc<DrainRegistry>,
    dedup: Arc<EventDedupGuard>,
    notifier: Arc<dyn Notifier>,
    active_work: Arc<dyn ActiveWorkQuery>,
    admission: Arc<dyn AdmissionGate>,
    transition_gate: Mutex<()>,
    transition_timeout: Option<Duration>,
}

/// Builder overriding the collaborators wired into [`AppState`].
pub struct AppStateBuilder {
    config: AppConfig,
    clock: Option<Arc<dyn Clock>>,
    notifier: Option<Arc<dyn Notifier>>,
    active_work: Option<Arc<dyn ActiveWorkQuery>>,
    admission: Option<Arc<dyn AdmissionGate>>,
}

impl AppStateBuilder {
    /// Use another wall clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use another notifier.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use another active-work query.
    pub fn active_work(mut self, active_work: Arc<dyn ActiveWorkQuery>) -> Self {
        self.active_work = Some(active_work);
        self
    }

    /// Use another admission gate.
    pub fn admission(mut self, admission: Arc<dyn AdmissionGate>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Build the state. It starts in degraded mode until a store is installed.
    pub fn build(self) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let store: StoreSlot = Arc::new(RwLock::new(None));
        let active_work = self
            .active_work
            .unwrap_or_else(|| Arc::new(StoreActiveWork::new(store.clone())));

        Arc::new(AppState {
            dedup: Arc::new(EventDedupGuard::new(self.config.dedup.clone())),
            store,
            degraded: degraded_tx,
            sse: SseHub::new(64),
            config: Arc::new(self.config),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            timers: Arc::new(TimerRegistry::new()),
            drains: Arc::new(DrainRegistry::new()),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            active_work,
            admission: self
                .admission
                .unwrap_or_else(|| Arc::new(AdmissionRegistry::default())),
            transition_gate: Mutex::new(()),
            transition_timeout: Some(DEFAULT_TRANSITION_TIMEOUT),
        })
    }
}

impl AppState {
    /// State with default collaborators.
    pub fn new(config: AppConfig) -> SharedState {
        Self::builder(config).build()
    }

    /// Builder for overriding collaborators.
    pub fn builder(config: AppConfig) -> AppStateBuilder {
        AppStateBuilder {
            config,
            clock: None,
            notifier: None,
            active_work: None,
            admission: None,
        }
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn FestivalStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_store(&self) -> Result<Arc<dyn FestivalStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn FestivalStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub feeding the lifecycle SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Wall clock used for schedules and dedup windows.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Armed phase timers.
    pub fn timers(&self) -> &Arc<TimerRegistry> {
        &self.timers
    }

    /// Live closing loops.
    pub fn drains(&self) -> &Arc<DrainRegistry> {
        &self.drains
    }

    /// Inbound trigger guard.
    pub fn dedup(&self) -> &Arc<EventDedupGuard> {
        &self.dedup
    }

    /// Notice delivery.
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Running-match query used while closing.
    pub fn active_work(&self) -> &Arc<dyn ActiveWorkQuery> {
        &self.active_work
    }

    /// Match admission switches.
    pub fn admission(&self) -> &Arc<dyn AdmissionGate> {
        &self.admission
    }

    /// Serialise a short read-modify-write section with every phase transition.
    pub async fn lock_transitions(&self) -> MutexGuard<'_, ()> {
        self.transition_gate.lock().await
    }

    /// Apply `event` to the stored festival under the transition gate.
    ///
    /// `mutate` runs on the advanced record before it is saved. The stored record only
    /// changes when the save succeeds. A stale event is a no-op.
    pub async fn run_transition<F>(
        &self,
        festival_id: Uuid,
        event: LifecycleEvent,
        mutate: F,
    ) -> Result<TransitionOutcome, ServiceError>
    where
        F: FnOnce(&mut FestivalEntity),
    {
        let store = self.require_store().await?;
        let _gate = self.transition_gate.lock().await;

        let work = self.advance(store.as_ref(), festival_id, event, mutate);
        match self.transition_timeout {
            Some(limit) => timeout(limit, work)
                .await
                .map_err(|_| ServiceError::Timeout)?,
            None => work.await,
        }
    }

    async fn advance<F>(
        &self,
        store: &dyn FestivalStore,
        festival_id: Uuid,
        event: LifecycleEvent,
        mutate: F,
    ) -> Result<TransitionOutcome, ServiceError>
    where
        F: FnOnce(&mut FestivalEntity),
    {
        let Some(mut festival) = store.find_festival_by_id(festival_id).await? else {
            debug!(festival_id = %festival_id, ?event, "festival is gone; skipping transition");
            return Ok(TransitionOutcome::Skipped);
        };

        let from = festival.phase;
        let next = match transition(from, event) {
            Ok(next) => next,
            Err(invalid) if invalid.is_stale() => {
                info!(
                    festival_id = %festival_id,
                    ?event,
                    phase = %from,
                    "festival already moved on; skipping transition"
                );
                return Ok(TransitionOutcome::Skipped);
            }
            Err(invalid) => return Err(invalid.into()),
        };

        festival.phase = next;
        mutate(&mut festival);
        festival.updated_at = self.clock.now();
        store.save_festival(festival.clone()).await?;

        info!(festival_id = %festival_id, %from, to = %next, "festival phase changed");
        Ok(TransitionOutcome::Applied { from, festival })
    }

    /// Load-modify-save a festival under the transition gate without changing its phase.
    ///
    /// `apply` returns `false` to leave the record untouched. Returns the saved record, or
    /// `None` when nothing was written.
    pub async fn update_festival<F>(
        &self,
        festival_id: Uuid,
        apply: F,
    ) -> Result<Option<FestivalEntity>, ServiceError>
    where
        F: FnOnce(&mut FestivalEntity) -> bool,
    {
        let store = self.require_store().await?;
        let _gate = self.transition_gate.lock().await;

        let Some(mut festival) = store.find_festival_by_id(festival_id).await? else {
            return Ok(None);
        };
        if !apply(&mut festival) {
            return Ok(None);
        }
        festival.updated_at = self.clock.now();
        store.save_festival(festival.clone()).await?;
        Ok(Some(festival))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestHarness, festival_fixture};

    #[tokio::test]
    async fn stale_and_invalid_events_leave_record_untouched() {
        let harness = TestHarness::new().await;
        let mut festival = festival_fixture(harness.clock.now());
        festival.phase = FestivalPhase::Active;
        harness.store.save_festival(festival.clone()).await.unwrap();

        let outcome = harness
            .state
            .run_transition(festival.id, LifecycleEvent::Activate, |_| {})
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Skipped));

        let err = harness
            .state
            .run_transition(festival.id, LifecycleEvent::Finish, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let stored = harness
            .store
            .find_festival_by_id(festival.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.phase, FestivalPhase::Active);
    }

    #[tokio::test]
    async fn degraded_state_refuses_transitions() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        let err = state
            .run_transition(Uuid::new_v4(), LifecycleEvent::Activate, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
