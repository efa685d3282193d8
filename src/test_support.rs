//! Fixtures shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use futures::{FutureExt, future::BoxFuture};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::AppConfig,
    dao::{
        festival_store::{FestivalStore, InMemoryFestivalStore},
        models::{FestivalEntity, FestivalFormatEntity, FestivalRecordEntity, RecordCategory},
    },
    error::ServiceError,
    services::collaborators::{ActiveWork, ActiveWorkQuery, Notifier, NotifyError},
    state::{AppState, SharedState},
};

pub const GUILD_ID: &str = "100000000000000001";

/// Scheduled festival starting in one hour and ending two hours later.
pub fn festival_fixture(now: SystemTime) -> FestivalEntity {
    FestivalEntity {
        id: Uuid::new_v4(),
        guild_id: GUILD_ID.into(),
        title: "Splatfest".into(),
        sides: ["Rock".into(), "Paper".into(), "Scissors".into()],
        start_time: now + Duration::from_secs(3_600),
        end_time: now + Duration::from_secs(3 * 3_600),
        phase: crate::state::lifecycle::FestivalPhase::Scheduled,
        closing: false,
        halfway_announced: false,
        announcement_target: "announcements".into(),
        format: FestivalFormatEntity {
            team_size: 4,
            ruleset: "turf_war".into(),
            excluded_maps: Vec::new(),
        },
        created_at: now,
        updated_at: now,
    }
}

pub fn tagged_record(
    category: RecordCategory,
    festival_id: Uuid,
    key: &str,
    active: bool,
) -> FestivalRecordEntity {
    FestivalRecordEntity {
        id: Uuid::new_v4(),
        category,
        guild_id: GUILD_ID.into(),
        festival_id: Some(festival_id),
        logical_key: key.into(),
        label: key.into(),
        active,
        updated_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
    }
}

/// Wall clock that follows the (possibly paused) tokio clock.
#[derive(Debug)]
pub struct TokioClock {
    base: SystemTime,
    anchor: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            anchor: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> SystemTime {
        self.base + self.anchor.elapsed()
    }
}

/// Active-work query answering from a script; the last answer repeats once the script
/// runs out.
#[derive(Default)]
pub struct ScriptedActiveWork {
    script: Mutex<VecDeque<Option<usize>>>,
    last: Mutex<usize>,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedActiveWork {
    /// Queue answers; `None` makes that poll fail.
    pub fn push(&self, answers: impl IntoIterator<Item = Option<usize>>) {
        self.script
            .lock()
            .unwrap()
            .extend(answers);
    }

    /// Every following query never resolves.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ActiveWorkQuery for ScriptedActiveWork {
    fn count_active(&self, _festival_id: Uuid) -> BoxFuture<'static, Result<ActiveWork, ServiceError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            return futures::future::pending().boxed();
        }

        let next = self.script.lock().unwrap().pop_front();
        let answer = match next {
            Some(Some(count)) => {
                *self.last.lock().unwrap() = count;
                Ok(count)
            }
            Some(None) => Err(ServiceError::Timeout),
            None => Ok(*self.last.lock().unwrap()),
        };

        let result = answer.map(|count| ActiveWork {
            count,
            names: (1..=count).map(|n| format!("match-{n}")).collect(),
        });
        futures::future::ready(result).boxed()
    }
}

/// Notifier keeping every delivered notice.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    hang: AtomicBool,
}

impl RecordingNotifier {
    /// Every following delivery is recorded but never completes.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn announce(&self, target: &str, message: String) -> BoxFuture<'static, Result<(), NotifyError>> {
        self.sent.lock().unwrap().push((target.to_owned(), message));
        if self.hang.load(Ordering::SeqCst) {
            return futures::future::pending().boxed();
        }
        futures::future::ready(Ok(())).boxed()
    }
}

/// Application state wired to in-memory collaborators.
pub struct TestHarness {
    pub state: SharedState,
    pub store: InMemoryFestivalStore,
    pub clock: Arc<TokioClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub active: Arc<ScriptedActiveWork>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let store = InMemoryFestivalStore::new();
        let clock = Arc::new(TokioClock::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let active = Arc::new(ScriptedActiveWork::default());

        let state = AppState::builder(config)
            .clock(clock.clone())
            .notifier(notifier.clone())
            .active_work(active.clone())
            .build();
        state.install_store(Arc::new(store.clone())).await;

        Self {
            state,
            store,
            clock,
            notifier,
            active,
        }
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Stored copy of the festival, if it still exists.
    pub async fn stored(&self, festival_id: Uuid) -> Option<FestivalEntity> {
        self.store.find_festival_by_id(festival_id).await.unwrap()
    }
}

/// Let spawned tasks run until they block on time or I/O.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
