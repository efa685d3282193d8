//! Process-local registry of the phase-transition timers armed for each festival.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::{DashMap, mapref::entry::Entry};
use serde::Serialize;
use tokio::{
    task::AbortHandle,
    time::{Instant, sleep_until},
};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

/// The three timers a festival may have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Start time reached.
    Activate,
    /// Midpoint reached.
    AnnounceHalfway,
    /// End time reached.
    BeginClosing,
}

impl TimerKind {
    /// Every kind, in firing order.
    pub const ALL: [TimerKind; 3] = [
        TimerKind::Activate,
        TimerKind::AnnounceHalfway,
        TimerKind::BeginClosing,
    ];

    /// Stable name used in logs and event ids.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Activate => "activate",
            TimerKind::AnnounceHalfway => "announce_halfway",
            TimerKind::BeginClosing => "begin_closing",
        }
    }

    /// Action kind reported to the dedup guard when the timer fires.
    pub const fn action_kind(&self) -> &'static str {
        match self {
            TimerKind::Activate => "lifecycle:activate",
            TimerKind::AnnounceHalfway => "lifecycle:announce_halfway",
            TimerKind::BeginClosing => "lifecycle:begin_closing",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ArmedTimer {
    abort: AbortHandle,
    generation: u64,
    fires_at: SystemTime,
}

/// Armed timers keyed by festival and kind. At most one timer per key.
#[derive(Default)]
pub struct TimerRegistry {
    armed: DashMap<(Uuid, TimerKind), ArmedTimer>,
    generation: AtomicU64,
}

/// Cancellation handle returned when arming a timer.
///
/// Dropping the handle does not cancel the timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    festival_id: Uuid,
    kind: TimerKind,
    generation: u64,
    registry: Weak<TimerRegistry>,
}

impl TimerHandle {
    /// Cancel the timer if it is still pending. Returns `false` when it already fired, was
    /// re-armed, or was cancelled.
    pub fn cancel(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        registry.cancel_generation(self.festival_id, self.kind, self.generation)
    }

    /// Kind of the armed timer.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

impl TimerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing any timer of the same kind for the festival.
    ///
    /// The timer leaves the registry right before `task` starts, so a running task is never
    /// aborted by [`cancel_all`](Self::cancel_all).
    pub fn arm<F, Fut>(
        self: &Arc<Self>,
        festival_id: Uuid,
        kind: TimerKind,
        delay: Duration,
        fires_at: SystemTime,
        task: F,
    ) -> TimerHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(self);
        let deadline = Instant::now() + delay;

        // Holding the entry while spawning keeps the task from unregistering itself
        // before it has been registered.
        let entry = self.armed.entry((festival_id, kind));
        let join = tokio::spawn({
            let registry = registry.clone();
            async move {
                sleep_until(deadline).await;
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                if !registry.take_generation(festival_id, kind, generation) {
                    return;
                }
                drop(registry);
                task().await;
            }
        });

        let armed = ArmedTimer {
            abort: join.abort_handle(),
            generation,
            fires_at,
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(armed);
                previous.abort.abort();
                debug!(festival_id = %festival_id, timer = %kind, "re-armed timer");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(armed);
            }
        }

        TimerHandle {
            festival_id,
            kind,
            generation,
            registry,
        }
    }

    /// Cancel one pending timer. Returns whether a timer was pending.
    pub fn cancel(&self, festival_id: Uuid, kind: TimerKind) -> bool {
        match self.armed.remove(&(festival_id, kind)) {
            Some((_, timer)) => {
                timer.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer of the festival, returning how many were pending.
    pub fn cancel_all(&self, festival_id: Uuid) -> usize {
        TimerKind::ALL
            .into_iter()
            .filter(|kind| self.cancel(festival_id, *kind))
            .count()
    }

    /// Pending timers of the festival with their due time.
    pub fn armed(&self, festival_id: Uuid) -> Vec<(TimerKind, SystemTime)> {
        TimerKind::ALL
            .into_iter()
            .filter_map(|kind| {
                self.armed
                    .get(&(festival_id, kind))
                    .map(|timer| (kind, timer.fires_at))
            })
            .collect()
    }

    /// Whether a timer of `kind` is pending for the festival.
    pub fn is_armed(&self, festival_id: Uuid, kind: TimerKind) -> bool {
        self.armed.contains_key(&(festival_id, kind))
    }

    fn cancel_generation(&self, festival_id: Uuid, kind: TimerKind, generation: u64) -> bool {
        match self
            .armed
            .remove_if(&(festival_id, kind), |_, timer| timer.generation == generation)
        {
            Some((_, timer)) => {
                timer.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Unregister a firing timer; `false` when it was replaced in the meantime.
    fn take_generation(&self, festival_id: Uuid, kind: TimerKind, generation: u64) -> bool {
        self.armed
            .remove_if(&(festival_id, kind), |_, timer| timer.generation == generation)
            .is_some()
    }
}
