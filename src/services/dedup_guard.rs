//! Filter for inbound triggers: rejects redelivered events, rapid double submissions
//! and near-duplicate actions before they reach any stateful operation.

use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, trace};

use crate::{clock::Clock, config::DedupConfig};

/// Why a trigger was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The exact event id was already delivered.
    Redelivery,
    /// Same actor submitted the same action moments ago.
    DoubleSubmit,
    /// Same actor submitted an action of the same category in the current bucket.
    NearDuplicate,
}

#[derive(Debug, Clone)]
struct RecentAction {
    kind: String,
    at_ms: u64,
}

/// Counters reported by a sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired event ids removed.
    pub events: usize,
    /// Expired action entries removed.
    pub actions: usize,
    /// Expired near-duplicate buckets removed.
    pub buckets: usize,
}

/// Three-layer idempotency filter. Every inbound trigger goes through
/// [`EventDedupGuard::admit`] exactly once.
pub struct EventDedupGuard {
    config: DedupConfig,
    multi_step: HashSet<String>,
    events: DashMap<String, u64>,
    actions: DashMap<(String, String), u64>,
    buckets: DashMap<(String, u64), Vec<RecentAction>>,
}

impl EventDedupGuard {
    /// Empty guard using `config` windows.
    pub fn new(config: DedupConfig) -> Self {
        let multi_step = config.multi_step_actions.iter().cloned().collect();
        Self {
            config,
            multi_step,
            events: DashMap::new(),
            actions: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// Returns `true` when the trigger should run. A `false` result means the trigger was
    /// already handled and no side effect may follow.
    pub fn admit(&self, event_id: &str, actor_id: &str, action_kind: &str, now_ms: u64) -> bool {
        match self.check(event_id, actor_id, action_kind, now_ms) {
            Ok(()) => true,
            Err(rejection) => {
                debug!(
                    event_id,
                    actor_id,
                    action_kind,
                    ?rejection,
                    "rejected duplicate trigger"
                );
                false
            }
        }
    }

    /// Same as [`admit`](Self::admit) but reports which check tripped.
    pub fn check(
        &self,
        event_id: &str,
        actor_id: &str,
        action_kind: &str,
        now_ms: u64,
    ) -> Result<(), Rejection> {
        // The event entry doubles as the claim: holding its shard lock while the other
        // checks run keeps two concurrent deliveries of one id from both passing.
        let event_entry = match self.events.entry(event_id.to_owned()) {
            Entry::Occupied(seen)
                if now_ms.saturating_sub(*seen.get()) < self.config.event_ttl_ms =>
            {
                return Err(Rejection::Redelivery);
            }
            entry => entry,
        };

        let exempt = self.multi_step.contains(action_kind);
        let action_key = (actor_id.to_owned(), action_kind.to_owned());
        if !exempt
            && let Some(last) = self.actions.get(&action_key)
            && now_ms.saturating_sub(*last) < self.config.action_ttl_ms
        {
            return Err(Rejection::DoubleSubmit);
        }

        let bucket_key = (actor_id.to_owned(), now_ms / self.config.bucket_window_ms);
        let mut bucket = self.buckets.entry(bucket_key).or_default();
        if !exempt {
            let prefix = category_prefix(action_kind);
            let near_duplicate = bucket.iter().any(|recent| {
                !self.multi_step.contains(&recent.kind) && category_prefix(&recent.kind) == prefix
            });
            if near_duplicate {
                return Err(Rejection::NearDuplicate);
            }
        }

        bucket.push(RecentAction {
            kind: action_kind.to_owned(),
            at_ms: now_ms,
        });
        drop(bucket);
        self.actions.insert(action_key, now_ms);
        event_entry.insert(now_ms);
        Ok(())
    }

    /// Drop a remembered event id so a redelivery is admitted again. Used when handling
    /// an admitted trigger failed before any side effect.
    pub fn forget(&self, event_id: &str) -> bool {
        self.events.remove(event_id).is_some()
    }

    /// Evict every entry past its TTL.
    pub fn sweep(&self, now_ms: u64) -> SweepStats {
        let mut stats = SweepStats::default();

        self.events.retain(|_, seen| {
            let keep = now_ms.saturating_sub(*seen) < self.config.event_ttl_ms;
            stats.events += usize::from(!keep);
            keep
        });
        self.actions.retain(|_, last| {
            let keep = now_ms.saturating_sub(*last) < self.config.action_ttl_ms;
            stats.actions += usize::from(!keep);
            keep
        });
        let window = self.config.bucket_window_ms;
        self.buckets.retain(|_, recent| {
            recent.retain(|action| now_ms.saturating_sub(action.at_ms) < window);
            let keep = !recent.is_empty();
            stats.buckets += usize::from(!keep);
            keep
        });

        stats
    }

    /// Number of remembered event ids.
    pub fn tracked_events(&self) -> usize {
        self.events.len()
    }

    /// Run [`sweep`](Self::sweep) periodically until the guard is dropped.
    pub fn spawn_sweeper(guard: &Arc<Self>, clock: Arc<dyn Clock>) {
        let weak: Weak<Self> = Arc::downgrade(guard);
        let period = guard.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(guard) = weak.upgrade() else {
                    break;
                };

                let stats = guard.sweep(clock.now_ms());
                trace!(?stats, "dedup sweep finished");
            }
        });
    }
}

/// Category of an action kind: the text before the first `:`.
fn category_prefix(kind: &str) -> &str {
    kind.split_once(':').map_or(kind, |(prefix, _)| prefix)
}
