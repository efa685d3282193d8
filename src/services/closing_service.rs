//! Progressive closing: stop admitting matches, wait (bounded) for running ones, then
//! purge and retire the festival.

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::FestivalEntity,
    error::ServiceError,
    services::{
        notices,
        purge_service::{self, PurgeResult, failure_summary},
        sse_events,
    },
    state::{
        SharedState, TransitionOutcome,
        drains::DrainSlot,
        lifecycle::{FestivalPhase, LifecycleEvent},
    },
};

/// How a closing run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Purged, marked ended and deleted.
    Finished(PurgeResult),
    /// The purge left records behind; the festival stays in closing.
    ManualIntervention(PurgeResult),
    /// Another closing run owns this festival in this process.
    AlreadyDraining,
    /// The live closing run was asked to stop waiting.
    Interrupted,
    /// The festival is gone or not closing.
    Skipped,
}

/// Run progressive closing for a festival already in [`FestivalPhase::Closing`].
///
/// Resumes silently when the closing flag was persisted by an earlier process.
pub async fn start_closing(
    state: &SharedState,
    festival_id: Uuid,
) -> Result<CloseOutcome, ServiceError> {
    let Some(slot) = state.drains().claim(festival_id) else {
        debug!(festival_id = %festival_id, "closing already running");
        return Ok(CloseOutcome::AlreadyDraining);
    };

    let flagged = state
        .update_festival(festival_id, |festival| {
            if festival.phase != FestivalPhase::Closing || festival.closing {
                return false;
            }
            festival.closing = true;
            true
        })
        .await?;

    let festival = match flagged {
        Some(festival) => {
            notices::deliver(state, &festival, notices::closing(&festival)).await;
            festival
        }
        None => {
            let store = state.require_store().await?;
            match store.find_festival_by_id(festival_id).await? {
                Some(festival) if festival.phase == FestivalPhase::Closing => {
                    info!(festival_id = %festival_id, "resuming progressive closing");
                    festival
                }
                Some(festival) => {
                    info!(
                        festival_id = %festival_id,
                        phase = %festival.phase,
                        "festival is not closing; nothing to drain"
                    );
                    return Ok(CloseOutcome::Skipped);
                }
                None => return Ok(CloseOutcome::Skipped),
            }
        }
    };

    state.admission().set_admission(festival_id, false);
    let forced = wait_for_drain(state, &festival, &slot).await;
    finish_closing(state, festival_id, forced, &slot).await
}

/// Purge immediately, without waiting for running matches.
///
/// When a closing run is live it is interrupted instead and completes as forced.
pub async fn close_now(state: &SharedState, festival_id: Uuid) -> Result<CloseOutcome, ServiceError> {
    let Some(slot) = state.drains().claim(festival_id) else {
        state.drains().interrupt(festival_id);
        info!(festival_id = %festival_id, "interrupted live closing run");
        return Ok(CloseOutcome::Interrupted);
    };

    state.admission().set_admission(festival_id, false);
    finish_closing(state, festival_id, true, &slot).await
}

/// Poll active work until it reaches zero, the deadline passes or an interrupt arrives.
/// Returns whether the close is forced.
async fn wait_for_drain(state: &SharedState, festival: &FestivalEntity, slot: &DrainSlot) -> bool {
    let config = &state.config().lifecycle;
    let deadline = Instant::now() + config.max_wait;
    let mut polls: u32 = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(festival_id = %festival.id, polls, "closing wait exhausted; forcing");
            return true;
        }

        polls += 1;
        let query = state.active_work().count_active(festival.id);
        tokio::select! {
            _ = slot.interrupted() => {
                info!(festival_id = %festival.id, polls, "closing interrupted; forcing");
                return true;
            }
            answer = timeout(remaining, query) => match answer {
                Ok(Ok(work)) if work.count == 0 => {
                    info!(festival_id = %festival.id, polls, "all matches finished");
                    return false;
                }
                Ok(Ok(work)) => {
                    debug!(festival_id = %festival.id, active = work.count, polls, "matches still running");
                    if polls % config.progress_every_polls == 0 {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        sse_events::broadcast_closing_progress(
                            state,
                            festival.id,
                            &work,
                            remaining.as_secs(),
                            polls,
                        );
                        notices::deliver_within(
                            state,
                            festival,
                            notices::progress(festival, &work, remaining),
                            remaining,
                        )
                        .await;
                    }
                }
                Ok(Err(err)) => {
                    warn!(festival_id = %festival.id, polls, error = %err, "active work query failed");
                }
                Err(_) => {
                    warn!(festival_id = %festival.id, polls, "active work query outlived closing wait; forcing");
                    return true;
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            _ = slot.interrupted() => {
                info!(festival_id = %festival.id, polls, "closing interrupted; forcing");
                return true;
            }
            _ = sleep(config.poll_interval.min(remaining)) => {}
        }
    }
}

/// Terminal path: purge, mark ended, delete the record and announce it.
///
/// Holding the drain slot keeps two terminal paths for one festival from overlapping.
async fn finish_closing(
    state: &SharedState,
    festival_id: Uuid,
    forced: bool,
    _slot: &DrainSlot,
) -> Result<CloseOutcome, ServiceError> {
    let store = state.require_store().await?;
    let festival = match store.find_festival_by_id(festival_id).await? {
        Some(festival) if festival.phase == FestivalPhase::Closing => festival,
        _ => {
            debug!(festival_id = %festival_id, "festival left closing meanwhile; skipping purge");
            return Ok(CloseOutcome::Skipped);
        }
    };

    let mut result = purge_service::purge_all(state, festival_id).await?;
    result.forced = forced;

    if result.requires_manual_intervention() {
        let summary = failure_summary(&result);
        error!(
            festival_id = %festival_id,
            guild_id = %festival.guild_id,
            failures = %summary,
            "festival purge incomplete; manual intervention required"
        );
        sse_events::broadcast_manual_intervention(
            state,
            festival_id,
            Some(&festival.guild_id),
            &result,
        );
        notices::deliver(
            state,
            &festival,
            notices::manual_intervention(&festival, &summary),
        )
        .await;
        return Ok(CloseOutcome::ManualIntervention(result));
    }

    match state
        .run_transition(festival_id, LifecycleEvent::Finish, |_| {})
        .await?
    {
        TransitionOutcome::Applied { from, festival } => {
            sse_events::broadcast_phase_changed(state, &festival, from);
        }
        TransitionOutcome::Skipped => return Ok(CloseOutcome::Skipped),
    }

    store.delete_festival(festival_id).await?;
    state.timers().cancel_all(festival_id);
    state.admission().release(festival_id);

    sse_events::broadcast_purge_completed(state, &festival, &result);
    notices::deliver(state, &festival, notices::ended(&festival, forced)).await;
    info!(
        festival_id = %festival_id,
        forced,
        deleted = result.total(),
        "festival ended"
    );
    Ok(CloseOutcome::Finished(result))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::{festival_store::FestivalStore, models::RecordCategory},
        test_support::{TestHarness, festival_fixture, settle, tagged_record},
    };

    async fn closing_festival(harness: &TestHarness, already_flagged: bool) -> Uuid {
        let mut festival = festival_fixture(harness.now());
        festival.phase = FestivalPhase::Closing;
        festival.closing = already_flagged;
        let id = festival.id;
        harness.store.save_festival(festival).await.unwrap();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Matches, id, "match-1", true))
            .await
            .unwrap();
        id
    }

    fn forced(outcome: &CloseOutcome) -> bool {
        match outcome {
            CloseOutcome::Finished(result) => result.forced,
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn busy_festival_is_forced_at_max_wait() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([Some(1)]);

        let started = Instant::now();
        let outcome = start_closing(&harness.state, id).await.unwrap();
        let waited = started.elapsed();

        assert!(forced(&outcome));
        assert!(waited >= Duration::from_secs(20 * 60));
        assert!(waited < Duration::from_secs(20 * 60 + 1));
        assert!(harness.stored(id).await.is_none());
        assert_eq!(harness.store.count_records(RecordCategory::Matches), 0);
        assert!(harness.notifier.count_containing("still running") > 0);
        assert_eq!(harness.notifier.count_containing("cut short"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_notices_cannot_stretch_the_deadline() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([Some(1)]);
        harness.notifier.hang();

        let started = Instant::now();
        let outcome = timeout(
            Duration::from_secs(3 * 3_600),
            start_closing(&harness.state, id),
        )
        .await
        .expect("closing must not hang on notices")
        .unwrap();

        // closing notice + max wait + end notice, each notice capped at 10s
        assert!(forced(&outcome));
        assert!(started.elapsed() <= Duration::from_secs(20 * 60 + 20));
        assert!(harness.active.calls() > 1);
        assert!(harness.stored(id).await.is_none());
        assert_eq!(harness.store.count_records(RecordCategory::Matches), 0);
        assert_eq!(harness.notifier.count_containing("cut short"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_festival_closes_within_one_poll() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([Some(0)]);

        let started = Instant::now();
        let outcome = start_closing(&harness.state, id).await.unwrap();

        assert!(!forced(&outcome));
        assert!(started.elapsed() <= Duration::from_secs(30));
        assert_eq!(harness.active.calls(), 1);
        assert_eq!(harness.notifier.count_containing("is closing"), 1);
        assert_eq!(harness.state.admission().is_admitting(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_closing_is_not_announced_again() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, true).await;
        harness.active.push([Some(2), Some(0)]);

        let outcome = start_closing(&harness.state, id).await.unwrap();

        assert!(!forced(&outcome));
        assert_eq!(harness.notifier.count_containing("is closing"), 0);
        assert_eq!(harness.active.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_query_cannot_stretch_the_deadline() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.hang();

        let started = Instant::now();
        let outcome = start_closing(&harness.state, id).await.unwrap();

        assert!(forced(&outcome));
        assert!(started.elapsed() < Duration::from_secs(20 * 60 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_keep_waiting() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([None, None, Some(0)]);

        let started = Instant::now();
        let outcome = start_closing(&harness.state, id).await.unwrap();

        assert!(!forced(&outcome));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_completes_as_forced() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([Some(3)]);

        let task = tokio::spawn({
            let state = harness.state.clone();
            async move { start_closing(&state, id).await }
        });
        sleep(Duration::from_secs(45)).await;
        assert!(harness.state.drains().is_live(id));

        let outcome = close_now(&harness.state, id).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Interrupted);

        let outcome = task.await.unwrap().unwrap();
        assert!(forced(&outcome));
        settle().await;
        assert!(!harness.state.drains().is_live(id));
        assert!(harness.stored(id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_is_refused_while_draining() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        let _slot = harness.state.drains().claim(id).unwrap();

        let outcome = start_closing(&harness.state, id).await.unwrap();
        assert_eq!(outcome, CloseOutcome::AlreadyDraining);
        assert_eq!(harness.active.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_failure_leaves_festival_closing() {
        let harness = TestHarness::new().await;
        let id = closing_festival(&harness, false).await;
        harness.active.push([Some(0)]);
        harness.store.fail_category(RecordCategory::Votes);

        let outcome = start_closing(&harness.state, id).await.unwrap();

        let CloseOutcome::ManualIntervention(result) = outcome else {
            panic!("expected manual intervention, got {outcome:?}");
        };
        assert!(result.failures.contains_key(&RecordCategory::Votes));
        let stored = harness.stored(id).await.unwrap();
        assert_eq!(stored.phase, FestivalPhase::Closing);
        assert_eq!(harness.notifier.count_containing("administrator"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn active_festival_is_not_drained() {
        let harness = TestHarness::new().await;
        let mut festival = festival_fixture(harness.now());
        festival.phase = FestivalPhase::Active;
        harness.store.save_festival(festival.clone()).await.unwrap();

        let outcome = start_closing(&harness.state, festival.id).await.unwrap();
        assert_eq!(outcome, CloseOutcome::Skipped);
        assert!(!harness.stored(festival.id).await.unwrap().closing);
    }
}
