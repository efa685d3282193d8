//! Festival lifecycle: creation, timer scheduling and recovery, phase transitions and
//! forced termination. Every trigger that mutates a festival enters through here.

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::FestivalEntity,
    dto::festival::{
        ArmedTimer, CreateFestivalRequest, FestivalStatusResponse, FestivalSummary,
        system_time_from_ms,
    },
    error::ServiceError,
    services::{
        closing_service::{self, CloseOutcome},
        notices, sse_events,
    },
    state::{
        SharedState, TransitionOutcome,
        lifecycle::{FestivalPhase, LifecycleEvent},
        timers::TimerKind,
    },
};

/// What to do with one of the three timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedStep {
    /// Due already: run it now.
    Fire,
    /// Arm a timer expiring after the delay.
    Arm(Duration),
    /// Missed by more than the grace window; dropped.
    Stale,
    /// Not applicable in the current phase.
    Skip,
}

/// Timers derived from a festival record and the current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    /// Start timer.
    pub activate: PlannedStep,
    /// Activation happens past the end; the start notice would be stale.
    pub silent_activation: bool,
    /// Halfway notice timer.
    pub announce_halfway: PlannedStep,
    /// End timer.
    pub begin_closing: PlannedStep,
    /// Closing was under way; its drain has to be resumed.
    pub resume_closing: bool,
    /// Ended record left behind by an interrupted terminal path.
    pub discard: bool,
}

impl SchedulePlan {
    fn idle() -> Self {
        Self {
            activate: PlannedStep::Skip,
            silent_activation: false,
            announce_halfway: PlannedStep::Skip,
            begin_closing: PlannedStep::Skip,
            resume_closing: false,
            discard: false,
        }
    }

    fn step(&self, kind: TimerKind) -> PlannedStep {
        match kind {
            TimerKind::Activate => self.activate,
            TimerKind::AnnounceHalfway => self.announce_halfway,
            TimerKind::BeginClosing => self.begin_closing,
        }
    }
}

/// Compute the timers of `festival` at `now`. Pure: nothing is armed or fired.
pub fn plan_schedule(festival: &FestivalEntity, now: SystemTime, grace: Duration) -> SchedulePlan {
    let mut plan = SchedulePlan::idle();
    let until = |at: SystemTime| at.duration_since(now).ok().filter(|d| !d.is_zero());

    match festival.phase {
        FestivalPhase::Ended => plan.discard = true,
        FestivalPhase::Closing => plan.resume_closing = true,
        FestivalPhase::Scheduled | FestivalPhase::Active => {
            let past_end = until(festival.end_time).is_none();

            if festival.phase == FestivalPhase::Scheduled {
                plan.activate = match until(festival.start_time) {
                    Some(delay) => PlannedStep::Arm(delay),
                    None => PlannedStep::Fire,
                };
                plan.silent_activation = past_end;
            }

            if !festival.halfway_announced {
                let halfway = festival.halfway_time();
                plan.announce_halfway = match until(halfway) {
                    Some(delay) if !past_end => PlannedStep::Arm(delay),
                    _ if past_end => PlannedStep::Stale,
                    _ => {
                        let late = now.duration_since(halfway).unwrap_or_default();
                        if late <= grace {
                            PlannedStep::Fire
                        } else {
                            PlannedStep::Stale
                        }
                    }
                };
            }

            plan.begin_closing = match until(festival.end_time) {
                Some(delay) => PlannedStep::Arm(delay),
                None => PlannedStep::Fire,
            };
        }
    }

    plan
}

/// Create a festival, persist it as scheduled and arm its timers.
pub async fn create(
    state: &SharedState,
    request: CreateFestivalRequest,
) -> Result<FestivalSummary, ServiceError> {
    if request.end_time_ms <= request.start_time_ms {
        return Err(ServiceError::InvalidInput(
            "end_time_ms must be after start_time_ms".into(),
        ));
    }

    let store = state.require_store().await?;
    let now = state.clock().now();
    let festival = FestivalEntity {
        id: Uuid::new_v4(),
        guild_id: request.guild_id,
        title: request.title,
        sides: request.sides,
        start_time: system_time_from_ms(request.start_time_ms),
        end_time: system_time_from_ms(request.end_time_ms),
        phase: FestivalPhase::Scheduled,
        closing: false,
        halfway_announced: false,
        announcement_target: request.announcement_target,
        format: request.format.into(),
        created_at: now,
        updated_at: now,
    };

    {
        let _gate = state.lock_transitions().await;
        if let Some(existing) = store.find_festival(&festival.guild_id).await? {
            if existing.phase != FestivalPhase::Ended {
                return Err(ServiceError::Conflict(format!(
                    "guild `{}` already hosts festival {}",
                    festival.guild_id, existing.id
                )));
            }
            // An ended record only outlives a terminal path that was cut short.
            store.delete_festival(existing.id).await?;
        }
        store.save_festival(festival.clone()).await?;
    }

    info!(
        festival_id = %festival.id,
        guild_id = %festival.guild_id,
        title = %festival.title,
        "festival created"
    );
    schedule_lifecycle(state, &festival);
    Ok(FestivalSummary::from(&festival))
}

/// Re-derive every timer of `festival` from its record and the clock.
///
/// Due steps run in one background task, in lifecycle order. Safe to call any number of
/// times: stale or duplicate steps turn into no-ops.
pub fn schedule_lifecycle(state: &SharedState, festival: &FestivalEntity) -> SchedulePlan {
    let now = state.clock().now();
    let plan = plan_schedule(festival, now, state.config().lifecycle.halfway_grace);
    let festival_id = festival.id;
    debug!(festival_id = %festival_id, ?plan, "festival schedule computed");

    // Admission switches are process-local; rebuild them from the stored phase.
    match festival.phase {
        FestivalPhase::Active => state.admission().set_admission(festival_id, true),
        FestivalPhase::Closing => state.admission().set_admission(festival_id, false),
        FestivalPhase::Scheduled | FestivalPhase::Ended => {}
    }

    let mut due = Vec::new();
    for kind in TimerKind::ALL {
        match plan.step(kind) {
            PlannedStep::Arm(delay) => {
                let task_state = state.clone();
                state.timers().arm(festival_id, kind, delay, now + delay, move || async move {
                    fire_timer(&task_state, festival_id, kind, true).await;
                });
            }
            PlannedStep::Fire => {
                state.timers().cancel(festival_id, kind);
                due.push(kind);
            }
            PlannedStep::Stale => {
                state.timers().cancel(festival_id, kind);
                info!(festival_id = %festival_id, timer = %kind, "missed timer is stale; skipping");
            }
            PlannedStep::Skip => {
                state.timers().cancel(festival_id, kind);
            }
        }
    }

    if due.is_empty() && !plan.resume_closing && !plan.discard {
        return plan;
    }

    let task_state = state.clone();
    let silent = plan.silent_activation;
    let resume = plan.resume_closing;
    let discard = plan.discard;
    tokio::spawn(async move {
        for kind in due {
            let announce = !(kind == TimerKind::Activate && silent);
            fire_timer(&task_state, festival_id, kind, announce).await;
        }
        if resume {
            if let Err(err) = closing_service::start_closing(&task_state, festival_id).await {
                warn!(festival_id = %festival_id, error = %err, "failed to resume closing");
            }
        }
        if discard {
            discard_ended(&task_state, festival_id).await;
        }
    });

    plan
}

/// Timer entry point: dedup, then dispatch. Errors end here, logged.
async fn fire_timer(state: &SharedState, festival_id: Uuid, kind: TimerKind, announce: bool) {
    let event_id = format!("timer:{festival_id}:{kind}");
    let actor = format!("scheduler:{festival_id}");
    if !state
        .dedup()
        .admit(&event_id, &actor, kind.action_kind(), state.clock().now_ms())
    {
        return;
    }

    let result = match kind {
        TimerKind::Activate => activate_with(state, festival_id, announce).await.map(|_| ()),
        TimerKind::AnnounceHalfway => announce_halfway(state, festival_id).await.map(|_| ()),
        TimerKind::BeginClosing => begin_closing(state, festival_id).await.map(|_| ()),
    };

    if let Err(err) = result {
        // The next recovery pass re-fires this timer under the same event id.
        state.dedup().forget(&event_id);
        warn!(
            festival_id = %festival_id,
            timer = %kind,
            error = %err,
            "festival timer failed"
        );
    }
}

/// Scheduled → Active, then the start notice.
pub async fn activate(
    state: &SharedState,
    festival_id: Uuid,
) -> Result<TransitionOutcome, ServiceError> {
    activate_with(state, festival_id, true).await
}

async fn activate_with(
    state: &SharedState,
    festival_id: Uuid,
    announce: bool,
) -> Result<TransitionOutcome, ServiceError> {
    let outcome = state
        .run_transition(festival_id, LifecycleEvent::Activate, |_| {})
        .await?;

    if let TransitionOutcome::Applied { from, festival } = &outcome {
        sse_events::broadcast_phase_changed(state, festival, *from);
        state.admission().set_admission(festival_id, true);
        if announce {
            notices::deliver(state, festival, notices::started(festival)).await;
        } else {
            info!(festival_id = %festival_id, "festival activated past its end; start notice skipped");
        }
    }
    Ok(outcome)
}

/// Send the halfway notice once. Returns whether it was sent.
pub async fn announce_halfway(state: &SharedState, festival_id: Uuid) -> Result<bool, ServiceError> {
    let updated = state
        .update_festival(festival_id, |festival| {
            if festival.phase != FestivalPhase::Active || festival.halfway_announced {
                return false;
            }
            festival.halfway_announced = true;
            true
        })
        .await?;

    match updated {
        Some(festival) => {
            notices::deliver(state, &festival, notices::halfway(&festival)).await;
            info!(festival_id = %festival_id, "halfway notice sent");
            Ok(true)
        }
        None => {
            debug!(festival_id = %festival_id, "halfway notice not applicable; skipping");
            Ok(false)
        }
    }
}

/// Active → Closing, then progressive closing.
pub async fn begin_closing(
    state: &SharedState,
    festival_id: Uuid,
) -> Result<CloseOutcome, ServiceError> {
    match state
        .run_transition(festival_id, LifecycleEvent::BeginClosing, |_| {})
        .await?
    {
        TransitionOutcome::Applied { from, festival } => {
            sse_events::broadcast_phase_changed(state, &festival, from);
            closing_service::start_closing(state, festival_id).await
        }
        TransitionOutcome::Skipped => Ok(CloseOutcome::Skipped),
    }
}

/// Terminate the guild's festival now, skipping the wait for running matches.
pub async fn force_close(state: &SharedState, guild_id: &str) -> Result<CloseOutcome, ServiceError> {
    let store = state.require_store().await?;
    let Some(festival) = store.find_festival(guild_id).await? else {
        debug!(guild_id, "no festival to close");
        return Ok(CloseOutcome::Skipped);
    };
    let festival_id = festival.id;

    let cancelled = state.timers().cancel_all(festival_id);
    info!(
        festival_id = %festival_id,
        guild_id,
        phase = %festival.phase,
        cancelled_timers = cancelled,
        "force closing festival"
    );

    match festival.phase {
        FestivalPhase::Scheduled | FestivalPhase::Active => {
            let outcome = state
                .run_transition(festival_id, LifecycleEvent::ForceClose, |festival| {
                    festival.closing = true;
                })
                .await?;
            if let TransitionOutcome::Applied { from, festival } = &outcome {
                sse_events::broadcast_phase_changed(state, festival, *from);
            }
            // Also covers a concurrent begin_closing that won the race.
            closing_service::close_now(state, festival_id).await
        }
        FestivalPhase::Closing => closing_service::close_now(state, festival_id).await,
        FestivalPhase::Ended => Ok(CloseOutcome::Skipped),
    }
}

/// Lifecycle status of a festival.
pub async fn status(
    state: &SharedState,
    festival_id: Uuid,
) -> Result<FestivalStatusResponse, ServiceError> {
    let store = state.require_store().await?;
    let festival = store
        .find_festival_by_id(festival_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("festival {festival_id} not found")))?;
    Ok(build_status(state, &festival))
}

/// Lifecycle status of the festival hosted by a guild.
pub async fn guild_status(
    state: &SharedState,
    guild_id: &str,
) -> Result<FestivalStatusResponse, ServiceError> {
    let store = state.require_store().await?;
    let festival = store
        .find_festival(guild_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("guild {guild_id} hosts no festival")))?;
    Ok(build_status(state, &festival))
}

fn build_status(state: &SharedState, festival: &FestivalEntity) -> FestivalStatusResponse {
    FestivalStatusResponse {
        festival: FestivalSummary::from(festival),
        timers: state
            .timers()
            .armed(festival.id)
            .into_iter()
            .map(|(kind, fires_at)| ArmedTimer::new(kind, fires_at))
            .collect(),
        draining: state.drains().is_live(festival.id),
        admitting: state.admission().is_admitting(festival.id),
    }
}

/// Schedule every stored festival. Runs at startup and after storage reconnects.
pub async fn recover_all(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let festivals = store.list_festivals().await?;
    for festival in &festivals {
        schedule_lifecycle(state, festival);
    }
    info!(count = festivals.len(), "festival schedules recovered");
    Ok(festivals.len())
}

async fn discard_ended(state: &SharedState, festival_id: Uuid) {
    let result = async {
        let store = state.require_store().await?;
        store.delete_festival(festival_id).await?;
        Ok::<_, ServiceError>(())
    }
    .await;

    match result {
        Ok(()) => {
            state.timers().cancel_all(festival_id);
            state.admission().release(festival_id);
            info!(festival_id = %festival_id, "removed leftover ended festival");
        }
        Err(err) => warn!(festival_id = %festival_id, error = %err, "failed to remove ended festival"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;
    use crate::{
        dao::{festival_store::FestivalStore, models::RecordCategory},
        dto::festival::FestivalFormatInput,
        test_support::{GUILD_ID, TestHarness, festival_fixture, tagged_record},
    };

    const MINUTE: Duration = Duration::from_secs(60);
    const GRACE: Duration = Duration::from_secs(5 * 60);

    fn ms(time: SystemTime) -> u64 {
        time.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_millis() as u64
    }

    fn request(start: SystemTime, end: SystemTime) -> CreateFestivalRequest {
        CreateFestivalRequest {
            guild_id: GUILD_ID.into(),
            title: "Splatfest".into(),
            sides: ["Rock".into(), "Paper".into(), "Scissors".into()],
            start_time_ms: ms(start),
            end_time_ms: ms(end),
            announcement_target: "announcements".into(),
            format: FestivalFormatInput {
                team_size: 4,
                ruleset: "turf_war".into(),
                excluded_maps: Vec::new(),
            },
        }
    }

    /// Festival around `now`: started `since` ago, lasting `span`.
    fn festival_at(now: SystemTime, since: Duration, span: Duration, phase: FestivalPhase) -> FestivalEntity {
        let mut festival = festival_fixture(now);
        festival.start_time = now - since;
        festival.end_time = festival.start_time + span;
        festival.phase = phase;
        festival
    }

    #[test]
    fn plan_arms_everything_before_start() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut festival = festival_fixture(now);
        festival.start_time = now + 10 * MINUTE;
        festival.end_time = festival.start_time + 120 * MINUTE;

        let plan = plan_schedule(&festival, now, GRACE);
        assert_eq!(plan.activate, PlannedStep::Arm(10 * MINUTE));
        assert_eq!(plan.announce_halfway, PlannedStep::Arm(70 * MINUTE));
        assert_eq!(plan.begin_closing, PlannedStep::Arm(130 * MINUTE));
        assert!(!plan.silent_activation);
    }

    #[test]
    fn plan_fires_halfway_within_grace_only() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let recent = festival_at(now, 63 * MINUTE, 120 * MINUTE, FestivalPhase::Active);
        assert_eq!(
            plan_schedule(&recent, now, GRACE).announce_halfway,
            PlannedStep::Fire
        );

        let old = festival_at(now, 90 * MINUTE, 120 * MINUTE, FestivalPhase::Active);
        let plan = plan_schedule(&old, now, GRACE);
        assert_eq!(plan.announce_halfway, PlannedStep::Stale);
        assert_eq!(plan.activate, PlannedStep::Skip);
        assert_eq!(plan.begin_closing, PlannedStep::Arm(30 * MINUTE));
    }

    #[test]
    fn plan_activates_silently_past_end() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let festival = festival_at(now, 180 * MINUTE, 120 * MINUTE, FestivalPhase::Scheduled);

        let plan = plan_schedule(&festival, now, GRACE);
        assert_eq!(plan.activate, PlannedStep::Fire);
        assert!(plan.silent_activation);
        assert_eq!(plan.announce_halfway, PlannedStep::Stale);
        assert_eq!(plan.begin_closing, PlannedStep::Fire);
    }

    #[test]
    fn plan_resumes_closing_and_discards_ended() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let closing = festival_at(now, 180 * MINUTE, 120 * MINUTE, FestivalPhase::Closing);
        let plan = plan_schedule(&closing, now, GRACE);
        assert!(plan.resume_closing);
        assert_eq!(plan.begin_closing, PlannedStep::Skip);

        let ended = festival_at(now, 180 * MINUTE, 120 * MINUTE, FestivalPhase::Ended);
        assert!(plan_schedule(&ended, now, GRACE).discard);
    }

    #[tokio::test(start_paused = true)]
    async fn created_festival_runs_its_whole_lifecycle() {
        let harness = TestHarness::new().await;
        let start = harness.now() + 10 * MINUTE;
        let end = start + 120 * MINUTE;

        let created = create(&harness.state, request(start, end)).await.unwrap();
        let id = created.id;
        assert_eq!(harness.state.timers().armed(id).len(), 3);

        sleep(10 * MINUTE + Duration::from_secs(1)).await;
        assert_eq!(harness.stored(id).await.unwrap().phase, FestivalPhase::Active);
        assert_eq!(harness.notifier.count_containing("has started"), 1);
        assert_eq!(harness.state.admission().is_admitting(id), Some(true));

        sleep(60 * MINUTE).await;
        assert!(harness.stored(id).await.unwrap().halfway_announced);
        assert_eq!(harness.notifier.count_containing("halfway"), 1);

        sleep(60 * MINUTE).await;
        assert!(harness.stored(id).await.is_none());
        assert_eq!(harness.notifier.count_containing("has ended"), 1);
        assert_eq!(harness.notifier.count_containing("cut short"), 0);
        assert!(harness.state.timers().armed(id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_while_active_rearms_remaining_timers() {
        let harness = TestHarness::new().await;
        let festival = festival_at(harness.now(), 30 * MINUTE, 120 * MINUTE, FestivalPhase::Active);
        harness.store.save_festival(festival.clone()).await.unwrap();

        let recovered = recover_all(&harness.state).await.unwrap();
        assert_eq!(recovered, 1);
        sleep(Duration::from_secs(1)).await;

        let armed: Vec<_> = harness
            .state
            .timers()
            .armed(festival.id)
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(armed, vec![TimerKind::AnnounceHalfway, TimerKind::BeginClosing]);
        assert_eq!(harness.notifier.count_containing("has started"), 0);
        assert_eq!(harness.state.admission().is_admitting(festival.id), Some(true));

        sleep(30 * MINUTE).await;
        assert_eq!(harness.notifier.count_containing("halfway"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_recovery_fires_activation_once() {
        let harness = TestHarness::new().await;
        let festival = festival_at(harness.now(), MINUTE, 120 * MINUTE, FestivalPhase::Scheduled);
        harness.store.save_festival(festival.clone()).await.unwrap();

        schedule_lifecycle(&harness.state, &festival);
        schedule_lifecycle(&harness.state, &festival);
        sleep(Duration::from_secs(1)).await;
        let stored = harness.stored(festival.id).await.unwrap();
        schedule_lifecycle(&harness.state, &stored);
        sleep(Duration::from_secs(1)).await;

        assert_eq!(harness.stored(festival.id).await.unwrap().phase, FestivalPhase::Active);
        assert_eq!(harness.notifier.count_containing("has started"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_failed_while_degraded_fires_again_on_recovery() {
        let harness = TestHarness::new().await;
        let festival = festival_at(harness.now(), 180 * MINUTE, 120 * MINUTE, FestivalPhase::Active);
        harness.store.save_festival(festival.clone()).await.unwrap();

        harness.state.clear_store().await;
        schedule_lifecycle(&harness.state, &festival);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(harness.stored(festival.id).await.unwrap().phase, FestivalPhase::Active);

        harness
            .state
            .install_store(Arc::new(harness.store.clone()))
            .await;
        sleep(Duration::from_secs(2)).await;
        assert_eq!(recover_all(&harness.state).await.unwrap(), 1);
        sleep(2 * MINUTE).await;

        assert!(harness.stored(festival.id).await.is_none());
        assert_eq!(harness.notifier.count_containing("has ended"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_closing_festival_stops_admission() {
        let harness = TestHarness::new().await;
        let mut festival = festival_at(harness.now(), 180 * MINUTE, 120 * MINUTE, FestivalPhase::Closing);
        festival.closing = true;
        harness.store.save_festival(festival.clone()).await.unwrap();
        harness.active.push([Some(1)]);

        schedule_lifecycle(&harness.state, &festival);
        assert_eq!(harness.state.admission().is_admitting(festival.id), Some(false));
        sleep(Duration::from_secs(1)).await;
        assert!(harness.state.drains().is_live(festival.id));
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_scheduled_festival_closes_without_start_notice() {
        let harness = TestHarness::new().await;
        let festival = festival_at(harness.now(), 180 * MINUTE, 120 * MINUTE, FestivalPhase::Scheduled);
        harness.store.save_festival(festival.clone()).await.unwrap();

        schedule_lifecycle(&harness.state, &festival);
        sleep(Duration::from_secs(1)).await;

        assert!(harness.stored(festival.id).await.is_none());
        assert_eq!(harness.notifier.count_containing("has started"), 0);
        assert_eq!(harness.notifier.count_containing("halfway"), 0);
        assert_eq!(harness.notifier.count_containing("has ended"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn force_close_purges_active_festival_immediately() {
        let harness = TestHarness::new().await;
        let festival = festival_at(harness.now(), 30 * MINUTE, 120 * MINUTE, FestivalPhase::Active);
        harness.store.save_festival(festival.clone()).await.unwrap();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Matches, festival.id, "match-1", true))
            .await
            .unwrap();
        harness.active.push([Some(1)]);
        schedule_lifecycle(&harness.state, &festival);

        let outcome = force_close(&harness.state, GUILD_ID).await.unwrap();

        let CloseOutcome::Finished(result) = outcome else {
            panic!("expected a finished close, got {outcome:?}");
        };
        assert!(result.forced);
        assert_eq!(result.counts[&RecordCategory::Matches], 1);
        assert!(harness.stored(festival.id).await.is_none());
        assert!(harness.state.timers().armed(festival.id).is_empty());
        assert_eq!(harness.notifier.count_containing("cut short"), 1);

        let again = force_close(&harness.state, GUILD_ID).await.unwrap();
        assert_eq!(again, CloseOutcome::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn force_close_retires_stuck_closing_festival() {
        let harness = TestHarness::new().await;
        let mut festival = festival_at(harness.now(), 180 * MINUTE, 120 * MINUTE, FestivalPhase::Closing);
        festival.closing = true;
        harness.store.save_festival(festival.clone()).await.unwrap();

        let outcome = force_close(&harness.state, GUILD_ID).await.unwrap();
        assert!(matches!(outcome, CloseOutcome::Finished(ref result) if result.forced));
        assert!(harness.stored(festival.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn creation_rejects_bad_window_and_second_festival() {
        let harness = TestHarness::new().await;
        let start = harness.now() + 10 * MINUTE;

        let err = create(&harness.state, request(start, start)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        create(&harness.state, request(start, start + 60 * MINUTE))
            .await
            .unwrap();
        let err = create(&harness.state, request(start, start + 60 * MINUTE))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_timers_and_admission() {
        let harness = TestHarness::new().await;
        let start = harness.now() + 10 * MINUTE;
        let created = create(&harness.state, request(start, start + 60 * MINUTE))
            .await
            .unwrap();

        let report = status(&harness.state, created.id).await.unwrap();
        assert_eq!(report.festival.phase, FestivalPhase::Scheduled);
        assert_eq!(report.timers.len(), 3);
        assert!(!report.draining);
        assert_eq!(report.admitting, None);

        let missing = status(&harness.state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }
}
