use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::FestivalEntity,
    dto::{
        admin::PurgeReport,
        sse::{
            ClosingProgressEvent, ManualInterventionEvent, NoticeEvent, PhaseChangedEvent,
            PurgeCompletedEvent, ServerEvent, SystemStatus,
        },
    },
    services::{collaborators::ActiveWork, purge_service::PurgeResult},
    state::{SharedState, lifecycle::FestivalPhase},
};

const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_CLOSING_PROGRESS: &str = "closing_progress";
const EVENT_PURGE_COMPLETED: &str = "purge_completed";
const EVENT_MANUAL_INTERVENTION: &str = "manual_intervention";
const EVENT_NOTICE: &str = "notice";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast a persisted phase change.
pub fn broadcast_phase_changed(state: &SharedState, festival: &FestivalEntity, from: FestivalPhase) {
    let payload = PhaseChangedEvent {
        festival_id: festival.id,
        guild_id: festival.guild_id.clone(),
        from,
        to: festival.phase,
    };
    send_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast how much work a closing festival still waits for.
pub fn broadcast_closing_progress(
    state: &SharedState,
    festival_id: Uuid,
    work: &ActiveWork,
    remaining_secs: u64,
    polls: u32,
) {
    let payload = ClosingProgressEvent {
        festival_id,
        active_matches: work.count,
        matches: work.names.clone(),
        remaining_secs,
        polls,
    };
    send_event(state, EVENT_CLOSING_PROGRESS, &payload);
}

/// Announce a finished purge on the SSE stream.
pub fn broadcast_purge_completed(state: &SharedState, festival: &FestivalEntity, result: &PurgeResult) {
    let payload = PurgeCompletedEvent {
        festival_id: festival.id,
        guild_id: festival.guild_id.clone(),
        report: PurgeReport::from(result),
    };
    send_event(state, EVENT_PURGE_COMPLETED, &payload);
}

/// Broadcast that a purge left records behind.
pub fn broadcast_manual_intervention(
    state: &SharedState,
    festival_id: Uuid,
    guild_id: Option<&str>,
    result: &PurgeResult,
) {
    let payload = ManualInterventionEvent {
        festival_id,
        guild_id: guild_id.map(str::to_owned),
        failures: result.failures.clone(),
    };
    send_event(state, EVENT_MANUAL_INTERVENTION, &payload);
}

/// Mirror a notice onto the stream.
pub fn broadcast_notice(state: &SharedState, festival: &FestivalEntity, message: &str) {
    let payload = NoticeEvent {
        festival_id: festival.id,
        target: festival.announcement_target.clone(),
        message: message.to_owned(),
    };
    send_event(state, EVENT_NOTICE, &payload);
}

/// Broadcast the degraded flag.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
