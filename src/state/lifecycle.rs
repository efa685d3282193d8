use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a festival. The declaration order is the only order phases may
/// be visited in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FestivalPhase {
    /// Created, waiting for its start time.
    Scheduled,
    /// Matches are being played.
    Active,
    /// No new matches; waiting for running matches before purging.
    Closing,
    /// Purged. Only observable transiently before the record is deleted.
    Ended,
}

impl fmt::Display for FestivalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FestivalPhase::Scheduled => "scheduled",
            FestivalPhase::Active => "active",
            FestivalPhase::Closing => "closing",
            FestivalPhase::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Events that move a festival through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Start time reached.
    Activate,
    /// End time reached; progressive closing starts.
    BeginClosing,
    /// Administrator terminates the festival ahead of schedule.
    ForceClose,
    /// Closing drained (or timed out) and the purge ran.
    Finish,
}

impl LifecycleEvent {
    /// Phase the festival must be in for this event to apply cleanly.
    pub fn expected_phase(&self) -> &'static [FestivalPhase] {
        match self {
            LifecycleEvent::Activate => &[FestivalPhase::Scheduled],
            LifecycleEvent::BeginClosing => &[FestivalPhase::Active],
            LifecycleEvent::ForceClose => &[FestivalPhase::Scheduled, FestivalPhase::Active],
            LifecycleEvent::Finish => &[FestivalPhase::Closing],
        }
    }
}

/// Error returned when an event does not apply to the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// Phase the festival was in.
    pub from: FestivalPhase,
    /// Rejected event.
    pub event: LifecycleEvent,
}

impl InvalidTransition {
    /// The festival already moved past the phase this event expects: replaying the event
    /// is harmless and should be treated as a no-op.
    pub fn is_stale(&self) -> bool {
        self.event
            .expected_phase()
            .iter()
            .all(|expected| self.from > *expected)
    }
}

/// Compute the phase reached by applying `event` from `from`.
pub fn transition(
    from: FestivalPhase,
    event: LifecycleEvent,
) -> Result<FestivalPhase, InvalidTransition> {
    let next = match (from, event) {
        (FestivalPhase::Scheduled, LifecycleEvent::Activate) => FestivalPhase::Active,
        (FestivalPhase::Active, LifecycleEvent::BeginClosing) => FestivalPhase::Closing,
        (FestivalPhase::Scheduled | FestivalPhase::Active, LifecycleEvent::ForceClose) => {
            FestivalPhase::Closing
        }
        (FestivalPhase::Closing, LifecycleEvent::Finish) => FestivalPhase::Ended,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
