//! Plain-text festival notices. Delivery is best effort: failures are logged and dropped.

use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::{
    dao::models::FestivalEntity,
    services::{collaborators::ActiveWork, sse_events},
    state::SharedState,
};

/// Start notice listing the sides.
pub fn started(festival: &FestivalEntity) -> String {
    let [first, second, third] = &festival.sides;
    format!(
        "{} has started! Pick your side: {first}, {second} or {third}.",
        festival.title
    )
}

/// Halfway notice.
pub fn halfway(festival: &FestivalEntity) -> String {
    format!("{} is halfway through. Keep playing!", festival.title)
}

/// Closing notice: admission stopped.
pub fn closing(festival: &FestivalEntity) -> String {
    format!(
        "{} is closing: no new matches will start. Running matches can still finish.",
        festival.title
    )
}

/// Closing progress with running matches and time left before forcing.
pub fn progress(festival: &FestivalEntity, work: &ActiveWork, remaining: Duration) -> String {
    let minutes = remaining.as_secs().div_ceil(60);
    let plural = if work.count == 1 { "" } else { "es" };
    let mut message = format!(
        "{} is closing: {} match{plural} still running",
        festival.title, work.count
    );
    if !work.names.is_empty() {
        message.push_str(&format!(" ({})", work.names.join(", ")));
    }
    message.push_str(&format!(". Closing will be forced in {minutes} min."));
    message
}

/// End notice; mentions cut matches when forced.
pub fn ended(festival: &FestivalEntity, forced: bool) -> String {
    let mut message = format!("{} has ended. Festival data has been cleared.", festival.title);
    if forced {
        message.push_str(" Matches still running were cut short.");
    }
    message
}

/// Purge failure notice.
pub fn manual_intervention(festival: &FestivalEntity, summary: &str) -> String {
    format!(
        "{} could not be fully cleaned up ({summary}). An administrator needs to take a look.",
        festival.title
    )
}

/// Send `message` to the festival's announcement target and mirror it on the SSE stream.
///
/// Delivery is cut off after the configured notify timeout.
pub async fn deliver(state: &SharedState, festival: &FestivalEntity, message: String) {
    let limit = state.config().lifecycle.notify_timeout;
    deliver_within(state, festival, message, limit).await;
}

/// [`deliver`] with an explicit upper bound, never above the configured notify timeout.
pub async fn deliver_within(
    state: &SharedState,
    festival: &FestivalEntity,
    message: String,
    limit: Duration,
) {
    sse_events::broadcast_notice(state, festival, &message);
    let limit = limit.min(state.config().lifecycle.notify_timeout);
    let delivery = state
        .notifier()
        .announce(&festival.announcement_target, message);

    match timeout(limit, delivery).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            festival_id = %festival.id,
            target_channel = %festival.announcement_target,
            error = %err,
            "failed to deliver festival notice"
        ),
        Err(_) => warn!(
            festival_id = %festival.id,
            target_channel = %festival.announcement_target,
            timeout_ms = limit.as_millis() as u64,
            "festival notice delivery timed out; dropped"
        ),
    }
}
