use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::lifecycle::FestivalPhase;

/// Options describing how matches are played during the festival.
///
/// Owned by the matchmaking layer; the lifecycle only carries them around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FestivalFormatEntity {
    /// Number of players on each team.
    pub team_size: u8,
    /// Ruleset identifier (e.g. "turf_war").
    pub ruleset: String,
    /// Maps excluded from selection.
    #[serde(default)]
    pub excluded_maps: Vec<String>,
}

/// Persisted festival instance. At most one non-ended festival exists per guild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FestivalEntity {
    /// Primary key of the festival instance.
    pub id: Uuid,
    /// Guild (community) hosting the festival.
    pub guild_id: String,
    /// Display title.
    pub title: String,
    /// The three competing sides.
    pub sides: [String; 3],
    /// When the festival becomes active.
    pub start_time: SystemTime,
    /// When the festival starts closing.
    pub end_time: SystemTime,
    /// Current lifecycle phase.
    pub phase: FestivalPhase,
    /// Set once progressive closing started; survives restarts.
    #[serde(default)]
    pub closing: bool,
    /// Whether the halfway notice has already been delivered.
    #[serde(default)]
    pub halfway_announced: bool,
    /// Opaque channel reference notices are delivered to.
    pub announcement_target: String,
    /// Match format, immutable after creation.
    pub format: FestivalFormatEntity,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}

impl FestivalEntity {
    /// Midpoint between start and end, used for the halfway notice.
    pub fn halfway_time(&self) -> SystemTime {
        let span = self
            .end_time
            .duration_since(self.start_time)
            .unwrap_or_default();
        self.start_time + span / 2
    }
}

/// Categories of records tagged with a festival id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    /// Registered festival teams.
    Teams,
    /// Matches, running or finished.
    Matches,
    /// Side votes cast by members.
    Votes,
    /// Per-team and per-side scores.
    Scores,
    /// Derived map-selection probability records.
    MapProbabilities,
    /// Match results awaiting confirmation.
    PendingResults,
    /// Match history entries.
    History,
    /// Sequence counters (match numbers, etc).
    Counters,
}

impl RecordCategory {
    /// Every category, in the order purge results report them.
    pub const ALL: [RecordCategory; 8] = [
        RecordCategory::Teams,
        RecordCategory::Matches,
        RecordCategory::Votes,
        RecordCategory::Scores,
        RecordCategory::MapProbabilities,
        RecordCategory::PendingResults,
        RecordCategory::History,
        RecordCategory::Counters,
    ];

    /// Stable snake_case name, also used as storage collection suffix.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordCategory::Teams => "teams",
            RecordCategory::Matches => "matches",
            RecordCategory::Votes => "votes",
            RecordCategory::Scores => "scores",
            RecordCategory::MapProbabilities => "map_probabilities",
            RecordCategory::PendingResults => "pending_results",
            RecordCategory::History => "history",
            RecordCategory::Counters => "counters",
        }
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborator-owned record tagged with the festival it belongs to.
///
/// Purge and reconcile only look at the tag, the logical key and the update time;
/// the rest of the record belongs to the layer that wrote it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FestivalRecordEntity {
    /// Primary key.
    pub id: Uuid,
    /// Category the record belongs to.
    pub category: RecordCategory,
    /// Guild that owns the record.
    pub guild_id: String,
    /// Festival tag, `None` for records that lost their owner.
    pub festival_id: Option<Uuid>,
    /// Key identifying the logical entity (e.g. team name); duplicates share it.
    pub logical_key: String,
    /// Display label (match name, team name).
    pub label: String,
    /// Matches only: the match is still running.
    #[serde(default)]
    pub active: bool,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}
