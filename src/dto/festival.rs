use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{FestivalEntity, FestivalFormatEntity},
    dto::{
        format_system_time,
        validation::{validate_guild_id, validate_sides, validate_window},
    },
    state::{lifecycle::FestivalPhase, timers::TimerKind},
};

/// Payload creating a festival for a guild.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateFestivalRequest {
    pub guild_id: String,
    pub title: String,
    #[schema(value_type = Vec<String>)]
    pub sides: [String; 3],
    /// Start, in milliseconds since UNIX epoch.
    pub start_time_ms: u64,
    /// End, in milliseconds since UNIX epoch. Must be after the start.
    pub end_time_ms: u64,
    /// Channel reference notices are posted to.
    pub announcement_target: String,
    pub format: FestivalFormatInput,
}

impl Validate for CreateFestivalRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_guild_id(&self.guild_id) {
            errors.add("guild_id", e);
        }
        if self.title.trim().is_empty() {
            errors.add("title", validator::ValidationError::new("title_empty"));
        }
        if let Err(e) = validate_sides(&self.sides) {
            errors.add("sides", e);
        }
        if let Err(e) = validate_window(self.start_time_ms, self.end_time_ms) {
            errors.add("end_time_ms", e);
        }
        if self.announcement_target.trim().is_empty() {
            errors.add(
                "announcement_target",
                validator::ValidationError::new("target_empty"),
            );
        }
        errors.merge_self("format", self.format.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Match format options supplied at creation.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
pub struct FestivalFormatInput {
    #[validate(range(min = 1, max = 8))]
    pub team_size: u8,
    #[validate(length(min = 1, max = 64))]
    pub ruleset: String,
    #[serde(default)]
    pub excluded_maps: Vec<String>,
}

impl From<FestivalFormatInput> for FestivalFormatEntity {
    fn from(value: FestivalFormatInput) -> Self {
        Self {
            team_size: value.team_size,
            ruleset: value.ruleset,
            excluded_maps: value.excluded_maps,
        }
    }
}

impl From<&FestivalFormatEntity> for FestivalFormatInput {
    fn from(value: &FestivalFormatEntity) -> Self {
        Self {
            team_size: value.team_size,
            ruleset: value.ruleset.clone(),
            excluded_maps: value.excluded_maps.clone(),
        }
    }
}

/// Festival as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct FestivalSummary {
    pub id: Uuid,
    pub guild_id: String,
    pub title: String,
    pub sides: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub phase: FestivalPhase,
    pub closing: bool,
    pub halfway_announced: bool,
    pub announcement_target: String,
    pub format: FestivalFormatInput,
    pub updated_at: String,
}

impl From<&FestivalEntity> for FestivalSummary {
    fn from(festival: &FestivalEntity) -> Self {
        Self {
            id: festival.id,
            guild_id: festival.guild_id.clone(),
            title: festival.title.clone(),
            sides: festival.sides.to_vec(),
            start_time: format_system_time(festival.start_time),
            end_time: format_system_time(festival.end_time),
            phase: festival.phase,
            closing: festival.closing,
            halfway_announced: festival.halfway_announced,
            announcement_target: festival.announcement_target.clone(),
            format: (&festival.format).into(),
            updated_at: format_system_time(festival.updated_at),
        }
    }
}

/// Pending phase timer.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    pub fires_at: String,
}

/// Lifecycle status of a festival in this process.
#[derive(Debug, Serialize, ToSchema)]
pub struct FestivalStatusResponse {
    pub festival: FestivalSummary,
    pub timers: Vec<ArmedTimer>,
    /// A closing loop for the festival runs in this process.
    pub draining: bool,
    /// Whether new matches are admitted; absent before the first switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admitting: Option<bool>,
}

impl ArmedTimer {
    pub fn new(kind: TimerKind, fires_at: SystemTime) -> Self {
        Self {
            kind,
            fires_at: format_system_time(fires_at),
        }
    }
}

/// Convert epoch milliseconds carried by requests.
pub fn system_time_from_ms(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateFestivalRequest {
        CreateFestivalRequest {
            guild_id: "100000000000000001".into(),
            title: "Splatfest".into(),
            sides: ["Rock".into(), "Paper".into(), "Scissors".into()],
            start_time_ms: 1_000,
            end_time_ms: 2_000,
            announcement_target: "announcements".into(),
            format: FestivalFormatInput {
                team_size: 4,
                ruleset: "turf_war".into(),
                excluded_maps: Vec::new(),
            },
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn reversed_window_is_reported_on_end_time() {
        let mut payload = request();
        payload.end_time_ms = payload.start_time_ms;
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("end_time_ms"));
    }

    #[test]
    fn nested_format_is_checked() {
        let mut payload = request();
        payload.format.team_size = 0;
        assert!(payload.validate().is_err());
    }
}
