use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::game::Score;

/// Snapshot returned by the `/api/admin/status` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Overall service status ("ok").
    pub status: String,
    /// ISO-8601 timestamp of the snapshot.
    pub timestamp: String,
    /// Seconds the process has been running.
    pub uptime_secs: u64,
    /// Current game state summary.
    pub game_state: GameStateSummary,
    /// Commentary pipeline summary.
    pub pipeline: PipelineSummary,
    /// Channel names in use by this deployment.
    pub config: ChannelConfigSummary,
}

/// Authoritative game state exposed to operators.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStateSummary {
    /// Current scoreboard.
    pub score: Score,
    /// Seconds remaining on the match clock.
    pub time_left: u32,
    /// Whether the match is currently running.
    pub is_game_active: bool,
    /// Whether the match has been kicked off at least once.
    pub game_has_started: bool,
}

/// Commentary pipeline counters exposed to operators.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    /// Formatted events waiting for the next flush.
    pub pending_commentary_events: usize,
    /// Whether a generation request is currently in flight.
    pub commentary_in_progress: bool,
}

/// Channel configuration exposed to operators.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfigSummary {
    /// Channel carrying inbound game events.
    pub main_channel: String,
    /// Channel carrying outbound commentary messages.
    pub commentary_channel: String,
}
