use axum::{Json, Router, extract::State, routing::get};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::dto::admin::{
    ChannelConfigSummary, GameStateSummary, PipelineSummary, StatusResponse,
};
use crate::state::SharedState;

#[utoipa::path(
    get,
    path = "/api/admin/status",
    responses((status = 200, description = "Operational snapshot", body = StatusResponse))
)]
/// Report the match, pipeline, and channel configuration in one snapshot.
pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let game = state.game().read().await.clone();
    let queue = state.queue().stats();

    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(StatusResponse {
        status: "ok".to_string(),
        timestamp,
        uptime_secs: state.uptime_secs(),
        game_state: GameStateSummary {
            score: game.score,
            time_left: game.time_left,
            is_game_active: game.is_game_active,
            game_has_started: game.game_has_started,
        },
        pipeline: PipelineSummary {
            pending_commentary_events: queue.pending,
            commentary_in_progress: queue.in_flight,
        },
        config: ChannelConfigSummary {
            main_channel: state.config().main_channel.clone(),
            commentary_channel: state.config().commentary_channel.clone(),
        },
    })
}

/// Configure the admin routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/admin/status", get(status))
}
