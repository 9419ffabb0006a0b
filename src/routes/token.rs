use axum::{Json, Router, extract::Query, routing::get};

use crate::dto::token::{TokenQuery, TokenResponse};
use crate::error::AppError;
use crate::services::token_service;
use crate::state::SharedState;

#[utoipa::path(
    get,
    path = "/api/realtime-token",
    params(TokenQuery),
    responses(
        (status = 200, description = "Issued channel credential", body = TokenResponse),
        (status = 400, description = "Malformed client identifier")
    )
)]
/// Issue a short-lived credential for subscribing to the realtime channels.
pub async fn realtime_token(
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = token_service::issue_token(query.client_id)?;
    Ok(Json(token))
}

/// Configure the token routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/realtime-token", get(realtime_token))
}
