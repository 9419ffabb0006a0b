use axum::Router;

use crate::state::SharedState;

/// Operator status endpoint.
pub mod admin;
/// Interactive API documentation.
pub mod docs;
/// Liveness endpoint.
pub mod health;
/// Realtime credential endpoint.
pub mod token;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(admin::router())
        .merge(token::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
