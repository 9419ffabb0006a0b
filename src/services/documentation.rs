use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Football Frenzy Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::admin::status,
        crate::routes::token::realtime_token,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::admin::StatusResponse,
            crate::dto::token::TokenResponse,
            crate::dto::game::PlayerStats,
            crate::dto::game::Score,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "admin", description = "Operational status endpoints"),
        (name = "token", description = "Realtime channel credentials"),
    )
)]
pub struct ApiDoc;
