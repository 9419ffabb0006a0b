use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters accepted by the realtime token route.
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    /// Client identifier to embed in the issued credential.
    pub client_id: Option<String>,
}

/// Short-lived credential granting access to the realtime channels.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Opaque bearer token.
    pub token: String,
    /// Client identifier the token was issued for.
    pub client_id: String,
    /// Issuance time, unix milliseconds.
    pub issued: u64,
    /// Expiry time, unix milliseconds.
    pub expires: u64,
    /// JSON-encoded channel capability grant.
    pub capability: String,
}
