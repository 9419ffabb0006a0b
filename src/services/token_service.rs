//! Issues short-lived credentials for the realtime channels.

use uuid::Uuid;

use crate::dto::token::TokenResponse;
use crate::error::ServiceError;
use crate::pubsub::now_ms;

/// Token lifetime in milliseconds.
const TOKEN_TTL_MS: u64 = 3_600_000;

/// Longest accepted client identifier.
const MAX_CLIENT_ID_LEN: usize = 128;

/// Grant applied to every issued token: full access to the namespaced
/// channels of this deployment.
const CAPABILITY: &str = r#"{"*":["publish","subscribe","presence","history"]}"#;

/// Issue a fresh credential for `client_id`, generating an anonymous
/// identifier when the caller did not supply one.
pub fn issue_token(client_id: Option<String>) -> Result<TokenResponse, ServiceError> {
    let client_id = match client_id.filter(|id| !id.is_empty()) {
        Some(id) => validate_client_id(id)?,
        None => format!("spectator-{}", Uuid::new_v4().simple()),
    };
    let issued = now_ms();

    Ok(TokenResponse {
        token: Uuid::new_v4().simple().to_string(),
        client_id,
        issued,
        expires: issued + TOKEN_TTL_MS,
        capability: CAPABILITY.to_string(),
    })
}

fn validate_client_id(id: String) -> Result<String, ServiceError> {
    if id.len() > MAX_CLIENT_ID_LEN {
        return Err(ServiceError::InvalidInput(format!(
            "client id exceeds {MAX_CLIENT_ID_LEN} characters"
        )));
    }
    if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ServiceError::InvalidInput(
            "client id contains whitespace or control characters".to_string(),
        ));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_carries_the_requested_client_id() {
        let token = issue_token(Some("scoreboard-1".to_string())).unwrap();
        assert_eq!(token.client_id, "scoreboard-1");
        assert_eq!(token.expires - token.issued, TOKEN_TTL_MS);
        assert!(!token.token.is_empty());
    }

    #[test]
    fn missing_client_id_gets_an_anonymous_one() {
        let token = issue_token(None).unwrap();
        assert!(token.client_id.starts_with("spectator-"));

        let blank = issue_token(Some(String::new())).unwrap();
        assert!(blank.client_id.starts_with("spectator-"));
    }

    #[test]
    fn tokens_are_unique() {
        let first = issue_token(None).unwrap();
        let second = issue_token(None).unwrap();
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn capability_is_valid_json() {
        let token = issue_token(None).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&token.capability).unwrap();
        assert!(parsed["*"].is_array());
    }

    #[test]
    fn malformed_client_ids_are_rejected() {
        assert!(issue_token(Some("has space".to_string())).is_err());
        assert!(issue_token(Some("a".repeat(129))).is_err());
    }
}
