//! Wire-level data transfer objects for HTTP responses and channel payloads.

/// Admin status snapshot payloads.
pub mod admin;
/// Outbound commentary channel messages.
pub mod commentary;
/// Inbound game events and their payloads.
pub mod game;
/// Health check payload.
pub mod health;
/// Realtime credential payloads.
pub mod token;
