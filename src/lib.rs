//! Library crate for football-frenzy-back, exposing modules for the binary
//! and integration tests.

/// Runtime configuration loaded from the environment.
pub mod config;
/// Wire-level request, response, and channel payload types.
pub mod dto;
/// Error types and their HTTP mappings.
pub mod error;
/// Text-generation backend abstraction and its OpenAI implementation.
pub mod llm;
/// Publish/subscribe channel transport.
pub mod pubsub;
/// HTTP route handlers.
pub mod routes;
/// Background services driving the commentary pipeline.
pub mod services;
/// Shared application state and the match-state reducer.
pub mod state;
