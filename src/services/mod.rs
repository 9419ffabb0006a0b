/// Main-channel subscriber driving the pipeline.
pub mod bridge;
/// Authoritative server-side game clock.
pub mod clock;
/// OpenAPI documentation generation.
pub mod documentation;
/// Event-to-envelope formatting for the commentary prompt.
pub mod formatter;
/// Commentary queue and debouncer.
pub mod queue;
/// Shared AI commentary session.
pub mod session;
/// Realtime channel credential issuance.
pub mod token_service;
