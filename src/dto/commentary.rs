use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pubsub::ChannelMessage;

/// Event name announcing that a commentary passage will arrive shortly.
pub const EVENT_PENDING: &str = "pending";
/// Event name opening a commentary passage.
pub const EVENT_START: &str = "start";
/// Event name carrying one streamed text fragment.
pub const EVENT_CHUNK: &str = "chunk";
/// Event name closing a commentary passage.
pub const EVENT_COMPLETE: &str = "complete";
/// Event name reporting a failed generation.
pub const EVENT_ERROR: &str = "error";
/// Event name telling subscribers to discard all commentary state.
pub const EVENT_CLEAR: &str = "clear";

/// Messages published on the commentary channel.
///
/// Every `start`/`chunk`/`complete` group shares a `commentary_id` minted per
/// flush; consumers reassemble chunks by `chunk_index`, never by arrival
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommentaryMessage {
    /// Events are queued and commentary generation will begin soon.
    #[serde(rename_all = "camelCase")]
    Pending {
        /// Seconds remaining on the match clock when the signal was sent.
        game_time: u32,
    },
    /// A generation request was dispatched for a claimed batch.
    #[serde(rename_all = "camelCase")]
    Start {
        /// Identifier shared by every message of this passage.
        commentary_id: Uuid,
        /// Number of match events covered by the passage.
        event_count: usize,
        /// Seconds remaining on the match clock.
        game_time: u32,
    },
    /// One streamed fragment of generated text.
    #[serde(rename_all = "camelCase")]
    Chunk {
        /// Identifier shared by every message of this passage.
        commentary_id: Uuid,
        /// Fragment text.
        text: String,
        /// Strictly increasing position within the passage.
        chunk_index: usize,
        /// Seconds remaining on the match clock.
        game_time: u32,
    },
    /// The passage finished streaming.
    #[serde(rename_all = "camelCase")]
    Complete {
        /// Identifier shared by every message of this passage.
        commentary_id: Uuid,
        /// Total number of chunks published for the passage.
        total_chunks: usize,
    },
    /// Generation failed after exhausting retries.
    Error {
        /// Human-readable failure description.
        message: String,
    },
    /// The match was reset; drop any buffered commentary.
    Clear,
}

impl CommentaryMessage {
    /// Wire name of this message on the commentary channel.
    pub fn name(&self) -> &'static str {
        match self {
            CommentaryMessage::Pending { .. } => EVENT_PENDING,
            CommentaryMessage::Start { .. } => EVENT_START,
            CommentaryMessage::Chunk { .. } => EVENT_CHUNK,
            CommentaryMessage::Complete { .. } => EVENT_COMPLETE,
            CommentaryMessage::Error { .. } => EVENT_ERROR,
            CommentaryMessage::Clear => EVENT_CLEAR,
        }
    }

    /// Build the channel message for this payload.
    pub fn into_message(self) -> ChannelMessage {
        let name = self.name();
        let data = match &self {
            CommentaryMessage::Clear => serde_json::json!({}),
            other => payload_value(other),
        };
        ChannelMessage::new(name, data)
    }
}

/// Serialize only the variant payload, without the enum tag wrapper.
fn payload_value(message: &CommentaryMessage) -> serde_json::Value {
    match serde_json::to_value(message) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .next()
            .map(|(_, inner)| inner)
            .unwrap_or_default(),
        Ok(other) => other,
        Err(_) => serde_json::Value::Null,
    }
}
