use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use crate::pubsub::ChannelMessage;

/// Event name used for player stat changes on the main channel.
pub const EVENT_PLAYER_STAT_UPDATE: &str = "player-stat-update";
/// Event name used for scoreboard replacements on the main channel.
pub const EVENT_SCORE_UPDATE: &str = "score-update";
/// Event name used for activation / clock changes on the main channel.
pub const EVENT_GAME_STATUS_UPDATE: &str = "game-status-update";
/// Event name used for the ephemeral per-second clock ticks.
pub const EVENT_TIME_UPDATE: &str = "time-update";
/// Event name used to reset the match wholesale.
pub const EVENT_RESET: &str = "reset";

/// Per-player counters tracked over one match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    /// Goals scored.
    pub goals: u32,
    /// Assists provided.
    pub assists: u32,
    /// Saves made.
    pub saves: u32,
    /// Yellow cards received.
    pub yellow_cards: u32,
}

/// Home/away scoreboard pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Score {
    /// Home side goal count.
    pub home: u32,
    /// Away side goal count.
    pub away: u32,
}

/// Payload of a [`GameEvent::PlayerStatUpdate`]: the player's new stat block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatUpdate {
    /// Roster id of the player concerned.
    pub player_id: u32,
    /// The player's full replacement stat block.
    pub stats: PlayerStats,
}

/// Payload of a [`GameEvent::GameStatusUpdate`]. Both fields are optional and
/// applied independently when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatusUpdate {
    /// New activation flag, when the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_game_active: Option<bool>,
    /// New clock value in seconds, when the event carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_left: Option<u32>,
}

/// Inbound game events carried by the main channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A player's stat block changed (one counter incremented).
    PlayerStatUpdate(PlayerStatUpdate),
    /// The scoreboard was replaced wholesale.
    ScoreUpdate(Score),
    /// Activation flag and/or remaining time changed.
    GameStatusUpdate(GameStatusUpdate),
    /// The authoritative clock ticked; replaces `time_left` only.
    TimeUpdate {
        /// New number of seconds remaining.
        time_left: u32,
    },
    /// Discard everything and return to the initial match state.
    Reset,
}

impl GameEvent {
    /// Wire name of this event on the main channel.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::PlayerStatUpdate(_) => EVENT_PLAYER_STAT_UPDATE,
            GameEvent::ScoreUpdate(_) => EVENT_SCORE_UPDATE,
            GameEvent::GameStatusUpdate(_) => EVENT_GAME_STATUS_UPDATE,
            GameEvent::TimeUpdate { .. } => EVENT_TIME_UPDATE,
            GameEvent::Reset => EVENT_RESET,
        }
    }

    /// Serialize the payload for publishing on the main channel.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            GameEvent::PlayerStatUpdate(update) => serde_json::to_value(update).unwrap_or_default(),
            GameEvent::ScoreUpdate(score) => serde_json::to_value(score).unwrap_or_default(),
            GameEvent::GameStatusUpdate(status) => serde_json::to_value(status).unwrap_or_default(),
            GameEvent::TimeUpdate { time_left } => serde_json::json!({ "timeLeft": time_left }),
            GameEvent::Reset => serde_json::json!({}),
        }
    }

    /// Decode a channel message into a typed event.
    ///
    /// Unknown event names and malformed payloads return `None` so the hot
    /// path skips instead of failing.
    pub fn decode(message: &ChannelMessage) -> Option<Self> {
        let event = match message.name.as_str() {
            EVENT_PLAYER_STAT_UPDATE => {
                GameEvent::PlayerStatUpdate(decode_payload(&message.name, &message.data)?)
            }
            EVENT_SCORE_UPDATE => {
                GameEvent::ScoreUpdate(decode_payload(&message.name, &message.data)?)
            }
            EVENT_GAME_STATUS_UPDATE => {
                GameEvent::GameStatusUpdate(decode_payload(&message.name, &message.data)?)
            }
            EVENT_TIME_UPDATE => {
                let tick: TimeUpdatePayload = decode_payload(&message.name, &message.data)?;
                GameEvent::TimeUpdate {
                    time_left: tick.time_left,
                }
            }
            EVENT_RESET => GameEvent::Reset,
            other => {
                warn!(event = other, "ignoring unknown game event");
                return None;
            }
        };

        Some(event)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeUpdatePayload {
    time_left: u32,
}

fn decode_payload<T: serde::de::DeserializeOwned>(
    name: &str,
    data: &serde_json::Value,
) -> Option<T> {
    match serde_json::from_value(data.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(event = name, error = %err, "ignoring malformed game event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::ChannelMessage;

    #[test]
    fn decodes_status_update_with_partial_payload() {
        let message = ChannelMessage::new(
            EVENT_GAME_STATUS_UPDATE,
            serde_json::json!({ "isGameActive": true }),
        );

        let event = GameEvent::decode(&message).unwrap();
        assert_eq!(
            event,
            GameEvent::GameStatusUpdate(GameStatusUpdate {
                is_game_active: Some(true),
                time_left: None,
            })
        );
    }

    #[test]
    fn unknown_event_name_is_skipped() {
        let message = ChannelMessage::new("new-comment", serde_json::json!({}));
        assert!(GameEvent::decode(&message).is_none());
    }

    #[test]
    fn malformed_payload_is_skipped() {
        let message = ChannelMessage::new(
            EVENT_PLAYER_STAT_UPDATE,
            serde_json::json!({ "playerId": "not-a-number" }),
        );
        assert!(GameEvent::decode(&message).is_none());
    }

    #[test]
    fn event_round_trips_through_wire_shape() {
        let event = GameEvent::PlayerStatUpdate(PlayerStatUpdate {
            player_id: 5,
            stats: PlayerStats {
                goals: 1,
                ..PlayerStats::default()
            },
        });

        let message = ChannelMessage::new(event.name(), event.payload());
        assert_eq!(GameEvent::decode(&message), Some(event));
    }
}
