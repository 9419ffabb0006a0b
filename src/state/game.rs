//! Authoritative match state and the reducer applied to inbound events.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::game::{GameEvent, PlayerStats, Score};

/// One squad member with their running stat counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Player {
    /// Stable identifier referenced by stat update events.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Position on the pitch.
    pub position: String,
    /// Counters accumulated during the match.
    pub stats: PlayerStats,
}

impl Player {
    fn new(id: u32, name: &str, position: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            position: position.to_string(),
            stats: PlayerStats::default(),
        }
    }
}

/// Authoritative snapshot of one match.
///
/// Mutated exclusively through [`GameState::apply`]; the bridge and the game
/// clock both route their changes through that single entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Squad in display order.
    pub players: Vec<Player>,
    /// Current scoreboard.
    pub score: Score,
    /// Seconds remaining, `0..=duration`.
    pub time_left: u32,
    /// Whether the clock is running.
    pub is_game_active: bool,
    /// Latches true on the first activation and stays true until reset.
    pub game_has_started: bool,
    #[serde(skip)]
    duration: u32,
}

impl GameState {
    /// Fresh pre-kickoff state with the default roster.
    pub fn initial(duration: u32) -> Self {
        Self {
            players: roster(),
            score: Score::default(),
            time_left: duration,
            is_game_active: false,
            game_has_started: false,
            duration,
        }
    }

    /// Full match length in seconds.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Look up a player by id.
    pub fn player(&self, id: u32) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    /// Apply one event, mutating the state in place.
    ///
    /// Total over all event variants: a stat update for an unknown player is
    /// a no-op, and status fields are applied independently when present.
    pub fn apply(&mut self, event: &GameEvent) {
        match event {
            GameEvent::PlayerStatUpdate(update) => {
                if let Some(player) = self
                    .players
                    .iter_mut()
                    .find(|player| player.id == update.player_id)
                {
                    player.stats = update.stats;
                }
            }
            GameEvent::ScoreUpdate(score) => {
                self.score = *score;
            }
            GameEvent::GameStatusUpdate(status) => {
                if let Some(time_left) = status.time_left {
                    self.time_left = time_left.min(self.duration);
                }
                if let Some(active) = status.is_game_active {
                    self.is_game_active = active;
                    if active {
                        self.game_has_started = true;
                    }
                }
            }
            GameEvent::TimeUpdate { time_left } => {
                self.time_left = (*time_left).min(self.duration);
            }
            GameEvent::Reset => {
                *self = Self::initial(self.duration);
            }
        }
    }
}

/// The legends turning out for this exhibition match.
fn roster() -> Vec<Player> {
    vec![
        Player::new(1, "Peter Schmeichel", "Goalkeeper"),
        Player::new(2, "David Beckham", "Right Midfielder"),
        Player::new(3, "Steven Gerrard", "Central Midfielder"),
        Player::new(4, "Thierry Henry", "Forward"),
        Player::new(5, "Cristiano Ronaldo", "Forward"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::game::{GameStatusUpdate, PlayerStatUpdate};

    const DURATION: u32 = 120;

    #[test]
    fn reset_restores_initial_state_regardless_of_history() {
        let mut state = GameState::initial(DURATION);
        state.apply(&GameEvent::ScoreUpdate(Score { home: 3, away: 2 }));
        state.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: Some(40),
        }));
        state.apply(&GameEvent::PlayerStatUpdate(PlayerStatUpdate {
            player_id: 5,
            stats: PlayerStats {
                goals: 2,
                ..PlayerStats::default()
            },
        }));

        state.apply(&GameEvent::Reset);
        assert_eq!(state, GameState::initial(DURATION));
    }

    #[test]
    fn stat_update_replaces_matching_player_block() {
        let mut state = GameState::initial(DURATION);
        let stats = PlayerStats {
            goals: 1,
            ..PlayerStats::default()
        };
        state.apply(&GameEvent::PlayerStatUpdate(PlayerStatUpdate {
            player_id: 4,
            stats,
        }));

        assert_eq!(state.player(4).unwrap().stats, stats);
        assert_eq!(state.player(5).unwrap().stats, PlayerStats::default());
    }

    #[test]
    fn stat_update_for_unknown_player_is_a_noop() {
        let mut state = GameState::initial(DURATION);
        let before = state.clone();
        state.apply(&GameEvent::PlayerStatUpdate(PlayerStatUpdate {
            player_id: 99,
            stats: PlayerStats {
                saves: 7,
                ..PlayerStats::default()
            },
        }));
        assert_eq!(state, before);
    }

    #[test]
    fn game_has_started_latches_on_first_activation() {
        let mut state = GameState::initial(DURATION);
        assert!(!state.game_has_started);

        state.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        }));
        assert!(state.game_has_started);

        state.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(false),
            time_left: None,
        }));
        assert!(!state.is_game_active);
        assert!(state.game_has_started);
    }

    #[test]
    fn status_fields_apply_independently() {
        let mut state = GameState::initial(DURATION);
        state.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: None,
            time_left: Some(60),
        }));
        assert_eq!(state.time_left, 60);
        assert!(!state.is_game_active);
        assert!(!state.game_has_started);
    }

    #[test]
    fn time_update_replaces_clock_only() {
        let mut state = GameState::initial(DURATION);
        state.apply(&GameEvent::TimeUpdate { time_left: 42 });
        assert_eq!(state.time_left, 42);
        assert!(!state.is_game_active);
    }

    #[test]
    fn time_left_is_clamped_to_duration() {
        let mut state = GameState::initial(DURATION);
        state.apply(&GameEvent::TimeUpdate {
            time_left: DURATION + 30,
        });
        assert_eq!(state.time_left, DURATION);
    }
}
