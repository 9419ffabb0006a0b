//! Derives compact semantic envelopes from state transitions for the
//! commentary prompt. An event that is not commentary-worthy yields `None`.

use serde::{Deserialize, Serialize};

use crate::dto::game::{GameEvent, Score};
use crate::state::game::GameState;

/// Semantic record handed to the commentary session, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchMoment {
    /// Kind of moment: `goal`, `yellow_card`, `assist`, `save`,
    /// `score_update`, `kickoff`, or `fulltime`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Player the moment belongs to, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    /// Scoreboard carried by `score_update` moments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    /// Match minute derived from the pre-mutation clock.
    pub minute: u32,
}

impl MatchMoment {
    fn new(kind: &str, minute: u32) -> Self {
        Self {
            kind: kind.to_string(),
            player: None,
            score: None,
            minute,
        }
    }

    fn encode(self) -> Option<String> {
        serde_json::to_string(&self).ok()
    }
}

/// Format a state transition into its commentary envelope.
///
/// `prior` is the state from *before* the event was reduced, so a stat
/// update can be diffed against the player's previous counters.
pub fn format_match_event(event: &GameEvent, prior: &GameState) -> Option<String> {
    let minute = (prior.duration().saturating_sub(prior.time_left)) / 60;

    match event {
        GameEvent::PlayerStatUpdate(update) => {
            let player = prior.player(update.player_id)?;
            let kind = incremented_stat(&player.stats, &update.stats)?;
            let mut moment = MatchMoment::new(kind, minute);
            moment.player = Some(player.name.clone());
            moment.encode()
        }
        GameEvent::ScoreUpdate(score) => {
            let mut moment = MatchMoment::new("score_update", minute);
            moment.score = Some(*score);
            moment.encode()
        }
        GameEvent::GameStatusUpdate(status) => {
            let active = status.is_game_active?;
            if active && !prior.is_game_active {
                return MatchMoment::new("kickoff", 0).encode();
            }
            // A manual pause mid-game is not a fulltime; the whistle only
            // blows when the clock has actually run out.
            if !active && prior.is_game_active && prior.time_left == 0 {
                return MatchMoment::new("fulltime", minute).encode();
            }
            None
        }
        GameEvent::TimeUpdate { .. } | GameEvent::Reset => None,
    }
}

/// Identify which single counter increased, in priority order
/// goal > yellow_card > assist > save. First match wins.
fn incremented_stat(
    old: &crate::dto::game::PlayerStats,
    new: &crate::dto::game::PlayerStats,
) -> Option<&'static str> {
    if new.goals > old.goals {
        Some("goal")
    } else if new.yellow_cards > old.yellow_cards {
        Some("yellow_card")
    } else if new.assists > old.assists {
        Some("assist")
    } else if new.saves > old.saves {
        Some("save")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::game::{GameStatusUpdate, PlayerStatUpdate, PlayerStats};

    const DURATION: u32 = 120;

    fn stat_event(player_id: u32, stats: PlayerStats) -> GameEvent {
        GameEvent::PlayerStatUpdate(PlayerStatUpdate { player_id, stats })
    }

    fn decode(envelope: String) -> MatchMoment {
        serde_json::from_str(&envelope).unwrap()
    }

    #[test]
    fn goal_envelope_names_the_scorer() {
        let mut prior = GameState::initial(DURATION);
        prior.time_left = 100;

        let envelope = format_match_event(
            &stat_event(
                5,
                PlayerStats {
                    goals: 1,
                    ..PlayerStats::default()
                },
            ),
            &prior,
        )
        .unwrap();

        let moment = decode(envelope);
        assert_eq!(moment.kind, "goal");
        assert_eq!(moment.player.as_deref(), Some("Cristiano Ronaldo"));
        assert_eq!(moment.minute, 0);
    }

    #[test]
    fn stat_priority_prefers_goal_over_everything() {
        let prior = GameState::initial(DURATION);
        let envelope = format_match_event(
            &stat_event(
                3,
                PlayerStats {
                    goals: 1,
                    yellow_cards: 1,
                    assists: 1,
                    saves: 1,
                },
            ),
            &prior,
        )
        .unwrap();
        assert_eq!(decode(envelope).kind, "goal");
    }

    #[test]
    fn stat_priority_prefers_yellow_card_over_assist_and_save() {
        let prior = GameState::initial(DURATION);
        let envelope = format_match_event(
            &stat_event(
                1,
                PlayerStats {
                    yellow_cards: 1,
                    assists: 1,
                    saves: 1,
                    ..PlayerStats::default()
                },
            ),
            &prior,
        )
        .unwrap();
        assert_eq!(decode(envelope).kind, "yellow_card");
    }

    #[test]
    fn unchanged_stats_are_not_commentary_worthy() {
        let prior = GameState::initial(DURATION);
        assert!(format_match_event(&stat_event(2, PlayerStats::default()), &prior).is_none());
    }

    #[test]
    fn unknown_player_is_not_commentary_worthy() {
        let prior = GameState::initial(DURATION);
        let event = stat_event(
            42,
            PlayerStats {
                goals: 1,
                ..PlayerStats::default()
            },
        );
        assert!(format_match_event(&event, &prior).is_none());
    }

    #[test]
    fn kickoff_only_on_activation_edge() {
        let mut prior = GameState::initial(DURATION);
        let activate = GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        });

        let envelope = format_match_event(&activate, &prior).unwrap();
        assert_eq!(decode(envelope).kind, "kickoff");

        prior.is_game_active = true;
        assert!(format_match_event(&activate, &prior).is_none());
    }

    #[test]
    fn fulltime_requires_expired_clock() {
        let mut prior = GameState::initial(DURATION);
        prior.is_game_active = true;
        prior.time_left = 30;

        let deactivate = GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(false),
            time_left: None,
        });

        // Manual pause mid-game.
        assert!(format_match_event(&deactivate, &prior).is_none());

        prior.time_left = 0;
        let envelope = format_match_event(&deactivate, &prior).unwrap();
        let moment = decode(envelope);
        assert_eq!(moment.kind, "fulltime");
        assert_eq!(moment.minute, DURATION / 60);
    }

    #[test]
    fn score_update_always_formats() {
        let prior = GameState::initial(DURATION);
        let envelope = format_match_event(
            &GameEvent::ScoreUpdate(Score { home: 2, away: 1 }),
            &prior,
        )
        .unwrap();

        let moment = decode(envelope);
        assert_eq!(moment.kind, "score_update");
        assert_eq!(moment.score, Some(Score { home: 2, away: 1 }));
    }
}
