//! Bridge between the main channel and the commentary pipeline.
//!
//! A background task subscribes to the main channel, reduces every decoded
//! event into the match state, and drives the side effects the event implies:
//! arming the queue on kickoff, starting or stopping the clock, and pushing
//! formatted moments toward the commentary flush.

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use crate::dto::commentary::CommentaryMessage;
use crate::dto::game::{GameEvent, GameStatusUpdate};
use crate::pubsub::ChannelMessage;
use crate::services::formatter::format_match_event;
use crate::services::queue::PendingCommentaryEvent;
use crate::state::SharedState;

/// Subscribe to the main channel and spawn the event loop.
///
/// The subscription is taken before the task is spawned so no event published
/// after this call returns can be missed.
pub fn spawn(state: SharedState) {
    let mut receiver = state.channels().subscribe(&state.config().main_channel);
    info!(channel = %state.config().main_channel, "game event bridge subscribed");

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(message) => handle_message(&state, &message).await,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    // Skip lagged messages but keep the bridge alive.
                    warn!(skipped, "game event bridge lagging");
                    continue;
                }
            }
        }
        info!("game event bridge stopped");
    });
}

async fn handle_message(state: &SharedState, message: &ChannelMessage) {
    let Some(event) = GameEvent::decode(message) else {
        return;
    };

    let prior = state.apply_event(&event).await;

    match &event {
        GameEvent::Reset => {
            state.clock().stop();
            state.queue().reset();
            publish_clear(state).await;
            info!("match reset; pipeline cleared");
            return;
        }
        GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(active),
            ..
        }) => {
            if *active && !prior.is_game_active {
                // Kickoff: make sure the session is ready and let the first
                // moment through without waiting out the debounce window.
                let mut session = state.session().lock().await;
                if let Err(err) = session.initialize().await {
                    error!(error = %err, "failed to initialize commentary session");
                }
                drop(session);

                state.queue().arm_immediate();
                state.start_clock();
            } else if !*active {
                state.clock().stop();
            }
        }
        _ => {}
    }

    if let Some(formatted) = format_match_event(&event, &prior) {
        state
            .queue()
            .push(PendingCommentaryEvent::new(formatted, event.name()));
    }
}

async fn publish_clear(state: &SharedState) {
    let message = CommentaryMessage::Clear.into_message();
    if let Err(err) = state
        .channels()
        .publish(&state.config().commentary_channel, message)
        .await
    {
        error!(error = %err, "failed to publish commentary clear");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dto::game::{PlayerStatUpdate, PlayerStats};
    use crate::llm::{ChatMessage, CompletionBackend, TokenStream};
    use crate::pubsub::InMemoryChannels;
    use crate::state::AppState;
    use futures::StreamExt;
    use futures::future::BoxFuture;
    use futures::stream;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct CannedBackend;

    impl CompletionBackend for CannedBackend {
        fn stream_chat(
            &self,
            _messages: Vec<ChatMessage>,
        ) -> BoxFuture<'static, Result<TokenStream, crate::error::CommentaryError>> {
            Box::pin(async {
                Ok(stream::iter(vec![Ok("What a moment!".to_string())]).boxed())
            })
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::load();
        config.main_channel = "main".to_string();
        config.commentary_channel = "commentary".to_string();
        config.game_duration_secs = 120;
        config.debounce = Duration::from_secs(4);
        // A missing prompt file must not fail these tests; point at a file
        // that exists in the repository.
        config.prompt_path = "prompts/commentary-system.md".into();
        config.player_data_dir = "data".into();
        config
    }

    struct Fixture {
        state: SharedState,
        main: broadcast::Receiver<ChannelMessage>,
        commentary: broadcast::Receiver<ChannelMessage>,
    }

    async fn fixture() -> Fixture {
        let channels = InMemoryChannels::shared();
        let main = channels.subscribe("main");
        let commentary = channels.subscribe("commentary");
        let state = AppState::new(test_config(), channels, Arc::new(CannedBackend));
        // Load the prompt up front so paused-time sleeps in the tests never
        // race the file read (initialization is idempotent).
        state.session().lock().await.initialize().await.unwrap();
        spawn(state.clone());
        Fixture {
            state,
            main,
            commentary,
        }
    }

    async fn publish(fixture: &Fixture, event: GameEvent) {
        fixture
            .state
            .channels()
            .publish("main", ChannelMessage::new(event.name(), event.payload()))
            .await
            .unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<ChannelMessage>) -> Vec<ChannelMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn activate() -> GameEvent {
        GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn kickoff_activates_clock_and_flushes_immediately() {
        let mut f = fixture().await;

        publish(&f, activate()).await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        let game = f.state.game().read().await.clone();
        assert!(game.is_game_active);
        assert!(game.game_has_started);
        assert!(f.state.clock().is_running());

        // Kickoff bypasses the debounce window entirely.
        let messages = drain(&mut f.commentary);
        assert!(messages.iter().any(|m| m.name == "start"));
        assert!(messages.iter().any(|m| m.name == "complete"));

        f.state.clock().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stat_update_becomes_a_debounced_moment() {
        let mut f = fixture().await;
        publish(&f, activate()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        drain(&mut f.commentary);

        publish(
            &f,
            GameEvent::PlayerStatUpdate(PlayerStatUpdate {
                player_id: 5,
                stats: PlayerStats {
                    goals: 1,
                    ..PlayerStats::default()
                },
            }),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The goal is recorded immediately but held back by the window.
        assert_eq!(f.state.game().read().await.player(5).unwrap().stats.goals, 1);
        let early = drain(&mut f.commentary);
        assert!(early.iter().all(|m| m.name != "start"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let messages = drain(&mut f.commentary);
        let start = messages.iter().find(|m| m.name == "start").unwrap();
        assert_eq!(start.data["eventCount"], 1);

        f.state.clock().stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_state_clock_and_commentary() {
        let mut f = fixture().await;
        publish(&f, activate()).await;
        publish(
            &f,
            GameEvent::ScoreUpdate(crate::dto::game::Score { home: 2, away: 1 }),
        )
        .await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        publish(&f, GameEvent::Reset).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let game = f.state.game().read().await.clone();
        assert_eq!(game.score, crate::dto::game::Score::default());
        assert!(!game.is_game_active);
        assert!(!game.game_has_started);
        assert!(!f.state.clock().is_running());

        let messages = drain(&mut f.commentary);
        assert!(messages.iter().any(|m| m.name == "clear"));

        drain(&mut f.main);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivation_stops_the_clock_without_fulltime() {
        let mut f = fixture().await;
        publish(&f, activate()).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        drain(&mut f.commentary);

        publish(
            &f,
            GameEvent::GameStatusUpdate(GameStatusUpdate {
                is_game_active: Some(false),
                time_left: None,
            }),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!f.state.clock().is_running());
        // A manual pause with time still on the clock is not fulltime.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let messages = drain(&mut f.commentary);
        assert!(messages.iter().all(|m| m.name != "start"));
    }
}
