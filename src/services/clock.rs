//! Authoritative server-side game clock.
//!
//! While the match is active a background task decrements the remaining time
//! once per second, publishing ephemeral `time-update` ticks. When the clock
//! hits zero it deactivates the match itself and synthesizes the fulltime
//! commentary moment, so the final whistle never depends on a client.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info};

use crate::dto::game::{GameEvent, GameStatusUpdate};
use crate::pubsub::{ChannelMessage, SharedChannels};
use crate::services::formatter::format_match_event;
use crate::services::queue::{PendingCommentaryEvent, QueueHandle};
use crate::state::game::GameState;

/// Everything one clock run touches.
#[derive(Clone)]
pub struct ClockDeps {
    /// Authoritative match state; mutated only through the reducer.
    pub game: Arc<RwLock<GameState>>,
    /// Transport the ticks and the final status update go out on.
    pub channels: SharedChannels,
    /// Main channel name.
    pub main_channel: String,
    /// Queue fed with the synthesized fulltime moment.
    pub queue: QueueHandle,
}

/// Owns the countdown task. At most one run exists at a time; starting
/// replaces any previous run.
#[derive(Default)]
pub struct GameClock {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameClock {
    /// Start (or restart) the 1 Hz countdown.
    pub fn start(&self, deps: ClockDeps) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        info!("game clock started");
        *slot = Some(tokio::spawn(run(deps)));
    }

    /// Abort the countdown, if one is running. State is left as-is.
    pub fn stop(&self) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.abort();
            info!("game clock stopped");
        }
    }

    /// Whether a countdown task is currently held.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

async fn run(deps: ClockDeps) {
    let mut ticks = time::interval_at(Instant::now() + Duration::from_secs(1), Duration::from_secs(1));

    loop {
        ticks.tick().await;

        let mut game = deps.game.write().await;
        if !game.is_game_active || game.time_left == 0 {
            break;
        }

        let tick = GameEvent::TimeUpdate {
            time_left: game.time_left - 1,
        };
        game.apply(&tick);

        // At zero the clock ends the match itself. The prior snapshot (time
        // exhausted, still active) is what makes the formatter recognise
        // fulltime.
        let finished = if game.time_left == 0 {
            let prior = game.clone();
            let status = GameEvent::GameStatusUpdate(GameStatusUpdate {
                is_game_active: Some(false),
                time_left: Some(0),
            });
            game.apply(&status);
            Some((format_match_event(&status, &prior), status))
        } else {
            None
        };
        drop(game);

        publish(&deps, &tick, true).await;

        if let Some((moment, status)) = finished {
            publish(&deps, &status, false).await;
            if let Some(formatted) = moment {
                deps.queue.push(PendingCommentaryEvent::new(formatted, status.name()));
            }
            info!("match time expired; game clock finished");
            break;
        }
    }
}

async fn publish(deps: &ClockDeps, event: &GameEvent, ephemeral: bool) {
    let mut message = ChannelMessage::new(event.name(), event.payload());
    if ephemeral {
        message = message.ephemeral();
    }
    if let Err(err) = deps.channels.publish(&deps.main_channel, message).await {
        error!(error = %err, event = event.name(), "failed to publish clock event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::pubsub::InMemoryChannels;
    use crate::services::queue::CommentaryQueue;
    use crate::services::session::CommentarySession;
    use futures::StreamExt;
    use futures::future::BoxFuture;
    use futures::stream;
    use tokio::sync::{Mutex as AsyncMutex, broadcast};

    struct SilentBackend;

    impl crate::llm::CompletionBackend for SilentBackend {
        fn stream_chat(
            &self,
            _messages: Vec<crate::llm::ChatMessage>,
        ) -> BoxFuture<'static, Result<crate::llm::TokenStream, crate::error::CommentaryError>>
        {
            Box::pin(async { Ok(stream::iter(vec![Ok("ok".to_string())]).boxed()) })
        }
    }

    fn deps(duration: u32) -> (ClockDeps, broadcast::Receiver<ChannelMessage>) {
        let channels = InMemoryChannels::shared();
        let game = Arc::new(RwLock::new(GameState::initial(duration)));
        let session = Arc::new(AsyncMutex::new(CommentarySession::preinitialized(
            Arc::new(SilentBackend),
        )));
        let queue = CommentaryQueue::spawn(
            session,
            channels.clone(),
            "commentary".to_string(),
            game.clone(),
            Duration::from_secs(4),
            RetryPolicy::default(),
        );
        let rx = channels.subscribe("main");
        (
            ClockDeps {
                game,
                channels,
                main_channel: "main".to_string(),
                queue,
            },
            rx,
        )
    }

    fn drain(rx: &mut broadcast::Receiver<ChannelMessage>) -> Vec<ChannelMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_decrement_once_per_second() {
        let (deps, mut rx) = deps(10);
        deps.game.write().await.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        }));

        let clock = GameClock::default();
        clock.start(deps.clone());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(deps.game.read().await.time_left, 7);

        let messages = drain(&mut rx);
        let ticks: Vec<_> = messages.iter().filter(|m| m.name == "time-update").collect();
        assert_eq!(ticks.len(), 3);
        assert!(ticks.iter().all(|m| m.ephemeral));
        assert_eq!(ticks[0].data["timeLeft"], 9);
        assert_eq!(ticks[2].data["timeLeft"], 7);

        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn clock_ends_the_match_and_queues_fulltime() {
        let (deps, mut rx) = deps(2);
        let mut commentary_rx = deps.channels.subscribe("commentary");
        deps.game.write().await.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        }));

        let clock = GameClock::default();
        clock.start(deps.clone());

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let game = deps.game.read().await.clone();
        assert_eq!(game.time_left, 0);
        assert!(!game.is_game_active);

        let messages = drain(&mut rx);
        let status: Vec<_> = messages
            .iter()
            .filter(|m| m.name == "game-status-update")
            .collect();
        assert_eq!(status.len(), 1);
        assert!(!status[0].ephemeral);
        assert_eq!(status[0].data["isGameActive"], false);
        assert_eq!(status[0].data["timeLeft"], 0);

        // The fulltime moment flowed into the commentary pipeline.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let commentary = drain(&mut commentary_rx);
        let start = commentary
            .iter()
            .find(|m| m.name == "start")
            .expect("fulltime flush started");
        assert_eq!(start.data["eventCount"], 1);

        assert!(!clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_countdown() {
        let (deps, _rx) = deps(30);
        deps.game.write().await.apply(&GameEvent::GameStatusUpdate(GameStatusUpdate {
            is_game_active: Some(true),
            time_left: None,
        }));

        let clock = GameClock::default();
        clock.start(deps.clone());
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        clock.stop();

        let frozen = deps.game.read().await.time_left;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(deps.game.read().await.time_left, frozen);
    }
}
