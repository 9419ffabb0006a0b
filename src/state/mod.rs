/// Match state and its event reducer.
pub mod game;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use crate::config::AppConfig;
use crate::dto::game::GameEvent;
use crate::llm::CompletionBackend;
use crate::pubsub::SharedChannels;
use crate::services::clock::{ClockDeps, GameClock};
use crate::services::queue::{CommentaryQueue, QueueHandle};
use crate::services::session::CommentarySession;
use crate::state::game::GameState;

/// Reference-counted [`AppState`] handed to routes and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state wiring the channel transport, the match state,
/// and the commentary pipeline together.
pub struct AppState {
    config: AppConfig,
    channels: SharedChannels,
    game: Arc<RwLock<GameState>>,
    session: Arc<Mutex<CommentarySession>>,
    queue: QueueHandle,
    clock: GameClock,
    started_at: Instant,
}

impl AppState {
    /// Construct the shared state and spawn the commentary queue worker.
    pub fn new(
        config: AppConfig,
        channels: SharedChannels,
        backend: Arc<dyn CompletionBackend>,
    ) -> SharedState {
        let game = Arc::new(RwLock::new(GameState::initial(config.game_duration_secs)));
        let session = Arc::new(Mutex::new(CommentarySession::new(
            backend,
            &config.prompt_path,
            &config.player_data_dir,
            config.generation_timeout,
        )));
        let queue = CommentaryQueue::spawn(
            session.clone(),
            channels.clone(),
            config.commentary_channel.clone(),
            game.clone(),
            config.debounce,
            config.retry,
        );

        Arc::new(Self {
            config,
            channels,
            game,
            session,
            queue,
            clock: GameClock::default(),
            started_at: Instant::now(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Channel transport handle.
    pub fn channels(&self) -> &SharedChannels {
        &self.channels
    }

    /// Authoritative match state.
    pub fn game(&self) -> &Arc<RwLock<GameState>> {
        &self.game
    }

    /// Shared commentary session.
    pub fn session(&self) -> &Arc<Mutex<CommentarySession>> {
        &self.session
    }

    /// Handle to the commentary queue worker.
    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    /// The server-side game clock.
    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    /// Seconds since the process started serving.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Reduce an event into the match state, returning the pre-mutation
    /// snapshot. This is the only mutation path; the bridge and the clock
    /// both go through the same reducer.
    pub async fn apply_event(&self, event: &GameEvent) -> GameState {
        let mut game = self.game.write().await;
        let prior = game.clone();
        game.apply(event);
        prior
    }

    /// Start the countdown task against the live pipeline.
    pub fn start_clock(&self) {
        self.clock.start(ClockDeps {
            game: self.game.clone(),
            channels: self.channels.clone(),
            main_channel: self.config.main_channel.clone(),
            queue: self.queue.clone(),
        });
    }
}
