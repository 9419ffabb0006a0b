//! Commentary queue and debouncer.
//!
//! A single worker task owns the buffered events, the debounce deadline, and
//! the at-most-one in-flight flush. Everything else talks to it through a
//! [`QueueHandle`], so no overlapping flushes can exist even though pushes,
//! the game clock, and resets all arrive concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::{BoxFuture, Fuse, FusedFuture};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::dto::commentary::CommentaryMessage;
use crate::error::CommentaryError;
use crate::pubsub::{SharedChannels, now_ms};
use crate::services::session::CommentarySession;
use crate::state::game::GameState;

/// Delay before re-checking the buffer after a flush finished with events
/// still queued.
const RECHECK_DELAY: Duration = Duration::from_millis(100);
/// Flush-level failures tolerated before the conversation context is
/// discarded and rebuilt.
const MAX_FAILURES_BEFORE_RESET: u32 = 3;

/// One formatted event waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommentaryEvent {
    /// JSON envelope produced by the formatter.
    pub formatted: String,
    /// Wire name of the event that produced the envelope.
    pub source: String,
    /// Time the envelope was queued, unix milliseconds.
    pub timestamp_ms: u64,
}

impl PendingCommentaryEvent {
    /// Queue entry for a freshly formatted event.
    pub fn new(formatted: String, source: impl Into<String>) -> Self {
        Self {
            formatted,
            source: source.into(),
            timestamp_ms: now_ms(),
        }
    }
}

/// Counters exposed for the admin status endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Events waiting in the buffer.
    pub pending: usize,
    /// Whether a flush currently owns a claimed batch.
    pub in_flight: bool,
}

enum Command {
    Push(PendingCommentaryEvent),
    ArmImmediate,
    Reset,
}

/// Cheap handle used to feed and control the queue worker.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Command>,
    stats: watch::Receiver<QueueStats>,
}

impl QueueHandle {
    /// Append a formatted event to the buffer, arming or bypassing the
    /// debounce window per the scheduler rules.
    pub fn push(&self, event: PendingCommentaryEvent) {
        let _ = self.tx.send(Command::Push(event));
    }

    /// Zero the time-since-last-flush so the next event flushes immediately
    /// (used on kickoff).
    pub fn arm_immediate(&self) {
        let _ = self.tx.send(Command::ArmImmediate);
    }

    /// Drop the buffer, cancel timers, clear flags, and reset the session.
    /// An in-flight flush is left to finish; its outcome is discarded.
    pub fn reset(&self) {
        let _ = self.tx.send(Command::Reset);
    }

    /// Current buffer/in-flight snapshot.
    pub fn stats(&self) -> QueueStats {
        *self.stats.borrow()
    }
}

/// Spawns the queue worker and returns its handle.
pub struct CommentaryQueue;

impl CommentaryQueue {
    /// Start the worker task that owns all flush-state transitions.
    pub fn spawn(
        session: Arc<Mutex<CommentarySession>>,
        channels: SharedChannels,
        commentary_channel: String,
        game: Arc<RwLock<GameState>>,
        debounce: Duration,
        retry: RetryPolicy,
    ) -> QueueHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(QueueStats::default());

        let worker = Worker {
            session,
            channels,
            commentary_channel,
            game,
            debounce,
            retry,
            buffer: VecDeque::new(),
            deadline: None,
            last_flush: None,
            pending_signal_sent: false,
            consecutive_failures: 0,
            epoch: 0,
            stats: stats_tx,
        };

        tokio::spawn(run_worker(worker, rx));

        QueueHandle { tx, stats: stats_rx }
    }
}

struct Worker {
    session: Arc<Mutex<CommentarySession>>,
    channels: SharedChannels,
    commentary_channel: String,
    game: Arc<RwLock<GameState>>,
    debounce: Duration,
    retry: RetryPolicy,
    buffer: VecDeque<PendingCommentaryEvent>,
    deadline: Option<Instant>,
    last_flush: Option<Instant>,
    pending_signal_sent: bool,
    consecutive_failures: u32,
    epoch: u64,
    stats: watch::Sender<QueueStats>,
}

struct FlushOutcome {
    epoch: u64,
    /// Claimed batch handed back when every attempt failed; `None` on
    /// success. Events are never silently dropped.
    requeue: Option<Vec<PendingCommentaryEvent>>,
    /// Successful (request, response) exchange, committed into the session
    /// only when the flush is not stale.
    exchange: Option<(String, String)>,
}

type FlushFuture = Fuse<BoxFuture<'static, FlushOutcome>>;

async fn run_worker(mut worker: Worker, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut flush: FlushFuture = Fuse::terminated();

    loop {
        let wake = worker.deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            biased;

            outcome = &mut flush, if !flush.is_terminated() => {
                worker.on_flush_complete(outcome).await;
            }

            command = rx.recv() => {
                match command {
                    Some(Command::Push(event)) => {
                        worker.on_push(event, &mut flush).await;
                    }
                    Some(Command::ArmImmediate) => {
                        worker.last_flush = None;
                    }
                    Some(Command::Reset) => {
                        worker.on_reset().await;
                    }
                    None => break,
                }
            }

            _ = tokio::time::sleep_until(wake), if flush.is_terminated() && worker.deadline.is_some() => {
                worker.deadline = None;
                if !worker.buffer.is_empty() {
                    worker.start_flush(&mut flush);
                }
            }
        }
    }
}

impl Worker {
    async fn on_push(&mut self, event: PendingCommentaryEvent, flush: &mut FlushFuture) {
        self.buffer.push_back(event);
        self.publish_stats(!flush.is_terminated());

        if !flush.is_terminated() {
            // Buffer grows while flushing; the batch is picked up on the
            // post-flush re-check.
            return;
        }

        if !self.pending_signal_sent {
            self.pending_signal_sent = true;
            let game_time = self.game.read().await.time_left;
            self.publish_outbound(CommentaryMessage::Pending { game_time })
                .await;
        }

        let quiet_enough = match self.last_flush {
            Some(last) => last.elapsed() >= self.debounce,
            None => true,
        };

        if quiet_enough {
            self.start_flush(flush);
        } else if let Some(last) = self.last_flush {
            self.deadline = Some(last + self.debounce);
        }
    }

    async fn on_reset(&mut self) {
        self.buffer.clear();
        self.deadline = None;
        self.last_flush = None;
        self.pending_signal_sent = false;
        self.consecutive_failures = 0;
        // In-flight flushes from before the reset report under the old epoch
        // and are discarded on completion.
        self.epoch += 1;
        self.session.lock().await.reset();
        self.publish_stats(false);
    }

    /// Claim the buffered batch and dispatch the flush.
    ///
    /// The snapshot-and-clear happens synchronously before the flush future
    /// first suspends, which is the at-most-one-in-flight guarantee.
    fn start_flush(&mut self, flush: &mut FlushFuture) {
        debug_assert!(flush.is_terminated());

        let batch: Vec<_> = self.buffer.drain(..).collect();
        if batch.is_empty() {
            return;
        }

        self.deadline = None;
        self.pending_signal_sent = false;
        self.publish_stats(true);

        *flush = run_flush(
            self.epoch,
            batch,
            self.session.clone(),
            self.channels.clone(),
            self.commentary_channel.clone(),
            self.game.clone(),
            self.retry,
        )
        .boxed()
        .fuse();
    }

    async fn on_flush_complete(&mut self, outcome: FlushOutcome) {
        if outcome.epoch != self.epoch {
            info!("discarding flush outcome from before reset");
            self.publish_stats(false);
            if !self.buffer.is_empty() {
                // Events pushed after the reset still need a claim.
                self.deadline = Some(Instant::now() + RECHECK_DELAY);
            }
            return;
        }

        self.last_flush = Some(Instant::now());

        match outcome.requeue {
            Some(batch) => {
                self.consecutive_failures += 1;
                for event in batch.into_iter().rev() {
                    self.buffer.push_front(event);
                }

                if self.consecutive_failures >= MAX_FAILURES_BEFORE_RESET {
                    warn!(
                        failures = self.consecutive_failures,
                        "repeated generation failures; rebuilding commentary session"
                    );
                    let mut session = self.session.lock().await;
                    session.reset();
                    if let Err(err) = session.initialize().await {
                        error!(error = %err, "failed to reinitialize commentary session");
                    }
                    self.consecutive_failures = 0;
                }
            }
            None => {
                self.consecutive_failures = 0;
                if let Some((request, response)) = outcome.exchange {
                    self.session.lock().await.commit(&request, &response);
                }
            }
        }

        self.publish_stats(false);

        if !self.buffer.is_empty() {
            // Events arrived while flushing; re-check shortly.
            self.deadline = Some(Instant::now() + RECHECK_DELAY);
        }
    }

    fn publish_stats(&self, in_flight: bool) {
        let _ = self.stats.send(QueueStats {
            pending: self.buffer.len(),
            in_flight,
        });
    }

    async fn publish_outbound(&self, message: CommentaryMessage) {
        publish_commentary(&self.channels, &self.commentary_channel, message).await;
    }
}

async fn publish_commentary(channels: &SharedChannels, channel: &str, message: CommentaryMessage) {
    let name = message.name();
    if let Err(err) = channels.publish(channel, message.into_message()).await {
        warn!(event = name, error = %err, "failed to publish commentary message");
    }
}

/// One complete flush: claim already happened; generate with retries, stream
/// chunks out, and hand the batch back on total failure.
async fn run_flush(
    epoch: u64,
    batch: Vec<PendingCommentaryEvent>,
    session: Arc<Mutex<CommentarySession>>,
    channels: SharedChannels,
    commentary_channel: String,
    game: Arc<RwLock<GameState>>,
    retry: RetryPolicy,
) -> FlushOutcome {
    let commentary_id = Uuid::new_v4();
    let message = CommentarySession::compose_message(&batch);
    let game_time = game.read().await.time_left;

    info!(
        %commentary_id,
        events = batch.len(),
        "flushing commentary batch"
    );

    publish_commentary(
        &channels,
        &commentary_channel,
        CommentaryMessage::Start {
            commentary_id,
            event_count: batch.len(),
            game_time,
        },
    )
    .await;

    // Chunk publication is fire-and-forget through a dedicated publisher
    // task: the generation loop never awaits a publish, while the single
    // consumer preserves chunk order on the wire.
    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<CommentaryMessage>();
    let publisher = {
        let channels = channels.clone();
        let commentary_channel = commentary_channel.clone();
        tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                publish_commentary(&channels, &commentary_channel, chunk).await;
            }
        })
    };

    let mut chunk_index = 0usize;
    let mut last_error: Option<CommentaryError> = None;

    for attempt in 1..=retry.max_attempts {
        // The guard drops at the end of this statement; the session lock is
        // never held across the backend call.
        let request = session.lock().await.prepare(&message);
        let stream = match request {
            Ok(request) => request.stream().await,
            Err(err) => Err(err),
        };

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(attempt, error = %err, "commentary generation attempt failed");
                last_error = Some(err);
                if !retryable || attempt == retry.max_attempts {
                    break;
                }
                tokio::time::sleep(retry.backoff_for(attempt)).await;
                continue;
            }
        };

        let mut full_response = String::new();
        let mut interrupted = None;

        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(text) => {
                    let game_time = game.read().await.time_left;
                    let _ = chunk_tx.send(CommentaryMessage::Chunk {
                        commentary_id,
                        text: text.clone(),
                        chunk_index,
                        game_time,
                    });
                    chunk_index += 1;
                    full_response.push_str(&text);
                }
                Err(err) => {
                    interrupted = Some(err);
                    break;
                }
            }
        }

        match interrupted {
            None => {
                drop(chunk_tx);
                if let Err(err) = publisher.await {
                    warn!(error = %err, "chunk publisher task failed");
                }

                publish_commentary(
                    &channels,
                    &commentary_channel,
                    CommentaryMessage::Complete {
                        commentary_id,
                        total_chunks: chunk_index,
                    },
                )
                .await;

                info!(%commentary_id, chunks = chunk_index, "commentary flush complete");

                return FlushOutcome {
                    epoch,
                    requeue: None,
                    exchange: Some((message, full_response)),
                };
            }
            Some(err) => {
                warn!(attempt, error = %err, "commentary stream interrupted");
                last_error = Some(err);
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.backoff_for(attempt)).await;
                }
            }
        }
    }

    drop(chunk_tx);
    let _ = publisher.await;

    let detail = last_error
        .map(|err| err.to_string())
        .unwrap_or_else(|| "commentary generation failed".to_string());
    publish_commentary(
        &channels,
        &commentary_channel,
        CommentaryMessage::Error { message: detail },
    )
    .await;

    FlushOutcome {
        epoch,
        requeue: Some(batch),
        exchange: None,
    }
}
