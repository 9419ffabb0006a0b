//! Publish/subscribe channel abstraction and the in-process implementation.
//!
//! The managed realtime transport is a deployment concern; the pipeline only
//! depends on [`ChannelService`]. The bundled [`InMemoryChannels`] backs local
//! runs and tests with Tokio broadcast channels plus a bounded history of
//! non-ephemeral messages for replay.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};

/// Capacity of each per-channel broadcast ring.
const CHANNEL_CAPACITY: usize = 64;
/// Maximum number of persisted messages retained per channel for replay.
const HISTORY_LIMIT: usize = 256;

/// A single message carried by a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Event name within the channel.
    pub name: String,
    /// JSON payload.
    pub data: serde_json::Value,
    /// Publish time, unix milliseconds.
    pub timestamp_ms: u64,
    /// Ephemeral messages are delivered but never retained in history.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ephemeral: bool,
}

impl ChannelMessage {
    /// Build a persisted message stamped with the current time.
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp_ms: now_ms(),
            ephemeral: false,
        }
    }

    /// Mark the message as ephemeral so it is excluded from history replay.
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }
}

/// Current unix time in milliseconds.
pub fn now_ms() -> u64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as u64
}

/// Errors raised by a channel transport.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The transport rejected or dropped a publish.
    #[error("publish to `{channel}` failed: {message}")]
    Publish {
        /// Channel the publish targeted.
        channel: String,
        /// Transport-specific description.
        message: String,
    },
}

/// Abstraction over the realtime publish/subscribe transport.
pub trait ChannelService: Send + Sync {
    /// Publish a message to every current subscriber of `channel`.
    fn publish(
        &self,
        channel: &str,
        message: ChannelMessage,
    ) -> BoxFuture<'static, Result<(), PubSubError>>;

    /// Register a new subscriber for subsequent messages on `channel`.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelMessage>;

    /// Retrieve up to `limit` retained messages, oldest first.
    fn history(
        &self,
        channel: &str,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<ChannelMessage>, PubSubError>>;
}

/// Shared handle to a channel service implementation.
pub type SharedChannels = Arc<dyn ChannelService>;

struct ChannelEntry {
    sender: broadcast::Sender<ChannelMessage>,
    history: Mutex<VecDeque<ChannelMessage>>,
}

impl ChannelEntry {
    fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(VecDeque::new()),
        }
    }
}

/// Broadcast-backed channel service used in-process.
#[derive(Default)]
pub struct InMemoryChannels {
    channels: DashMap<String, Arc<ChannelEntry>>,
}

impl InMemoryChannels {
    /// Create an empty channel registry wrapped for sharing.
    pub fn shared() -> SharedChannels {
        Arc::new(Self::default())
    }

    fn entry(&self, channel: &str) -> Arc<ChannelEntry> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(ChannelEntry::new()))
            .clone()
    }
}

impl ChannelService for InMemoryChannels {
    fn publish(
        &self,
        channel: &str,
        message: ChannelMessage,
    ) -> BoxFuture<'static, Result<(), PubSubError>> {
        let entry = self.entry(channel);
        Box::pin(async move {
            if !message.ephemeral {
                let mut history = entry.history.lock().await;
                if history.len() >= HISTORY_LIMIT {
                    history.pop_front();
                }
                history.push_back(message.clone());
            }

            // No subscribers is not a failure; the message simply fans out to
            // nobody.
            let _ = entry.sender.send(message);
            Ok(())
        })
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<ChannelMessage> {
        self.entry(channel).sender.subscribe()
    }

    fn history(
        &self,
        channel: &str,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<ChannelMessage>, PubSubError>> {
        let entry = self.entry(channel);
        Box::pin(async move {
            let history = entry.history.lock().await;
            let skip = history.len().saturating_sub(limit);
            Ok(history.iter().skip(skip).cloned().collect())
        })
    }
}
