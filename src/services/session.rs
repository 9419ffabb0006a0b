//! The single ongoing conversation with the text-generation service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::CommentaryError;
use crate::llm::{ChatMessage, CompletionBackend, TokenStream};
use crate::services::queue::PendingCommentaryEvent;

/// Conversation turns retained beyond the instruction turn, to bound token
/// growth and latency.
const MAX_HISTORY_TURNS: usize = 20;

/// Process-wide commentary conversation.
///
/// Owns the instruction turn (commentator persona plus player bios) and a
/// capped rolling history of user/assistant turns. One flush at a time calls
/// [`CommentarySession::prepare`] and drives the detached request; the flush
/// commits the exchange into the history only after the stream drained
/// successfully, so retries never leave dangling user turns behind.
pub struct CommentarySession {
    backend: Arc<dyn CompletionBackend>,
    prompt_path: PathBuf,
    player_data_dir: PathBuf,
    generation_timeout: Duration,
    system: Option<ChatMessage>,
    history: Vec<ChatMessage>,
}

impl CommentarySession {
    /// Build an uninitialized session over the given backend.
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        prompt_path: impl Into<PathBuf>,
        player_data_dir: impl Into<PathBuf>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            prompt_path: prompt_path.into(),
            player_data_dir: player_data_dir.into(),
            generation_timeout,
            system: None,
            history: Vec::new(),
        }
    }

    /// Whether the instruction turn has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.system.is_some()
    }

    /// Load the instruction text and player bios. Idempotent; a missing
    /// prompt file is fatal because commentary without it is meaningless.
    pub async fn initialize(&mut self) -> Result<(), CommentaryError> {
        if self.system.is_some() {
            debug!("commentary session already initialized");
            return Ok(());
        }

        let prompt = tokio::fs::read_to_string(&self.prompt_path)
            .await
            .map_err(|err| {
                CommentaryError::Configuration(format!(
                    "could not load commentary prompt from {}: {err}",
                    self.prompt_path.display()
                ))
            })?;

        let bios = load_player_bios(&self.player_data_dir).await;
        self.system = Some(ChatMessage::system(format!("{prompt}{bios}")));
        info!("commentary session initialized with player data");
        Ok(())
    }

    /// Compose the request text for a claimed batch. Single events pass
    /// through their formatted envelope as-is; batches become a numbered
    /// list with an instruction to cover all of them.
    pub fn compose_message(batch: &[PendingCommentaryEvent]) -> String {
        if let [only] = batch {
            return only.formatted.clone();
        }

        let mut message = String::from("Multiple events occurred:\n");
        for (index, event) in batch.iter().enumerate() {
            message.push_str(&format!("{}. {}\n", index + 1, event.formatted));
        }
        message.push_str("\nProvide one commentary passage covering all of these.");
        message
    }

    /// Snapshot the running conversation plus `message` into a detached
    /// [`GenerationRequest`]. Synchronous, so callers hold the session lock
    /// only for the snapshot and never across the backend call. The exchange
    /// is not recorded until [`CommentarySession::commit`].
    pub fn prepare(&self, message: &str) -> Result<GenerationRequest, CommentaryError> {
        let system = self.system.as_ref().ok_or_else(|| {
            CommentaryError::Configuration("commentary session is not initialized".into())
        })?;

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(system.clone());
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(message));

        Ok(GenerationRequest {
            backend: self.backend.clone(),
            messages,
            timeout: self.generation_timeout,
        })
    }

    /// Record a completed exchange so follow-up generations have context,
    /// trimming the oldest turns beyond the cap.
    pub fn commit(&mut self, message: &str, response: &str) {
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(response));

        if self.history.len() > MAX_HISTORY_TURNS {
            let excess = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
    }

    /// Drop all conversational state so commentary never references a
    /// previous match. Idempotent; the instruction turn survives.
    pub fn reset(&mut self) {
        self.history.clear();
        info!("commentary session reset");
    }

    #[cfg(test)]
    pub(crate) fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Session with a canned instruction turn, skipping the prompt file.
    #[cfg(test)]
    pub(crate) fn preinitialized(backend: Arc<dyn CompletionBackend>) -> Self {
        let mut session = Self::new(
            backend,
            "prompts/commentary-system.md",
            "data",
            Duration::from_secs(5),
        );
        session.system = Some(ChatMessage::system("You are a football commentator."));
        session
    }
}

/// One prepared generation call, detached from the session.
///
/// Holds its own backend handle and message snapshot so the stream can be
/// established while the session lock is free for resets and commits.
pub struct GenerationRequest {
    backend: Arc<dyn CompletionBackend>,
    messages: Vec<ChatMessage>,
    timeout: Duration,
}

impl GenerationRequest {
    /// Establish the lazy fragment stream, bounding how long the backend may
    /// take to start responding.
    pub async fn stream(self) -> Result<TokenStream, CommentaryError> {
        match timeout(self.timeout, self.backend.stream_chat(self.messages)).await {
            Ok(result) => result,
            Err(_) => Err(CommentaryError::Generation(format!(
                "generation call did not respond within {:?}",
                self.timeout
            ))),
        }
    }
}

/// Fold every markdown bio under `dir` into a prompt supplement. A missing
/// or empty directory yields an empty supplement rather than an error.
async fn load_player_bios(dir: &Path) -> String {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "no player data directory; continuing without bios");
            return String::new();
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return String::new();
    }

    let mut supplement = String::from("\n\n## Player Data Files\n\n");
    for path in files {
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            warn!(path = %path.display(), "skipping unreadable player bio");
            continue;
        };

        supplement.push_str(&format!("### {}\n\n", bio_title(&path)));
        supplement.push_str(&content);
        supplement.push_str("\n\n---\n\n");
    }

    supplement
}

/// Derive a display title from a bio file name (`david_beckham.md` becomes
/// `David Beckham`).
fn bio_title(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
