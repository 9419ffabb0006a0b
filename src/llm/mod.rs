//! Seam over the streaming text-generation service.
//!
//! The commentary session only depends on [`CompletionBackend`]; the bundled
//! [`OpenAiBackend`] talks to an OpenAI-compatible chat completions endpoint
//! and decodes its server-sent-events stream into text fragments.

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::CommentaryError;

/// Role of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction turn carrying the commentator persona and player bios.
    System,
    /// Formatted match events submitted for commentary.
    User,
    /// Generated commentary retained for conversational context.
    Assistant,
}

/// One turn of the rolling commentary conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker of the turn.
    pub role: Role,
    /// Turn text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazy sequence of generated text fragments.
pub type TokenStream = BoxStream<'static, Result<String, CommentaryError>>;

/// Abstraction over the streaming completion call.
pub trait CompletionBackend: Send + Sync {
    /// Submit the running conversation and return a stream of text deltas.
    fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'static, Result<TokenStream, CommentaryError>>;
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    /// Build a backend for the given endpoint and model.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionBackend for OpenAiBackend {
    fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'static, Result<TokenStream, CommentaryError>> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .bearer_auth(self.api_key.clone())
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
                temperature: 0.8,
                max_tokens: 500,
            });

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|err| CommentaryError::Generation(format!("request failed: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CommentaryError::Generation(format!(
                    "completion endpoint returned {status}: {body}"
                )));
            }

            Ok(decode_sse_stream(response))
        })
    }
}

/// Decode the `text/event-stream` body of a streaming completion response.
///
/// Frames look like `data: {json}\n\n` with a final `data: [DONE]` sentinel.
/// Transport errors mid-stream surface as [`CommentaryError::Generation`]
/// items so the caller's retry logic can take over.
fn decode_sse_stream(response: reqwest::Response) -> TokenStream {
    let mut body = response.bytes_stream();

    let stream = async_stream::stream! {
        let mut buffer = String::new();

        while let Some(next) = body.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(err) => {
                    yield Err(CommentaryError::Generation(format!(
                        "stream interrupted: {err}"
                    )));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(boundary) = buffer.find('\n') {
                let line = buffer[..boundary].trim_end_matches('\r').to_string();
                buffer.drain(..=boundary);

                let Some(frame) = line.strip_prefix("data: ") else {
                    continue;
                };

                if frame == "[DONE]" {
                    return;
                }

                match serde_json::from_str::<ChatChunk>(frame) {
                    Ok(chunk) => {
                        if let Some(content) = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|choice| choice.delta.content)
                            && !content.is_empty()
                        {
                            yield Ok(content);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "skipping undecodable stream frame");
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
