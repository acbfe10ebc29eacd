//! Chat-completion client and streaming relay
//!
//! Serializes a conversation into the chat-completion wire format, issues it
//! through an [`HttpTransport`], and relays streamed deltas to the caller.
//!
//! # SSE Format
//!
//! Each `data:` line carries one JSON fragment; blank lines between
//! fragments are optional:
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! ```
//!
//! The stream ends with:
//! ```text
//! data: [DONE]
//!
//! ```

use crate::error::CompletionError;
use crate::models::{ConversationMessage, GenerationConfig, Role};
use crate::router::Tier;
use crate::shared::transport::{ChunkStream, HttpTransport};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_json::Value;
use std::pin::pin;
use std::sync::Arc;

/// Callback receiving each streamed content delta, in arrival order
pub type DeltaCallback = dyn Fn(&str) + Send + Sync;

/// Sentinel payload terminating a streamed response
pub const DONE_SENTINEL: &str = "[DONE]";

/// Request body for `POST {endpoint}/v1/chat/completions`
///
/// Only role and content are sent; timestamps stay with the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
    tier: Tier,
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn new(
        tier: Tier,
        conversation: &'a [ConversationMessage],
        config: &GenerationConfig,
    ) -> Self {
        Self {
            messages: conversation
                .iter()
                .map(|m| WireMessage {
                    role: m.role(),
                    content: m.content(),
                })
                .collect(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            stream: config.stream,
            tier,
        }
    }
}

/// Build the chat-completions URL for an endpoint base URL
pub fn completions_url(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

/// First choice's message content of a non-streaming response, or `""`
pub fn message_content(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn delta_content(fragment: &Value) -> Option<&str> {
    fragment
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
}

/// Accumulate a streamed response while forwarding each delta
///
/// Every `data:` line is handled on its own, whether or not servers separate
/// lines with blank lines. Malformed fragments are skipped; `[DONE]` ends the
/// stream without being parsed. A final event left unterminated at EOF is
/// still relayed. A transport error mid-stream fails the whole call.
pub async fn relay_stream(
    chunks: ChunkStream,
    on_delta: Option<&DeltaCallback>,
) -> Result<String, CompletionError> {
    let flush = stream::once(async { Ok(b"\n\n".to_vec()) });
    let mut events = pin!(chunks.chain(flush).eventsource());
    let mut response = String::new();
    let mut deltas_received = 0usize;

    'events: while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(source)) => {
                tracing::warn!(
                    bytes_received = response.len(),
                    deltas_received = deltas_received,
                    error = %source,
                    "Stream interrupted mid-response"
                );
                return Err(CompletionError::StreamInterrupted {
                    bytes_received: response.len(),
                    deltas_received,
                    source,
                });
            }
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable stream event");
                continue;
            }
        };

        // Consecutive data lines arrive joined by newlines
        for line in event.data.lines() {
            let data = line.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                break 'events;
            }

            match serde_json::from_str::<Value>(data) {
                Ok(fragment) => {
                    if let Some(delta) = delta_content(&fragment).filter(|d| !d.is_empty()) {
                        response.push_str(delta);
                        deltas_received += 1;
                        if let Some(on_delta) = on_delta {
                            on_delta(delta);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        fragment_preview = %data.chars().take(80).collect::<String>(),
                        "Skipping malformed stream fragment"
                    );
                }
            }
        }
    }

    tracing::debug!(
        bytes_received = response.len(),
        deltas_received = deltas_received,
        "Stream completed"
    );
    Ok(response)
}

/// Client for OpenAI-style chat-completion endpoints
#[derive(Clone)]
pub struct ChatCompletionClient {
    transport: Arc<dyn HttpTransport>,
}

impl ChatCompletionClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Run one chat completion against `base_url`, tagged with `tier`
    ///
    /// Streams when `config.stream` is set, forwarding deltas to `on_delta`.
    pub async fn complete(
        &self,
        base_url: &str,
        tier: Tier,
        conversation: &[ConversationMessage],
        config: &GenerationConfig,
        on_delta: Option<&DeltaCallback>,
    ) -> Result<String, CompletionError> {
        let request = ChatCompletionRequest::new(tier, conversation, config);
        let body =
            serde_json::to_value(&request).map_err(|e| CompletionError::Encode(e.to_string()))?;
        let url = completions_url(base_url);

        tracing::debug!(
            url = %url,
            tier = %tier,
            messages = conversation.len(),
            stream = config.stream,
            "Sending chat completion request"
        );

        if config.stream {
            let chunks = self.transport.post_stream(&url, &body).await?;
            relay_stream(chunks, on_delta).await
        } else {
            let response = self.transport.post_json(&url, &body).await?;
            Ok(message_content(&response))
        }
    }
}
