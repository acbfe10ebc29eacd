//! Generation endpoint
//!
//! Handles POST /v1/generate. Non-streaming requests return the completed
//! generation as JSON. With `config.stream = true` the response is a
//! Server-Sent Events stream.
//!
//! # SSE Format
//!
//! ```text
//! event: delta
//! data: {"content":"Hel"}
//!
//! event: done
//! data: {"response":"Hello","decision":{...}}
//!
//! ```
//!
//! A terminal failure ends the stream with `event: error` instead of `done`.
//! When a tier fails mid-stream and another takes over, `event: reset` tells
//! the client to discard the deltas it has shown so far.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::models::{ConversationMessage, GenerationConfig};
use crate::router::{Generation, SessionState, StreamSink};
use axum::{
    Extension, Json,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Body of POST /v1/generate
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub config: GenerationConfig,
}

impl GenerateRequest {
    /// Reject requests the router should never see
    pub fn validate(&self) -> AppResult<()> {
        if self.messages.is_empty() {
            return Err(AppError::Validation(
                "messages must contain at least one message".to_string(),
            ));
        }
        self.config.validate().map_err(AppError::Validation)
    }
}

/// POST /v1/generate handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response, AppError> {
    request.validate()?;
    let session = *state.session().read().await;

    tracing::debug!(
        request_id = %request_id,
        messages = request.messages.len(),
        stream = request.config.stream,
        "Received generation request"
    );

    if request.config.stream {
        return Ok(stream_response(state, session, request, request_id));
    }

    let generation = state
        .router()
        .generate_with_routing(&session, &request.messages, &request.config, None)
        .await
        .map_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Generation failed");
            e
        })?;

    Ok(Json(generation).into_response())
}

/// Messages from the generation task to the SSE stream
#[derive(Debug)]
enum StreamMessage {
    Delta(String),
    Reset,
    Done(Generation),
    Failed(String),
}

impl StreamMessage {
    fn into_event(self) -> Event {
        let (name, payload) = match self {
            Self::Delta(content) => ("delta", json!({ "content": content })),
            Self::Reset => ("reset", json!({})),
            Self::Done(generation) => match serde_json::to_value(&generation) {
                Ok(value) => ("done", value),
                Err(e) => ("error", json!({ "error": e.to_string() })),
            },
            Self::Failed(error) => ("error", json!({ "error": error })),
        };
        Event::default().event(name).data(payload.to_string())
    }
}

/// Forwards router output into the SSE channel
///
/// A closed channel means the client went away; the generation still runs
/// to completion (it is not cancellable).
struct ChannelSink {
    tx: mpsc::UnboundedSender<StreamMessage>,
}

impl StreamSink for ChannelSink {
    fn delta(&self, content: &str) {
        let _ = self.tx.send(StreamMessage::Delta(content.to_string()));
    }

    fn reset(&self) {
        let _ = self.tx.send(StreamMessage::Reset);
    }
}

/// Run the generation on a task and relay its deltas as SSE events
///
/// Deltas are forwarded in arrival order through an unbounded channel; the
/// stream ends after the `done` or `error` event.
fn stream_response(
    state: AppState,
    session: SessionState,
    request: GenerateRequest,
    request_id: RequestId,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<StreamMessage>();

    tokio::spawn(async move {
        let sink: Arc<dyn StreamSink> = Arc::new(ChannelSink { tx: tx.clone() });

        let result = state
            .router()
            .generate_with_routing(&session, &request.messages, &request.config, Some(sink))
            .await;

        let message = match result {
            Ok(generation) => {
                tracing::info!(
                    request_id = %request_id,
                    tier = %generation.decision.tier(),
                    latency_ms = generation.decision.estimated_latency_ms(),
                    "Streaming generation completed"
                );
                StreamMessage::Done(generation)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    error = %e,
                    "Streaming generation failed"
                );
                StreamMessage::Failed(e.to_string())
            }
        };

        if tx.send(message).is_err() {
            tracing::debug!(
                request_id = %request_id,
                "Client disconnected before the stream finished"
            );
        }
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let message = rx.recv().await?;
        Some((Ok::<Event, Infallible>(message.into_event()), rx))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}
