//! Local model runner
//!
//! The Browser tier runs a quantized model on the client's own compute. The
//! router only needs a readiness flag and a `generate` call; loading and
//! unloading are driven by the embedding application.

use crate::error::LocalRunnerError;
use crate::models::{ConversationMessage, GenerationConfig};
use crate::router::Tier;
use crate::shared::completions::{ChatCompletionClient, DeltaCallback};
use crate::shared::transport::HttpTransport;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Progress report emitted while a model loads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadProgress {
    /// Fraction complete in [0, 1]
    pub progress: f32,
    pub text: String,
}

/// Callback receiving load progress reports
pub type ProgressCallback = dyn Fn(&LoadProgress) + Send + Sync;

/// Contract of the Local Model Runner collaborator
#[async_trait]
pub trait LocalModelRunner: Send + Sync {
    /// Whether a model is loaded and can serve `generate`
    fn is_ready(&self) -> bool;

    /// Identifier of the loaded model, if any
    fn model_id(&self) -> Option<String>;

    /// Load a model, reporting progress
    async fn load(
        &self,
        model_id: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), LocalRunnerError>;

    /// Release the loaded model
    async fn unload(&self) -> Result<(), LocalRunnerError>;

    /// Generate a reply, streaming deltas when `config.stream` is set
    async fn generate(
        &self,
        conversation: &[ConversationMessage],
        config: &GenerationConfig,
        on_delta: Option<&DeltaCallback>,
    ) -> Result<String, LocalRunnerError>;
}

/// Runner for deployments without a local model
///
/// Never ready; every generation fails with [`LocalRunnerError::NotLoaded`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedRunner;

#[async_trait]
impl LocalModelRunner for DetachedRunner {
    fn is_ready(&self) -> bool {
        false
    }

    fn model_id(&self) -> Option<String> {
        None
    }

    async fn load(
        &self,
        model_id: &str,
        _on_progress: Option<&ProgressCallback>,
    ) -> Result<(), LocalRunnerError> {
        Err(LocalRunnerError::ModelNotFound(model_id.to_string()))
    }

    async fn unload(&self) -> Result<(), LocalRunnerError> {
        Ok(())
    }

    async fn generate(
        &self,
        _conversation: &[ConversationMessage],
        _config: &GenerationConfig,
        _on_delta: Option<&DeltaCallback>,
    ) -> Result<String, LocalRunnerError> {
        Err(LocalRunnerError::NotLoaded)
    }
}

/// Runner backed by a model server on the local machine
///
/// Talks to an OpenAI-compatible server (llama.cpp, Ollama) using the same
/// chat-completion wire format as the remote tiers, tagged `browser`.
pub struct LocalServerRunner {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    client: ChatCompletionClient,
    ready: AtomicBool,
    model: Mutex<Option<String>>,
}

impl LocalServerRunner {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: ChatCompletionClient::new(transport.clone()),
            transport,
            ready: AtomicBool::new(false),
            model: Mutex::new(None),
        }
    }

    /// Get the local server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn set_model(&self, model: Option<String>) {
        let ready = model.is_some();
        *self.model.lock().unwrap_or_else(PoisonError::into_inner) = model;
        self.ready.store(ready, Ordering::SeqCst);
    }
}

fn report(on_progress: Option<&ProgressCallback>, progress: f32, text: impl Into<String>) {
    if let Some(on_progress) = on_progress {
        on_progress(&LoadProgress {
            progress,
            text: text.into(),
        });
    }
}

#[async_trait]
impl LocalModelRunner for LocalServerRunner {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn model_id(&self) -> Option<String> {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn load(
        &self,
        model_id: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), LocalRunnerError> {
        report(on_progress, 0.0, format!("Checking local server for {model_id}"));

        let url = format!("{}/v1/models", self.base_url);
        let listing = self.transport.get_json(&url).await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Local model server unreachable");
            LocalRunnerError::Completion(e.into())
        })?;

        let listed = listing
            .get("data")
            .and_then(Value::as_array)
            .is_some_and(|models| {
                models
                    .iter()
                    .any(|m| m.get("id").and_then(Value::as_str) == Some(model_id))
            });
        if !listed {
            self.set_model(None);
            return Err(LocalRunnerError::ModelNotFound(model_id.to_string()));
        }

        self.set_model(Some(model_id.to_string()));
        report(on_progress, 1.0, format!("{model_id} ready"));
        tracing::info!(model = %model_id, base_url = %self.base_url, "Local model ready");
        Ok(())
    }

    async fn unload(&self) -> Result<(), LocalRunnerError> {
        if let Some(model) = self.model_id() {
            tracing::info!(model = %model, "Local model unloaded");
        }
        self.set_model(None);
        Ok(())
    }

    async fn generate(
        &self,
        conversation: &[ConversationMessage],
        config: &GenerationConfig,
        on_delta: Option<&DeltaCallback>,
    ) -> Result<String, LocalRunnerError> {
        if !self.is_ready() {
            return Err(LocalRunnerError::NotLoaded);
        }
        Ok(self
            .client
            .complete(&self.base_url, Tier::Browser, conversation, config, on_delta)
            .await?)
    }
}
