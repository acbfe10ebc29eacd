//! Conversation and generation parameters supplied by the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One message of a conversation
///
/// Immutable once created; the router only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversationMessage {
    role: Role,
    content: String,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Content of the last message, or `""` for an empty conversation
pub fn last_content(conversation: &[ConversationMessage]) -> &str {
    conversation.last().map(|m| m.content()).unwrap_or_default()
}

/// Per-call generation parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stream: false,
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.95,
        }
    }
}

impl GenerationConfig {
    /// Enable or disable streaming
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Validate parameter ranges
    ///
    /// # Errors
    /// Returns a description of the first invalid parameter.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be a finite number between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        if !self.top_p.is_finite() || !(0.0..=1.0).contains(&self.top_p) {
            return Err(format!(
                "top_p must be a finite number between 0.0 and 1.0, got {}",
                self.top_p
            ));
        }
        Ok(())
    }
}
