//! Caller-facing data and leaf collaborators
//!
//! Conversation types, the availability snapshot and its probe, and the
//! local model runner contract with its implementations.

pub mod availability;
pub mod conversation;
pub mod local;

pub use availability::{AvailabilityProbe, AvailabilityState};
pub use conversation::{ConversationMessage, GenerationConfig, Role, last_content};
pub use local::{
    DetachedRunner, LoadProgress, LocalModelRunner, LocalServerRunner, ProgressCallback,
};
