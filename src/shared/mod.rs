//! Request plumbing shared by the router and the local runner
//!
//! HTTP transport abstraction, the chat-completion client with its
//! streaming relay, and per-tier dispatch.

pub mod completions;
pub mod dispatch;
pub mod transport;

pub use completions::{ChatCompletionClient, DeltaCallback};
pub use dispatch::{Dispatcher, GenerationRequest, TierTimeouts};
pub use transport::{ChunkStream, HttpTransport, ReqwestTransport};
