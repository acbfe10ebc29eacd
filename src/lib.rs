//! hybridroute - Hybrid inference router for local, on-premise and cloud LLMs
//!
//! Decides, per conversation turn, whether a generation runs on a local model,
//! an on-premise GPU cluster or a cloud provider, relays streamed output back
//! to the caller, and falls back to the remaining tiers when one fails.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod router;
pub mod shared;
pub mod telemetry;
