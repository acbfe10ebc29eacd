//! Command-line interface for hybridroute
//!
//! Provides argument parsing and subcommand handling for the hybridroute binary.

use clap::{Parser, Subcommand};

/// Hybrid inference router for local, on-premise and cloud LLM tiers
#[derive(Parser)]
#[command(name = "hybridroute")]
#[command(version)]
#[command(about = "Hybrid inference router for local, on-premise and cloud LLM tiers")]
#[command(
    long_about = "hybridroute decides, per conversation turn, whether a generation runs on a \
    local model, an on-premise GPU cluster or a cloud provider, using privacy, latency and \
    cost heuristics with a fixed fallback chain."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Probe tier availability once and print the result as JSON
    Probe,
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# hybridroute Configuration
# =========================
#
# This file configures the HTTP server, tier endpoints, the local model,
# default routing preferences and observability settings.

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "127.0.0.1"

# Port to listen on
port = 3000

# Default generation timeout in seconds (can be overridden per-tier in [timeouts])
request_timeout_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# TIER ENDPOINTS
# ─────────────────────────────────────────────────────────────────────────────
#
# Base URLs only: /v1/chat/completions and /v1/health are appended.
# Do not end a URL with /v1.

[endpoints]
# Self-hosted GPU cluster (OpenAI-compatible chat completions)
on_premise = "http://gpu-cluster.internal:8000"

# Managed cloud inference gateway
cloud = "https://inference.example.com"

# Combined health endpoint reporting on_premise and cloud reachability
health = "http://gateway.internal:8080"

# ─────────────────────────────────────────────────────────────────────────────
# LOCAL MODEL (Browser tier)
# ─────────────────────────────────────────────────────────────────────────────
#
# Optional. Without base_url the local tier is never ready.

[local]
# OpenAI-compatible server on this machine (llama.cpp, Ollama, ...)
base_url = "http://127.0.0.1:11434"

# Model identifier to load
model = "Llama-3.2-3B-Instruct-q4f16_1"

# Load the model when the server starts
load_on_startup = true

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING PREFERENCES (session defaults)
# ─────────────────────────────────────────────────────────────────────────────

[preferences]
# "auto" lets the policy decide; "browser", "on_premise" or "cloud" force a tier
preferred_tier = "auto"

# "low", "medium" or "high". High keeps every request off the cloud tier
privacy_level = "medium"

# "low", "medium" or "high". Low sends short prompts to the local model
latency_requirement = "medium"

# Prefer tiers without marginal cost (local, then on-premise)
cost_optimization = false

# Try the remaining tiers when the chosen one fails
fallback_enabled = true

# ─────────────────────────────────────────────────────────────────────────────
# AVAILABILITY
# ─────────────────────────────────────────────────────────────────────────────

[availability]
# Probe once before serving
probe_on_startup = true

# Re-probe every N seconds (0 disables the background probe)
probe_interval_seconds = 30

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port

# ─────────────────────────────────────────────────────────────────────────────
# TIMEOUTS (Optional)
# ─────────────────────────────────────────────────────────────────────────────
#
# Per-tier timeout overrides in seconds, each in (0, 300].
# If not specified, server.request_timeout_seconds is used.
# A timeout counts as a tier failure and triggers fallback.

[timeouts]
browser = 120     # local models on consumer hardware are slow
on_premise = 60
cloud = 30
health = 5        # availability probe
"#
}
