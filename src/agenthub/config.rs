//! Runtime configuration for the hub.
//!
//! Provides the [`HubConfig`] struct consumed by the agent runtime, router,
//! and orchestrator. Users construct it manually — no file parsing or
//! environment lookups happen inside the crate.
//!
//! # Example
//!
//! ```rust
//! use agenthub::config::HubConfig;
//! use std::time::Duration;
//!
//! // Use the defaults
//! let config = HubConfig::default();
//! assert_eq!(config.orchestrator_parallelism, 8);
//!
//! // Or override selectively
//! let config = HubConfig {
//!     default_step_timeout: Duration::from_secs(30),
//!     ..HubConfig::default()
//! };
//! ```

use std::time::Duration;

/// Tunables consumed by the core components.
///
/// This struct is intentionally minimal; callers own how the values are
/// sourced (flags, files, hard-coded) and pass the result in.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on agents the registry will create.
    pub max_concurrent_agents: usize,
    /// Deadline applied to a plan step when the request does not carry one.
    pub default_step_timeout: Duration,
    /// Maximum size of a single streamed chunk forwarded to clients; larger
    /// chunks are split by the router before broadcast.
    pub max_stream_chunk_size: usize,
    /// Cap on how many eligible plan steps run concurrently.
    pub orchestrator_parallelism: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 8,
            default_step_timeout: Duration::from_secs(120),
            max_stream_chunk_size: 16 * 1024,
            orchestrator_parallelism: 8,
        }
    }
}
