//! AgentHub — a real-time multi-agent orchestration hub.
//!
//! AgentHub binds transport connections, conversation sessions, streaming
//! agents, tool execution, and multi-step orchestration plans into one
//! runtime. Clients talk to two logical endpoints — an agent hub and an
//! orchestrator hub — over any bidirectional transport that supports named
//! groups; the crate ships an in-memory transport and an optional WebSocket
//! binding (`ws-server` feature).
//!
//! ```text
//!  client ──► OrchestratorHub ──► SessionManager ──► SessionRepository
//!     │             │                    │
//!     │             ▼                    ▼
//!     │        Orchestrator ──►      EventBus  ◄── Agent runtime
//!     │             │                    │
//!     └──► AgentHub ┴──► MessageRouter ──┴──► GroupTransport ──► clients
//! ```
//!
//! Provider adapters, concrete tools, and storage engines are collaborators
//! behind traits ([`AgentAdapter`](crate::agent::AgentAdapter),
//! [`ToolHandler`](crate::tool_protocol::ToolHandler),
//! [`SessionRepository`](crate::session_repository::SessionRepository)); the
//! crate contains the concurrency fabric, not the integrations.

// Import the top-level `agenthub` module.
pub mod agenthub;

// Re-exporting key items for easier external access.
pub use agenthub::agent::{Agent, AgentAdapter, AgentResponse, AgentStatus};
pub use agenthub::agent_hub::AgentHub;
pub use agenthub::agent_registry::AgentRegistry;
pub use agenthub::config::HubConfig;
pub use agenthub::connection_manager::ConnectionManager;
pub use agenthub::error::{HubError, HubResult};
pub use agenthub::event_bus::EventBus;
pub use agenthub::message::AgentMessage;
pub use agenthub::message_router::MessageRouter;
pub use agenthub::orchestrator::Orchestrator;
pub use agenthub::orchestrator_hub::OrchestratorHub;
pub use agenthub::session::Session;
pub use agenthub::session_manager::SessionManager;
pub use agenthub::session_repository::{InMemorySessionRepository, SessionRepository};
pub use agenthub::{
    agent, agent_hub, agent_registry, config, connection_manager, dto, error, event_bus, events,
    message, message_router, orchestrator, orchestrator_hub, session, session_manager,
    session_repository, tool_protocol, transport,
};
#[cfg(feature = "ws-server")]
pub use agenthub::ws_server;

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// Initialize `env_logger` once for binaries, examples, and tests.
///
/// Safe to call any number of times; only the first call installs the
/// logger. Respects `RUST_LOG` the usual way.
pub fn init_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env()
            .format_timestamp_millis()
            .try_init();
    });
}
