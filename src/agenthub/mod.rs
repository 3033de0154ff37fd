// src/agenthub/mod.rs

pub mod agent;
pub mod agent_hub;
pub mod agent_registry;
pub mod config;
pub mod connection_manager;
pub mod dto;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod message;
pub mod message_router;
pub mod orchestrator;
pub mod orchestrator_hub;
pub mod session;
pub mod session_manager;
pub mod session_repository;
pub mod tool_protocol;
pub mod transport;
#[cfg(feature = "ws-server")]
pub mod ws_server;

// Explicitly export the entry-point types so callers reach them as
// agenthub::SessionManager instead of agenthub::session_manager::SessionManager.
pub use agent::Agent;
pub use agent_hub::AgentHub;
pub use agent_registry::AgentRegistry;
pub use event_bus::EventBus;
pub use orchestrator::Orchestrator;
pub use orchestrator_hub::OrchestratorHub;
pub use session_manager::SessionManager;
