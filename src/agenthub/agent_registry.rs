//! Agent factory and registry.
//!
//! The [`AgentRegistry`] owns the process-wide agent instances: exactly one
//! [`Agent`] per id, created through the pluggable [`AgentFactory`]
//! collaborator which knows how to build the provider-specific adapter for
//! each agent type. Registration is keyed by agent id; re-registering an id
//! destroys the previous instance first.

use crate::agenthub::agent::{Agent, AgentAdapter, AgentInfo};
use crate::agenthub::config::HubConfig;
use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::event_bus::EventBus;
use crate::agenthub::tool_protocol::{ApprovalHandler, StaticApprovalHandler, ToolRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything needed to create one agent.
#[derive(Debug, Clone)]
pub struct CreateAgentRequest {
    /// Id the agent will be registered under. Must be unused.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Adapter family to instantiate (resolved by the factory).
    pub agent_type: String,
    /// Opaque configuration forwarded to the factory and stored on the
    /// agent.
    pub configuration: serde_json::Value,
}

/// Collaborator that builds provider-specific adapters.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Build an adapter of the given family.
    ///
    /// Unknown families should fail; the registry surfaces the error to the
    /// caller unchanged.
    async fn create_adapter(
        &self,
        agent_type: &str,
        configuration: &serde_json::Value,
    ) -> Result<Arc<dyn AgentAdapter>, Box<dyn Error + Send + Sync>>;
}

/// Process-wide agent registry.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<Agent>>>,
    factory: Arc<dyn AgentFactory>,
    bus: Arc<EventBus>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<dyn ApprovalHandler>,
    config: HubConfig,
}

impl AgentRegistry {
    /// Create a registry over the given factory and bus, with a shared tool
    /// registry handed to every agent.
    pub fn new(factory: Arc<dyn AgentFactory>, bus: Arc<EventBus>, config: HubConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            factory,
            bus,
            tools: Arc::new(ToolRegistry::new()),
            approvals: StaticApprovalHandler::allow_all(),
            config,
        }
    }

    /// Replace the shared tool registry (builder pattern).
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Replace the approval collaborator (builder pattern).
    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalHandler>) -> Self {
        self.approvals = approvals;
        self
    }

    /// The tool registry shared by agents created here.
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Create, initialize, and register a new agent.
    ///
    /// Fails with `InvalidArgument` on an empty id, a duplicate id, or when
    /// the configured agent cap is reached, and with an adapter failure when
    /// the factory or initialization fails (the agent is not registered in
    /// that case).
    pub async fn create_agent(&self, request: CreateAgentRequest) -> HubResult<Arc<Agent>> {
        if request.id.is_empty() {
            return Err(HubError::invalid_argument("agent id must not be empty"));
        }
        {
            let agents = self.agents.read().await;
            if agents.contains_key(&request.id) {
                return Err(HubError::invalid_argument(format!(
                    "agent id {} is already registered",
                    request.id
                )));
            }
            if agents.len() >= self.config.max_concurrent_agents {
                return Err(HubError::PreconditionFailed(format!(
                    "agent limit of {} reached",
                    self.config.max_concurrent_agents
                )));
            }
        }

        let adapter = self
            .factory
            .create_adapter(&request.agent_type, &request.configuration)
            .await
            .map_err(|err| HubError::AdapterFailure {
                message: format!("factory failed for type {}: {}", request.agent_type, err),
                fatal: true,
            })?;

        let agent = Arc::new(
            Agent::new(
                request.id.clone(),
                request.name,
                adapter,
                Arc::clone(&self.bus),
            )
            .with_configuration(request.configuration)
            .with_tools(Arc::clone(&self.tools))
            .with_approvals(Arc::clone(&self.approvals)),
        );
        agent.initialize().await?;

        // The id may have been taken while the adapter initialized; the
        // duplicate loses and is torn down.
        let mut agents = self.agents.write().await;
        if agents.contains_key(&request.id) {
            drop(agents);
            agent.shutdown().await;
            return Err(HubError::invalid_argument(format!(
                "agent id {} is already registered",
                request.id
            )));
        }
        agents.insert(request.id.clone(), Arc::clone(&agent));
        log::info!("registered agent {} ({})", request.id, agent.agent_type);
        Ok(agent)
    }

    /// Fetch an agent by id. Empty or unknown ids yield `None`.
    pub async fn get_agent(&self, id: &str) -> Option<Arc<Agent>> {
        if id.is_empty() {
            return None;
        }
        let agents = self.agents.read().await;
        agents.get(id).cloned()
    }

    /// Summaries of every registered agent, sorted by id.
    pub async fn list_configured_agents(&self) -> Vec<AgentInfo> {
        let agents = self.agents.read().await;
        let mut infos: Vec<AgentInfo> = agents.values().map(|a| AgentInfo::from_agent(a)).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Register an externally built agent under `id`, overwriting any
    /// previous holder of the id. The previous instance is shut down first.
    pub async fn register_agent(&self, id: &str, agent: Arc<Agent>) {
        let previous = {
            let mut agents = self.agents.write().await;
            agents.remove(id)
        };
        if let Some(previous) = previous {
            log::info!("replacing agent {}; shutting the old instance down", id);
            previous.shutdown().await;
        }
        let mut agents = self.agents.write().await;
        agents.insert(id.to_string(), agent);
    }

    /// Remove and shut down the agent behind `id`. Returns whether an agent
    /// was removed.
    pub async fn unregister_agent(&self, id: &str) -> bool {
        let removed = {
            let mut agents = self.agents.write().await;
            agents.remove(id)
        };
        match removed {
            Some(agent) => {
                agent.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Number of registered agents.
    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Shut down every agent and clear the registry.
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<Agent>> = {
            let mut agents = self.agents.write().await;
            agents.drain().map(|(_, agent)| agent).collect()
        };
        for agent in drained {
            agent.shutdown().await;
        }
    }
}
