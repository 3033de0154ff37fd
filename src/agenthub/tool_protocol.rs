//! Tool execution contract.
//!
//! Agents do not run tools themselves; they dispatch through a
//! [`ToolRegistry`] holding [`ToolHandler`] implementations. The registry
//! owns the cross-cutting concerns every tool shares: lookup, argument shape
//! checking, approval gating, deadline enforcement, and execution timing.
//! Concrete tools (file I/O, shell, web fetch, ...) live outside this crate
//! and plug in through the trait.
//!
//! # Approval
//!
//! A handler that reports [`requires_approval`](ToolHandler::requires_approval)
//! is gated through the [`ApprovalHandler`] collaborator before execution.
//! A rejected approval surfaces as a permission error to the caller, never
//! as a silent no-op.
//!
//! # Example
//!
//! ```rust
//! use agenthub::tool_protocol::{StaticApprovalHandler, ToolHandler, ToolRegistry, ToolExecutionContext};
//! use agenthub::message::{ToolCall, ToolResult};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ToolHandler for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn description(&self) -> &str { "Returns its arguments unchanged." }
//!     fn parameter_schema(&self) -> serde_json::Value {
//!         serde_json::json!({"type": "object"})
//!     }
//!     async fn execute(
//!         &self,
//!         arguments: serde_json::Value,
//!         _context: &ToolExecutionContext,
//!         _cancellation: CancellationToken,
//!     ) -> Result<ToolResult, Box<dyn std::error::Error + Send + Sync>> {
//!         Ok(ToolResult::success(arguments))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = ToolRegistry::new();
//! registry.register(Arc::new(Echo)).await;
//!
//! let call = ToolCall::new("echo", serde_json::json!({"x": 1}));
//! let result = registry
//!     .execute(
//!         &call,
//!         &ToolExecutionContext::for_agent("a1"),
//!         &StaticApprovalHandler::allow_all(),
//!         None,
//!         CancellationToken::new(),
//!     )
//!     .await
//!     .unwrap();
//! assert!(result.success);
//! # }
//! ```

use crate::agenthub::error::{HubError, HubResult};
use crate::agenthub::message::{ToolCall, ToolResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Ambient information handed to a tool at execution time.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Session the invocation belongs to, when known.
    pub session_id: Option<String>,
    /// Agent on whose behalf the tool runs.
    pub agent_id: String,
    /// Working directory the tool should operate in.
    pub working_directory: Option<String>,
}

impl ToolExecutionContext {
    /// Context for a tool run by `agent_id` outside any session.
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            session_id: None,
            agent_id: agent_id.into(),
            working_directory: None,
        }
    }

    /// Attach the owning session (builder pattern).
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach a working directory (builder pattern).
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

/// A named tool an agent can invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Identifier the LLM uses to select the tool.
    fn name(&self) -> &str;

    /// Human-readable description surfaced to agents and clients.
    fn description(&self) -> &str;

    /// Whether invocations must pass the approval collaborator first.
    fn requires_approval(&self) -> bool {
        false
    }

    /// JSON Schema describing the accepted arguments.
    fn parameter_schema(&self) -> serde_json::Value;

    /// Run the tool.
    ///
    /// Implementations should observe `cancellation` at their natural
    /// suspension points and validate their own arguments, returning an
    /// error for malformed input.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolExecutionContext,
        cancellation: CancellationToken,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>>;
}

/// Descriptive record for one registered tool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    /// Tool identifier.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Whether invocation requires approval.
    pub requires_approval: bool,
    /// JSON Schema of the accepted arguments.
    pub parameter_schema: serde_json::Value,
}

/// How an approval collaborator answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Approve everything without asking.
    AlwaysAllow,
    /// Reject everything without asking.
    AlwaysDeny,
    /// Ask on every invocation.
    AskEach,
    /// Ask once per tool, then reuse the answer.
    AskOnce,
}

/// Outcome of an approval request.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    /// Whether the invocation may proceed.
    pub approved: bool,
    /// Optional explanation, surfaced on rejection.
    pub reason: Option<String>,
}

/// Collaborator deciding whether gated tools may run.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// The mode this handler operates in.
    fn mode(&self) -> ApprovalMode;

    /// Decide whether `tool_name` may run `command` for the stated reason.
    async fn request_approval(
        &self,
        tool_name: &str,
        command: &str,
        reason: &str,
    ) -> ApprovalDecision;
}

/// Non-interactive approval handler with a fixed answer.
///
/// In [`ApprovalMode::AskOnce`] the fixed answer is recorded per tool on
/// first use, matching how an interactive implementation would cache the
/// user's reply.
pub struct StaticApprovalHandler {
    mode: ApprovalMode,
    approve: bool,
    asked: Mutex<HashSet<String>>,
}

impl StaticApprovalHandler {
    /// Handler that approves every request.
    pub fn allow_all() -> Arc<dyn ApprovalHandler> {
        Arc::new(Self {
            mode: ApprovalMode::AlwaysAllow,
            approve: true,
            asked: Mutex::new(HashSet::new()),
        })
    }

    /// Handler that rejects every request.
    pub fn deny_all() -> Arc<dyn ApprovalHandler> {
        Arc::new(Self {
            mode: ApprovalMode::AlwaysDeny,
            approve: false,
            asked: Mutex::new(HashSet::new()),
        })
    }

    /// Handler in the given mode answering `approve` whenever asked.
    pub fn with_mode(mode: ApprovalMode, approve: bool) -> Arc<dyn ApprovalHandler> {
        Arc::new(Self {
            mode,
            approve,
            asked: Mutex::new(HashSet::new()),
        })
    }
}

#[async_trait]
impl ApprovalHandler for StaticApprovalHandler {
    fn mode(&self) -> ApprovalMode {
        self.mode
    }

    async fn request_approval(
        &self,
        tool_name: &str,
        _command: &str,
        _reason: &str,
    ) -> ApprovalDecision {
        if self.mode == ApprovalMode::AskOnce {
            let mut asked = self.asked.lock().await;
            asked.insert(tool_name.to_string());
        }
        ApprovalDecision {
            approved: self.approve,
            reason: if self.approve {
                None
            } else {
                Some("rejected by policy".to_string())
            },
        }
    }
}

/// Registry routing tool calls to their handlers.
pub struct ToolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler under its own name, replacing any previous one.
    pub async fn register(&self, handler: Arc<dyn ToolHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.insert(handler.name().to_string(), handler);
    }

    /// Remove a handler. Unknown names are a no-op.
    pub async fn unregister(&self, tool_name: &str) {
        let mut handlers = self.handlers.write().await;
        handlers.remove(tool_name);
    }

    /// Whether a handler is registered under `tool_name`.
    pub async fn has_tool(&self, tool_name: &str) -> bool {
        let handlers = self.handlers.read().await;
        handlers.contains_key(tool_name)
    }

    /// Descriptors for every registered tool, sorted by name.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let handlers = self.handlers.read().await;
        let mut tools: Vec<ToolDescriptor> = handlers
            .values()
            .map(|handler| ToolDescriptor {
                name: handler.name().to_string(),
                description: handler.description().to_string(),
                requires_approval: handler.requires_approval(),
                parameter_schema: handler.parameter_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute `call` with approval gating, deadline enforcement, and
    /// execution timing.
    ///
    /// Lookup failure, malformed argument shape, and rejected approval are
    /// errors; a tool that runs and fails is a successful dispatch whose
    /// [`ToolResult::success`] is `false`. Exceeding `timeout` yields the
    /// conventional `"timeout"` failure result rather than an error.
    pub async fn execute(
        &self,
        call: &ToolCall,
        context: &ToolExecutionContext,
        approvals: &Arc<dyn ApprovalHandler>,
        timeout: Option<Duration>,
        cancellation: CancellationToken,
    ) -> HubResult<ToolResult> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers
                .get(&call.tool_name)
                .cloned()
                .ok_or_else(|| HubError::not_found("tool", &call.tool_name))?
        };

        if !(call.arguments.is_object() || call.arguments.is_null()) {
            return Err(HubError::invalid_argument(format!(
                "arguments for tool {} must be a JSON object",
                call.tool_name
            )));
        }

        if handler.requires_approval() {
            let command = call.arguments.to_string();
            let decision = approvals
                .request_approval(&call.tool_name, &command, handler.description())
                .await;
            if !decision.approved {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "approval rejected".to_string());
                return Err(HubError::PermissionDenied(format!(
                    "tool {} was not approved: {}",
                    call.tool_name, reason
                )));
            }
        }

        let started = Instant::now();
        let execution = handler.execute(call.arguments.clone(), context, cancellation);

        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, execution).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!(
                        "tool {} exceeded its {}ms deadline",
                        call.tool_name,
                        deadline.as_millis()
                    );
                    let mut result = ToolResult::timeout();
                    result.execution_time_ms = started.elapsed().as_millis() as u64;
                    return Ok(result);
                }
            },
            None => execution.await,
        };

        let elapsed = started.elapsed().as_millis() as u64;
        let mut result = match outcome {
            Ok(result) => result,
            Err(err) => ToolResult::failure(err.to_string()),
        };
        result.execution_time_ms = elapsed;
        Ok(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
