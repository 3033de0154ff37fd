//! Message data model shared by sessions, agents, and the wire surface.
//!
//! An [`AgentMessage`] is one immutable entry in a session's ordered log:
//! user input, an assistant turn, a system note, or a tool exchange. Messages
//! carry optional [`Attachment`]s, free-form metadata, and the [`ToolCall`]s
//! the authoring agent made while producing the content. Once appended to a
//! session the record never changes; the repository stamps the strictly
//! increasing `sequence_number`.
//!
//! # Example
//!
//! ```rust
//! use agenthub::message::{AgentMessage, MessageRole};
//!
//! let msg = AgentMessage::user("s-1", "hi there");
//! assert_eq!(msg.role, MessageRole::User);
//! assert_eq!(msg.agent_id, "user");
//! assert_eq!(msg.sequence_number, 0); // assigned by the repository on append
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Sentinel `agent_id` used for messages authored by the human user rather
/// than by a registered agent.
pub const USER_AGENT_ID: &str = "user";

/// The role a message plays in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// Priming or administrative content.
    System,
    /// Human-authored input.
    User,
    /// Agent-authored output.
    Assistant,
    /// A tool invocation or its result, recorded mid-turn.
    Tool,
}

/// A file or blob attached to a message.
///
/// Either `url` or `content` is populated depending on whether the payload
/// lives out-of-band or inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name presented to the user.
    pub file_name: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Out-of-band location of the payload, if stored externally.
    pub url: Option<String>,
    /// Inline payload, if small enough to travel with the message.
    pub content: Option<String>,
}

/// A structured request to run a named tool with a mapping of arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id of this call, used to correlate the [`ToolResult`].
    pub id: String,
    /// Name of the tool to execute.
    pub tool_name: String,
    /// JSON arguments forwarded to the tool handler.
    pub arguments: serde_json::Value,
    /// Result of the execution, attached once the call completes.
    pub result: Option<ToolResult>,
}

impl ToolCall {
    /// Create a call with a fresh id and the given tool name and arguments.
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
            result: None,
        }
    }
}

/// The outcome of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool completed without error.
    pub success: bool,
    /// Output payload produced by the tool.
    pub output: serde_json::Value,
    /// Error message when `success` is false.
    pub error: Option<String>,
    /// Execution metadata (timing, cost, approval notes, ...).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Wall-clock execution time in milliseconds, measured by the registry.
    pub execution_time_ms: u64,
}

impl ToolResult {
    /// Convenience constructor for a successful execution.
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
            execution_time_ms: 0,
        }
    }

    /// Convenience constructor for a failed execution.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
            execution_time_ms: 0,
        }
    }

    /// A failure carrying the conventional `"timeout"` marker, reported when
    /// a tool exceeds its caller-supplied deadline.
    pub fn timeout() -> Self {
        Self::failure("timeout")
    }

    /// Attach a metadata entry to the result.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One entry in a session's message log.
///
/// Created by the hub on user input or by the agent runtime on assistant
/// output, then handed to the repository which stamps `sequence_number`.
/// Records are immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message id.
    pub id: String,
    /// Id of the owning session.
    pub session_id: String,
    /// Authoring agent id, or [`USER_AGENT_ID`] for human input.
    pub agent_id: String,
    /// Role of the message in the conversation.
    pub role: MessageRole,
    /// Message body.
    pub content: String,
    /// Creation time, stamped by the session manager.
    pub timestamp: DateTime<Utc>,
    /// Files attached to the message.
    pub attachments: Vec<Attachment>,
    /// Free-form metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Tool calls made while producing this message. Empty for most records.
    pub tool_calls: Vec<ToolCall>,
    /// Position in the session log, assigned by the repository starting at 1.
    /// Zero until the message has been appended.
    pub sequence_number: u64,
}

impl AgentMessage {
    /// Create a message with a fresh id and the given role, author, and body.
    pub fn new(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            metadata: HashMap::new(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
            sequence_number: 0,
        }
    }

    /// Shorthand for a user-authored message.
    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, USER_AGENT_ID, MessageRole::User, content)
    }

    /// Shorthand for an assistant message authored by `agent_id`.
    pub fn assistant(
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(session_id, agent_id, MessageRole::Assistant, content)
    }

    /// Attach files to the message (builder pattern).
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Attach tool calls to the message (builder pattern).
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Add a metadata entry (builder pattern).
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
