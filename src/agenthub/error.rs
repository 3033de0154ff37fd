//! Error taxonomy shared across the hub runtime.
//!
//! Every component in the crate reports failures through [`HubError`] so that
//! callers can branch on the *kind* of failure without string matching. The
//! hub layer converts these into `ReceiveError` pushes or `success = false`
//! responses at the method boundary; nothing in this crate lets an error
//! escape into the transport.
//!
//! # Example
//!
//! ```rust
//! use agenthub::error::HubError;
//!
//! let err = HubError::not_found("session", "s-42");
//! assert!(err.to_string().contains("Session s-42 not found"));
//! ```

use std::error::Error;
use std::fmt;

/// Convenience alias used by the core components.
pub type HubResult<T> = Result<T, HubError>;

/// Classified failure raised by the session, agent, routing, and
/// orchestration components.
///
/// The variants mirror how failures are surfaced to clients:
/// `InvalidArgument` and `NotFound` are thrown back to the immediate caller,
/// `Timeout` and `Cancelled` are reported as normal results carrying a
/// marker, and `AdapterFailure` distinguishes fatal provider errors (which
/// move an agent to its error state) from transient ones.
#[derive(Debug, Clone)]
pub enum HubError {
    /// A required input was empty or malformed.
    InvalidArgument(String),
    /// An unknown session, agent, or tool was referenced.
    NotFound(String),
    /// A tool requiring approval was rejected.
    PermissionDenied(String),
    /// The operation is not valid in the current state
    /// (e.g. sending to an agent that is shut down).
    PreconditionFailed(String),
    /// The operation exceeded its deadline.
    Timeout(String),
    /// The operation was cancelled cooperatively; partial state is retained.
    Cancelled(String),
    /// An underlying provider, tool, or transport error. `fatal` marks
    /// failures after which the owning agent cannot continue.
    AdapterFailure {
        /// Human readable description from the adapter.
        message: String,
        /// Whether the owning agent must transition to its error state.
        fatal: bool,
    },
    /// An unexpected internal failure, tagged with a correlation id that is
    /// also written to the log.
    Internal {
        /// Correlation id shared between the log entry and the surfaced error.
        correlation_id: String,
        /// Description of the unexpected condition.
        message: String,
    },
}

impl HubError {
    /// Build a [`HubError::NotFound`] with the conventional
    /// `"<Kind> <id> not found"` message used across the hub surface.
    pub fn not_found(kind: &str, id: &str) -> Self {
        let mut label = kind.to_string();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        HubError::NotFound(format!("{} {} not found", label, id))
    }

    /// Build an [`HubError::InvalidArgument`] from any displayable cause.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        HubError::InvalidArgument(message.into())
    }

    /// Wrap an unexpected failure, generating a fresh correlation id.
    ///
    /// The correlation id is logged at error level alongside the message so
    /// that a generic failure surfaced to a client can be matched to the log.
    pub fn internal(message: impl Into<String>) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let message = message.into();
        log::error!("internal error [{}]: {}", correlation_id, message);
        HubError::Internal {
            correlation_id,
            message,
        }
    }

    /// True when the error represents a cooperative cancellation or timeout,
    /// both of which are reported as markers rather than failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HubError::Cancelled(_) | HubError::Timeout(_))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            HubError::NotFound(msg) => write!(f, "{}", msg),
            HubError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            HubError::PreconditionFailed(msg) => write!(f, "Precondition failed: {}", msg),
            HubError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            HubError::Cancelled(msg) => write!(f, "Cancelled: {}", msg),
            HubError::AdapterFailure { message, fatal } => {
                if *fatal {
                    write!(f, "Adapter failure (fatal): {}", message)
                } else {
                    write!(f, "Adapter failure: {}", message)
                }
            }
            HubError::Internal {
                correlation_id,
                message,
            } => write!(f, "Internal error [{}]: {}", correlation_id, message),
        }
    }
}

impl Error for HubError {}

impl From<Box<dyn Error + Send + Sync>> for HubError {
    /// Collaborator traits surface `Box<dyn Error + Send + Sync>`; at the
    /// component boundary those become non-fatal adapter failures.
    fn from(err: Box<dyn Error + Send + Sync>) -> Self {
        HubError::AdapterFailure {
            message: err.to_string(),
            fatal: false,
        }
    }
}
