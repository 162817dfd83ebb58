//! Error taxonomy: capability failures, state-carried faults, and the
//! engine-level error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type using [`OrchestratorError`].
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Errors surfaced by collaborator capabilities.
///
/// The split decides retry behavior: only [`Transient`](CapabilityError::Transient)
/// failures are retried.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// Failure that may succeed on retry (rate limits, timeouts, 5xx).
    #[error("transient failure: {0}")]
    Transient(String),

    /// Failure that will not succeed on retry (auth, invalid request).
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CapabilityError {
    /// Whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CapabilityError::Transient(_))
    }

    /// The closed error kind this failure maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CapabilityError::Transient(_) => ErrorKind::TransientExternal,
            CapabilityError::Permanent(_) => ErrorKind::PermanentExternal,
            CapabilityError::NotFound(_) => ErrorKind::PermanentExternal,
        }
    }
}

/// Closed taxonomy of failure kinds carried in [`Fault`] records and agent
/// outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request itself was malformed (empty or oversized query).
    InvalidInput,
    /// No ticker symbol could be recognized in the query.
    SymbolNotFound,
    /// Retrieval produced no usable context.
    NoContext,
    /// A collaborator failed in a retryable way.
    TransientExternal,
    /// A collaborator failed in a non-retryable way.
    PermanentExternal,
    /// Chart rendering failed.
    RenderFailed,
    /// An agent exceeded its deadline.
    Timeout,
    /// The request was cancelled upstream.
    Cancelled,
    /// An agent the intent depends on failed.
    RequiredAgentFailed,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::SymbolNotFound => "symbol_not_found",
            ErrorKind::NoContext => "no_context",
            ErrorKind::TransientExternal => "transient_external",
            ErrorKind::PermanentExternal => "permanent_external",
            ErrorKind::RenderFailed => "render_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RequiredAgentFailed => "required_agent_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded in the request state.
///
/// `recoverable = false` gates the rest of the run: only the error handler
/// and the responder may execute afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    /// Failure classification.
    pub kind: ErrorKind,
    /// Node or agent that produced the failure.
    pub node: String,
    /// Internal message; never shown to the user.
    pub message: String,
    /// Whether the run may continue past this failure.
    pub recoverable: bool,
}

impl Fault {
    /// Create a fault record.
    pub fn new(
        kind: ErrorKind,
        node: impl Into<String>,
        message: impl Into<String>,
        recoverable: bool,
    ) -> Self {
        Self {
            kind,
            node: node.into(),
            message: message.into(),
            recoverable,
        }
    }

    /// Create an unrecoverable fault.
    pub fn fatal(kind: ErrorKind, node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(kind, node, message, false)
    }

    /// Create a recoverable fault.
    pub fn recoverable(
        kind: ErrorKind,
        node: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(kind, node, message, true)
    }

    /// Map a capability failure observed by `node` into a fault record.
    /// Transient failures stay recoverable; the rest do not.
    pub fn from_capability(node: impl Into<String>, err: &CapabilityError) -> Self {
        Self::new(err.kind(), node, err.to_string(), err.is_retryable())
    }
}

/// Engine-level errors: anything that prevents the graph from being built
/// or run at all. Request-level failures travel inside the state as
/// [`Fault`] records instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The workflow graph failed to build or validate.
    #[error(transparent)]
    Graph(#[from] stategraph::GraphError),

    /// Serialization failure while packing a response payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_the_only_retryable_class() {
        assert!(CapabilityError::Transient("429".into()).is_retryable());
        assert!(!CapabilityError::Permanent("401".into()).is_retryable());
        assert!(!CapabilityError::NotFound("missing".into()).is_retryable());
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(ErrorKind::RequiredAgentFailed.as_str(), "required_agent_failed");
        assert_eq!(
            serde_json::to_string(&ErrorKind::InvalidInput).unwrap(),
            "\"invalid_input\""
        );
    }

    #[test]
    fn capability_faults_keep_retryability() {
        let fault = Fault::from_capability("data", &CapabilityError::Transient("503".into()));
        assert_eq!(fault.kind, ErrorKind::TransientExternal);
        assert!(fault.recoverable);

        let fault = Fault::from_capability("data", &CapabilityError::Permanent("401".into()));
        assert!(!fault.recoverable);
    }
}
