//! Harness error types.
//!
//! # Classification
//!
//! Errors fall into three groups:
//!
//! - **Protocol deviations** observed on the SUT: [`TckError::ProtocolViolation`],
//!   [`TckError::UnexpectedMessage`], [`TckError::ExpectationTimeout`],
//!   [`TckError::StateMismatch`].
//! - **State machine rejections**: [`TckError::IllegalStateTransition`] and
//!   [`TckError::CorrelationIdAlreadySet`]. These signal either a harness
//!   defect or a SUT that drove the negotiation somewhere it may not go.
//! - **Environment failures**: [`TckError::TransportIo`], [`TckError::Server`],
//!   [`TckError::Config`], [`TckError::Io`].
//!
//! Every variant is fatal to the pipeline that raised it. Transient HTTP
//! failures never surface here directly; the transport retries them and
//! escalates to `ProtocolViolation` once the retry budget is spent.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::{NegotiationRole, NegotiationState};

/// Kind of protocol violation detected while classifying an HTTP response.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The counterparty answered 404 although success was expected.
    #[error("unexpected 404")]
    UnexpectedNotFound,

    /// The counterparty answered with a status the call does not accept.
    #[error("unexpected response code: {0}")]
    UnexpectedStatus(u16),

    /// The call was expected to fail but the counterparty answered 2xx.
    #[error("expected to throw an error")]
    MissingExpectedError,
}

/// Conformance harness errors.
#[derive(Error, Debug)]
pub enum TckError {
    /// The SUT answered an outbound call in a way the protocol forbids.
    #[error("Protocol violation on {url}: {kind}")]
    ProtocolViolation {
        /// Request URL.
        url: String,
        /// What went wrong.
        kind: Violation,
    },

    /// Attempted transition is not an edge of the role's table.
    #[error("Illegal {role} transition: {} -> {to}", describe_state(.from))]
    IllegalStateTransition {
        /// Role of the negotiation.
        role: NegotiationRole,
        /// Current state, `None` for a record that has not entered the protocol yet.
        from: Option<NegotiationState>,
        /// Rejected target state.
        to: NegotiationState,
    },

    /// The counterparty-assigned id was already known.
    #[error("Correlation id already set to '{existing}', refusing '{attempted}'")]
    CorrelationIdAlreadySet {
        /// Id recorded first.
        existing: String,
        /// Id offered by the second attempt.
        attempted: String,
    },

    /// A stage needs the counterparty id before it has been learned.
    #[error("Negotiation {0} has no correlation id yet")]
    MissingCorrelationId(String),

    /// Connection-level failure. Never retried.
    #[error("Transport I/O failure on {url}: {message}")]
    TransportIo {
        /// Request URL.
        url: String,
        /// Underlying client error.
        message: String,
    },

    /// An inbound expectation was not met within the configured wait.
    #[error("Timed out after {waited:?} waiting for {expectation}")]
    ExpectationTimeout {
        /// Expectation description.
        expectation: String,
        /// Wait that elapsed.
        waited: Duration,
    },

    /// An inbound handler fired but its action failed.
    #[error("Handler for {expectation} failed: {message}")]
    HandlerFailed {
        /// Expectation description.
        expectation: String,
        /// Failure reported by the handler.
        message: String,
    },

    /// The SUT sent a message no handler was registered for.
    #[error("Unexpected inbound message: {method} {path}")]
    UnexpectedMessage {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
    },

    /// A handler is already active for the pattern.
    #[error("Handler already registered for pattern {0}")]
    HandlerConflict(String),

    /// Observed negotiation state differs from the expected one.
    #[error("Expected state {expected}, found {actual}")]
    StateMismatch {
        /// Expected state (namespaced for remote checks).
        expected: String,
        /// Observed state.
        actual: String,
    },

    /// Custom assertion failed.
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// Message is missing a property the protocol requires.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Callback listener error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_state(state: &Option<NegotiationState>) -> String {
    state.map_or_else(|| "<new>".to_string(), |s| s.to_string())
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, TckError>;

impl TckError {
    /// Returns the violation kind if this is a protocol violation.
    pub fn violation(&self) -> Option<Violation> {
        match self {
            TckError::ProtocolViolation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true for errors that stem from the outbound connection rather
    /// than from a classified response.
    pub fn is_transport_io(&self) -> bool {
        matches!(self, TckError::TransportIo { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_messages() {
        let err = TckError::ProtocolViolation {
            url: "http://sut/negotiations/request".to_string(),
            kind: Violation::UnexpectedNotFound,
        };
        assert!(err.to_string().contains("unexpected 404"));
        assert!(err.to_string().contains("http://sut/negotiations/request"));
        assert_eq!(err.violation(), Some(Violation::UnexpectedNotFound));

        let err = TckError::ProtocolViolation {
            url: "http://sut".to_string(),
            kind: Violation::MissingExpectedError,
        };
        assert!(err.to_string().contains("expected to throw an error"));
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = TckError::IllegalStateTransition {
            role: NegotiationRole::Consumer,
            from: None,
            to: NegotiationState::Agreed,
        };
        assert_eq!(err.to_string(), "Illegal consumer transition: <new> -> AGREED");

        let err = TckError::IllegalStateTransition {
            role: NegotiationRole::Provider,
            from: Some(NegotiationState::Finalized),
            to: NegotiationState::Terminated,
        };
        assert_eq!(
            err.to_string(),
            "Illegal provider transition: FINALIZED -> TERMINATED"
        );
        assert!(err.violation().is_none());
    }
}
