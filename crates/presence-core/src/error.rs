//! Error types for the presence core
//!
//! Two layers of errors exist:
//!
//! - [`TransportError`] is what a [`SessionTransport`](crate::transport::SessionTransport)
//!   or [`CallHandle`](crate::transport::CallHandle) implementation reports.
//! - [`SessionError`] is what the [`SessionManager`](crate::SessionManager) records
//!   in its error slot or writes to the log.
//!
//! # Error Categories
//!
//! - **Connection** - join/leave failures and timeouts. Surfaced through the
//!   manager's error slot, never fatal: the manager ends up `Disconnected`.
//! - **Delivery** - a presence broadcast could not be sent. Logged only.
//! - **Configuration** - the [`SessionConfig`](crate::SessionConfig) is unusable.
//! - **Presence source** - the local detector failed to start or stopped.
//!
//! Undecodable presence events are not errors at all; see
//! [`PresenceDecode`](crate::presence::PresenceDecode).
//!
//! ```rust
//! use voicebox_presence_core::{SessionError, TransportError};
//!
//! let err = SessionError::join_failed(TransportError::rejected("token expired"));
//! assert_eq!(err.category(), "connection");
//! assert!(err.is_connection_error());
//! ```

use thiserror::Error;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors reported by transport collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote service refused the request
    #[error("Request rejected: {reason}")]
    Rejected { reason: String },

    /// The requested call does not exist and creation was not allowed
    #[error("Call not found: {call_id}")]
    RoomNotFound { call_id: String },

    /// The handle is not (or no longer) joined to its call
    #[error("Not joined to call")]
    NotJoined,

    /// The underlying connection was closed
    #[error("Transport closed")]
    Closed,

    /// The service could not be reached
    #[error("Service unreachable: {reason}")]
    Unreachable { reason: String },
}

impl TransportError {
    /// Create a rejected error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    /// Create an unreachable error
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable { reason: reason.into() }
    }
}

/// Errors surfaced or logged by the session manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Joining or leaving the call failed
    #[error("{operation} failed: {reason}")]
    Connection { operation: &'static str, reason: String },

    /// A join or leave did not complete in time
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout { operation: &'static str, duration_ms: u64 },

    /// A custom event could not be delivered
    #[error("Presence delivery failed: {reason}")]
    Delivery { reason: String },

    /// Configuration is unusable
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The local presence detector reported a failure
    #[error("Presence source error: {reason}")]
    PresenceSource { reason: String },
}

impl SessionError {
    /// Create a join failure from a transport error
    pub fn join_failed(source: TransportError) -> Self {
        Self::Connection { operation: "join", reason: source.to_string() }
    }

    /// Create a leave failure from a transport error
    pub fn leave_failed(source: TransportError) -> Self {
        Self::Connection { operation: "leave", reason: source.to_string() }
    }

    /// Create a delivery failure from a transport error
    pub fn delivery_failed(source: TransportError) -> Self {
        Self::Delivery { reason: source.to_string() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Create a presence source error
    pub fn presence_source(reason: impl Into<String>) -> Self {
        Self::PresenceSource { reason: reason.into() }
    }

    /// Check if this error belongs in the user-visible error slot
    pub fn is_connection_error(&self) -> bool {
        matches!(self, SessionError::Connection { .. } | SessionError::Timeout { .. })
    }

    /// Check if a later attempt could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::Connection { .. }
            | SessionError::Timeout { .. }
            | SessionError::Delivery { .. } => true,

            SessionError::InvalidConfiguration { .. } | SessionError::PresenceSource { .. } => {
                false
            }
        }
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::Connection { .. } | SessionError::Timeout { .. } => "connection",
            SessionError::Delivery { .. } => "delivery",
            SessionError::InvalidConfiguration { .. } => "configuration",
            SessionError::PresenceSource { .. } => "presence",
        }
    }
}
