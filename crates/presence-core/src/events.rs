//! Session events for UI integration
//!
//! The [`SessionManager`](crate::SessionManager) publishes every change of its
//! observable state as a [`SessionEvent`] on a tokio broadcast channel.
//! Subscribers that fall behind lose the oldest events; the current values are
//! always available through [`SessionManager::snapshot`](crate::SessionManager::snapshot).
//!
//! ```rust,no_run
//! # use voicebox_presence_core::{SessionManager, SessionEvent};
//! # async fn example(manager: std::sync::Arc<SessionManager>) {
//! let mut events = manager.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::RemotePresenceChanged { present } = event {
//!             println!("peer present: {present}");
//!         }
//!     }
//! });
//! # }
//! ```

use crate::error::SessionError;
use crate::session::ConnectionState;

/// Event priority levels for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine updates (meter levels, counts)
    Low,
    /// State changes
    Normal,
    /// Failures the user should see
    High,
}

/// Observable changes of a session manager
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection state changed
    StateChanged {
        /// State before the transition
        previous: ConnectionState,
        /// State after the transition
        new: ConnectionState,
    },
    /// Number of participants in the call changed
    ParticipantCountChanged {
        /// Current participant count
        count: usize,
    },
    /// The peer's presence flag changed
    RemotePresenceChanged {
        /// Someone is in front of the peer device
        present: bool,
    },
    /// The local presence flag changed
    LocalPresenceChanged {
        /// Someone is in front of this device
        present: bool,
    },
    /// A lifecycle operation failed
    Error {
        /// The recorded error
        error: SessionError,
    },
}

impl SessionEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            SessionEvent::Error { .. } => EventPriority::High,
            SessionEvent::StateChanged { .. }
            | SessionEvent::RemotePresenceChanged { .. }
            | SessionEvent::LocalPresenceChanged { .. } => EventPriority::Normal,
            SessionEvent::ParticipantCountChanged { .. } => EventPriority::Low,
        }
    }

    /// Check if this event is at least as important as `min`
    pub fn passes_priority(&self, min: EventPriority) -> bool {
        self.priority() >= min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_high_priority() {
        let event = SessionEvent::Error {
            error: SessionError::Timeout { operation: "join", duration_ms: 10 },
        };
        assert_eq!(event.priority(), EventPriority::High);
        assert!(event.passes_priority(EventPriority::Normal));
    }

    #[test]
    fn test_count_updates_are_filtered_by_normal_priority() {
        let event = SessionEvent::ParticipantCountChanged { count: 2 };
        assert!(!event.passes_priority(EventPriority::Normal));
        assert!(event.passes_priority(EventPriority::Low));
    }
}
