//! Observable session state
//!
//! [`SharedState`] is the single place the published fields live. The manager
//! and both observation loops write through it; every write that changes a
//! value is mirrored as a [`SessionEvent`].

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::presence::PresenceRecord;

/// Connection state of a session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No call is joined
    Disconnected,
    /// A join is in flight
    Connecting,
    /// A call is joined and observed
    Connected,
}

impl ConnectionState {
    /// Check if a call is joined
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Point-in-time copy of everything a session manager publishes
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Connection state
    pub state: ConnectionState,
    /// Id of the current connection, while connected
    pub session_id: Option<Uuid>,
    /// When the current connection was established
    pub connected_at: Option<DateTime<Utc>>,
    /// Participants in the call, this endpoint included
    pub participant_count: usize,
    /// Local and remote presence
    pub presence: PresenceRecord,
    /// The call is live (joined and audible)
    pub is_live: bool,
    /// Microphone input level in `[0, 1]`
    pub mic_level: f32,
    /// Last lifecycle error, if any
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session_id: None,
            connected_at: None,
            participant_count: 0,
            presence: PresenceRecord::default(),
            is_live: false,
            mic_level: 0.0,
            last_error: None,
        }
    }
}

pub(crate) struct SharedState {
    snapshot: RwLock<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SharedState {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self { snapshot: RwLock::new(SessionSnapshot::disconnected()), events }
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.snapshot.read().state
    }

    pub(crate) fn presence(&self) -> PresenceRecord {
        self.snapshot.read().presence
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    pub(crate) fn set_state(&self, new: ConnectionState) {
        let previous = std::mem::replace(&mut self.snapshot.write().state, new);
        if previous != new {
            self.emit(SessionEvent::StateChanged { previous, new });
        }
    }

    pub(crate) fn mark_connected(&self, session_id: Uuid, connected_at: DateTime<Utc>) {
        let previous = {
            let mut snapshot = self.snapshot.write();
            snapshot.session_id = Some(session_id);
            snapshot.connected_at = Some(connected_at);
            snapshot.is_live = true;
            snapshot.last_error = None;
            std::mem::replace(&mut snapshot.state, ConnectionState::Connected)
        };
        if previous != ConnectionState::Connected {
            self.emit(SessionEvent::StateChanged { previous, new: ConnectionState::Connected });
        }
    }

    pub(crate) fn set_participant_count(&self, count: usize) {
        let previous = std::mem::replace(&mut self.snapshot.write().participant_count, count);
        if previous != count {
            self.emit(SessionEvent::ParticipantCountChanged { count });
        }
    }

    pub(crate) fn set_remote_presence(&self, present: bool) {
        let previous = std::mem::replace(&mut self.snapshot.write().presence.remote, present);
        if previous != present {
            self.emit(SessionEvent::RemotePresenceChanged { present });
        }
    }

    pub(crate) fn set_local_presence(&self, present: bool) {
        let previous = std::mem::replace(&mut self.snapshot.write().presence.local, present);
        if previous != present {
            self.emit(SessionEvent::LocalPresenceChanged { present });
        }
    }

    pub(crate) fn set_mic_level(&self, level: f32) {
        self.snapshot.write().mic_level = level;
    }

    pub(crate) fn record_error(&self, error: SessionError) {
        self.snapshot.write().last_error = Some(error.to_string());
        self.emit(SessionEvent::Error { error });
    }

    /// Reset every connection-scoped field. The error slot is left alone.
    pub(crate) fn reset_disconnected(&self) {
        let before = {
            let mut snapshot = self.snapshot.write();
            let last_error = snapshot.last_error.take();
            let fresh = SessionSnapshot { last_error, ..SessionSnapshot::disconnected() };
            std::mem::replace(&mut *snapshot, fresh)
        };

        if before.presence.remote {
            self.emit(SessionEvent::RemotePresenceChanged { present: false });
        }
        if before.presence.local {
            self.emit(SessionEvent::LocalPresenceChanged { present: false });
        }
        if before.participant_count != 0 {
            self.emit(SessionEvent::ParticipantCountChanged { count: 0 });
        }
        if before.state != ConnectionState::Disconnected {
            self.emit(SessionEvent::StateChanged {
                previous: before.state,
                new: ConnectionState::Disconnected,
            });
        }
    }
}
