//! Real-time call transport abstraction
//!
//! The presence core never talks to a concrete video/audio SDK. Everything it
//! needs from the network is expressed by two traits:
//!
//! - [`SessionTransport`] joins a call and hands back a [`CallHandle`].
//! - [`CallHandle`] leaves the call, streams participant snapshots and custom
//!   events, and sends custom events to the other participants.
//!
//! ```text
//! ┌──────────────────┐   join()    ┌──────────────────┐
//! │  SessionManager  │ ──────────► │ SessionTransport │
//! └────────┬─────────┘             └────────┬─────────┘
//!          │ owns                           │ returns
//! ┌────────▼─────────┐                      │
//! │    CallHandle    │ ◄────────────────────┘
//! │  participants()  │──► participant-count loop
//! │  custom_events() │──► presence-event loop
//! │  send_custom_..  │◄── broadcast_presence()
//! └──────────────────┘
//! ```
//!
//! Streams returned by a handle are live: they may stay pending indefinitely
//! and end only when the handle is torn down.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// JSON object carried by a custom event
pub type EventPayload = serde_json::Map<String, serde_json::Value>;

/// Service credentials presented on join
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// API key of the call service
    pub api_key: String,
    /// Auth token of the joining user
    pub token: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, token: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), token: token.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Parameters for joining a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Credentials the service authenticates the join with
    pub credentials: Credentials,
    /// Identity of the local participant
    pub user_id: String,
    /// Display name of the local participant
    pub user_name: String,
    /// Call type understood by the service (e.g. "default")
    pub call_type: String,
    /// Identifier of the call shared by both endpoints
    pub call_id: String,
    /// Create the call if it does not exist yet
    pub create: bool,
}

/// Set of participants currently in a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    /// User ids of everyone in the call, the local participant included
    pub participants: Vec<String>,
}

impl ParticipantSnapshot {
    /// Create a snapshot from user ids
    pub fn new(participants: Vec<String>) -> Self {
        Self { participants }
    }

    /// Number of participants in the call
    pub fn count(&self) -> usize {
        self.participants.len()
    }
}

/// A custom event received from another participant
#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    /// User id of the sender, when the service reports it
    pub sender: Option<String>,
    /// Event body
    pub payload: EventPayload,
}

impl CustomEvent {
    /// Create an event with an unknown sender
    pub fn new(payload: EventPayload) -> Self {
        Self { sender: None, payload }
    }

    /// Attach the sender's user id
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

/// Entry point to the real-time call service
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Join (and optionally create) a call
    async fn join(&self, request: &JoinRequest) -> Result<Arc<dyn CallHandle>, TransportError>;
}

/// A joined call
#[async_trait]
pub trait CallHandle: Send + Sync {
    /// Leave the call
    async fn leave(&self) -> Result<(), TransportError>;

    /// Live sequence of participant-set snapshots
    ///
    /// The current snapshot is yielded first.
    fn participants(&self) -> BoxStream<'static, ParticipantSnapshot>;

    /// Live sequence of custom events sent by other participants
    fn custom_events(&self) -> BoxStream<'static, CustomEvent>;

    /// Send a custom event to every other participant
    async fn send_custom_event(&self, payload: EventPayload) -> Result<(), TransportError>;
}
