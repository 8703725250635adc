//! Session configuration
//!
//! [`SessionConfig`] holds everything the [`SessionManager`](crate::SessionManager)
//! needs to join the shared call: the service credentials, the identity of
//! this endpoint, the call both phones meet in, and the time budgets for
//! join/leave.
//!
//! Durations are serialized as whole milliseconds so the config can live in a
//! TOML file:
//!
//! ```toml
//! api_key = "6yks7w9qurxz"
//! user_id = "2"
//! token = "..."
//! call_id = "living-room"
//! join_timeout_ms = 10000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::transport::{Credentials, JoinRequest};

/// Default call type; it lets any participant join without a host going live
pub const DEFAULT_CALL_TYPE: &str = "default";

/// Configuration for a session manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// API key of the call service
    pub api_key: String,
    /// User id of this endpoint
    pub user_id: String,
    /// Display name; falls back to the user id when empty
    pub user_name: String,
    /// Auth token for `user_id`
    pub token: String,
    /// Call type understood by the service
    pub call_type: String,
    /// Call shared by both endpoints
    pub call_id: String,
    /// Create the call when joining if it does not exist yet
    pub create_if_missing: bool,
    /// Upper bound for a join, in milliseconds
    pub join_timeout_ms: u64,
    /// Upper bound for a leave, in milliseconds
    pub leave_timeout_ms: u64,
    /// Capacity of the session event channel
    pub event_capacity: usize,
}

impl SessionConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            user_id: String::new(),
            user_name: String::new(),
            token: String::new(),
            call_type: DEFAULT_CALL_TYPE.to_string(),
            call_id: String::new(),
            create_if_missing: true,
            join_timeout_ms: 10_000,
            leave_timeout_ms: 5_000,
            event_capacity: 64,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the user id and auth token
    pub fn with_user(mut self, user_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.token = token.into();
        self
    }

    /// Set the display name
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    /// Set the call id
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    /// Set the call type
    pub fn with_call_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = call_type.into();
        self
    }

    /// Allow or forbid creating the call on join
    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set the join timeout
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the leave timeout
    pub fn with_leave_timeout(mut self, timeout: Duration) -> Self {
        self.leave_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Join timeout as a duration
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Leave timeout as a duration
    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }

    /// Check that the configuration can be used to join a call
    pub fn validate(&self) -> SessionResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(SessionError::invalid_configuration("user_id", "must not be empty"));
        }
        if self.token.trim().is_empty() {
            return Err(SessionError::invalid_configuration("token", "must not be empty"));
        }
        if self.call_id.trim().is_empty() {
            return Err(SessionError::invalid_configuration("call_id", "must not be empty"));
        }
        if self.call_type.trim().is_empty() {
            return Err(SessionError::invalid_configuration("call_type", "must not be empty"));
        }
        if self.join_timeout_ms == 0 {
            return Err(SessionError::invalid_configuration("join_timeout_ms", "must be positive"));
        }
        if self.leave_timeout_ms == 0 {
            return Err(SessionError::invalid_configuration("leave_timeout_ms", "must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(SessionError::invalid_configuration("event_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Build the transport join request for this configuration
    pub fn join_request(&self) -> JoinRequest {
        let user_name = if self.user_name.is_empty() {
            self.user_id.clone()
        } else {
            self.user_name.clone()
        };

        JoinRequest {
            credentials: Credentials::new(self.api_key.clone(), self.token.clone()),
            user_id: self.user_id.clone(),
            user_name,
            call_type: self.call_type.clone(),
            call_id: self.call_id.clone(),
            create: self.create_if_missing,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
