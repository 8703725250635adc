//! Session manager builder

use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::session::SessionManager;
use crate::transport::SessionTransport;

/// Builder for creating a session manager
pub struct SessionManagerBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn SessionTransport>>,
}

impl SessionManagerBuilder {
    /// Create a new builder with a default configuration
    pub fn new() -> Self {
        Self { config: SessionConfig::default(), transport: None }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the transport used to join calls
    pub fn transport(mut self, transport: Arc<dyn SessionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the user id and auth token
    pub fn user(mut self, user_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.config = self.config.with_user(user_id, token);
        self
    }

    /// Set the call id
    pub fn call_id(mut self, call_id: impl Into<String>) -> Self {
        self.config = self.config.with_call_id(call_id);
        self
    }

    /// Set the join timeout
    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_join_timeout(timeout);
        self
    }

    /// Build the session manager
    pub fn build(self) -> SessionResult<Arc<SessionManager>> {
        let transport = self
            .transport
            .ok_or_else(|| SessionError::invalid_configuration("transport", "not set"))?;
        SessionManager::new(self.config, transport)
    }
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
