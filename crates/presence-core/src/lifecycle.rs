//! Application lifecycle driven connect/disconnect
//!
//! The embedding application forwards its foreground/background transitions
//! and charger state as [`LifecycleSignal`]s. The [`LifecycleController`]
//! decides from a [`LifecyclePolicy`] whether the session should be up, and
//! runs the presence source alongside it.
//!
//! | Signal                 | Policy                 | Action     |
//! |------------------------|------------------------|------------|
//! | `ScenePhase(Active)`   | charging not required  | connect    |
//! | `ScenePhase(Active)`   | charging required      | connect if charging |
//! | `ScenePhase(Background)` | any                  | disconnect |
//! | `ScenePhase(Inactive)` | any                    | none       |
//! | `Charging(false)`      | charging required      | disconnect |
//! | `Charging(true)`       | charging required      | connect if in foreground |

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bridge::PresenceSource;
use crate::session::SessionManager;

/// Visibility of the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenePhase {
    /// In the foreground and receiving input
    Active,
    /// Visible but not receiving input
    Inactive,
    /// Not visible
    Background,
}

impl ScenePhase {
    fn is_foreground(self) -> bool {
        !matches!(self, ScenePhase::Background)
    }
}

/// Input to the lifecycle controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    ScenePhase(ScenePhase),
    /// Charger connected (or battery full) vs. on battery
    Charging(bool),
}

/// When the session is allowed to be up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    /// Only hold the call while the device is charging
    pub require_charging: bool,
}

impl LifecyclePolicy {
    /// Policy that connects whenever the app is active
    pub fn new() -> Self {
        Self::default()
    }

    /// Only connect while the device is charging
    pub fn with_require_charging(mut self, require: bool) -> Self {
        self.require_charging = require;
        self
    }
}

/// What the controller last heard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStatus {
    /// `None` until the first scene phase signal
    pub phase: Option<ScenePhase>,
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Connect,
    Disconnect,
}

impl LifecycleStatus {
    /// Fold a signal into the status and pick the action it calls for
    fn apply(&mut self, signal: LifecycleSignal, policy: &LifecyclePolicy) -> Option<Action> {
        match signal {
            LifecycleSignal::ScenePhase(phase) => {
                self.phase = Some(phase);
                match phase {
                    ScenePhase::Active if !policy.require_charging || self.charging => {
                        Some(Action::Connect)
                    }
                    ScenePhase::Active | ScenePhase::Inactive => None,
                    ScenePhase::Background => Some(Action::Disconnect),
                }
            }
            LifecycleSignal::Charging(charging) => {
                self.charging = charging;
                if !policy.require_charging {
                    return None;
                }
                if !charging {
                    return Some(Action::Disconnect);
                }
                match self.phase {
                    Some(phase) if phase.is_foreground() => Some(Action::Connect),
                    _ => None,
                }
            }
        }
    }
}

/// Brings a session (and its presence source) up and down with the app
pub struct LifecycleController {
    session: Arc<SessionManager>,
    source: Option<Arc<dyn PresenceSource>>,
    policy: LifecyclePolicy,
    status: Mutex<LifecycleStatus>,
}

impl LifecycleController {
    /// Drive `session` according to `policy`
    pub fn new(session: Arc<SessionManager>, policy: LifecyclePolicy) -> Self {
        Self { session, source: None, policy, status: Mutex::new(LifecycleStatus::default()) }
    }

    /// Start and stop `source` together with the session
    pub fn with_presence_source(mut self, source: Arc<dyn PresenceSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// React to one lifecycle signal
    pub async fn handle(&self, signal: LifecycleSignal) {
        let action = self.status.lock().apply(signal, &self.policy);
        debug!(?signal, ?action, "Lifecycle signal");

        match action {
            Some(Action::Connect) => self.bring_up().await,
            Some(Action::Disconnect) => self.bring_down().await,
            None => {}
        }
    }

    async fn bring_up(&self) {
        self.session.connect().await;

        if !self.session.state().is_connected() {
            // Detections made without a call would never reach the peer
            if let Some(source) = &self.source {
                source.stop();
            }
            warn!(error = ?self.session.last_error(), "Session not brought up");
            return;
        }

        if let Some(source) = &self.source {
            match source.start() {
                // A source that was already running reports no transition
                Ok(()) => self.session.broadcast_presence(source.is_present()),
                Err(e) => warn!(error = %e, "Presence source failed to start"),
            }
        }
        info!(state = %self.session.state(), "Session brought up");
    }

    async fn bring_down(&self) {
        // Stopping first publishes the final "absent" while still joined
        if let Some(source) = &self.source {
            source.stop();
        }
        self.session.disconnect().await;
        info!("Session brought down");
    }

    /// Last phase and charger state seen
    pub fn status(&self) -> LifecycleStatus {
        *self.status.lock()
    }

    /// Policy this controller applies
    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// The driven session
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MockPresenceSource, PresenceBridge, WatchPresenceSource};
    use std::time::Duration;
    use crate::config::SessionConfig;
    use crate::error::{SessionError, TransportError};
    use crate::loopback::LoopbackHub;

    fn manager(hub: &LoopbackHub) -> Arc<SessionManager> {
        user(hub, "1")
    }

    fn user(hub: &LoopbackHub, id: &str) -> Arc<SessionManager> {
        let config = SessionConfig::new().with_user(id, format!("token-{id}")).with_call_id("room");
        SessionManager::new(config, Arc::new(hub.clone())).unwrap()
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_policy_without_charging_requirement() {
        let policy = LifecyclePolicy::new();
        let mut status = LifecycleStatus::default();

        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Active), &policy), Some(Action::Connect));
        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Inactive), &policy), None);
        assert_eq!(status.apply(LifecycleSignal::Charging(false), &policy), None);
        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Background), &policy), Some(Action::Disconnect));
    }

    #[test]
    fn test_policy_with_charging_requirement() {
        let policy = LifecyclePolicy::new().with_require_charging(true);
        let mut status = LifecycleStatus::default();

        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Active), &policy), None);
        assert_eq!(status.apply(LifecycleSignal::Charging(true), &policy), Some(Action::Connect));
        assert_eq!(status.apply(LifecycleSignal::Charging(false), &policy), Some(Action::Disconnect));

        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Background), &policy), Some(Action::Disconnect));
        // Plugged in while backgrounded
        assert_eq!(status.apply(LifecycleSignal::Charging(true), &policy), None);
        assert_eq!(status.apply(LifecycleSignal::ScenePhase(ScenePhase::Active), &policy), Some(Action::Connect));
    }

    #[tokio::test]
    async fn test_foreground_background_cycle() {
        let hub = LoopbackHub::new();
        let source = Arc::new(crate::bridge::WatchPresenceSource::new());
        let controller = LifecycleController::new(manager(&hub), LifecyclePolicy::new())
            .with_presence_source(source.clone());

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
        assert!(controller.session().state().is_connected());
        assert!(source.is_active());

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Inactive)).await;
        assert!(controller.session().state().is_connected());

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Background)).await;
        assert!(!controller.session().state().is_connected());
        assert!(!source.is_active());
        assert_eq!(controller.status().phase, Some(ScenePhase::Background));
    }

    #[tokio::test]
    async fn test_unplugging_drops_the_call() {
        let hub = LoopbackHub::new();
        let controller = LifecycleController::new(
            manager(&hub),
            LifecyclePolicy::new().with_require_charging(true),
        );

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
        assert_eq!(hub.join_count(), 0);

        controller.handle(LifecycleSignal::Charging(true)).await;
        assert!(controller.session().state().is_connected());

        controller.handle(LifecycleSignal::Charging(false)).await;
        assert!(!controller.session().state().is_connected());
        assert!(hub.participants("default", "room").is_empty());
    }

    #[tokio::test]
    async fn test_source_start_failure_keeps_session() {
        let mut source = MockPresenceSource::new();
        source
            .expect_start()
            .times(1)
            .returning(|| Err(SessionError::presence_source("camera permission denied")));

        let hub = LoopbackHub::new();
        let controller = LifecycleController::new(manager(&hub), LifecyclePolicy::new())
            .with_presence_source(Arc::new(source));

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
        assert!(controller.session().state().is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_source_stopped() {
        let hub = LoopbackHub::new();
        let peer = user(&hub, "2");
        peer.connect().await;

        let source = Arc::new(WatchPresenceSource::new());
        let session = manager(&hub);
        let _bridge = PresenceBridge::attach(source.as_ref(), session.clone());
        let controller = LifecycleController::new(session, LifecyclePolicy::new())
            .with_presence_source(source.clone());

        hub.fail_next_join(TransportError::unreachable("offline"));
        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
        assert!(!controller.session().state().is_connected());
        assert!(!source.is_active());

        // Nobody to tell, so the detection is not latched either
        source.report(true);
        assert!(!source.is_present());

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;
        assert!(controller.session().state().is_connected());
        source.report(true);
        wait_for(|| peer.remote_presence()).await;
        assert!(controller.session().presence().local);
    }

    #[tokio::test]
    async fn test_running_source_is_republished_on_connect() {
        let hub = LoopbackHub::new();
        let peer = user(&hub, "2");
        peer.connect().await;

        let source = Arc::new(WatchPresenceSource::new());
        source.start().unwrap();
        source.report(true);

        let session = manager(&hub);
        let _bridge = PresenceBridge::attach(source.as_ref(), session.clone());
        let controller = LifecycleController::new(session, LifecyclePolicy::new())
            .with_presence_source(source.clone());

        controller.handle(LifecycleSignal::ScenePhase(ScenePhase::Active)).await;

        assert!(controller.session().presence().local);
        wait_for(|| peer.remote_presence()).await;
    }
}
