//! Presence detector to session bridge
//!
//! A [`PresenceSource`] reports whether someone is in front of the device. The
//! [`PresenceBridge`] forwards every reported value, unchanged, to a
//! [`PresenceSink`] (normally the [`SessionManager`]). It keeps no state and
//! does no debouncing: sources only report transitions.
//!
//! [`WatchPresenceSource`] is a source fed by the embedding application (a
//! camera pipeline, a sensor, the CLI demo) through [`WatchPresenceSource::report`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::error::SessionResult;
use crate::session::SessionManager;

/// Callback invoked with every presence transition
pub type PresenceListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Something that detects local presence
#[cfg_attr(test, mockall::automock)]
pub trait PresenceSource: Send + Sync {
    /// Begin detecting; idempotent
    fn start(&self) -> SessionResult<()>;

    /// Stop detecting; idempotent. The reported value drops to `false`.
    fn stop(&self);

    /// Whether detection is running
    fn is_active(&self) -> bool;

    /// Latest reported value; `false` while stopped
    fn is_present(&self) -> bool;

    /// Last failure of the detector, if any
    fn last_error(&self) -> Option<String>;

    /// Register the callback that receives transitions, replacing any previous one
    fn set_listener(&self, listener: PresenceListener);
}

/// Something that publishes local presence and knows the remote one
#[cfg_attr(test, mockall::automock)]
pub trait PresenceSink: Send + Sync {
    /// Publish the local presence value
    fn broadcast_presence(&self, is_present: bool);

    /// Latest presence value received from the peer
    fn remote_presence(&self) -> bool;
}

impl PresenceSink for SessionManager {
    fn broadcast_presence(&self, is_present: bool) {
        SessionManager::broadcast_presence(self, is_present);
    }

    fn remote_presence(&self) -> bool {
        SessionManager::remote_presence(self)
    }
}

/// Forwards local presence transitions into a session
pub struct PresenceBridge {
    sink: Arc<dyn PresenceSink>,
}

impl PresenceBridge {
    /// Register on `source` and forward everything it reports to `sink`
    pub fn attach(source: &dyn PresenceSource, sink: Arc<dyn PresenceSink>) -> Self {
        let forward = sink.clone();
        source.set_listener(Arc::new(move |is_present| {
            trace!(is_present, "Forwarding local presence");
            forward.broadcast_presence(is_present);
        }));
        Self { sink }
    }

    /// Whether someone is in front of the peer device
    pub fn remote_presence(&self) -> bool {
        self.sink.remote_presence()
    }
}

/// Presence source driven by explicit reports
pub struct WatchPresenceSource {
    value: watch::Sender<bool>,
    running: AtomicBool,
    last_error: RwLock<Option<String>>,
    listener: RwLock<Option<PresenceListener>>,
}

impl WatchPresenceSource {
    /// Create a stopped source reporting absent
    pub fn new() -> Self {
        let (value, _) = watch::channel(false);
        Self {
            value,
            running: AtomicBool::new(false),
            last_error: RwLock::new(None),
            listener: RwLock::new(None),
        }
    }

    /// Feed one detection result
    ///
    /// Ignored while stopped. Listeners hear about it only if the value changed.
    pub fn report(&self, is_present: bool) {
        if !self.running.load(Ordering::Acquire) {
            trace!(is_present, "Presence source stopped, ignoring report");
            return;
        }
        if self.set_value(is_present) {
            debug!(is_present, "Local presence changed");
            self.notify(is_present);
        }
    }

    /// Record a detector failure and stop
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(reason = %reason, "Presence detector failed");
        *self.last_error.write() = Some(reason);
        self.stop();
    }

    /// Watch the local presence value
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.value.subscribe()
    }

    fn set_value(&self, is_present: bool) -> bool {
        self.value.send_if_modified(|current| {
            if *current == is_present {
                return false;
            }
            *current = is_present;
            true
        })
    }

    fn notify(&self, is_present: bool) {
        // Clone out so the listener runs without the lock held
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(is_present);
        }
    }
}

impl Default for WatchPresenceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceSource for WatchPresenceSource {
    fn start(&self) -> SessionResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *self.last_error.write() = None;
        info!("Presence detection started");
        Ok(())
    }

    fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if self.set_value(false) {
            self.notify(false);
        }
        if was_running {
            info!("Presence detection stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn is_present(&self) -> bool {
        *self.value.borrow()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_listener(&self, listener: PresenceListener) {
        *self.listener.write() = Some(listener);
    }
}
