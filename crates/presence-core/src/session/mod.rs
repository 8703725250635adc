//! Session lifecycle management
//!
//! [`SessionManager`] owns the one call this endpoint takes part in. It joins
//! and leaves through a [`SessionTransport`], supervises the two observation
//! loops of the joined call, and publishes the resulting state.
//!
//! # Lifecycle
//!
//! ```text
//!                 connect()                join ok
//! Disconnected ─────────────► Connecting ─────────► Connected
//!      ▲                          │                     │
//!      │        join failed       │                     │ disconnect()
//!      ├──────────────────────────┘                     │ force_cleanup()
//!      └────────────────────────────────────────────────┘
//! ```
//!
//! - At most one connect attempt runs at a time. A `connect()` that finds an
//!   attempt in flight (or the call already joined) returns immediately.
//! - Every connect starts with [`force_cleanup`](SessionManager::force_cleanup),
//!   so a handle left behind by an abnormal termination is torn down first.
//! - Teardown always cancels the observation loops, then leaves the call, then
//!   resets the published state.
//! - Lifecycle operations never return errors. Join and leave failures land in
//!   the error slot ([`SessionManager::last_error`]) and on the event channel.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voicebox_presence_core::{LoopbackHub, SessionConfig, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(LoopbackHub::new());
//! let config = SessionConfig::new().with_user("1", "token").with_call_id("living-room");
//! let manager = SessionManager::builder().config(config).transport(hub).build()?;
//!
//! manager.connect().await;
//! manager.broadcast_presence(true);
//! println!("{:?}", manager.snapshot());
//! manager.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod guard;
pub mod meter;
mod observe;
mod state;

pub use builder::SessionManagerBuilder;
pub use state::{ConnectionState, SessionSnapshot};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, trace, warn, Instrument};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult, TransportError};
use crate::events::SessionEvent;
use crate::presence::{encode_presence, PresenceRecord};
use crate::transport::{CallHandle, SessionTransport};

use guard::{ConnectGuard, ResetOnDrop};
use observe::ObservationTasks;
use state::SharedState;

/// A joined call and its observers
struct ActiveSession {
    id: Uuid,
    handle: Arc<dyn CallHandle>,
    observers: ObservationTasks,
}

/// Owns the call lifecycle and presence synchronisation of one endpoint
pub struct SessionManager {
    config: SessionConfig,
    transport: Arc<dyn SessionTransport>,
    /// Set while a connect attempt is in flight
    connecting: AtomicBool,
    /// Serialises connect, disconnect and cleanup bodies
    lifecycle: AsyncMutex<()>,
    active: parking_lot::Mutex<Option<ActiveSession>>,
    shared: Arc<SharedState>,
    /// Runtime used for detached sends when called from a foreign thread
    runtime: Option<RuntimeHandle>,
}

impl SessionManager {
    /// Create a session manager
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn SessionTransport>,
    ) -> SessionResult<Arc<Self>> {
        config.validate()?;

        let shared = Arc::new(SharedState::new(config.event_capacity));
        Ok(Arc::new(Self {
            config,
            transport,
            connecting: AtomicBool::new(false),
            lifecycle: AsyncMutex::new(()),
            active: parking_lot::Mutex::new(None),
            shared,
            runtime: RuntimeHandle::try_current().ok(),
        }))
    }

    /// Start building a session manager
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Join the configured call
    ///
    /// Does nothing when already connected or when another connect attempt is
    /// in flight. Failures are recorded in the error slot and leave the
    /// manager `Disconnected`.
    pub async fn connect(&self) {
        if self.state().is_connected() {
            debug!("Already connected, ignoring connect");
            return;
        }
        let Some(_guard) = ConnectGuard::try_acquire(&self.connecting) else {
            debug!("Connect already in progress, ignoring connect");
            return;
        };

        let _lifecycle = self.lifecycle.lock().await;
        // A previous attempt may have completed while we waited
        if self.state().is_connected() {
            return;
        }

        self.cleanup_locked().await;
        self.shared.set_state(ConnectionState::Connecting);
        let reset = ResetOnDrop::new(&self.shared);

        let request = self.config.join_request();
        info!(
            call_type = %request.call_type,
            call_id = %request.call_id,
            user_id = %request.user_id,
            "Joining call"
        );

        let joined =
            with_timeout("join", self.config.join_timeout(), self.transport.join(&request)).await;

        match joined {
            Ok(handle) => {
                let id = Uuid::new_v4();
                let observers = ObservationTasks::spawn(id, &handle, self.shared.clone());
                *self.active.lock() = Some(ActiveSession { id, handle, observers });
                self.shared.mark_connected(id, Utc::now());
                reset.disarm();
                info!(session_id = %id, call_id = %request.call_id, "Joined call");
            }
            Err(error) => {
                warn!(
                    call_id = %request.call_id,
                    error = %error,
                    category = error.category(),
                    "Failed to join call"
                );
                self.shared.record_error(error);
            }
        }
    }

    /// Leave the joined call
    ///
    /// Observation loops are stopped before the transport is touched. A failed
    /// leave is recorded but the local state is reset regardless, also when
    /// this future is dropped before it completes.
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let _reset = ResetOnDrop::new(&self.shared);

        let active = self.active.lock().take();
        let joined = match active {
            Some(active) => {
                active.observers.shutdown().await;
                Some((active.id, active.handle))
            }
            None => None,
        };

        if !self.state().is_connected() {
            debug!("Not connected, nothing to leave");
            return;
        }

        if let Some((id, handle)) = joined {
            match with_timeout("leave", self.config.leave_timeout(), handle.leave()).await {
                Ok(()) => info!(session_id = %id, "Left call"),
                Err(error) => {
                    warn!(
                        session_id = %id,
                        error = %error,
                        category = error.category(),
                        "Failed to leave call cleanly"
                    );
                    self.shared.record_error(error);
                }
            }
        }
    }

    /// Tear down whatever is left, without reporting failures
    ///
    /// Safe to call in any state and idempotent. Used before every connect so
    /// that state left behind by a crash or an interrupted teardown does not
    /// leak into the next call.
    pub async fn force_cleanup(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.cleanup_locked().await;
    }

    async fn cleanup_locked(&self) {
        let _reset = ResetOnDrop::new(&self.shared);
        let active = self.active.lock().take();
        if let Some(active) = active {
            active.observers.shutdown().await;
            if let Err(error) =
                with_timeout("leave", self.config.leave_timeout(), active.handle.leave()).await
            {
                debug!(session_id = %active.id, error = %error, "Ignoring leave failure during cleanup");
            }
        }
    }

    /// Tell the other participants whether someone is in front of this device
    ///
    /// Does nothing unless connected. The send runs detached; a failed send is
    /// logged and dropped. The local flag is written while the call handle is
    /// held, so a concurrent teardown always leaves it cleared.
    pub fn broadcast_presence(&self, is_present: bool) {
        if !self.state().is_connected() {
            trace!(is_present, "Not connected, presence not broadcast");
            return;
        }
        let Some(runtime) = RuntimeHandle::try_current().ok().or_else(|| self.runtime.clone())
        else {
            warn!(is_present, "No async runtime available, presence not broadcast");
            return;
        };

        // Teardown takes the handle before resetting state
        let (id, handle) = {
            let active = self.active.lock();
            let Some(active) = active.as_ref() else {
                return;
            };
            self.shared.set_local_presence(is_present);
            (active.id, active.handle.clone())
        };

        let payload = encode_presence(is_present);

        let send = async move {
            match handle.send_custom_event(payload).await {
                Ok(()) => debug!(session_id = %id, is_present, "Presence broadcast"),
                Err(e) => {
                    let error = SessionError::delivery_failed(e);
                    warn!(session_id = %id, is_present, error = %error, "Presence broadcast dropped");
                }
            }
        };
        runtime.spawn(send.in_current_span());
    }

    /// Feed a buffer of microphone samples to the level meter
    ///
    /// Ignored unless connected.
    pub fn report_input_samples(&self, samples: &[f32]) {
        if self.state().is_connected() {
            self.shared.set_mic_level(meter::input_level(samples));
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Copy of everything this manager publishes
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    /// Local and remote presence
    pub fn presence(&self) -> PresenceRecord {
        self.shared.presence()
    }

    /// Whether someone is in front of the peer device
    pub fn remote_presence(&self) -> bool {
        self.shared.presence().remote
    }

    /// Participants in the joined call
    pub fn participant_count(&self) -> usize {
        self.shared.snapshot().participant_count
    }

    /// Last lifecycle error
    pub fn last_error(&self) -> Option<String> {
        self.shared.snapshot().last_error
    }

    /// Whether a connect attempt is in flight
    pub fn is_connect_in_progress(&self) -> bool {
        self.connecting.load(Ordering::Acquire)
    }

    /// Whether a call handle is currently held
    pub fn has_session(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Number of observation loops still running
    pub fn running_observers(&self) -> usize {
        self.active.lock().as_ref().map_or(0, |active| active.observers.running())
    }

    /// Configuration this manager was built with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.subscribe()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("call_id", &self.config.call_id)
            .field("user_id", &self.config.user_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Run a transport operation under a time budget
async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> SessionResult<T>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SessionError::Connection { operation, reason: e.to_string() }),
        Err(_) => {
            warn!(operation, timeout_ms = timeout.as_millis() as u64, "Operation timed out");
            Err(SessionError::Timeout { operation, duration_ms: timeout.as_millis() as u64 })
        }
    }
}
