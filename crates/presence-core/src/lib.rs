//! # Voicebox Presence Core
//!
//! Call session lifecycle and presence synchronisation for two always-on
//! endpoints sharing one audio call.
//!
//! This crate provides:
//! - [`SessionManager`]: joins and leaves the call, supervises the participant
//!   and presence observation loops, publishes state and events
//! - [`PresenceBridge`]: forwards local presence detections into the call
//! - [`LifecycleController`]: connects and disconnects with the application's
//!   foreground state and charger
//! - [`SessionTransport`]/[`CallHandle`]: the seam to a real call service
//! - [`LoopbackHub`]: an in-memory call service for demos and tests
//!
//! ## Wire format
//!
//! Presence travels as a custom call event with a single key,
//! `{"presence_detected": true}`. Receivers also accept the strings `"true"`
//! and `"1"`; anything else is ignored.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voicebox_presence_core::{
//!     LoopbackHub, PresenceBridge, PresenceSource, SessionConfig, SessionManager,
//!     WatchPresenceSource,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = Arc::new(LoopbackHub::new());
//! let manager = SessionManager::builder()
//!     .config(SessionConfig::new().with_user("1", "token").with_call_id("kitchen"))
//!     .transport(hub)
//!     .build()?;
//!
//! let camera = WatchPresenceSource::new();
//! let bridge = PresenceBridge::attach(&camera, manager.clone());
//!
//! manager.connect().await;
//! camera.start()?;
//! camera.report(true);
//! println!("peer present: {}", bridge.remote_presence());
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod loopback;
pub mod presence;
pub mod session;
pub mod transport;

pub use bridge::{PresenceBridge, PresenceListener, PresenceSink, PresenceSource, WatchPresenceSource};
pub use config::{SessionConfig, DEFAULT_CALL_TYPE};
pub use error::{SessionError, SessionResult, TransportError};
pub use events::{EventPriority, SessionEvent};
pub use lifecycle::{LifecycleController, LifecyclePolicy, LifecycleSignal, LifecycleStatus, ScenePhase};
pub use loopback::LoopbackHub;
pub use presence::{decode_presence, encode_presence, PresenceDecode, PresenceRecord, SkipReason, PRESENCE_KEY};
pub use session::{ConnectionState, SessionManager, SessionManagerBuilder, SessionSnapshot};
pub use transport::{
    CallHandle, Credentials, CustomEvent, EventPayload, JoinRequest, ParticipantSnapshot, SessionTransport,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
