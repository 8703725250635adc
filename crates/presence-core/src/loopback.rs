//! In-memory call transport
//!
//! [`LoopbackHub`] implements [`SessionTransport`] without any network. Calls
//! are rooms keyed by call type and id; participant sets are published through
//! a `watch` channel and custom events are fanned out to every *other*
//! participant through a `broadcast` channel, as a real call service would.
//!
//! Used by the CLI demo to run two endpoints in one process and by tests,
//! which can inject failures:
//!
//! ```rust
//! use std::time::Duration;
//! use voicebox_presence_core::{LoopbackHub, TransportError};
//!
//! let hub = LoopbackHub::new();
//! hub.fail_next_join(TransportError::unreachable("offline"));
//! hub.set_fail_sends(true);
//! hub.set_join_delay(Some(Duration::from_millis(50)));
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{
    CallHandle, CustomEvent, EventPayload, JoinRequest, ParticipantSnapshot, SessionTransport,
};

const ROOM_EVENT_CAPACITY: usize = 128;

#[derive(Debug, Default)]
struct Faults {
    fail_next_join: Option<TransportError>,
    fail_sends: bool,
    fail_leaves: bool,
    join_delay: Option<Duration>,
}

struct HubInner {
    rooms: DashMap<String, Arc<Room>>,
    faults: Mutex<Faults>,
    last_join: Mutex<Option<JoinRequest>>,
    joins: AtomicUsize,
    sends: AtomicUsize,
}

#[derive(Clone)]
struct RoomEvent {
    member_id: u64,
    sender: String,
    payload: EventPayload,
}

struct Room {
    members: Mutex<Vec<(u64, String)>>,
    participants: watch::Sender<ParticipantSnapshot>,
    events: broadcast::Sender<RoomEvent>,
    next_member: AtomicU64,
}

impl Room {
    fn new() -> Self {
        let (participants, _) = watch::channel(ParticipantSnapshot::default());
        let (events, _) = broadcast::channel(ROOM_EVENT_CAPACITY);
        Self { members: Mutex::new(Vec::new()), participants, events, next_member: AtomicU64::new(1) }
    }

    fn add_member(&self, user_id: &str) -> u64 {
        let member_id = self.next_member.fetch_add(1, Ordering::Relaxed);
        let mut members = self.members.lock();
        members.push((member_id, user_id.to_string()));
        self.publish(&members);
        member_id
    }

    fn remove_member(&self, member_id: u64) {
        let mut members = self.members.lock();
        members.retain(|(id, _)| *id != member_id);
        self.publish(&members);
    }

    fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    fn publish(&self, members: &[(u64, String)]) {
        let snapshot =
            ParticipantSnapshot::new(members.iter().map(|(_, user)| user.clone()).collect());
        self.participants.send_replace(snapshot);
    }
}

/// In-memory call service shared by every endpoint of a process
#[derive(Clone)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                rooms: DashMap::new(),
                faults: Mutex::new(Faults::default()),
                last_join: Mutex::new(None),
                joins: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
            }),
        }
    }

    fn room_key(call_type: &str, call_id: &str) -> String {
        format!("{call_type}:{call_id}")
    }

    /// Fail the next join with `error`
    pub fn fail_next_join(&self, error: TransportError) {
        self.inner.faults.lock().fail_next_join = Some(error);
    }

    /// Make every custom event send fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.faults.lock().fail_sends = fail;
    }

    /// Make every leave fail
    pub fn set_fail_leaves(&self, fail: bool) {
        self.inner.faults.lock().fail_leaves = fail;
    }

    /// Delay every join by `delay`
    pub fn set_join_delay(&self, delay: Option<Duration>) {
        self.inner.faults.lock().join_delay = delay;
    }

    /// Number of join attempts seen, failed ones included
    pub fn join_count(&self) -> usize {
        self.inner.joins.load(Ordering::Relaxed)
    }

    /// Number of custom events accepted for delivery
    pub fn sent_count(&self) -> usize {
        self.inner.sends.load(Ordering::Relaxed)
    }

    /// Most recent join request that reached the hub
    pub fn last_join_request(&self) -> Option<JoinRequest> {
        self.inner.last_join.lock().clone()
    }

    /// Number of calls with at least one participant
    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Participants currently in a call
    pub fn participants(&self, call_type: &str, call_id: &str) -> Vec<String> {
        self.inner
            .rooms
            .get(&Self::room_key(call_type, call_id))
            .map(|room| room.participants.borrow().participants.clone())
            .unwrap_or_default()
    }

    /// Deliver a custom event to everyone in a call, as if sent by a remote
    /// participant that is not joined through this hub
    pub fn inject_event(
        &self,
        call_type: &str,
        call_id: &str,
        sender: &str,
        payload: EventPayload,
    ) -> bool {
        let Some(room) = self.inner.rooms.get(&Self::room_key(call_type, call_id)).map(|r| r.clone())
        else {
            return false;
        };
        room.events.send(RoomEvent { member_id: 0, sender: sender.to_string(), payload }).is_ok()
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionTransport for LoopbackHub {
    async fn join(&self, request: &JoinRequest) -> Result<Arc<dyn CallHandle>, TransportError> {
        self.inner.joins.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_join.lock() = Some(request.clone());

        let (delay, failure) = {
            let mut faults = self.inner.faults.lock();
            (faults.join_delay, faults.fail_next_join.take())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }

        if request.credentials.token.is_empty() {
            return Err(TransportError::rejected("missing auth token"));
        }

        // Members are added under the map guard so an emptied room cannot be
        // removed between lookup and join
        let key = Self::room_key(&request.call_type, &request.call_id);
        let (room, member_id) = if request.create {
            let entry = self.inner.rooms.entry(key.clone()).or_insert_with(|| Arc::new(Room::new()));
            let member_id = entry.add_member(&request.user_id);
            (entry.value().clone(), member_id)
        } else {
            let entry = self
                .inner
                .rooms
                .get(&key)
                .ok_or_else(|| TransportError::RoomNotFound { call_id: request.call_id.clone() })?;
            let member_id = entry.add_member(&request.user_id);
            (entry.value().clone(), member_id)
        };
        debug!(call_id = %request.call_id, user_id = %request.user_id, member_id, "Loopback join");

        Ok(Arc::new(LoopbackCall {
            inner: self.inner.clone(),
            room,
            room_key: key,
            member_id,
            user_id: request.user_id.clone(),
            joined: AtomicBool::new(true),
            left: CancellationToken::new(),
        }))
    }
}

/// One participant's membership in a loopback call
struct LoopbackCall {
    inner: Arc<HubInner>,
    room: Arc<Room>,
    room_key: String,
    member_id: u64,
    user_id: String,
    joined: AtomicBool,
    /// Ends this handle's streams once it has left
    left: CancellationToken,
}

#[async_trait]
impl CallHandle for LoopbackCall {
    async fn leave(&self) -> Result<(), TransportError> {
        if self.inner.faults.lock().fail_leaves {
            return Err(TransportError::unreachable("leave rejected by loopback"));
        }
        if !self.joined.swap(false, Ordering::AcqRel) {
            return Err(TransportError::NotJoined);
        }

        self.room.remove_member(self.member_id);
        self.inner
            .rooms
            .remove_if(&self.room_key, |_, room| Arc::ptr_eq(room, &self.room) && room.is_empty());
        self.left.cancel();
        debug!(user_id = %self.user_id, member_id = self.member_id, "Loopback leave");
        Ok(())
    }

    fn participants(&self) -> BoxStream<'static, ParticipantSnapshot> {
        WatchStream::new(self.room.participants.subscribe())
            .take_until(self.left.clone().cancelled_owned())
            .boxed()
    }

    fn custom_events(&self) -> BoxStream<'static, CustomEvent> {
        let own_id = self.member_id;
        BroadcastStream::new(self.room.events.subscribe())
            .filter_map(move |item| {
                future::ready(match item {
                    Ok(event) if event.member_id != own_id => {
                        Some(CustomEvent::new(event.payload).with_sender(event.sender))
                    }
                    // Own echoes and lag notifications
                    _ => None,
                })
            })
            .take_until(self.left.clone().cancelled_owned())
            .boxed()
    }

    async fn send_custom_event(&self, payload: EventPayload) -> Result<(), TransportError> {
        if self.inner.faults.lock().fail_sends {
            return Err(TransportError::rejected("send rejected by loopback"));
        }
        if !self.joined.load(Ordering::Acquire) {
            return Err(TransportError::NotJoined);
        }

        // No other participant listening is not a failure
        let _ = self.room.events.send(RoomEvent {
            member_id: self.member_id,
            sender: self.user_id.clone(),
            payload,
        });
        self.inner.sends.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::encode_presence;
    use crate::transport::Credentials;

    fn request(user: &str, create: bool) -> JoinRequest {
        JoinRequest {
            credentials: Credentials::new("key", format!("token-{user}")),
            user_id: user.to_string(),
            user_name: user.to_string(),
            call_type: "default".to_string(),
            call_id: "room".to_string(),
            create,
        }
    }

    #[tokio::test]
    async fn test_join_without_create_requires_existing_call() {
        let hub = LoopbackHub::new();
        let err = hub.join(&request("1", false)).await.err().unwrap();
        assert_eq!(err, TransportError::RoomNotFound { call_id: "room".into() });

        hub.join(&request("1", true)).await.unwrap();
        assert!(hub.join(&request("2", false)).await.is_ok());
        assert_eq!(hub.participants("default", "room"), vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn test_events_reach_other_participants_only() {
        let hub = LoopbackHub::new();
        let a = hub.join(&request("a", true)).await.unwrap();
        let b = hub.join(&request("b", true)).await.unwrap();

        let mut a_events = a.custom_events();
        let mut b_events = b.custom_events();

        a.send_custom_event(encode_presence(true)).await.unwrap();
        b.send_custom_event(encode_presence(false)).await.unwrap();

        let at_b = b_events.next().await.unwrap();
        assert_eq!(at_b.sender.as_deref(), Some("a"));
        assert_eq!(at_b.payload, encode_presence(true));

        let at_a = a_events.next().await.unwrap();
        assert_eq!(at_a.sender.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_leave_ends_streams_and_updates_participants() {
        let hub = LoopbackHub::new();
        let a = hub.join(&request("a", true)).await.unwrap();
        let b = hub.join(&request("b", true)).await.unwrap();

        let mut a_participants = a.participants();
        assert_eq!(a_participants.next().await.unwrap().count(), 2);

        b.leave().await.unwrap();
        assert_eq!(a_participants.next().await.unwrap().count(), 1);
        assert_eq!(b.leave().await, Err(TransportError::NotJoined));

        a.leave().await.unwrap();
        assert!(a_participants.next().await.is_none());
    }

    #[tokio::test]
    async fn test_join_sees_credentials() {
        let hub = LoopbackHub::new();
        hub.join(&request("7", true)).await.unwrap();

        let seen = hub.last_join_request().unwrap();
        assert_eq!(seen.credentials, Credentials::new("key", "token-7"));

        let mut anonymous = request("8", true);
        anonymous.credentials.token.clear();
        let err = hub.join(&anonymous).await.err().unwrap();
        assert!(matches!(err, TransportError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_empty_rooms_are_dropped() {
        let hub = LoopbackHub::new();
        let a = hub.join(&request("a", true)).await.unwrap();
        let b = hub.join(&request("b", true)).await.unwrap();
        assert_eq!(hub.room_count(), 1);

        a.leave().await.unwrap();
        assert_eq!(hub.room_count(), 1);
        b.leave().await.unwrap();
        assert_eq!(hub.room_count(), 0);

        // A later join recreates the call from scratch
        assert!(hub.join(&request("c", false)).await.is_err());
        let c = hub.join(&request("c", true)).await.unwrap();
        assert_eq!(hub.participants("default", "room"), vec!["c".to_string()]);
        c.leave().await.unwrap();
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let hub = LoopbackHub::new();
        hub.fail_next_join(TransportError::unreachable("offline"));
        assert!(hub.join(&request("a", true)).await.is_err());

        let a = hub.join(&request("a", true)).await.unwrap();
        assert_eq!(hub.join_count(), 2);

        hub.set_fail_sends(true);
        assert!(a.send_custom_event(encode_presence(true)).await.is_err());
        assert_eq!(hub.sent_count(), 0);

        hub.set_fail_leaves(true);
        assert!(a.leave().await.is_err());
        assert_eq!(hub.participants("default", "room").len(), 1);
    }
}
