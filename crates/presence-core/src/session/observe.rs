//! Observation loops bound to one joined call
//!
//! Each connection runs two loops that share one [`CancellationToken`]:
//!
//! - the participant loop mirrors the size of the participant set;
//! - the presence loop decodes custom events into the remote presence flag.
//!
//! Both loops stop on cancellation or when their stream ends, and check the
//! token again before every write so a cancelled loop never mutates state.

use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::presence::{decode_presence, PresenceDecode};
use crate::session::state::SharedState;
use crate::transport::{CallHandle, CustomEvent, ParticipantSnapshot};

/// The two background loops of a connection
pub(crate) struct ObservationTasks {
    cancel: CancellationToken,
    participants: JoinHandle<()>,
    presence: JoinHandle<()>,
}

impl ObservationTasks {
    pub(crate) fn spawn(
        session_id: Uuid,
        handle: &Arc<dyn CallHandle>,
        shared: Arc<SharedState>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let participants = tokio::spawn(observe_participants(
            session_id,
            handle.participants(),
            shared.clone(),
            cancel.clone(),
        ));
        let presence = tokio::spawn(observe_presence(
            session_id,
            handle.custom_events(),
            shared,
            cancel.clone(),
        ));

        Self { cancel, participants, presence }
    }

    /// Number of loops that have not exited yet
    pub(crate) fn running(&self) -> usize {
        [&self.participants, &self.presence].iter().filter(|task| !task.is_finished()).count()
    }

    /// Cancel both loops and wait for them to exit.
    ///
    /// The loops select on the token, so this does not wait for the next
    /// transport element.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();

        for (name, task) in [("participants", self.participants), ("presence", self.presence)] {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(observer = name, error = %e, "Observation task panicked");
                }
            }
        }
    }
}

async fn observe_participants(
    session_id: Uuid,
    mut snapshots: BoxStream<'static, ParticipantSnapshot>,
    shared: Arc<SharedState>,
    cancel: CancellationToken,
) {
    debug!(%session_id, "Participant observer started");

    loop {
        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = snapshots.next() => match next {
                Some(snapshot) => snapshot,
                None => {
                    debug!(%session_id, "Participant stream ended");
                    break;
                }
            },
        };

        if cancel.is_cancelled() {
            break;
        }
        trace!(%session_id, count = snapshot.count(), "Participant snapshot");
        shared.set_participant_count(snapshot.count());
    }

    debug!(%session_id, "Participant observer stopped");
}

async fn observe_presence(
    session_id: Uuid,
    mut events: BoxStream<'static, CustomEvent>,
    shared: Arc<SharedState>,
    cancel: CancellationToken,
) {
    debug!(%session_id, "Presence observer started");

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = events.next() => match next {
                Some(event) => event,
                None => {
                    debug!(%session_id, "Custom event stream ended");
                    break;
                }
            },
        };

        match decode_presence(&event.payload) {
            PresenceDecode::Present(present) => {
                if cancel.is_cancelled() {
                    break;
                }
                debug!(%session_id, sender = ?event.sender, present, "Remote presence");
                shared.set_remote_presence(present);
            }
            PresenceDecode::Skip(reason) => {
                trace!(%session_id, ?reason, "Ignoring custom event");
            }
        }
    }

    debug!(%session_id, "Presence observer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::encode_presence;
    use crate::session::ConnectionState;
    use futures::stream;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test]
    async fn test_presence_loop_applies_only_decodable_events() {
        let shared = Arc::new(SharedState::new(16));
        let events = vec![
            CustomEvent::new(json!({ "reaction": "wave" }).as_object().cloned().unwrap()),
            CustomEvent::new(encode_presence(true)),
            CustomEvent::new(json!({ "presence_detected": "maybe" }).as_object().cloned().unwrap()),
        ];

        observe_presence(
            Uuid::new_v4(),
            stream::iter(events).boxed(),
            shared.clone(),
            CancellationToken::new(),
        )
        .await;

        assert!(shared.presence().remote);
    }

    #[tokio::test]
    async fn test_participant_loop_tracks_latest_snapshot() {
        let shared = Arc::new(SharedState::new(16));
        let snapshots = vec![
            ParticipantSnapshot::new(vec!["1".into()]),
            ParticipantSnapshot::new(vec!["1".into(), "2".into()]),
        ];

        observe_participants(
            Uuid::new_v4(),
            stream::iter(snapshots).boxed(),
            shared.clone(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(shared.snapshot().participant_count, 2);
        assert_eq!(shared.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_cancelled_loop_exits_while_stream_is_pending() {
        let shared = Arc::new(SharedState::new(16));
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel::<CustomEvent>();

        let task = tokio::spawn(observe_presence(
            Uuid::new_v4(),
            UnboundedReceiverStream::new(rx).boxed(),
            shared.clone(),
            cancel.clone(),
        ));

        cancel.cancel();
        task.await.unwrap();

        // Delivered after cancellation: must not be applied
        let _ = tx.send(CustomEvent::new(encode_presence(true)));
        assert!(!shared.presence().remote);
    }
}
