//! Signaling reconciler
//!
//! `signal` brings every peer connection in a room into agreement with
//! the room's current track set: stale senders are removed, missing
//! forwarding tracks attached, and a fresh offer emitted to each peer.
//! Track add/remove and peer-connection state changes are the only
//! callers; all of them may race, so a pass restarts from the top
//! whenever it observes a mutation it cannot reconcile in place.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::room::RoomInner;
use crate::{event, ControlMessage, ForwardingTrack, PeerId, Room, SfuRegistry, TrackMeta};

enum SyncOutcome {
    Converged,
    TryAgain,
}

impl SfuRegistry {
    /// Reconcile `room` and notify its peers.
    ///
    /// Serialized per room by the room lock; concurrent invocations
    /// queue. If the pass cannot converge within the configured attempt
    /// bound (a burst of track mutations from media callbacks can
    /// legitimately keep invalidating it), a deferred retry is scheduled
    /// and the lock released so the mutations can drain.
    pub async fn signal(&self, room: &Arc<Room>) {
        let mut delete_room = false;
        {
            let mut inner = room.lock().await;
            debug!(room_id = %room.id, "reconciling peer connections");

            let mut converged = false;
            for _ in 0..self.config().max_signal_attempts {
                match self.attempt_sync(room, &mut inner).await {
                    SyncOutcome::Converged => {
                        converged = true;
                        break;
                    }
                    SyncOutcome::TryAgain => {}
                }
            }

            if converged {
                if inner.peers.is_empty() {
                    delete_room = true;
                }
            } else {
                self.signal_deferred(room);
            }
        }

        room.dispatch_keyframes().await;

        if delete_room {
            self.remove_if_present(&room.id);
        }
    }

    fn signal_deferred(&self, room: &Arc<Room>) {
        warn!(room_id = %room.id, "reconciliation did not converge, backing off");
        let Some(registry) = self.me.upgrade() else {
            return;
        };
        let room = Arc::clone(room);
        tokio::spawn(async move {
            tokio::time::sleep(registry.config().signal_retry_delay()).await;
            registry.signal(&room).await;
        });
    }

    /// One reconciliation pass over the room's peers, in join order.
    /// Returns `TryAgain` on any observation that invalidates the pass:
    /// a closed peer connection, a failed sender mutation, or a failed
    /// control write.
    async fn attempt_sync(&self, room: &Room, inner: &mut RoomInner) -> SyncOutcome {
        let mut i = 0;
        while i < inner.peers.len() {
            if inner.peers[i].pc.connection_state() == RTCPeerConnectionState::Closed {
                let gone = inner.peers.remove(i);
                debug!(room_id = %room.id, peer_id = %gone.id, "dropped closed peer connection");
                // Indices shifted, restart the pass.
                return SyncOutcome::TryAgain;
            }

            let peer = &inner.peers[i];

            // Track ids this peer already sends or receives. Receivers
            // count so a publisher is never offered its own media back.
            let mut present: HashSet<String> = HashSet::new();

            for sender in peer.pc.get_senders().await {
                let Some(track) = sender.track().await else {
                    continue;
                };
                let track_id = track.id().to_string();
                present.insert(track_id.clone());

                if !inner.tracks.contains_key(&track_id) {
                    if let Err(err) = peer.pc.remove_track(&sender).await {
                        debug!(peer_id = %peer.id, error = %err, "sender removal failed");
                        return SyncOutcome::TryAgain;
                    }
                }
            }

            for receiver in peer.pc.get_receivers().await {
                let Some(track) = receiver.tracks().await.into_iter().next() else {
                    continue;
                };
                present.insert(track.id());
            }

            for forwarding in inner.tracks.values() {
                if present.contains(forwarding.local.id()) {
                    continue;
                }
                if forwarding.origin == peer.id {
                    continue;
                }

                if let Err(err) = peer
                    .pc
                    .add_track(Arc::clone(&forwarding.local) as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                {
                    debug!(peer_id = %peer.id, error = %err, "track attach failed");
                    return SyncOutcome::TryAgain;
                }
                debug!(
                    room_id = %room.id,
                    peer_id = %peer.id,
                    stream_id = %forwarding.local.stream_id(),
                    origin = %forwarding.origin,
                    "attached forwarding track"
                );

                // The client relies on this mapping to attribute the
                // incoming stream to a participant.
                let meta = TrackMeta {
                    id: forwarding.local.stream_id().to_string(),
                    peer_id: forwarding.origin.to_string(),
                };
                let Ok(message) = ControlMessage::with_payload(event::TRACK_META, &meta) else {
                    return SyncOutcome::TryAgain;
                };
                if let Err(err) = peer.sink.send(&message).await {
                    warn!(peer_id = %peer.id, error = %err, "track-meta write failed");
                    return SyncOutcome::TryAgain;
                }
            }

            let offer = match peer.pc.create_offer(None).await {
                Ok(offer) => offer,
                Err(err) => {
                    debug!(peer_id = %peer.id, error = %err, "offer creation failed");
                    return SyncOutcome::TryAgain;
                }
            };
            if let Err(err) = peer.pc.set_local_description(offer.clone()).await {
                debug!(peer_id = %peer.id, error = %err, "setting local description failed");
                return SyncOutcome::TryAgain;
            }
            let Ok(payload) = serde_json::to_string(&offer) else {
                return SyncOutcome::TryAgain;
            };

            trace!(peer_id = %peer.id, sdp = %offer.sdp, "generated offer");
            if let Err(err) = peer
                .sink
                .send(&ControlMessage::new(event::OFFER, payload))
                .await
            {
                warn!(peer_id = %peer.id, error = %err, "offer write failed");
                return SyncOutcome::TryAgain;
            }
            debug!(room_id = %room.id, peer_id = %peer.id, "sent offer");

            i += 1;
        }

        SyncOutcome::Converged
    }

    /// Republish a remote track into the room and renegotiate. Returns
    /// the forwarding track so the caller's read loop can feed it.
    pub async fn add_track(
        &self,
        room: &Arc<Room>,
        remote: &TrackRemote,
        origin: &PeerId,
    ) -> Arc<TrackLocalStaticRTP> {
        let forwarding = ForwardingTrack::from_remote(remote, origin.clone());
        let local = Arc::clone(&forwarding.local);
        self.publish_track(room, forwarding).await;
        local
    }

    /// Insert a forwarding track and renegotiate the room.
    pub async fn publish_track(&self, room: &Arc<Room>, forwarding: ForwardingTrack) {
        {
            let mut inner = room.lock().await;
            inner
                .tracks
                .insert(forwarding.local.id().to_string(), forwarding);
        }
        self.signal(room).await;
    }

    /// Drop a forwarding track and renegotiate the room.
    pub async fn remove_track(&self, room: &Arc<Room>, local: &TrackLocalStaticRTP) {
        {
            let mut inner = room.lock().await;
            inner.tracks.remove(local.id());
        }
        self.signal(room).await;
    }
}
