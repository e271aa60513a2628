//! Room state
//!
//! A room is the forwarding scope: every forwarding track in a room is
//! delivered to every peer in that room except its origin. One async
//! mutex guards both the peer list and the track map; holding it across
//! the whole reconciliation pass is what serializes concurrent passes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{trace, warn};
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;

use crate::{ControlMessage, ForwardingTrack, PeerId, PeerSession, RoomId};

pub struct Room {
    pub id: RoomId,
    inner: Mutex<RoomInner>,
}

pub(crate) struct RoomInner {
    /// Insertion-ordered: a reconciliation pass visits peers in join order.
    pub(crate) peers: Vec<PeerSession>,
    /// Keyed by track id.
    pub(crate) tracks: HashMap<String, ForwardingTrack>,
}

impl Room {
    pub(crate) fn new(id: RoomId) -> Self {
        Self {
            id,
            inner: Mutex::new(RoomInner {
                peers: Vec::new(),
                tracks: HashMap::new(),
            }),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().await
    }

    pub async fn peer_count(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    pub async fn track_count(&self) -> usize {
        self.inner.lock().await.tracks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.peers.is_empty()
    }

    /// Ask every peer's inbound tracks for a keyframe (PLI), so late
    /// joiners get a decodable picture without waiting for the next
    /// scheduled one. Best-effort; engine errors are swallowed.
    pub async fn dispatch_keyframes(&self) {
        let inner = self.inner.lock().await;
        for peer in &inner.peers {
            for receiver in peer.pc.get_receivers().await {
                let Some(track) = receiver.tracks().await.into_iter().next() else {
                    continue;
                };
                let pli = PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc: track.ssrc(),
                };
                if let Err(err) = peer.pc.write_rtcp(&[Box::new(pli)]).await {
                    trace!(peer_id = %peer.id, error = %err, "keyframe request failed");
                }
            }
        }
    }

    /// Send `message` to every peer except `from`. Write errors are
    /// logged and do not stop the broadcast.
    pub async fn broadcast_except(&self, from: &PeerId, message: &ControlMessage) {
        let inner = self.inner.lock().await;
        for peer in &inner.peers {
            if peer.id == *from {
                continue;
            }
            if let Err(err) = peer.sink.send(message).await {
                warn!(room_id = %self.id, peer_id = %peer.id, error = %err, "broadcast write failed");
            }
        }
    }
}
