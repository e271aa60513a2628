//! Forwarding tracks
//!
//! A forwarding track is the server-side republication of one remote
//! track: a local RTP track carrying the same codec parameters, track id
//! and stream id as its origin, fed by the origin's read loop and fanned
//! out to every other peer's sender.

use std::sync::Arc;

use tracing::debug;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use crate::PeerId;

/// RTP read buffer size, one MTU.
const RTP_BUFFER_SIZE: usize = 1500;

/// A local track republishing one peer's inbound media, keyed in the
/// room by its track id.
pub struct ForwardingTrack {
    pub local: Arc<TrackLocalStaticRTP>,
    pub origin: PeerId,
}

impl ForwardingTrack {
    pub fn new(local: Arc<TrackLocalStaticRTP>, origin: PeerId) -> Self {
        Self { local, origin }
    }

    /// Mirror a remote track's codec and identifiers into a fresh local
    /// track, so the forwarded stream is indistinguishable from its
    /// origin on the wire.
    pub fn from_remote(remote: &TrackRemote, origin: PeerId) -> Self {
        let local = Arc::new(TrackLocalStaticRTP::new(
            remote.codec().capability.clone(),
            remote.id(),
            remote.stream_id(),
        ));
        Self { local, origin }
    }
}

/// Pump RTP packets from a remote track into its forwarding track until
/// either side errors. Returns on the first failure; the caller then
/// removes the forwarding track from the room.
pub async fn relay_rtp(remote: &TrackRemote, local: &TrackLocalStaticRTP) {
    let mut buf = vec![0u8; RTP_BUFFER_SIZE];
    loop {
        let (packet, _) = match remote.read(&mut buf).await {
            Ok(read) => read,
            Err(err) => {
                debug!(track_id = %remote.id(), error = %err, "remote track read ended");
                return;
            }
        };

        if let Err(err) = local.write_rtp(&packet).await {
            debug!(track_id = %remote.id(), error = %err, "forwarding track write failed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
    use webrtc::track::track_local::TrackLocal;

    #[test]
    fn forwarding_track_keeps_identifiers() {
        let local = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                ..Default::default()
            },
            "track-a".to_string(),
            "stream-a".to_string(),
        ));
        let track = ForwardingTrack::new(local, PeerId::from("peer-a"));
        assert_eq!(track.local.id(), "track-a");
        assert_eq!(track.local.stream_id(), "stream-a");
        assert_eq!(track.origin, PeerId::from("peer-a"));
    }
}
