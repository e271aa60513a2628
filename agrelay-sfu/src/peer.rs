//! Peer sessions and peer-connection construction

use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::{ControlSink, PeerId, Result};

/// One authenticated client inside a room: its peer connection and the
/// serialized writer for its control channel.
pub struct PeerSession {
    pub id: PeerId,
    pub pc: Arc<RTCPeerConnection>,
    pub sink: Arc<dyn ControlSink>,
}

/// Build a peer connection with the default codec set and interceptors,
/// pre-wired to receive exactly one video and one audio track.
///
/// No ICE servers are configured; the SFU answers on its host candidates.
pub async fn new_peer_connection() -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let pc = api.new_peer_connection(RTCConfiguration::default()).await?;

    for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
        pc.add_transceiver_from_kind(
            kind,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await?;
    }

    Ok(Arc::new(pc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_peer_connection_has_one_transceiver_per_kind() {
        let pc = new_peer_connection().await.unwrap();
        let transceivers = pc.get_transceivers().await;
        assert_eq!(transceivers.len(), 2);

        let kinds: Vec<RTPCodecType> = transceivers.iter().map(|t| t.kind()).collect();
        assert!(kinds.contains(&RTPCodecType::Video));
        assert!(kinds.contains(&RTPCodecType::Audio));
        for transceiver in &transceivers {
            assert_eq!(
                transceiver.direction(),
                RTCRtpTransceiverDirection::Recvonly
            );
        }
    }
}
