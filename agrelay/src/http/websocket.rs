// Peer session handler
//
// One task per client: upgrade, login handshake, token validation, peer
// connection wiring, then the command loop until the client goes away.
// Teardown closes the peer connection; the reconciler observes the
// Closed state and removes the peer from its room.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use agrelay_sfu::{
    auth, event, new_peer_connection, relay_rtp, ControlMessage, ControlSink, Error, LoginReply,
    PeerId, PeerSession,
};

use super::{token_key, AppState};

/// `GET /websocket` upgrade point.
pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialized writer over one client's control channel. The mutex makes
/// every frame atomic with respect to concurrent offers and broadcasts.
struct ControlSocket {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl ControlSocket {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl ControlSink for ControlSocket {
    async fn send(&self, message: &ControlMessage) -> agrelay_sfu::Result<()> {
        let frame = serde_json::to_string(message)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame))
            .await
            .map_err(|err| Error::Socket(err.to_string()))
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            })))
            .await;
        let _ = sink.close().await;
    }
}

/// Read the next control frame, or `None` once the session is over.
/// A malformed or binary frame ends the session (protocol error).
async fn read_message(stream: &mut SplitStream<WebSocket>) -> Option<ControlMessage> {
    loop {
        match stream.next().await? {
            Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                Ok(message) => return Some(message),
                Err(err) => {
                    warn!(error = %err, "malformed control frame");
                    return None;
                }
            },
            Ok(Message::Close(_)) => return None,
            Ok(Message::Binary(_)) => {
                warn!("unexpected binary frame on control channel");
                return None;
            }
            // Ping/pong are handled by the transport.
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "websocket read failed");
                return None;
            }
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let sink: Arc<dyn ControlSink> = Arc::new(ControlSocket::new(ws_sink));

    let peer_id = PeerId::generate();
    if let Err(err) = sink
        .send(&ControlMessage::new(event::LOGIN, peer_id.to_string()))
        .await
    {
        warn!(error = %err, "failed to send login");
        return;
    }

    // Exactly one frame may precede authentication.
    let Some(reply) = read_message(&mut ws_stream).await else {
        sink.close().await;
        return;
    };
    if reply.event != event::LOGIN_REPLY {
        warn!(peer_id = %peer_id, event = %reply.event, "expected login-reply");
        sink.close().await;
        return;
    }
    let login: LoginReply = match reply.payload() {
        Ok(login) => login,
        Err(err) => {
            warn!(peer_id = %peer_id, error = %err, "malformed login-reply");
            sink.close().await;
            return;
        }
    };

    let room_id = match auth::room_id_from_token(&login.token, &login.token_hint, token_key) {
        Ok(room_id) => room_id,
        Err(err) => {
            warn!(peer_id = %peer_id, error = %err, "token rejected");
            sink.close().await;
            return;
        }
    };

    let (room, _created) = state.registry.get_or_create(room_id);

    let pc = match new_peer_connection().await {
        Ok(pc) => pc,
        Err(err) => {
            error!(room_id = %room.id, error = %err, "failed to create peer connection");
            sink.close().await;
            return;
        }
    };
    debug!(room_id = %room.id, peer_id = %peer_id, "new peer connection");

    // Trickle ICE: emit server candidates to this client.
    {
        let sink = Arc::clone(&sink);
        let room_id = room.id.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let sink = Arc::clone(&sink);
            let room_id = room_id.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                debug!(room_id = %room_id, "emitting ICE candidate");

                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(err) => {
                        warn!(error = %err, "failed to encode ICE candidate");
                        return;
                    }
                };
                let payload = match serde_json::to_string(&init) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to encode ICE candidate");
                        return;
                    }
                };
                if let Err(err) = sink
                    .send(&ControlMessage::new(event::CANDIDATE, payload))
                    .await
                {
                    warn!(error = %err, "failed to send ICE candidate");
                }
            })
        }));
    }

    // Failed connections are force-closed; Closed ones are reaped by the
    // reconciler, which also collects the room if it became empty.
    {
        let registry = Arc::clone(&state.registry);
        let room = Arc::clone(&room);
        let weak_pc = Arc::downgrade(&pc);
        let peer_id = peer_id.clone();
        pc.on_peer_connection_state_change(Box::new(move |connection_state| {
            let registry = Arc::clone(&registry);
            let room = Arc::clone(&room);
            let weak_pc = weak_pc.clone();
            let peer_id = peer_id.clone();
            Box::pin(async move {
                debug!(
                    room_id = %room.id,
                    peer_id = %peer_id,
                    state = %connection_state,
                    "connection state changed"
                );
                match connection_state {
                    RTCPeerConnectionState::Failed => {
                        if let Some(pc) = weak_pc.upgrade() {
                            if let Err(err) = pc.close().await {
                                warn!(error = %err, "failed to close peer connection");
                            }
                        }
                    }
                    RTCPeerConnectionState::Closed => registry.signal(&room).await,
                    _ => {}
                }
            })
        }));
    }

    // Republish every inbound track to the room and pump its RTP until
    // the remote side stops.
    {
        let registry = Arc::clone(&state.registry);
        let room = Arc::clone(&room);
        let origin = peer_id.clone();
        pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
            let registry = Arc::clone(&registry);
            let room = Arc::clone(&room);
            let origin = origin.clone();
            Box::pin(async move {
                debug!(
                    room_id = %room.id,
                    peer_id = %origin,
                    track_id = %remote.id(),
                    "remote track started"
                );
                let local = registry.add_track(&room, &remote, &origin).await;
                relay_rtp(&remote, &local).await;
                registry.remove_track(&room, &local).await;
            })
        }));
    }

    state
        .registry
        .attach_peer(
            &room,
            PeerSession {
                id: peer_id.clone(),
                pc: Arc::clone(&pc),
                sink: Arc::clone(&sink),
            },
        )
        .await;

    // First offer for the new peer.
    state.registry.signal(&room).await;

    while let Some(message) = read_message(&mut ws_stream).await {
        match message.event.as_str() {
            event::CANDIDATE => {
                let candidate: RTCIceCandidateInit = match message.payload() {
                    Ok(candidate) => candidate,
                    Err(err) => {
                        warn!(peer_id = %peer_id, error = %err, "malformed candidate");
                        break;
                    }
                };
                if let Err(err) = pc.add_ice_candidate(candidate).await {
                    warn!(peer_id = %peer_id, error = %err, "failed to add ICE candidate");
                    break;
                }
            }
            event::ANSWER => {
                let answer: RTCSessionDescription = match message.payload() {
                    Ok(answer) => answer,
                    Err(err) => {
                        warn!(peer_id = %peer_id, error = %err, "malformed answer");
                        break;
                    }
                };
                debug!(room_id = %room.id, peer_id = %peer_id, "got answer");
                trace!(peer_id = %peer_id, sdp = %answer.sdp, "answer sdp");
                if let Err(err) = pc.set_remote_description(answer).await {
                    warn!(peer_id = %peer_id, error = %err, "failed to set remote description");
                    break;
                }
            }
            _ => {}
        }
    }

    // Teardown: closing the peer connection makes the reconciler drop
    // this peer from the room and collect the room if now empty.
    if let Err(err) = pc.close().await {
        debug!(peer_id = %peer_id, error = %err, "peer connection close failed");
    }
    sink.close().await;
    state.registry.detach_peer();
    room.broadcast_except(
        &peer_id,
        &ControlMessage::new(event::PEER_GONE, peer_id.to_string()),
    )
    .await;
    debug!(room_id = %room.id, peer_id = %peer_id, "session ended");
}
