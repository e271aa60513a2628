//! Control channel protocol
//!
//! Every frame on the websocket is a text JSON envelope
//! `{event, data}` where `data` is itself a JSON-encoded string whose
//! schema depends on `event`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Event names used on the control channel.
pub mod event {
    /// Server → client, first frame: assigned peer id.
    pub const LOGIN: &str = "login";
    /// Client → server: bearer token reply to `login`.
    pub const LOGIN_REPLY: &str = "login-reply";
    /// Server → client: session description offer.
    pub const OFFER: &str = "offer";
    /// Client → server: session description answer.
    pub const ANSWER: &str = "answer";
    /// Both directions: trickled ICE candidate.
    pub const CANDIDATE: &str = "candidate";
    /// Server → client: stream id → origin peer mapping for a new track.
    pub const TRACK_META: &str = "track-meta";
    /// Server → client: a peer left the room.
    pub const PEER_GONE: &str = "peer-gone";
}

/// The wire envelope for all control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub event: String,
    pub data: String,
}

impl ControlMessage {
    pub fn new(event: &str, data: impl Into<String>) -> Self {
        Self {
            event: event.to_string(),
            data: data.into(),
        }
    }

    /// Build an envelope whose `data` is the JSON encoding of `payload`.
    pub fn with_payload<T: Serialize>(event: &str, payload: &T) -> Result<Self> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Decode the `data` field into an event-specific payload.
    pub fn payload<'a, T: Deserialize<'a>>(&'a self) -> Result<T> {
        serde_json::from_str(&self.data).map_err(Error::from)
    }
}

/// Payload of a `track-meta` event: lets the client associate upcoming
/// media (by stream id) with the peer that published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: String,
    pub peer_id: String,
}

/// Payload of a `login-reply` event. Clients may send extra fields; the
/// server ignores them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginReply {
    pub token: String,
    pub token_hint: String,
}

/// Capability handle for one client's control channel.
///
/// Writes through a single sink are serialized by the implementation so
/// that concurrent offers and broadcasts never interleave frames. The
/// websocket-backed implementation lives in the server crate.
#[async_trait]
pub trait ControlSink: Send + Sync {
    async fn send(&self, message: &ControlMessage) -> Result<()>;
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips() {
        let message = ControlMessage::new(event::LOGIN, "abc");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"event":"login","data":"abc"}"#);
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn track_meta_uses_wire_field_names() {
        let message = ControlMessage::with_payload(
            event::TRACK_META,
            &TrackMeta {
                id: "stream-1".to_string(),
                peer_id: "peer-1".to_string(),
            },
        )
        .unwrap();
        assert_eq!(message.data, r#"{"id":"stream-1","peer_id":"peer-1"}"#);
    }

    #[test]
    fn login_reply_ignores_extra_fields() {
        let message = ControlMessage::new(
            event::LOGIN_REPLY,
            r#"{"token":"t","token_hint":"h","client_version":"9.9"}"#,
        );
        let reply: LoginReply = message.payload().unwrap();
        assert_eq!(reply.token, "t");
        assert_eq!(reply.token_hint, "h");
    }

    #[test]
    fn login_reply_tolerates_missing_hint() {
        let message = ControlMessage::new(event::LOGIN_REPLY, r#"{"token":"t"}"#);
        let reply: LoginReply = message.payload().unwrap();
        assert_eq!(reply.token, "t");
        assert_eq!(reply.token_hint, "");
    }
}
