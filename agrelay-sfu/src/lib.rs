//! agrelay SFU core
//!
//! Server-side coordinator for a many-to-many WebRTC SFU: rooms, the
//! per-room track fan-out state, the renegotiation loop that keeps every
//! peer's sender set in agreement with the room, and the periodic
//! keyframe dispatch.
//!
//! ## Architecture
//!
//! - [`SfuRegistry`]: process-wide room map, counters and periodic tasks
//! - [`Room`]: one forwarding scope of peers and forwarding tracks
//! - [`PeerSession`]: a joined client's peer connection + control writer
//! - [`ForwardingTrack`]: server-side republication of one remote track
//! - [`ControlSink`]: capability trait for the client control channel;
//!   the websocket-backed implementation lives in the server crate
//!
//! The media engine is webrtc-rs; SDP, ICE, DTLS and RTP I/O stay inside
//! it. This crate only moves tracks between peer connections and drives
//! the offer/answer exchange over the control channel.

pub mod auth;
mod config;
mod error;
mod message;
mod peer;
mod registry;
mod room;
mod signal;
mod track;
mod types;

pub use config::SfuConfig;
pub use error::{Error, Result};
pub use message::{event, ControlMessage, ControlSink, LoginReply, TrackMeta};
pub use peer::{new_peer_connection, PeerSession};
pub use registry::{RegistryStats, SfuRegistry};
pub use room::Room;
pub use track::{relay_rtp, ForwardingTrack};
pub use types::{PeerId, RoomId};
