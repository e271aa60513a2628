//! Room registry
//!
//! Process-wide map from room id to room state. Rooms are created lazily
//! on the first authenticated join and removed by the reconciler once
//! their last peer is gone. The registry also owns the global counters
//! surfaced by the stats endpoint and the periodic keyframe task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{debug, info};

use crate::{PeerSession, Room, RoomId, SfuConfig};

/// Snapshot of the global counters, serialized with the wire field names
/// of the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    #[serde(rename = "total-rooms")]
    pub total_rooms: usize,
    #[serde(rename = "total-peers")]
    pub total_peers: usize,
    #[serde(rename = "room-ids", default, skip_serializing_if = "Option::is_none")]
    pub room_ids: Option<Vec<String>>,
}

pub struct SfuRegistry {
    config: SfuConfig,
    rooms: DashMap<RoomId, Arc<Room>>,
    total_rooms: AtomicUsize,
    total_peers: AtomicUsize,
    /// Handle to ourselves for the deferred-reconciliation task.
    pub(crate) me: Weak<SfuRegistry>,
}

impl SfuRegistry {
    /// Create the registry and start the periodic keyframe task.
    pub fn new(config: SfuConfig) -> Arc<Self> {
        let registry = Arc::new_cyclic(|me| Self {
            config,
            rooms: DashMap::new(),
            total_rooms: AtomicUsize::new(0),
            total_peers: AtomicUsize::new(0),
            me: me.clone(),
        });

        tokio::spawn(Arc::clone(&registry).keyframe_task());

        registry
    }

    #[must_use]
    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    /// Look up a room, creating it if absent. Returns the room and
    /// whether it was created by this call.
    pub fn get_or_create(&self, room_id: RoomId) -> (Arc<Room>, bool) {
        match self.rooms.entry(room_id) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let room = Arc::new(Room::new(entry.key().clone()));
                entry.insert(Arc::clone(&room));
                self.total_rooms.fetch_add(1, Ordering::Relaxed);
                debug!(room_id = %room.id, "created room");
                (room, true)
            }
        }
    }

    /// Remove a room if it is still registered, adjusting the counter
    /// only when something was actually removed.
    pub fn remove_if_present(&self, room_id: &RoomId) {
        if self.rooms.remove(room_id).is_some() {
            self.total_rooms.fetch_sub(1, Ordering::Relaxed);
            info!(room_id = %room_id, "removed empty room");
        }
    }

    /// Shallow copy of the current rooms, for iteration outside the map.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    #[must_use]
    pub fn stats(&self, details: bool) -> RegistryStats {
        RegistryStats {
            total_rooms: self.total_rooms.load(Ordering::Relaxed),
            total_peers: self.total_peers.load(Ordering::Relaxed),
            room_ids: details
                .then(|| self.rooms.iter().map(|entry| entry.key().to_string()).collect()),
        }
    }

    /// Append a peer to a room and count it. The caller runs the
    /// reconciler afterwards to bring the new peer into agreement.
    pub async fn attach_peer(&self, room: &Arc<Room>, peer: PeerSession) {
        let mut inner = room.lock().await;
        inner.peers.push(peer);
        self.total_peers.fetch_add(1, Ordering::Relaxed);
    }

    /// Account for a departed peer. The room entry itself is removed by
    /// the reconciler when it observes the closed peer connection; only
    /// sessions that were attached call this.
    pub fn detach_peer(&self) {
        self.total_peers.fetch_sub(1, Ordering::Relaxed);
    }

    async fn keyframe_task(self: Arc<Self>) {
        let mut ticker = interval(self.config.keyframe_interval());
        loop {
            ticker.tick().await;
            for room in self.snapshot() {
                room.dispatch_keyframes().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = SfuRegistry::new(SfuConfig::default());

        let (room, created) = registry.get_or_create(RoomId::from("R1"));
        assert!(created);
        let (room_again, created_again) = registry.get_or_create(RoomId::from("R1"));
        assert!(!created_again);
        assert!(Arc::ptr_eq(&room, &room_again));

        let stats = registry.stats(true);
        assert_eq!(stats.total_rooms, 1);
        assert_eq!(stats.room_ids, Some(vec!["R1".to_string()]));
    }

    #[tokio::test]
    async fn remove_if_present_only_counts_real_removals() {
        let registry = SfuRegistry::new(SfuConfig::default());
        registry.get_or_create(RoomId::from("R1"));
        assert_eq!(registry.stats(false).total_rooms, 1);

        registry.remove_if_present(&RoomId::from("R1"));
        assert_eq!(registry.stats(false).total_rooms, 0);

        // Double removal must not underflow the counter.
        registry.remove_if_present(&RoomId::from("R1"));
        assert_eq!(registry.stats(false).total_rooms, 0);
    }

    #[tokio::test]
    async fn stats_omits_room_ids_without_details() {
        let registry = SfuRegistry::new(SfuConfig::default());
        registry.get_or_create(RoomId::from("R1"));

        let stats = registry.stats(false);
        assert!(stats.room_ids.is_none());

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("total-rooms"));
        assert!(json.contains("total-peers"));
        assert!(!json.contains("room-ids"));
    }

    #[tokio::test]
    async fn snapshot_returns_all_rooms() {
        let registry = SfuRegistry::new(SfuConfig::default());
        registry.get_or_create(RoomId::from("R1"));
        registry.get_or_create(RoomId::from("R2"));
        assert_eq!(registry.snapshot().len(), 2);
    }
}
