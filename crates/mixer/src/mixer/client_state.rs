use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::net::PeerId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarSnapshot {
    pub position: Vec3,
    pub pose: Vec<u8>,
    pub billboard: Vec<u8>,
    pub identity: Vec<u8>,
}

impl AvatarSnapshot {
    pub fn apply_pose(&mut self, position: Vec3, pose: &[u8]) {
        self.position = position;
        self.pose.clear();
        self.pose.extend_from_slice(pose);
    }
}

#[derive(Debug, Default)]
pub struct ClientState {
    pub snapshot: AvatarSnapshot,
    pub last_billboard_change: Option<Instant>,
    pub last_identity_change: Option<Instant>,
    has_received_first_packets: bool,
}

impl ClientState {
    pub fn has_received_first_packets(&self) -> bool {
        self.has_received_first_packets
    }

    /// Marks the first service as done, returning whether it already was.
    pub fn check_and_set_has_received_first_packets(&mut self) -> bool {
        std::mem::replace(&mut self.has_received_first_packets, true)
    }

    pub fn update_identity(&mut self, identity: &[u8], now: Instant) -> bool {
        if self.snapshot.identity == identity {
            return false;
        }
        self.snapshot.identity = identity.to_vec();
        self.last_identity_change = Some(now);
        true
    }

    pub fn update_billboard(&mut self, billboard: &[u8], now: Instant) -> bool {
        if self.snapshot.billboard == billboard {
            return false;
        }
        self.snapshot.billboard = billboard.to_vec();
        self.last_billboard_change = Some(now);
        true
    }
}

/// One peer's state behind its own lock.
#[derive(Debug, Default)]
pub struct ClientEntry {
    state: Mutex<ClientState>,
}

impl ClientEntry {
    /// Non-blocking access; `None` while another thread holds the entry.
    pub fn try_access(&self) -> Option<MutexGuard<'_, ClientState>> {
        self.state.try_lock()
    }

    pub fn access(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock()
    }
}

/// Per-peer client state owned by the mixer. The map lock is only held for
/// lookups; entry locks are taken on the returned `Arc<ClientEntry>`.
#[derive(Debug, Default)]
pub struct ClientStateStore {
    entries: RwLock<HashMap<PeerId, Arc<ClientEntry>>>,
}

impl ClientStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, peer_id: PeerId) -> Arc<ClientEntry> {
        if let Some(entry) = self.entry(peer_id) {
            return entry;
        }
        Arc::clone(self.entries.write().entry(peer_id).or_default())
    }

    pub fn entry(&self, peer_id: PeerId) -> Option<Arc<ClientEntry>> {
        self.entries.read().get(&peer_id).cloned()
    }

    pub fn try_access<R>(
        &self,
        peer_id: PeerId,
        f: impl FnOnce(&mut ClientState) -> R,
    ) -> Option<R> {
        let entry = self.entry(peer_id)?;
        let mut state = entry.try_access()?;
        Some(f(&mut state))
    }

    pub fn remove(&self, peer_id: PeerId) -> bool {
        self.entries.write().remove(&peer_id).is_some()
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.entries.read().contains_key(&peer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
