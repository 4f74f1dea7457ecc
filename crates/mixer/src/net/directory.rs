use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PeerCategory {
    /// Uploads its own avatar and receives everyone else's.
    Contributor = 0,
    Observer = 1,
}

impl PeerCategory {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PeerCategory::Contributor),
            1 => Some(PeerCategory::Observer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerCategory::Contributor => "contributor",
            PeerCategory::Observer => "observer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub category: PeerCategory,
    pub addr: Option<SocketAddr>,
    pub last_receive_time: Instant,
}

impl Peer {
    pub fn new(id: PeerId, category: PeerCategory, addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            category,
            addr,
            last_receive_time: Instant::now(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.addr.is_some()
    }

    pub fn touch(&mut self) {
        self.last_receive_time = Instant::now();
    }
}

pub type RemovalListener = Box<dyn Fn(&Peer) + Send + Sync>;

/// The set of peers the mixer relays between, and the way to reach them.
///
/// Implementations must not hold internal locks while running `for_each_matching`
/// callbacks or removal listeners: both may call back into the directory.
pub trait PeerDirectory: Send + Sync {
    fn for_each_matching(
        &self,
        predicate: &mut dyn FnMut(&Peer) -> bool,
        action: &mut dyn FnMut(&Peer),
    );

    fn send_datagram(&self, bytes: &[u8], peer: &Peer);

    fn broadcast_to(&self, bytes: &[u8], category: PeerCategory);

    fn on_peer_removed(&self, listener: RemovalListener);

    /// Finds the peer a datagram came from, refreshing its liveness.
    fn resolve_sender(&self, addr: SocketAddr) -> Option<Peer>;

    /// Drops a peer and notifies the removal listener if it was known.
    fn remove_peer(&self, id: PeerId) -> Option<Peer>;

    fn handle_unrecognized(&self, datagram: &[u8], addr: SocketAddr);
}
