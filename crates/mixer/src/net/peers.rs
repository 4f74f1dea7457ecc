use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::directory::{Peer, PeerCategory, PeerId};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_PEERS: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub max_peers: usize,
    pub peer_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            peer_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Known peers, indexed by id and by address, enumerated in registration order.
#[derive(Debug)]
pub struct PeerTable {
    peers_by_addr: HashMap<SocketAddr, PeerId>,
    peers: HashMap<PeerId, Peer>,
    order: Vec<PeerId>,
    max_peers: usize,
    timeout: Duration,
}

impl PeerTable {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            peers_by_addr: HashMap::new(),
            peers: HashMap::new(),
            order: Vec::new(),
            max_peers: config.max_peers,
            timeout: config.peer_timeout,
        }
    }

    /// Returns the id already bound to `addr`, or registers a new peer.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        category: PeerCategory,
    ) -> Result<PeerId, &'static str> {
        if let Some(&id) = self.peers_by_addr.get(&addr) {
            if self.peers.contains_key(&id) {
                return Ok(id);
            }
        }

        if self.peers.len() >= self.max_peers {
            return Err("Directory full");
        }

        let id = PeerId::new_v4();
        self.peers.insert(id, Peer::new(id, category, Some(addr)));
        self.peers_by_addr.insert(addr, id);
        self.order.push(id);

        Ok(id)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&Peer> {
        self.peers_by_addr
            .get(addr)
            .and_then(|id| self.peers.get(id))
    }

    pub fn touch_by_addr(&mut self, addr: &SocketAddr) -> Option<&Peer> {
        let id = *self.peers_by_addr.get(addr)?;
        let peer = self.peers.get_mut(&id)?;
        peer.touch();
        Some(peer)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        if let Some(addr) = peer.addr {
            self.peers_by_addr.remove(&addr);
        }
        self.order.retain(|&other| other != id);
        Some(peer)
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.order
            .iter()
            .filter_map(|id| self.peers.get(id))
            .cloned()
            .collect()
    }

    pub fn cleanup_timed_out(&mut self) -> Vec<Peer> {
        let timed_out: Vec<PeerId> = self
            .order
            .iter()
            .filter(|id| {
                self.peers
                    .get(*id)
                    .is_some_and(|p| p.last_receive_time.elapsed() > self.timeout)
            })
            .copied()
            .collect();

        timed_out
            .into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    pub fn count(&self, category: PeerCategory) -> usize {
        self.peers
            .values()
            .filter(|p| p.category == category)
            .count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn register_is_idempotent_per_address() {
        let mut table = PeerTable::new(&DirectoryConfig::default());

        let first = table.register(addr(5000), PeerCategory::Contributor).unwrap();
        let again = table.register(addr(5000), PeerCategory::Contributor).unwrap();
        let other = table.register(addr(5001), PeerCategory::Observer).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(table.len(), 2);
        assert_eq!(table.count(PeerCategory::Observer), 1);
    }

    #[test]
    fn register_refuses_when_full() {
        let config = DirectoryConfig {
            max_peers: 1,
            ..Default::default()
        };
        let mut table = PeerTable::new(&config);

        table.register(addr(5000), PeerCategory::Contributor).unwrap();
        assert!(table.register(addr(5001), PeerCategory::Contributor).is_err());
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let mut table = PeerTable::new(&DirectoryConfig::default());
        let ids: Vec<PeerId> = (0..5)
            .map(|i| table.register(addr(6000 + i), PeerCategory::Contributor).unwrap())
            .collect();

        table.remove(ids[2]);

        let order: Vec<PeerId> = table.snapshot().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![ids[0], ids[1], ids[3], ids[4]]);
        assert!(table.get_by_addr(&addr(6002)).is_none());
    }

    #[test]
    fn cleanup_removes_silent_peers() {
        let config = DirectoryConfig {
            peer_timeout: Duration::from_millis(5),
            ..Default::default()
        };
        let mut table = PeerTable::new(&config);
        let id = table.register(addr(7000), PeerCategory::Contributor).unwrap();

        std::thread::sleep(Duration::from_millis(20));

        let removed = table.cleanup_timed_out();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, id);
        assert!(table.is_empty());
    }
}
