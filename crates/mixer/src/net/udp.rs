use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use parking_lot::RwLock;

use super::directory::{Peer, PeerCategory, PeerDirectory, PeerId, RemovalListener};
use super::endpoint::NetworkEndpoint;
use super::peers::{DirectoryConfig, PeerTable};
use super::protocol::{Packet, PacketHeader, PacketType};
use super::stats::NetworkStats;

type SharedListener = Arc<dyn Fn(&Peer) + Send + Sync>;

/// Peer directory backed by a single UDP socket.
///
/// Peers join with a `Hello` datagram and are answered with a `Welcome`
/// carrying their id; they are forgotten after staying silent longer than
/// the configured timeout.
pub struct UdpPeerDirectory {
    endpoint: NetworkEndpoint,
    peers: RwLock<PeerTable>,
    listeners: RwLock<Vec<SharedListener>>,
}

impl UdpPeerDirectory {
    pub fn bind<A: ToSocketAddrs>(addr: A, config: &DirectoryConfig) -> io::Result<Self> {
        Ok(Self {
            endpoint: NetworkEndpoint::bind(addr)?,
            peers: RwLock::new(PeerTable::new(config)),
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn network_stats(&self) -> NetworkStats {
        self.endpoint.stats()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn count(&self, category: PeerCategory) -> usize {
        self.peers.read().count(category)
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().snapshot()
    }

    pub fn receive(&self) -> io::Result<Vec<(Vec<u8>, SocketAddr)>> {
        self.endpoint.receive()
    }

    /// Forgets peers that went silent and notifies removal listeners for each.
    pub fn sweep_expired(&self) -> usize {
        let expired = self.peers.write().cleanup_timed_out();
        for peer in &expired {
            log::info!("Peer {} timed out", peer.id);
            self.notify_removed(peer);
        }
        expired.len()
    }

    fn notify_removed(&self, peer: &Peer) {
        let listeners: Vec<SharedListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(peer);
        }
    }

    fn handle_hello(&self, category: PeerCategory, addr: SocketAddr) {
        let registered = {
            let mut peers = self.peers.write();
            let known = peers.get_by_addr(&addr).map(|p| p.id);
            peers.register(addr, category).map(|id| (id, known.is_none()))
        };

        match registered {
            Ok((peer_id, is_new)) => {
                if is_new {
                    log::info!(
                        "Peer {} joined from {} as {}",
                        peer_id,
                        addr,
                        category.as_str()
                    );
                }
                self.send_welcome(peer_id, addr);
            }
            Err(reason) => log::warn!("Ignoring hello from {}: {}", addr, reason),
        }
    }

    fn send_welcome(&self, peer_id: PeerId, addr: SocketAddr) {
        match (Packet::Welcome { peer_id }).encode() {
            Ok(bytes) => {
                if let Err(e) = self.endpoint.send_to(&bytes, addr) {
                    log::debug!("Failed to send welcome to {}: {}", addr, e);
                }
            }
            Err(e) => log::error!("Failed to encode welcome: {}", e),
        }
    }
}

impl PeerDirectory for UdpPeerDirectory {
    fn for_each_matching(
        &self,
        predicate: &mut dyn FnMut(&Peer) -> bool,
        action: &mut dyn FnMut(&Peer),
    ) {
        let snapshot = self.peers.read().snapshot();
        for peer in &snapshot {
            if predicate(peer) {
                action(peer);
            }
        }
    }

    fn send_datagram(&self, bytes: &[u8], peer: &Peer) {
        let Some(addr) = peer.addr else {
            return;
        };
        if let Err(e) = self.endpoint.send_to(bytes, addr) {
            log::debug!("Failed to send {} bytes to {}: {}", bytes.len(), addr, e);
        }
    }

    fn broadcast_to(&self, bytes: &[u8], category: PeerCategory) {
        let snapshot = self.peers.read().snapshot();
        for peer in snapshot.iter().filter(|p| p.category == category) {
            self.send_datagram(bytes, peer);
        }
    }

    fn on_peer_removed(&self, listener: RemovalListener) {
        self.listeners.write().push(Arc::from(listener));
    }

    fn resolve_sender(&self, addr: SocketAddr) -> Option<Peer> {
        self.peers.write().touch_by_addr(&addr).cloned()
    }

    fn remove_peer(&self, id: PeerId) -> Option<Peer> {
        let removed = self.peers.write().remove(id);
        if let Some(peer) = &removed {
            log::info!("Peer {} left", peer.id);
            self.notify_removed(peer);
        }
        removed
    }

    fn handle_unrecognized(&self, datagram: &[u8], addr: SocketAddr) {
        let Ok((header, body)) = PacketHeader::split(datagram) else {
            return;
        };

        match header.kind() {
            Some(PacketType::Hello) => match Packet::decode_body(PacketType::Hello, body) {
                Ok(Packet::Hello { category }) => self.handle_hello(category, addr),
                Ok(_) => {}
                Err(e) => log::debug!("Malformed hello from {}: {}", addr, e),
            },
            _ => {
                if self.peers.write().touch_by_addr(&addr).is_none() {
                    log::debug!(
                        "Dropping packet type {:#04x} from unknown {}",
                        header.packet_type,
                        addr
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn bind_local(config: &DirectoryConfig) -> UdpPeerDirectory {
        UdpPeerDirectory::bind("127.0.0.1:0", config).unwrap()
    }

    fn hello(directory: &UdpPeerDirectory, addr: SocketAddr, category: PeerCategory) {
        let bytes = Packet::Hello { category }.encode().unwrap();
        directory.handle_unrecognized(&bytes, addr);
    }

    #[test]
    fn hello_registers_peer_once() {
        let directory = bind_local(&DirectoryConfig::default());
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();

        hello(&directory, addr, PeerCategory::Contributor);
        hello(&directory, addr, PeerCategory::Contributor);

        assert_eq!(directory.peer_count(), 1);
        assert_eq!(directory.count(PeerCategory::Contributor), 1);
        assert!(directory.resolve_sender(addr).is_some());
    }

    #[test]
    fn remove_notifies_listeners_once() {
        let directory = bind_local(&DirectoryConfig::default());
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        hello(&directory, addr, PeerCategory::Contributor);
        let id = directory.resolve_sender(addr).unwrap().id;

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        directory.on_peer_removed(Box::new(move |_: &Peer| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(directory.remove_peer(id).is_some());
        assert!(directory.remove_peer(id).is_none());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn for_each_matching_allows_reentry() {
        let directory = bind_local(&DirectoryConfig::default());
        for port in 10..13 {
            let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
            hello(&directory, addr, PeerCategory::Contributor);
        }

        let mut pairs = 0;
        directory.for_each_matching(&mut |_: &Peer| true, &mut |outer: &Peer| {
            directory.for_each_matching(&mut |inner: &Peer| inner.id != outer.id, &mut |_: &Peer| {
                pairs += 1;
            });
        });

        assert_eq!(pairs, 6);
    }

    #[test]
    fn sweep_expires_silent_peers() {
        let config = DirectoryConfig {
            peer_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let directory = bind_local(&config);
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        hello(&directory, addr, PeerCategory::Observer);

        let deadline = Instant::now() + Duration::from_secs(1);
        while directory.sweep_expired() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(directory.peer_count(), 0);
    }
}
