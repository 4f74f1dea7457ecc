use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::mixer::UniformSource;
use crate::net::{Packet, Peer, PeerCategory, PeerDirectory, PeerId, RemovalListener};

/// In-process directory that records every datagram instead of sending it.
#[derive(Default)]
pub struct MemoryDirectory {
    peers: Mutex<Vec<Peer>>,
    sent: Mutex<Vec<(PeerId, Vec<u8>)>>,
    unrecognized: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    listeners: Mutex<Vec<Arc<dyn Fn(&Peer) + Send + Sync>>>,
    next_port: Mutex<u16>,
    scan_delay: Mutex<Option<Duration>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, category: PeerCategory) -> Peer {
        let port = {
            let mut next = self.next_port.lock();
            *next += 1;
            20_000 + *next
        };
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let peer = Peer::new(PeerId::new_v4(), category, Some(addr));
        self.peers.lock().push(peer.clone());
        peer
    }

    pub fn add_unreachable(&self, category: PeerCategory) -> Peer {
        let peer = Peer::new(PeerId::new_v4(), category, None);
        self.peers.lock().push(peer.clone());
        peer
    }

    /// Makes every `for_each_matching` call sleep first, like a directory
    /// under heavy load.
    pub fn set_scan_delay(&self, delay: Duration) {
        *self.scan_delay.lock() = Some(delay);
    }

    pub fn take_sent(&self) -> Vec<(PeerId, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn packets_for(&self, id: PeerId) -> Vec<Packet> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, bytes)| Packet::decode(bytes).unwrap())
            .collect()
    }

    pub fn unrecognized(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.unrecognized.lock().clone()
    }
}

impl PeerDirectory for MemoryDirectory {
    fn for_each_matching(
        &self,
        predicate: &mut dyn FnMut(&Peer) -> bool,
        action: &mut dyn FnMut(&Peer),
    ) {
        let delay = *self.scan_delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let snapshot = self.peers.lock().clone();
        for peer in &snapshot {
            if predicate(peer) {
                action(peer);
            }
        }
    }

    fn send_datagram(&self, bytes: &[u8], peer: &Peer) {
        self.sent.lock().push((peer.id, bytes.to_vec()));
    }

    fn broadcast_to(&self, bytes: &[u8], category: PeerCategory) {
        let targets: Vec<PeerId> = self
            .peers
            .lock()
            .iter()
            .filter(|p| p.category == category && p.is_reachable())
            .map(|p| p.id)
            .collect();
        let mut sent = self.sent.lock();
        for id in targets {
            sent.push((id, bytes.to_vec()));
        }
    }

    fn on_peer_removed(&self, listener: RemovalListener) {
        self.listeners.lock().push(Arc::from(listener));
    }

    fn resolve_sender(&self, addr: SocketAddr) -> Option<Peer> {
        let mut peers = self.peers.lock();
        let peer = peers.iter_mut().find(|p| p.addr == Some(addr))?;
        peer.touch();
        Some(peer.clone())
    }

    fn remove_peer(&self, id: PeerId) -> Option<Peer> {
        let removed = {
            let mut peers = self.peers.lock();
            let index = peers.iter().position(|p| p.id == id)?;
            peers.remove(index)
        };
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(&removed);
        }
        Some(removed)
    }

    fn handle_unrecognized(&self, datagram: &[u8], addr: SocketAddr) {
        self.unrecognized.lock().push((datagram.to_vec(), addr));
    }
}

/// Always returns the same draw.
pub struct FixedSource(pub f32);

impl UniformSource for FixedSource {
    fn next_unit(&mut self) -> f32 {
        self.0
    }
}

/// Cycles through a fixed list of draws and counts how many were taken.
pub struct SequenceSource {
    values: Vec<f32>,
    pub draws: usize,
}

impl SequenceSource {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, draws: 0 }
    }
}

impl UniformSource for SequenceSource {
    fn next_unit(&mut self) -> f32 {
        let value = self.values[self.draws % self.values.len()];
        self.draws += 1;
        value
    }
}
