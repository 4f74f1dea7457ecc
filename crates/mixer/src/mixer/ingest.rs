use std::net::SocketAddr;
use std::time::Instant;

use super::client_state::ClientStateStore;
use crate::net::{Packet, PacketHeader, PacketType, PeerDirectory, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    PoseApplied(PeerId),
    IdentityUpdated { peer_id: PeerId, changed: bool },
    BillboardUpdated { peer_id: PeerId, changed: bool },
    PeerRetired(PeerId),
    /// Handed to the directory as traffic the mixer does not own.
    Delegated,
    Dropped,
}

/// Routes inbound datagrams into client state. Runs on the receive thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestDispatcher;

impl IngestDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(
        &self,
        datagram: &[u8],
        sender: SocketAddr,
        directory: &dyn PeerDirectory,
        store: &ClientStateStore,
        now: Instant,
    ) -> IngestOutcome {
        let (header, body) = match PacketHeader::split(datagram) {
            Ok(parts) => parts,
            Err(err) => {
                log::debug!("Dropping datagram from {}: {}", sender, err);
                return IngestOutcome::Dropped;
            }
        };

        let kind = match header.kind() {
            Some(
                kind @ (PacketType::PoseUpdate
                | PacketType::IdentityUpdate
                | PacketType::BillboardUpdate
                | PacketType::PeerRemoved),
            ) => kind,
            _ => {
                directory.handle_unrecognized(datagram, sender);
                return IngestOutcome::Delegated;
            }
        };

        let Some(peer) = directory.resolve_sender(sender) else {
            log::debug!("Dropping {:?} from unknown sender {}", kind, sender);
            return IngestOutcome::Dropped;
        };

        let packet = match Packet::decode_body(kind, body) {
            Ok(packet) => packet,
            Err(err) => {
                log::debug!("Malformed {:?} from {}: {}", kind, peer.id, err);
                return IngestOutcome::Dropped;
            }
        };

        match packet {
            Packet::PoseUpdate { position, pose } => {
                let entry = store.attach(peer.id);
                entry.access().snapshot.apply_pose(position, &pose);
                IngestOutcome::PoseApplied(peer.id)
            }
            Packet::IdentityUpdate(identity) => {
                let Some(entry) = store.entry(peer.id) else {
                    return IngestOutcome::Dropped;
                };
                let changed = entry.access().update_identity(&identity, now);
                if changed {
                    log::debug!("Peer {} changed identity ({} bytes)", peer.id, identity.len());
                }
                IngestOutcome::IdentityUpdated {
                    peer_id: peer.id,
                    changed,
                }
            }
            Packet::BillboardUpdate(billboard) => {
                let Some(entry) = store.entry(peer.id) else {
                    return IngestOutcome::Dropped;
                };
                let changed = entry.access().update_billboard(&billboard, now);
                IngestOutcome::BillboardUpdated {
                    peer_id: peer.id,
                    changed,
                }
            }
            Packet::PeerRemoved(id) if id == peer.id => {
                directory.remove_peer(id);
                store.remove(id);
                IngestOutcome::PeerRetired(id)
            }
            Packet::PeerRemoved(id) => {
                log::warn!("Peer {} tried to remove {}", peer.id, id);
                IngestOutcome::Dropped
            }
            _ => IngestOutcome::Dropped,
        }
    }
}
