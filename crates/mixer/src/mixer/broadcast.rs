use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use super::client_state::{ClientEntry, ClientStateStore};
use super::config::MixerConfig;
use super::random::UniformSource;
use super::stats::TickStats;
use crate::net::{
    PacketBuilder, PacketType, Peer, PeerCategory, PeerDirectory, PeerId, avatar_record_len,
    write_avatar_record, write_relay_packet,
};

struct Candidate {
    peer: Peer,
    entry: Arc<ClientEntry>,
}

impl Candidate {
    fn is_listener(&self) -> bool {
        self.peer.category == PeerCategory::Contributor && self.peer.is_reachable()
    }
}

/// Whether a source survives load shedding. No draw is taken at ratio 0.
pub fn passes_throttle(throttling_ratio: f32, rng: &mut dyn UniformSource) -> bool {
    if throttling_ratio == 0.0 {
        return true;
    }
    rng.next_unit() < 1.0 - throttling_ratio
}

/// Distance falloff: a source at `d` is included with probability
/// `full_rate_distance / d`, which saturates to 1 inside the full-rate radius.
pub fn include_by_distance(
    distance: f32,
    full_rate_distance: f32,
    rng: &mut dyn UniformSource,
) -> bool {
    if distance == 0.0 {
        return true;
    }
    rng.next_unit() < full_rate_distance / distance
}

/// Builds and sends every listener's view of the other avatars for one tick.
pub struct BroadcastEngine {
    full_rate_distance: f32,
    aux_keepalive_probability: f32,
    rng: Box<dyn UniformSource>,
    packer: PacketBuilder,
    relay_buffer: Vec<u8>,
}

impl BroadcastEngine {
    pub fn new(config: &MixerConfig, rng: Box<dyn UniformSource>) -> Self {
        Self {
            full_rate_distance: config.full_rate_distance,
            aux_keepalive_probability: config.aux_keepalive_probability,
            rng,
            packer: PacketBuilder::new(PacketType::BulkState),
            relay_buffer: Vec::new(),
        }
    }

    pub fn broadcast(
        &mut self,
        directory: &dyn PeerDirectory,
        store: &ClientStateStore,
        throttling_ratio: f32,
        previous_tick_end: Instant,
    ) -> TickStats {
        let mut stats = TickStats::default();

        let mut candidates = Vec::new();
        directory.for_each_matching(
            &mut |peer: &Peer| store.contains(peer.id),
            &mut |peer: &Peer| {
                if let Some(entry) = store.entry(peer.id) {
                    candidates.push(Candidate {
                        peer: peer.clone(),
                        entry,
                    });
                }
            },
        );

        for receiver in candidates.iter().filter(|c| c.is_listener()) {
            let (receiver_position, force_aux) = match receiver.entry.try_access() {
                Some(mut state) => (
                    state.snapshot.position,
                    !state.check_and_set_has_received_first_packets(),
                ),
                None => {
                    log::debug!("Skipping listener {} this tick, state is busy", receiver.peer.id);
                    stats.contention_skips += 1;
                    continue;
                }
            };

            self.packer.reset();
            for source in &candidates {
                if source.peer.id == receiver.peer.id {
                    continue;
                }
                self.relay_source(
                    directory,
                    &receiver.peer,
                    receiver_position,
                    source,
                    throttling_ratio,
                    force_aux,
                    previous_tick_end,
                    &mut stats,
                );
            }

            self.packer.finish(|packet| {
                directory.send_datagram(packet, &receiver.peer);
                stats.bulk_packets += 1;
            });
            stats.listeners += 1;
        }

        stats
    }

    #[allow(clippy::too_many_arguments)]
    fn relay_source(
        &mut self,
        directory: &dyn PeerDirectory,
        receiver: &Peer,
        receiver_position: Vec3,
        source: &Candidate,
        throttling_ratio: f32,
        force_aux: bool,
        previous_tick_end: Instant,
        stats: &mut TickStats,
    ) {
        if !passes_throttle(throttling_ratio, self.rng.as_mut()) {
            return;
        }

        let Some(state) = source.entry.try_access() else {
            stats.contention_skips += 1;
            return;
        };
        let snapshot = &state.snapshot;

        let distance = receiver_position.distance(snapshot.position);
        if include_by_distance(distance, self.full_rate_distance, self.rng.as_mut()) {
            let appended = self.packer.append_with(
                avatar_record_len(snapshot.pose.len()),
                |buf| write_avatar_record(buf, source.peer.id, snapshot.position, &snapshot.pose),
                |packet| {
                    directory.send_datagram(packet, receiver);
                    stats.bulk_packets += 1;
                },
            );
            match appended {
                Ok(_) => stats.avatar_records += 1,
                Err(err) => log::debug!("Dropping avatar record for {}: {}", source.peer.id, err),
            }
        }

        if self.should_send_aux(
            &snapshot.billboard,
            state.last_billboard_change,
            force_aux,
            previous_tick_end,
        ) && self.send_relay(
            directory,
            receiver,
            PacketType::BillboardRelay,
            source.peer.id,
            &snapshot.billboard,
        ) {
            stats.billboard_packets += 1;
        }

        if self.should_send_aux(
            &snapshot.identity,
            state.last_identity_change,
            force_aux,
            previous_tick_end,
        ) && self.send_relay(
            directory,
            receiver,
            PacketType::IdentityRelay,
            source.peer.id,
            &snapshot.identity,
        ) {
            stats.identity_packets += 1;
        }
    }

    fn should_send_aux(
        &mut self,
        payload: &[u8],
        changed_at: Option<Instant>,
        force: bool,
        previous_tick_end: Instant,
    ) -> bool {
        if payload.is_empty() {
            return false;
        }
        force
            || changed_at.is_some_and(|at| at > previous_tick_end)
            || self.rng.next_unit() < self.aux_keepalive_probability
    }

    fn send_relay(
        &mut self,
        directory: &dyn PeerDirectory,
        receiver: &Peer,
        packet_type: PacketType,
        source: PeerId,
        payload: &[u8],
    ) -> bool {
        match write_relay_packet(&mut self.relay_buffer, packet_type, source, payload) {
            Ok(()) => {
                directory.send_datagram(&self.relay_buffer, receiver);
                true
            }
            Err(err) => {
                log::debug!("Dropping {:?} for {}: {}", packet_type, source, err);
                false
            }
        }
    }
}
