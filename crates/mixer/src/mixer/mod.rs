mod broadcast;
mod client_state;
mod config;
mod ingest;
mod random;
mod stats;
mod throttle;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

pub use broadcast::{BroadcastEngine, include_by_distance, passes_throttle};
pub use client_state::{AvatarSnapshot, ClientEntry, ClientState, ClientStateStore};
pub use config::{AUX_KEEPALIVE_PROBABILITY, FULL_RATE_DISTANCE, MixerConfig};
pub use ingest::{IngestDispatcher, IngestOutcome};
pub use random::{EntropySource, UniformSource};
pub use stats::{ReportError, StatsAggregator, StatsSnapshot, TickStats};
pub use throttle::ThrottleController;

use crate::net::{Packet, Peer, PeerCategory, PeerDirectory};

struct TickContext {
    engine: BroadcastEngine,
    throttle: ThrottleController,
    last_tick_end: Instant,
}

/// What stats readers see. Published at the end of every tick.
struct Reporting {
    stats: StatsAggregator,
    throttle: ThrottleController,
}

/// Relays avatar state between the peers of a directory.
///
/// Datagrams come in through [`AvatarMixer::on_datagram`] on the receive
/// thread; [`AvatarMixer::run_tick`] is driven by the tick scheduler. The two
/// only meet on per-peer entry locks, which the tick side never waits on.
pub struct AvatarMixer {
    directory: Arc<dyn PeerDirectory>,
    store: ClientStateStore,
    ingest: IngestDispatcher,
    tick: Mutex<TickContext>,
    reports: Mutex<Reporting>,
    config: MixerConfig,
}

impl AvatarMixer {
    pub fn new(directory: Arc<dyn PeerDirectory>, config: MixerConfig) -> Arc<Self> {
        Self::with_random_source(directory, config, Box::new(EntropySource::from_entropy()))
    }

    pub fn with_random_source(
        directory: Arc<dyn PeerDirectory>,
        config: MixerConfig,
        rng: Box<dyn UniformSource>,
    ) -> Arc<Self> {
        let mixer = Arc::new(Self {
            tick: Mutex::new(TickContext {
                engine: BroadcastEngine::new(&config, rng),
                throttle: ThrottleController::new(),
                last_tick_end: Instant::now(),
            }),
            reports: Mutex::new(Reporting {
                stats: StatsAggregator::new(),
                throttle: ThrottleController::new(),
            }),
            directory,
            store: ClientStateStore::new(),
            ingest: IngestDispatcher::new(),
            config,
        });

        let weak = Arc::downgrade(&mixer);
        mixer.directory.on_peer_removed(Box::new(move |peer: &Peer| {
            if let Some(mixer) = weak.upgrade() {
                mixer.handle_peer_removed(peer);
            }
        }));

        mixer
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Arc<dyn PeerDirectory> {
        &self.directory
    }

    pub fn store(&self) -> &ClientStateStore {
        &self.store
    }

    /// Runs one broadcast pass. Returns `false` without doing anything if
    /// another tick is still in progress.
    pub fn run_tick(&self) -> bool {
        let Some(mut guard) = self.tick.try_lock() else {
            log::warn!("Tick requested while the previous one is still running, skipping");
            return false;
        };
        let TickContext {
            engine,
            throttle,
            last_tick_end,
        } = &mut *guard;

        let idle = Instant::now().saturating_duration_since(*last_tick_end);
        let ratio = throttle.on_tick_complete(idle, self.config.tick_interval);

        let tick_stats = engine.broadcast(
            self.directory.as_ref(),
            &self.store,
            ratio,
            *last_tick_end,
        );

        {
            let mut reports = self.reports.lock();
            reports.stats.record_frame(&tick_stats);
            reports.throttle.clone_from(throttle);
        }

        *last_tick_end = Instant::now();
        true
    }

    pub fn on_datagram(&self, datagram: &[u8], sender: SocketAddr) -> IngestOutcome {
        self.ingest
            .dispatch(datagram, sender, self.directory.as_ref(), &self.store, Instant::now())
    }

    /// Never waits on a running tick; reports the throttle as of the last
    /// completed one.
    pub fn collect_and_reset_stats(&self) -> StatsSnapshot {
        let mut guard = self.reports.lock();
        let Reporting { stats, throttle } = &mut *guard;
        stats.collect_and_reset(throttle)
    }

    pub fn throttling_ratio(&self) -> f32 {
        self.reports.lock().throttle.performance_throttling_ratio()
    }

    /// Tells the remaining contributors that `peer` is gone and drops its state.
    pub fn handle_peer_removed(&self, peer: &Peer) {
        if !self.store.contains(peer.id) {
            return;
        }

        match Packet::PeerRemoved(peer.id).encode() {
            Ok(bytes) => self.directory.broadcast_to(&bytes, PeerCategory::Contributor),
            Err(err) => log::debug!("Failed to encode removal of {}: {}", peer.id, err),
        }
        self.store.remove(peer.id);
        log::info!("Avatar {} left the mixer", peer.id);
    }
}
