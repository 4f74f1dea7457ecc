pub mod mixer;
pub mod net;
pub mod simulation;

#[cfg(test)]
mod testing;

pub use mixer::{
    AvatarMixer, AvatarSnapshot, BroadcastEngine, ClientState, ClientStateStore, EntropySource,
    IngestDispatcher, IngestOutcome, MixerConfig, StatsAggregator, StatsSnapshot,
    ThrottleController, TickStats, UniformSource,
};
pub use net::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, DirectoryConfig, NetworkEndpoint, NetworkStats, Packet,
    PacketError, PacketHeader, PacketType, Peer, PeerCategory, PeerDirectory, PeerId,
    UdpPeerDirectory,
};
pub use simulation::TickScheduler;
