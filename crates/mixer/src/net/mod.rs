mod directory;
mod endpoint;
mod packer;
mod peers;
mod protocol;
mod stats;
mod udp;

pub use directory::{Peer, PeerCategory, PeerDirectory, PeerId, RemovalListener};
pub use endpoint::NetworkEndpoint;
pub use packer::PacketBuilder;
pub use peers::{DirectoryConfig, PeerTable};
pub use protocol::{
    AVATAR_RECORD_OVERHEAD, AvatarRecord, DEFAULT_PORT, DEFAULT_TICK_RATE, HEADER_SIZE,
    MAX_PACKET_SIZE, MAX_POSE_BYTES, MAX_RELAY_PAYLOAD_BYTES, PEER_ID_SIZE, PROTOCOL_MAGIC,
    PROTOCOL_VERSION, Packet, PacketError, PacketHeader, PacketType, avatar_record_len,
    write_avatar_record, write_relay_packet,
};
pub use stats::{NetworkCounters, NetworkStats};
pub use udp::UdpPeerDirectory;
