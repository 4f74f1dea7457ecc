use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::directory::{PeerCategory, PeerId};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u8 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x504C5A41;
pub const DEFAULT_PORT: u16 = 40102;
pub const DEFAULT_TICK_RATE: u32 = 60;

pub const HEADER_SIZE: usize = 6;
pub const PEER_ID_SIZE: usize = 16;
const POSITION_SIZE: usize = 12;
const LENGTH_PREFIX_SIZE: usize = 2;

pub const AVATAR_RECORD_OVERHEAD: usize = PEER_ID_SIZE + POSITION_SIZE + LENGTH_PREFIX_SIZE;
/// Largest pose that still fits a bulk packet as a single record.
pub const MAX_POSE_BYTES: usize = MAX_PACKET_SIZE - HEADER_SIZE - AVATAR_RECORD_OVERHEAD;
/// Largest identity or billboard payload that still fits a relay packet.
pub const MAX_RELAY_PAYLOAD_BYTES: usize =
    MAX_PACKET_SIZE - HEADER_SIZE - PEER_ID_SIZE - LENGTH_PREFIX_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    PoseUpdate = 0x01,
    IdentityUpdate = 0x02,
    BillboardUpdate = 0x03,
    PeerRemoved = 0x04,
    BulkState = 0x10,
    IdentityRelay = 0x11,
    BillboardRelay = 0x12,
    Hello = 0x20,
    Welcome = 0x21,
}

impl TryFrom<u8> for PacketType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketType::PoseUpdate),
            0x02 => Ok(PacketType::IdentityUpdate),
            0x03 => Ok(PacketType::BillboardUpdate),
            0x04 => Ok(PacketType::PeerRemoved),
            0x10 => Ok(PacketType::BulkState),
            0x11 => Ok(PacketType::IdentityRelay),
            0x12 => Ok(PacketType::BillboardRelay),
            0x20 => Ok(PacketType::Hello),
            0x21 => Ok(PacketType::Welcome),
            other => Err(PacketError::UnknownType(other)),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("magic or version mismatch")]
    InvalidHeader,
    #[error("unknown packet type {0:#04x}")]
    UnknownType(u8),
    #[error("{0} unexpected bytes after body")]
    TrailingBytes(usize),
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("record of {len} bytes exceeds packet body capacity of {capacity}")]
    RecordTooLarge { len: usize, capacity: usize },
    #[error("non-finite position")]
    InvalidPosition,
    #[error("unknown peer category {0}")]
    UnknownCategory(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u8,
    pub packet_type: u8,
}

impl PacketHeader {
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            packet_type: packet_type as u8,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }

    pub fn kind(&self) -> Option<PacketType> {
        PacketType::try_from(self.packet_type).ok()
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf.push(self.version);
        buf.push(self.packet_type);
    }

    pub fn read(data: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(data);
        Ok(Self {
            magic: reader.u32()?,
            version: reader.u8()?,
            packet_type: reader.u8()?,
        })
    }

    /// Reads and validates the header, returning it with the body that follows.
    pub fn split(data: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        let header = Self::read(data)?;
        if !header.is_valid() {
            return Err(PacketError::InvalidHeader);
        }
        Ok((header, &data[HEADER_SIZE..]))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvatarRecord {
    pub peer_id: PeerId,
    pub position: Vec3,
    pub pose: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    PoseUpdate { position: Vec3, pose: Vec<u8> },
    IdentityUpdate(Vec<u8>),
    BillboardUpdate(Vec<u8>),
    PeerRemoved(PeerId),
    BulkState(Vec<AvatarRecord>),
    IdentityRelay { peer_id: PeerId, identity: Vec<u8> },
    BillboardRelay { peer_id: PeerId, billboard: Vec<u8> },
    Hello { category: PeerCategory },
    Welcome { peer_id: PeerId },
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::PoseUpdate { .. } => PacketType::PoseUpdate,
            Packet::IdentityUpdate(_) => PacketType::IdentityUpdate,
            Packet::BillboardUpdate(_) => PacketType::BillboardUpdate,
            Packet::PeerRemoved(_) => PacketType::PeerRemoved,
            Packet::BulkState(_) => PacketType::BulkState,
            Packet::IdentityRelay { .. } => PacketType::IdentityRelay,
            Packet::BillboardRelay { .. } => PacketType::BillboardRelay,
            Packet::Hello { .. } => PacketType::Hello,
            Packet::Welcome { .. } => PacketType::Welcome,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + 64);
        PacketHeader::new(self.packet_type()).write(&mut buf);

        match self {
            Packet::PoseUpdate { position, pose } => {
                check_len(pose.len(), MAX_POSE_BYTES)?;
                write_vec3(&mut buf, *position);
                write_prefixed(&mut buf, pose);
            }
            Packet::IdentityUpdate(payload) | Packet::BillboardUpdate(payload) => {
                check_len(payload.len(), MAX_RELAY_PAYLOAD_BYTES)?;
                write_prefixed(&mut buf, payload);
            }
            Packet::PeerRemoved(peer_id) | Packet::Welcome { peer_id } => {
                buf.extend_from_slice(peer_id.as_bytes());
            }
            Packet::BulkState(records) => {
                for record in records {
                    check_len(record.pose.len(), MAX_POSE_BYTES)?;
                    write_avatar_record(&mut buf, record.peer_id, record.position, &record.pose);
                }
            }
            Packet::IdentityRelay {
                peer_id,
                identity: payload,
            }
            | Packet::BillboardRelay {
                peer_id,
                billboard: payload,
            } => {
                check_len(payload.len(), MAX_RELAY_PAYLOAD_BYTES)?;
                write_relay_body(&mut buf, *peer_id, payload);
            }
            Packet::Hello { category } => buf.push(*category as u8),
        }

        if buf.len() > MAX_PACKET_SIZE {
            return Err(PacketError::PayloadTooLarge {
                len: buf.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let (header, body) = PacketHeader::split(data)?;
        let kind = PacketType::try_from(header.packet_type)?;
        Self::decode_body(kind, body)
    }

    pub fn decode_body(kind: PacketType, body: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(body);

        let packet = match kind {
            PacketType::PoseUpdate => {
                let position = reader.vec3()?;
                let pose = reader.prefixed(MAX_POSE_BYTES)?.to_vec();
                Packet::PoseUpdate { position, pose }
            }
            PacketType::IdentityUpdate => {
                Packet::IdentityUpdate(reader.prefixed(MAX_RELAY_PAYLOAD_BYTES)?.to_vec())
            }
            PacketType::BillboardUpdate => {
                Packet::BillboardUpdate(reader.prefixed(MAX_RELAY_PAYLOAD_BYTES)?.to_vec())
            }
            PacketType::PeerRemoved => Packet::PeerRemoved(reader.peer_id()?),
            PacketType::BulkState => {
                let mut records = Vec::new();
                while !reader.is_empty() {
                    records.push(AvatarRecord {
                        peer_id: reader.peer_id()?,
                        position: reader.vec3()?,
                        pose: reader.prefixed(MAX_POSE_BYTES)?.to_vec(),
                    });
                }
                Packet::BulkState(records)
            }
            PacketType::IdentityRelay => Packet::IdentityRelay {
                peer_id: reader.peer_id()?,
                identity: reader.prefixed(MAX_RELAY_PAYLOAD_BYTES)?.to_vec(),
            },
            PacketType::BillboardRelay => Packet::BillboardRelay {
                peer_id: reader.peer_id()?,
                billboard: reader.prefixed(MAX_RELAY_PAYLOAD_BYTES)?.to_vec(),
            },
            PacketType::Hello => {
                let raw = reader.u8()?;
                let category =
                    PeerCategory::from_u8(raw).ok_or(PacketError::UnknownCategory(raw))?;
                Packet::Hello { category }
            }
            PacketType::Welcome => Packet::Welcome {
                peer_id: reader.peer_id()?,
            },
        };

        reader.finish()?;
        Ok(packet)
    }
}

#[inline]
pub fn avatar_record_len(pose_len: usize) -> usize {
    AVATAR_RECORD_OVERHEAD + pose_len
}

pub fn write_avatar_record(buf: &mut Vec<u8>, peer_id: PeerId, position: Vec3, pose: &[u8]) {
    buf.extend_from_slice(peer_id.as_bytes());
    write_vec3(buf, position);
    write_prefixed(buf, pose);
}

/// Encodes a complete relay packet (`IdentityRelay` or `BillboardRelay`) into `buf`.
pub fn write_relay_packet(
    buf: &mut Vec<u8>,
    packet_type: PacketType,
    peer_id: PeerId,
    payload: &[u8],
) -> Result<(), PacketError> {
    check_len(payload.len(), MAX_RELAY_PAYLOAD_BYTES)?;
    buf.clear();
    PacketHeader::new(packet_type).write(buf);
    write_relay_body(buf, peer_id, payload);
    Ok(())
}

fn write_relay_body(buf: &mut Vec<u8>, peer_id: PeerId, payload: &[u8]) {
    buf.extend_from_slice(peer_id.as_bytes());
    write_prefixed(buf, payload);
}

fn write_vec3(buf: &mut Vec<u8>, v: Vec3) {
    for component in v.to_array() {
        buf.extend_from_slice(&component.to_le_bytes());
    }
}

fn write_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn check_len(len: usize, max: usize) -> Result<(), PacketError> {
    if len > max {
        Err(PacketError::PayloadTooLarge { len, max })
    } else {
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], PacketError> {
        if self.remaining() < needed {
            return Err(PacketError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, PacketError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, PacketError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn vec3(&mut self) -> Result<Vec3, PacketError> {
        let v = Vec3::new(self.f32()?, self.f32()?, self.f32()?);
        if !v.is_finite() {
            return Err(PacketError::InvalidPosition);
        }
        Ok(v)
    }

    fn peer_id(&mut self) -> Result<PeerId, PacketError> {
        Ok(PeerId::from_bytes(self.array()?))
    }

    fn prefixed(&mut self, max: usize) -> Result<&'a [u8], PacketError> {
        let len = self.u16()? as usize;
        check_len(len, max)?;
        self.take(len)
    }

    fn finish(&self) -> Result<(), PacketError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(PacketError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let mut buf = Vec::new();
        PacketHeader::new(PacketType::BulkState).write(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..4], &PROTOCOL_MAGIC.to_le_bytes());
        assert_eq!(buf[4], PROTOCOL_VERSION);
        assert_eq!(buf[5], 0x10);
    }

    #[test]
    fn header_rejects_wrong_version() {
        let mut buf = Vec::new();
        let mut header = PacketHeader::new(PacketType::PoseUpdate);
        header.version = PROTOCOL_VERSION + 1;
        header.write(&mut buf);

        assert_eq!(PacketHeader::split(&buf), Err(PacketError::InvalidHeader));
    }

    #[test]
    fn unknown_type_still_has_readable_header() {
        let mut buf = Vec::new();
        PacketHeader {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            packet_type: 0x7f,
        }
        .write(&mut buf);

        let (header, body) = PacketHeader::split(&buf).unwrap();
        assert!(header.kind().is_none());
        assert!(body.is_empty());
        assert_eq!(Packet::decode(&buf), Err(PacketError::UnknownType(0x7f)));
    }

    #[test]
    fn pose_update_wire_format() {
        let packet = Packet::PoseUpdate {
            position: Vec3::new(1.0, 2.0, 3.0),
            pose: vec![9, 8, 7],
        };
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 12 + 2 + 3);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[HEADER_SIZE + 12..HEADER_SIZE + 14], &3u16.to_le_bytes());
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn bulk_state_decodes_every_record() {
        let a = PeerId::new_v4();
        let b = PeerId::new_v4();
        let mut bytes = Vec::new();
        PacketHeader::new(PacketType::BulkState).write(&mut bytes);
        write_avatar_record(&mut bytes, a, Vec3::ZERO, &[1]);
        write_avatar_record(&mut bytes, b, Vec3::X, &[]);

        assert_eq!(
            bytes.len(),
            HEADER_SIZE + avatar_record_len(1) + avatar_record_len(0)
        );

        match Packet::decode(&bytes).unwrap() {
            Packet::BulkState(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].peer_id, a);
                assert_eq!(records[0].pose, vec![1]);
                assert_eq!(records[1].peer_id, b);
                assert_eq!(records[1].position, Vec3::X);
            }
            other => panic!("expected bulk state, got {:?}", other),
        }
    }

    #[test]
    fn truncated_identity_is_rejected() {
        let mut bytes = Packet::IdentityUpdate(vec![1, 2, 3, 4]).encode().unwrap();
        bytes.pop();

        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = Packet::PeerRemoved(PeerId::new_v4()).encode().unwrap();
        bytes.push(0);

        assert_eq!(Packet::decode(&bytes), Err(PacketError::TrailingBytes(1)));
    }

    #[test]
    fn non_finite_position_is_rejected() {
        let mut bytes = Vec::new();
        PacketHeader::new(PacketType::PoseUpdate).write(&mut bytes);
        write_vec3(&mut bytes, Vec3::new(f32::NAN, 0.0, 0.0));
        write_prefixed(&mut bytes, &[]);

        assert_eq!(Packet::decode(&bytes), Err(PacketError::InvalidPosition));
    }

    #[test]
    fn largest_payloads_fill_packet_exactly() {
        let pose = Packet::PoseUpdate {
            position: Vec3::ZERO,
            pose: vec![0; MAX_POSE_BYTES],
        };
        let relay = Packet::IdentityRelay {
            peer_id: PeerId::new_v4(),
            identity: vec![0; MAX_RELAY_PAYLOAD_BYTES],
        };

        assert_eq!(relay.encode().unwrap().len(), MAX_PACKET_SIZE);
        assert!(pose.encode().unwrap().len() <= MAX_PACKET_SIZE);
        assert_eq!(
            HEADER_SIZE + avatar_record_len(MAX_POSE_BYTES),
            MAX_PACKET_SIZE
        );

        let oversized = Packet::BillboardUpdate(vec![0; MAX_RELAY_PAYLOAD_BYTES + 1]);
        assert!(matches!(
            oversized.encode(),
            Err(PacketError::PayloadTooLarge { .. })
        ));
    }
}
