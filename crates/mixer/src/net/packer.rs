use super::protocol::{HEADER_SIZE, MAX_PACKET_SIZE, PacketError, PacketHeader, PacketType};

/// Packs variable-length records behind a fixed header, handing a finished
/// packet to `flush` whenever the next record would cross the size ceiling.
#[derive(Debug)]
pub struct PacketBuilder {
    buffer: Vec<u8>,
    header: PacketHeader,
    max_size: usize,
    records: usize,
}

impl PacketBuilder {
    pub fn new(packet_type: PacketType) -> Self {
        Self::with_max_size(packet_type, MAX_PACKET_SIZE)
    }

    pub fn with_max_size(packet_type: PacketType, max_size: usize) -> Self {
        let max_size = max_size.clamp(HEADER_SIZE, MAX_PACKET_SIZE);
        let mut builder = Self {
            buffer: Vec::with_capacity(max_size),
            header: PacketHeader::new(packet_type),
            max_size,
            records: 0,
        };
        builder.reset();
        builder
    }

    /// Body bytes available in an empty packet.
    pub fn capacity(&self) -> usize {
        self.max_size - HEADER_SIZE
    }

    pub fn remaining(&self) -> usize {
        self.max_size - self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.header.write(&mut self.buffer);
        self.records = 0;
    }

    pub fn append<F>(&mut self, record: &[u8], flush: F) -> Result<bool, PacketError>
    where
        F: FnMut(&[u8]),
    {
        self.append_with(record.len(), |buf| buf.extend_from_slice(record), flush)
    }

    /// Appends a record of `record_len` bytes produced by `write`. Returns
    /// whether the packet in progress had to be flushed first.
    pub fn append_with<W, F>(
        &mut self,
        record_len: usize,
        write: W,
        mut flush: F,
    ) -> Result<bool, PacketError>
    where
        W: FnOnce(&mut Vec<u8>),
        F: FnMut(&[u8]),
    {
        if record_len > self.capacity() {
            return Err(PacketError::RecordTooLarge {
                len: record_len,
                capacity: self.capacity(),
            });
        }

        let flushed = record_len > self.remaining();
        if flushed {
            flush(&self.buffer);
            self.reset();
        }

        let before = self.buffer.len();
        write(&mut self.buffer);
        debug_assert_eq!(self.buffer.len() - before, record_len);
        self.records += 1;

        Ok(flushed)
    }

    /// Hands over the packet in progress, even if it only holds the header,
    /// and starts a fresh one.
    pub fn finish<F>(&mut self, flush: F)
    where
        F: FnOnce(&[u8]),
    {
        flush(&self.buffer);
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::Packet;

    fn record(tag: u8, len: usize) -> Vec<u8> {
        vec![tag; len]
    }

    #[test]
    fn fresh_builder_holds_only_header() {
        let builder = PacketBuilder::new(PacketType::BulkState);

        assert_eq!(builder.len(), HEADER_SIZE);
        assert!(builder.is_empty());
        assert_eq!(builder.capacity(), MAX_PACKET_SIZE - HEADER_SIZE);

        let (header, body) = PacketHeader::split(builder.as_bytes()).unwrap();
        assert_eq!(header.kind(), Some(PacketType::BulkState));
        assert!(body.is_empty());
    }

    #[test]
    fn overflow_flushes_exactly_once_before_placing_record() {
        let mut builder = PacketBuilder::with_max_size(PacketType::BulkState, HEADER_SIZE + 10);
        let mut sent: Vec<Vec<u8>> = Vec::new();

        assert!(!builder.append(&record(1, 6), |p| sent.push(p.to_vec())).unwrap());
        assert!(!builder.append(&record(2, 4), |p| sent.push(p.to_vec())).unwrap());
        assert!(sent.is_empty());
        assert_eq!(builder.remaining(), 0);

        assert!(builder.append(&record(3, 1), |p| sent.push(p.to_vec())).unwrap());
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][HEADER_SIZE..], &[1, 1, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(builder.record_count(), 1);
        assert_eq!(&builder.as_bytes()[HEADER_SIZE..], &[3]);
    }

    #[test]
    fn packing_never_drops_or_exceeds() {
        let max = HEADER_SIZE + 50;
        let mut builder = PacketBuilder::with_max_size(PacketType::BulkState, max);
        let mut sent: Vec<Vec<u8>> = Vec::new();

        let records: Vec<Vec<u8>> = (0..40u8)
            .map(|i| record(i, 1 + (i as usize * 7) % 23))
            .collect();
        let mut flushes = 0;
        for r in &records {
            if builder.append(r, |p| sent.push(p.to_vec())).unwrap() {
                flushes += 1;
            }
        }
        builder.finish(|p| sent.push(p.to_vec()));

        assert_eq!(sent.len(), flushes + 1);
        assert!(sent.iter().all(|p| p.len() <= max));

        let packed: Vec<u8> = sent.iter().flat_map(|p| p[HEADER_SIZE..].to_vec()).collect();
        let expected: Vec<u8> = records.concat();
        assert_eq!(packed, expected);
    }

    #[test]
    fn oversized_record_is_refused_without_flushing() {
        let mut builder = PacketBuilder::with_max_size(PacketType::BulkState, HEADER_SIZE + 8);
        let mut flushed = false;

        builder.append(&record(1, 4), |_| flushed = true).unwrap();
        let result = builder.append(&record(2, 9), |_| flushed = true);

        assert!(matches!(result, Err(PacketError::RecordTooLarge { .. })));
        assert!(!flushed);
        assert_eq!(builder.record_count(), 1);
    }

    #[test]
    fn finish_emits_header_only_heartbeat() {
        let mut builder = PacketBuilder::new(PacketType::BulkState);
        let mut sent = Vec::new();

        builder.finish(|p| sent.push(p.to_vec()));

        assert_eq!(sent.len(), 1);
        assert_eq!(Packet::decode(&sent[0]).unwrap(), Packet::BulkState(Vec::new()));
    }
}
