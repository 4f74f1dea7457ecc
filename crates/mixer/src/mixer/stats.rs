use rkyv::rancor;
use rkyv::util::AlignedVec;
use serde::{Deserialize, Serialize};

use super::throttle::ThrottleController;

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub listeners: u64,
    pub billboard_packets: u64,
    pub identity_packets: u64,
    pub bulk_packets: u64,
    pub avatar_records: u64,
    pub contention_skips: u64,
}

impl TickStats {
    fn accumulate(&mut self, other: &TickStats) {
        self.listeners += other.listeners;
        self.billboard_packets += other.billboard_packets;
        self.identity_packets += other.identity_packets;
        self.bulk_packets += other.bulk_packets;
        self.avatar_records += other.avatar_records;
        self.contention_skips += other.contention_skips;
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct StatsSnapshot {
    pub frames: u32,
    pub average_listeners_per_frame: f32,
    pub average_billboard_packets_per_frame: f32,
    pub average_identity_packets_per_frame: f32,
    pub average_bulk_packets_per_frame: f32,
    pub average_avatar_records_per_frame: f32,
    pub contention_skips: u64,
    pub trailing_sleep_percentage: f32,
    pub performance_throttling_ratio: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl StatsSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReportError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.to_vec())
            .map_err(ReportError::Serialize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ReportError> {
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(ReportError::Deserialize)
    }
}

/// Sums tick counters between two collections.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    totals: TickStats,
    frames: u32,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, tick: &TickStats) {
        self.totals.accumulate(tick);
        self.frames = self.frames.saturating_add(1);
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn collect_and_reset(&mut self, throttle: &ThrottleController) -> StatsSnapshot {
        let per_frame = |sum: u64| {
            if self.frames == 0 {
                0.0
            } else {
                sum as f32 / self.frames as f32
            }
        };

        let snapshot = StatsSnapshot {
            frames: self.frames,
            average_listeners_per_frame: per_frame(self.totals.listeners),
            average_billboard_packets_per_frame: per_frame(self.totals.billboard_packets),
            average_identity_packets_per_frame: per_frame(self.totals.identity_packets),
            average_bulk_packets_per_frame: per_frame(self.totals.bulk_packets),
            average_avatar_records_per_frame: per_frame(self.totals.avatar_records),
            contention_skips: self.totals.contention_skips,
            trailing_sleep_percentage: throttle.trailing_sleep_ratio() * 100.0,
            performance_throttling_ratio: throttle.performance_throttling_ratio(),
        };

        self.totals = TickStats::default();
        self.frames = 0;

        snapshot
    }
}
