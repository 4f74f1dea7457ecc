use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::DEFAULT_TICK_RATE;

/// Distance within which a source is included in every tick.
pub const FULL_RATE_DISTANCE: f32 = 2.0;
/// Chance per tick of refreshing an unchanged billboard or identity.
pub const AUX_KEEPALIVE_PROBABILITY: f32 = 1.0 / 300.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    pub tick_interval: Duration,
    pub full_rate_distance: f32,
    pub aux_keepalive_probability: f32,
}

impl MixerConfig {
    pub fn with_tick_rate(tick_rate: u32) -> Self {
        Self {
            tick_interval: Duration::from_secs_f64(1.0 / tick_rate.max(1) as f64),
            ..Default::default()
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs_f64(1.0 / DEFAULT_TICK_RATE as f64),
            full_rate_distance: FULL_RATE_DISTANCE,
            aux_keepalive_probability: AUX_KEEPALIVE_PROBABILITY,
        }
    }
}
