use std::net::SocketAddr;
use std::time::Duration;

use plaza::{DEFAULT_TICK_RATE, DirectoryConfig, MixerConfig};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_peers: usize,
    pub peer_timeout: Duration,
    pub stats_interval: Duration,
    /// Where archived stats reports are sent, if anywhere.
    pub stats_addr: Option<SocketAddr>,
    pub seed: Option<u64>,
}

impl ServerConfig {
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig::with_tick_rate(self.tick_rate)
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            max_peers: self.max_peers,
            peer_timeout: self.peer_timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let directory = DirectoryConfig::default();
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_peers: directory.max_peers,
            peer_timeout: directory.peer_timeout,
            stats_interval: Duration::from_secs(1),
            stats_addr: None,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_rate_sets_mixer_interval() {
        let config = ServerConfig {
            tick_rate: 30,
            ..Default::default()
        };

        let mixer = config.mixer_config();
        assert!((mixer.tick_interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(mixer.full_rate_distance, plaza::mixer::FULL_RATE_DISTANCE);
    }

    #[test]
    fn directory_limits_are_forwarded() {
        let config = ServerConfig {
            max_peers: 8,
            peer_timeout: Duration::from_secs(3),
            ..Default::default()
        };

        let directory = config.directory_config();
        assert_eq!(directory.max_peers, 8);
        assert_eq!(directory.peer_timeout, Duration::from_secs(3));
    }
}
