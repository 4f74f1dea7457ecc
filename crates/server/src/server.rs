use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use plaza::{
    AvatarMixer, EntropySource, NetworkStats, PeerCategory, PeerDirectory, StatsSnapshot,
    TickScheduler, UdpPeerDirectory, UniformSource,
};

use crate::config::ServerConfig;

pub struct MixerServer {
    directory: Arc<UdpPeerDirectory>,
    mixer: Arc<AvatarMixer>,
    config: ServerConfig,
    running: Arc<AtomicBool>,
    scheduler: Option<TickScheduler>,
    receiver: Option<JoinHandle<()>>,
    stats_socket: Option<UdpSocket>,
    last_report: Instant,
    latest_report: StatsSnapshot,
    start_time: Instant,
}

impl MixerServer {
    pub fn new(bind_addr: &str, config: ServerConfig) -> io::Result<Self> {
        let directory = Arc::new(UdpPeerDirectory::bind(bind_addr, &config.directory_config())?);

        let rng: Box<dyn UniformSource> = match config.seed {
            Some(seed) => Box::new(EntropySource::seeded(seed)),
            None => Box::new(EntropySource::from_entropy()),
        };
        let mixer = AvatarMixer::with_random_source(
            Arc::clone(&directory) as Arc<dyn PeerDirectory>,
            config.mixer_config(),
            rng,
        );

        let stats_socket = match config.stats_addr {
            Some(_) => Some(UdpSocket::bind("0.0.0.0:0")?),
            None => None,
        };

        Ok(Self {
            directory,
            mixer,
            running: Arc::new(AtomicBool::new(true)),
            scheduler: None,
            receiver: None,
            stats_socket,
            last_report: Instant::now(),
            latest_report: StatsSnapshot::default(),
            start_time: Instant::now(),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.directory.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Spawns the tick and receive threads.
    pub fn start(&mut self) -> io::Result<()> {
        if self.scheduler.is_none() {
            let mixer = Arc::clone(&self.mixer);
            self.scheduler = Some(TickScheduler::spawn(
                self.mixer.config().tick_interval,
                move || mixer.run_tick(),
            )?);
        }

        if self.receiver.is_none() {
            let directory = Arc::clone(&self.directory);
            let mixer = Arc::clone(&self.mixer);
            let running = Arc::clone(&self.running);
            self.receiver = Some(
                thread::Builder::new()
                    .name("mixer-receive".into())
                    .spawn(move || receive_loop(&directory, &mixer, &running))?,
            );
        }

        Ok(())
    }

    pub fn run(&mut self) -> io::Result<()> {
        self.start()?;
        while self.running.load(Ordering::SeqCst) {
            self.poll_stats();
            thread::sleep(Duration::from_millis(50));
        }
        self.shutdown();
        Ok(())
    }

    /// Collects a report once per stats interval, logging it and forwarding it
    /// to the stats sink.
    pub fn poll_stats(&mut self) -> Option<StatsSnapshot> {
        if self.last_report.elapsed() < self.config.stats_interval {
            return None;
        }
        self.last_report = Instant::now();

        let report = self.mixer.collect_and_reset_stats();
        log::info!(
            "frames={} listeners/frame={:.1} records/frame={:.1} identity/frame={:.2} billboard/frame={:.2} skips={} sleep={:.1}% throttle={:.3}",
            report.frames,
            report.average_listeners_per_frame,
            report.average_avatar_records_per_frame,
            report.average_identity_packets_per_frame,
            report.average_billboard_packets_per_frame,
            report.contention_skips,
            report.trailing_sleep_percentage,
            report.performance_throttling_ratio
        );

        if let (Some(socket), Some(addr)) = (&self.stats_socket, self.config.stats_addr) {
            match report.to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, addr) {
                        log::debug!("Failed to send stats to {}: {}", addr, e);
                    }
                }
                Err(e) => log::error!("Failed to archive stats: {}", e),
            }
        }

        self.latest_report = report;
        Some(report)
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        if let Some(receiver) = self.receiver.take() {
            if receiver.join().is_err() {
                log::warn!("Receive thread panicked");
            }
        }
    }

    pub fn stats(&self) -> ServerStats {
        let (ticks, overruns) = self
            .scheduler
            .as_ref()
            .map_or((0, 0), |s| (s.ticks(), s.overruns()));

        ServerStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            peer_count: self.directory.peer_count(),
            contributors: self.directory.count(PeerCategory::Contributor),
            observers: self.directory.count(PeerCategory::Observer),
            avatars: self.mixer.store().len(),
            max_peers: self.config.max_peers,
            tick_rate: self.config.tick_rate,
            ticks,
            overruns,
            report: self.latest_report,
            network_stats: self.directory.network_stats(),
        }
    }
}

impl Drop for MixerServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(directory: &UdpPeerDirectory, mixer: &AvatarMixer, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match directory.receive() {
            Ok(datagrams) => {
                for (bytes, from) in datagrams {
                    mixer.on_datagram(&bytes, from);
                }
            }
            Err(e) => log::error!("Network error: {}", e),
        }
        directory.sweep_expired();
        thread::sleep(Duration::from_millis(1));
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub peer_count: usize,
    pub contributors: usize,
    pub observers: usize,
    pub avatars: usize,
    pub max_peers: usize,
    pub tick_rate: u32,
    pub ticks: u64,
    pub overruns: u64,
    pub report: StatsSnapshot,
    pub network_stats: NetworkStats,
}
