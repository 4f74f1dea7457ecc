use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct TickCounters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    overruns: AtomicU64,
}

/// Drives a tick function at a fixed interval on its own thread.
///
/// Missed deadlines are not replayed: when a tick finishes past the next
/// deadline, the following tick starts immediately and the schedule is
/// re-anchored from there. An overloaded tick function therefore sees no idle
/// time between ticks.
pub struct TickScheduler {
    interval: Duration,
    running: Arc<AtomicBool>,
    counters: Arc<TickCounters>,
    handle: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// `tick` returns whether it actually ran.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(TickCounters::default());

        let handle = {
            let running = Arc::clone(&running);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("mixer-tick".into())
                .spawn(move || {
                    let mut deadline = Instant::now() + interval;
                    while running.load(Ordering::Acquire) {
                        let now = Instant::now();
                        if now < deadline {
                            thread::sleep(deadline - now);
                            continue;
                        }

                        if tick() {
                            counters.ticks.fetch_add(1, Ordering::Relaxed);
                        } else {
                            counters.skipped.fetch_add(1, Ordering::Relaxed);
                        }

                        deadline += interval;
                        let finished = Instant::now();
                        if finished > deadline {
                            let overruns = counters.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                            log::warn!(
                                "Tick overran its interval by {:?} ({} overruns)",
                                finished - deadline,
                                overruns
                            );
                            deadline = finished;
                        }
                    }
                })?
        };

        log::debug!("Tick scheduler started at {:?} per tick", interval);

        Ok(Self {
            interval,
            running,
            counters,
            handle: Some(handle),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn ticks(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.counters.overruns.load(Ordering::Relaxed)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Tick thread panicked");
            }
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
