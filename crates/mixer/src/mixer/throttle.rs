use std::time::Duration;

const TRAILING_AVERAGE_FRAMES: u32 = 100;
const CURRENT_FRAME_RATIO: f32 = 1.0 / TRAILING_AVERAGE_FRAMES as f32;
const PREVIOUS_FRAMES_RATIO: f32 = 1.0 - CURRENT_FRAME_RATIO;

const STRUGGLE_TRIGGER_SLEEP_RATIO: f32 = 0.10;
const BACK_OFF_TRIGGER_SLEEP_RATIO: f32 = 0.20;
const RATIO_BACK_OFF: f32 = 0.02;

/// Load shedding driven by how much of each tick interval the mixer spends idle.
///
/// The trailing sleep ratio is an exponential moving average of idle time over
/// the target interval. When it stays low the throttling ratio jumps halfway
/// to 1; when it stays high the ratio is walked back down in small steps. At
/// most one change happens per window of `TRAILING_AVERAGE_FRAMES` ticks.
#[derive(Debug, Clone)]
pub struct ThrottleController {
    trailing_sleep_ratio: f32,
    performance_throttling_ratio: f32,
    frames_since_last_change: u32,
}

impl Default for ThrottleController {
    fn default() -> Self {
        Self::new()
    }
}

impl ThrottleController {
    pub fn new() -> Self {
        Self::with_ratios(1.0, 0.0)
    }

    pub fn with_ratios(trailing_sleep_ratio: f32, performance_throttling_ratio: f32) -> Self {
        Self {
            trailing_sleep_ratio,
            performance_throttling_ratio: performance_throttling_ratio.clamp(0.0, 1.0),
            frames_since_last_change: TRAILING_AVERAGE_FRAMES,
        }
    }

    pub fn trailing_sleep_ratio(&self) -> f32 {
        self.trailing_sleep_ratio
    }

    pub fn performance_throttling_ratio(&self) -> f32 {
        self.performance_throttling_ratio
    }

    pub fn on_tick_complete(&mut self, idle: Duration, target_interval: Duration) -> f32 {
        let sample = if target_interval.is_zero() {
            0.0
        } else {
            (idle.as_secs_f32() / target_interval.as_secs_f32()).clamp(0.0, 1.0)
        };
        self.record_sleep_sample(sample)
    }

    /// Folds one idle sample into the trailing ratio and returns the ratio to
    /// use for this tick. The window counter is bumped before it is compared,
    /// so consecutive changes land exactly `TRAILING_AVERAGE_FRAMES` ticks apart.
    pub fn record_sleep_sample(&mut self, sample: f32) -> f32 {
        self.trailing_sleep_ratio =
            PREVIOUS_FRAMES_RATIO * self.trailing_sleep_ratio + CURRENT_FRAME_RATIO * sample;

        self.frames_since_last_change = self.frames_since_last_change.saturating_add(1);
        if self.frames_since_last_change < TRAILING_AVERAGE_FRAMES {
            return self.performance_throttling_ratio;
        }

        let previous = self.performance_throttling_ratio;
        if self.trailing_sleep_ratio <= STRUGGLE_TRIGGER_SLEEP_RATIO {
            self.performance_throttling_ratio = previous + 0.5 * (1.0 - previous);
            log::debug!(
                "Mixer is struggling, sleeping {:.1}% of frame time. Throttling ratio {:.3} -> {:.3}",
                self.trailing_sleep_ratio * 100.0,
                previous,
                self.performance_throttling_ratio
            );
            self.frames_since_last_change = 0;
        } else if self.trailing_sleep_ratio >= BACK_OFF_TRIGGER_SLEEP_RATIO && previous != 0.0 {
            self.performance_throttling_ratio = (previous - RATIO_BACK_OFF).max(0.0);
            log::debug!(
                "Mixer is recovering, sleeping {:.1}% of frame time. Throttling ratio {:.3} -> {:.3}",
                self.trailing_sleep_ratio * 100.0,
                previous,
                self.performance_throttling_ratio
            );
            self.frames_since_last_change = 0;
        }

        self.performance_throttling_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(
        controller: &mut ThrottleController,
        sample: f32,
        ticks: usize,
    ) -> Vec<(usize, f32)> {
        let mut out = Vec::new();
        let mut last = controller.performance_throttling_ratio();
        for tick in 0..ticks {
            let ratio = controller.record_sleep_sample(sample);
            if ratio != last {
                out.push((tick, ratio));
                last = ratio;
            }
        }
        out
    }

    #[test]
    fn trailing_ratio_matches_closed_form() {
        let mut controller = ThrottleController::new();
        let constant = 0.4f32;

        for _ in 0..500 {
            controller.record_sleep_sample(constant);
        }

        let expected = constant as f64 + (1.0 - constant as f64) * 0.99f64.powi(500);
        assert!((controller.trailing_sleep_ratio() as f64 - expected).abs() < 1e-4);
    }

    #[test]
    fn trailing_ratio_tracks_synthetic_sequence() {
        let mut controller = ThrottleController::new();
        let mut reference = 1.0f64;

        for i in 0..1_000 {
            let sample = ((i * 37) % 100) as f32 / 100.0;
            controller.record_sleep_sample(sample);
            reference = 0.99 * reference + 0.01 * sample as f64;
        }

        assert!((controller.trailing_sleep_ratio() as f64 - reference).abs() < 1e-4);
    }

    #[test]
    fn trailing_ratio_converges_to_constant_input() {
        let mut controller = ThrottleController::new();
        for _ in 0..3_000 {
            controller.record_sleep_sample(0.5);
        }
        assert!((controller.trailing_sleep_ratio() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn idle_time_is_normalised_by_interval() {
        let mut controller = ThrottleController::with_ratios(0.0, 0.0);
        controller.on_tick_complete(Duration::from_millis(8), Duration::from_millis(16));
        assert!((controller.trailing_sleep_ratio() - 0.005).abs() < 1e-6);

        let mut late = ThrottleController::with_ratios(0.0, 0.0);
        late.on_tick_complete(Duration::from_secs(5), Duration::from_millis(16));
        assert!((late.trailing_sleep_ratio() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn struggling_raises_ratio_once_per_window() {
        let mut controller = ThrottleController::new();
        let steps = changes(&mut controller, 0.0, 600);

        assert_eq!(steps.len(), 4);
        assert!((229..=231).contains(&steps[0].0));
        for pair in steps.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, 100);
        }

        let mut expected = 0.0f32;
        for (_, ratio) in &steps {
            expected += 0.5 * (1.0 - expected);
            assert!((ratio - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn recovery_steps_down_to_zero_and_stops() {
        let mut controller = ThrottleController::with_ratios(1.0, 0.1);
        let steps = changes(&mut controller, 1.0, 1_000);

        assert_eq!(steps[0].0, 0);
        for pair in steps.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, 100);
            assert!(pair[0].1 - pair[1].1 <= RATIO_BACK_OFF + 1e-6);
        }
        assert!((steps[0].1 - 0.08).abs() < 1e-6);
        assert_eq!(steps.last().unwrap().1, 0.0);
        assert!(steps.len() <= 6);
        assert_eq!(controller.performance_throttling_ratio(), 0.0);
    }

    #[test]
    fn middle_band_holds_ratio() {
        let mut controller = ThrottleController::with_ratios(0.15, 0.3);
        let steps = changes(&mut controller, 0.15, 1_000);

        assert!(steps.is_empty());
        assert_eq!(controller.performance_throttling_ratio(), 0.3);
    }

    #[test]
    fn ratio_stays_in_unit_interval() {
        let mut controller = ThrottleController::new();
        for i in 0..5_000 {
            let sample = if (i / 700) % 2 == 0 { 0.0 } else { 1.0 };
            let ratio = controller.record_sleep_sample(sample);
            assert!((0.0..=1.0).contains(&ratio));
        }
        assert!(ThrottleController::with_ratios(1.0, 3.0).performance_throttling_ratio() <= 1.0);
    }
}
