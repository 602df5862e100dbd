//! Throttled progress, speed and ETA sampling.

use std::time::{Duration, Instant};

/// Minimum spacing between two emitted samples
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// One emitted progress sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Phase-local progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Bytes per second since the previous sample
    pub speed_bps: u64,
    /// Seconds remaining at the current speed (0 when speed is 0)
    pub eta_secs: u64,
}

/// Converts a stream of byte counters into throttled progress samples
///
/// The first observation is always emitted (with zero speed); later ones only
/// once at least [`MIN_SAMPLE_INTERVAL`] has passed since the last emission.
#[derive(Debug)]
pub struct ProgressSampler {
    min_interval: Duration,
    last: Option<(Instant, u64)>,
}

impl Default for ProgressSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSampler {
    /// Sampler with the default one-second spacing
    pub fn new() -> Self {
        Self::with_interval(MIN_SAMPLE_INTERVAL)
    }

    /// Sampler with a custom spacing (clamped to at least one second)
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval: min_interval.max(MIN_SAMPLE_INTERVAL),
            last: None,
        }
    }

    /// Observe `bytes_done` of `bytes_total` now
    pub fn sample(&mut self, bytes_done: u64, bytes_total: u64) -> Option<ProgressSample> {
        self.sample_at(Instant::now(), bytes_done, bytes_total)
    }

    /// Observe `bytes_done` of `bytes_total` at `now`
    pub fn sample_at(
        &mut self,
        now: Instant,
        bytes_done: u64,
        bytes_total: u64,
    ) -> Option<ProgressSample> {
        if let Some((at, _)) = self.last
            && now.saturating_duration_since(at) < self.min_interval
        {
            return None;
        }
        Some(self.emit(now, bytes_done, bytes_total))
    }

    /// Emit the final observation regardless of spacing
    pub fn finish(&mut self, bytes_done: u64, bytes_total: u64) -> ProgressSample {
        self.finish_at(Instant::now(), bytes_done, bytes_total)
    }

    /// Emit the observation at `now` regardless of spacing
    pub fn finish_at(&mut self, now: Instant, bytes_done: u64, bytes_total: u64) -> ProgressSample {
        self.emit(now, bytes_done, bytes_total)
    }

    fn emit(&mut self, now: Instant, bytes_done: u64, bytes_total: u64) -> ProgressSample {
        let speed_bps = match self.last {
            None => 0,
            Some((at, bytes)) => {
                let elapsed = now.saturating_duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    (bytes_done.saturating_sub(bytes) as f64 / elapsed) as u64
                } else {
                    0
                }
            }
        };
        self.last = Some((now, bytes_done));

        let progress = if bytes_total > 0 {
            ((bytes_done as f64 / bytes_total as f64) * 100.0).min(100.0) as f32
        } else {
            0.0
        };

        let eta_secs = if speed_bps > 0 {
            bytes_total.saturating_sub(bytes_done) / speed_bps
        } else {
            0
        };

        ProgressSample {
            progress,
            speed_bps,
            eta_secs,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_emitted_with_zero_speed() {
        let mut sampler = ProgressSampler::new();
        let sample = sampler.sample_at(Instant::now(), 250, 1000).unwrap();
        assert_eq!(sample.progress, 25.0);
        assert_eq!(sample.speed_bps, 0);
        assert_eq!(sample.eta_secs, 0);
    }

    #[test]
    fn samples_closer_than_interval_are_dropped() {
        let mut sampler = ProgressSampler::new();
        let start = Instant::now();
        sampler.sample_at(start, 0, 1000).unwrap();
        assert!(
            sampler
                .sample_at(start + Duration::from_millis(400), 100, 1000)
                .is_none()
        );
    }

    #[test]
    fn speed_and_eta_from_delta() {
        let mut sampler = ProgressSampler::new();
        let start = Instant::now();
        sampler.sample_at(start, 0, 10_000).unwrap();

        let sample = sampler
            .sample_at(start + Duration::from_secs(2), 2_000, 10_000)
            .unwrap();
        assert_eq!(sample.speed_bps, 1_000);
        assert_eq!(sample.eta_secs, 8);
        assert_eq!(sample.progress, 20.0);
    }

    #[test]
    fn interval_cannot_go_below_one_second() {
        let sampler = ProgressSampler::with_interval(Duration::from_millis(10));
        assert_eq!(sampler.min_interval, MIN_SAMPLE_INTERVAL);
    }

    #[test]
    fn finish_emits_inside_interval() {
        let mut sampler = ProgressSampler::new();
        let start = Instant::now();
        sampler.sample_at(start, 0, 4_000).unwrap();
        assert!(
            sampler
                .sample_at(start + Duration::from_millis(200), 1_000, 4_000)
                .is_none()
        );

        // Speed covers the bytes since the last emitted sample
        let sample = sampler.finish_at(start + Duration::from_millis(500), 4_000, 4_000);
        assert_eq!(sample.progress, 100.0);
        assert_eq!(sample.speed_bps, 8_000);
        assert_eq!(sample.eta_secs, 0);
    }

    #[test]
    fn unknown_total_reports_zero_progress() {
        let mut sampler = ProgressSampler::new();
        assert_eq!(sampler.sample(10, 0).unwrap().progress, 0.0);
    }
}
