//! Windowed time-mean with smooth bucket-boundary blending, generalized
//! from the teacher's `utils-rs/stats` crate for the 1 m / 10 m / 1 h
//! hashrate averages (spec §4.8).
//!
//! A sample inserted mid-window accumulates into `sum`; when the window
//! rolls over, `sum` becomes `prev_window` and a fresh window starts.
//! `measure` linearly blends `prev_window` and the in-progress `sum`
//! proportionally to how much of the current window has elapsed, so the
//! published value never steps discontinuously at a bucket boundary.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct WindowedTimeMeanState {
    interval: f64,
    started: Option<Instant>,
    prev_window: f64,
    sum: f64,
}

impl WindowedTimeMeanState {
    fn new(interval: f64) -> Self {
        Self {
            interval,
            started: None,
            prev_window: 0.0,
            sum: 0.0,
        }
    }

    fn insert(&mut self, sample: f64, now: Instant) {
        match self.started {
            None => {
                self.started = Some(now);
                self.sum = sample;
            }
            Some(started) => {
                let elapsed = now.duration_since(started).as_secs_f64();
                if elapsed >= self.interval {
                    // Roll over: the window that just ended becomes the new
                    // predecessor, and `sample` seeds the next window.
                    self.prev_window = self.sum;
                    self.sum = sample;
                    self.started = Some(now);
                } else {
                    self.sum += sample;
                }
            }
        }
    }

    fn measure(&self, now: Instant) -> f64 {
        let started = match self.started {
            Some(s) => s,
            None => return 0.0,
        };
        let elapsed = now.duration_since(started).as_secs_f64();
        let a = (elapsed / self.interval).min(1.0);
        let blended = if a < 1.0 {
            self.prev_window * (1.0 - a) + self.sum * a
        } else {
            self.sum
        };
        blended / self.interval
    }
}

/// Public windowed time-mean, parameterized by bucket interval. One of
/// these backs each of `hashrate_1m` / `hashrate_10m` / `hashrate_1h`.
#[derive(Debug, Clone)]
pub struct WindowedTimeMean {
    state: WindowedTimeMeanState,
}

impl WindowedTimeMean {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: WindowedTimeMeanState::new(interval.as_secs_f64()),
        }
    }

    pub fn insert(&mut self, sample: f64, now: Instant) {
        self.state.insert(sample, now);
    }

    pub fn measure(&self, now: Instant) -> f64 {
        self.state.measure(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mean_is_zero() {
        let mean = WindowedTimeMean::new(Duration::from_secs(3));
        assert_eq!(mean.measure(Instant::now()), 0.0);
    }

    #[test]
    fn single_sample_blends_from_zero_predecessor() {
        let mut mean = WindowedTimeMean::new(Duration::from_secs(3));
        let t0 = Instant::now();
        mean.insert(9.0, t0);
        // Halfway through the window: blend of prev_window=0 and sum=9 at a=0.5,
        // divided by the 3s interval.
        let half = t0 + Duration::from_millis(1500);
        let measured = mean.measure(half);
        let expected = (0.0 * 0.5 + 9.0 * 0.5) / 3.0;
        assert!((measured - expected).abs() < 1e-9);
    }

    #[test]
    fn rollover_does_not_double_count_at_exact_boundary() {
        let mut mean = WindowedTimeMean::new(Duration::from_secs(3));
        let t0 = Instant::now();
        mean.insert(9.0, t0);
        let boundary = t0 + Duration::from_secs(3);
        // A sample landing exactly on the boundary starts a fresh window
        // rather than being folded into the just-finished one.
        mean.insert(6.0, boundary);
        let measured = mean.measure(boundary);
        // a = 0 at the instant of rollover, so measure == prev_window / interval.
        let expected = 9.0 / 3.0;
        assert!((measured - expected).abs() < 1e-9);
    }

    #[test]
    fn measure_saturates_after_full_window_elapses() {
        let mut mean = WindowedTimeMean::new(Duration::from_secs(3));
        let t0 = Instant::now();
        mean.insert(9.0, t0);
        let later = t0 + Duration::from_secs(10);
        assert!((mean.measure(later) - 9.0 / 3.0).abs() < 1e-9);
    }
}
