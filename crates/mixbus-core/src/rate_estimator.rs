//! Tracks a device's effective sample rate against noisy buffer-level
//! observations (`spec.md §4.1`).

use std::time::{Duration, Instant};

/// Default exponential-smoothing factor for blending a freshly regressed
/// rate sample into the running estimate.
pub const DEFAULT_SMOOTH_FACTOR: f64 = 0.3;

/// Default regression window length.
pub const DEFAULT_WINDOW_SIZE: Duration = Duration::from_secs(5);

/// Incremental (streaming) least-squares accumulator over `(t, y)` pairs.
///
/// Avoids buffering samples: `spec.md §4.1` requires `check()` to be
/// cheap and callable every audio cycle, and `sonido-core`'s DSP
/// primitives document the same no-allocation-in-steady-state discipline.
#[derive(Debug, Clone, Copy, Default)]
struct LeastSquaresAccumulator {
    n: u32,
    sum_t: f64,
    sum_t2: f64,
    sum_y: f64,
    sum_ty: f64,
}

impl LeastSquaresAccumulator {
    fn add_point(&mut self, t: f64, y: f64) {
        self.n += 1;
        self.sum_t += t;
        self.sum_t2 += t * t;
        self.sum_y += y;
        self.sum_ty += t * y;
    }

    /// Least-squares slope of `y` against `t`, or `None` if the
    /// accumulated points carry no time spread (would divide by zero).
    fn slope(&self) -> Option<f64> {
        if self.n == 0 {
            return None;
        }
        let n = f64::from(self.n);
        let denom = n * self.sum_t2 - self.sum_t * self.sum_t;
        if denom.abs() < f64::EPSILON {
            return None;
        }
        Some((n * self.sum_ty - self.sum_t * self.sum_y) / denom)
    }
}

/// Per-device filter estimating the hardware's actual sample rate from
/// `(buffer_level, monotonic_time)` observations.
#[derive(Debug, Clone)]
pub struct RateEstimator {
    window_start: Instant,
    window_size: Duration,
    window_frames: i64,
    smooth_factor: f64,
    estimated_rate: f64,
    lsq: LeastSquaresAccumulator,
    level_diff: i64,
    last_level: u32,
    /// True until the first `check()` call establishes a baseline level;
    /// avoids treating a reset's stale `last_level` as a real jump.
    needs_baseline: bool,
}

impl RateEstimator {
    /// Creates an estimator seeded at `rate_hz`, using the default
    /// smoothing factor and window size.
    #[must_use]
    pub fn new(rate_hz: u32, now: Instant) -> Self {
        Self::with_params(rate_hz, DEFAULT_WINDOW_SIZE, DEFAULT_SMOOTH_FACTOR, now)
    }

    /// Creates an estimator with explicit window size and smoothing
    /// factor (`smooth_factor` is clamped to `[0, 1]`).
    #[must_use]
    pub fn with_params(rate_hz: u32, window_size: Duration, smooth_factor: f64, now: Instant) -> Self {
        Self {
            window_start: now,
            window_size,
            window_frames: 0,
            smooth_factor: smooth_factor.clamp(0.0, 1.0),
            estimated_rate: f64::from(rate_hz),
            lsq: LeastSquaresAccumulator::default(),
            level_diff: 0,
            last_level: 0,
            needs_baseline: true,
        }
    }

    /// Records frames the caller wrote to or read from the device since
    /// the last `check()` (positive), or frames dropped (negative).
    pub fn add_frames(&mut self, frames: i32) {
        self.level_diff += i64::from(frames);
    }

    /// Advances the estimator with a fresh buffer-level observation.
    ///
    /// Returns `true` if this call completed a window and updated
    /// [`RateEstimator::estimated_rate`], `false` if it only accumulated
    /// a point into the current window.
    pub fn check(&mut self, hw_level: u32, now: Instant) -> bool {
        if self.needs_baseline {
            self.window_start = now;
            self.window_frames = 0;
            self.level_diff = 0;
            self.lsq = LeastSquaresAccumulator::default();
            self.last_level = hw_level;
            self.needs_baseline = false;
            return false;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window_size {
            let delta = self.level_diff + i64::from(hw_level) - i64::from(self.last_level);
            self.window_frames += delta;
            self.lsq.add_point(elapsed.as_secs_f64(), self.window_frames as f64);
            self.last_level = hw_level;
            self.level_diff = 0;
            return false;
        }

        // Window complete: derive a rate sample via regression slope and
        // smooth it into the running estimate. A window with no time
        // spread or no accumulated points contributes nothing
        // (`spec.md §4.1`: "never divides by zero... skip the sample").
        if let Some(slope) = self.lsq.slope() {
            self.estimated_rate = self.smooth_factor * slope + (1.0 - self.smooth_factor) * self.estimated_rate;
        }

        self.window_start = now;
        self.window_frames = 0;
        self.level_diff = 0;
        self.lsq = LeastSquaresAccumulator::default();
        self.last_level = hw_level;
        true
    }

    /// Reinitializes the estimate to `rate_hz` and discards the
    /// in-flight regression window. Called on device open, on an output
    /// underrun that resets timing, and when frames are dropped
    /// (`spec.md §4.1`).
    pub fn reset_rate(&mut self, rate_hz: u32) {
        self.estimated_rate = f64::from(rate_hz);
        self.lsq = LeastSquaresAccumulator::default();
        self.window_frames = 0;
        self.level_diff = 0;
        self.needs_baseline = true;
    }

    /// The current smoothed rate estimate, in Hz.
    #[must_use]
    pub const fn estimated_rate(&self) -> f64 {
        self.estimated_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `spec.md §8` invariant 8: feeding exactly `R * t` frames over time
    /// `t` with no jitter, for `t > 5 * window_size`, yields
    /// `|estimated_rate - R| / R < 0.01`.
    #[test]
    fn converges_to_true_rate_with_no_jitter() {
        let rate_hz = 48_000u32;
        let start = Instant::now();
        let mut est = RateEstimator::new(rate_hz, start);

        let cycle = Duration::from_millis(10);
        let frames_per_cycle = (f64::from(rate_hz) * cycle.as_secs_f64()) as u32;
        let mut level = 0u32;
        let mut now = start;

        // 5 * window_size (5s) of simulated time, in 10ms steps.
        let total_cycles = (5 * DEFAULT_WINDOW_SIZE.as_millis() / cycle.as_millis()) as u32;
        for _ in 0..total_cycles {
            now += cycle;
            est.add_frames(frames_per_cycle as i32);
            level += frames_per_cycle;
            est.check(level, now);
            // Hardware drains the buffer at the same constant rate.
            level = level.saturating_sub(frames_per_cycle);
        }

        let rel_err = (est.estimated_rate() - f64::from(rate_hz)).abs() / f64::from(rate_hz);
        assert!(rel_err < 0.01, "relative error {rel_err} too high, estimate={}", est.estimated_rate());
    }

    #[test]
    fn converges_toward_true_rate_from_a_mismatched_seed() {
        let true_rate_hz = 48_000u32;
        let start = Instant::now();
        // Seeded with the wrong nominal rate; true hardware rate is 48000.
        let mut est = RateEstimator::new(44_100, start);

        let cycle = Duration::from_millis(10);
        let frames_per_cycle = (f64::from(true_rate_hz) * cycle.as_secs_f64()) as u32;
        let mut level = 0u32;
        let mut now = start;

        let total_cycles = (10 * DEFAULT_WINDOW_SIZE.as_millis() / cycle.as_millis()) as u32;
        for _ in 0..total_cycles {
            now += cycle;
            est.add_frames(frames_per_cycle as i32);
            level += frames_per_cycle;
            est.check(level, now);
            level = level.saturating_sub(frames_per_cycle);
        }

        let rel_err = (est.estimated_rate() - f64::from(true_rate_hz)).abs() / f64::from(true_rate_hz);
        assert!(rel_err < 0.01, "relative error {rel_err} too high, estimate={}", est.estimated_rate());
    }

    #[test]
    fn reset_rate_overrides_estimate_immediately() {
        let start = Instant::now();
        let mut est = RateEstimator::new(44_100, start);
        est.reset_rate(48_000);
        assert_eq!(est.estimated_rate(), 48_000.0);
    }

    #[test]
    fn zero_duration_window_never_divides_by_zero() {
        let start = Instant::now();
        let mut est = RateEstimator::new(48_000, start);
        // Baseline call.
        est.check(0, start);
        // Same instant again: no time spread.
        est.check(0, start);
        assert!(est.estimated_rate().is_finite());
    }
}
