//! Frame-count / duration conversions at a given sample rate.
//!
//! `spec.md §8` invariant 1: "for every rate `R` and duration `T` in
//! nanoseconds with `T < 2^31 / R`, the conversion `frames(T, R) ->
//! timespec(frames, R) -> frames'` satisfies `|frames' - frames| <= 1`."

use std::time::Duration;

/// Converts a duration to a frame count at `rate_hz`, rounding to nearest.
#[must_use]
pub fn duration_to_frames(d: Duration, rate_hz: u32) -> u64 {
    // frames = d_seconds * rate_hz, computed in nanoseconds to avoid
    // losing precision on sub-second durations.
    let nanos = d.as_nanos();
    let rate = u128::from(rate_hz);
    let scaled = nanos * rate + 500_000_000;
    (scaled / 1_000_000_000) as u64
}

/// Converts a frame count at `rate_hz` back to a duration.
#[must_use]
pub fn frames_to_duration(frames: u64, rate_hz: u32) -> Duration {
    assert!(rate_hz > 0, "rate_hz must be nonzero");
    let nanos = (u128::from(frames) * 1_000_000_000) / u128::from(rate_hz);
    Duration::from_nanos(nanos as u64)
}

/// Round-trips a frame count through a duration and back, for the
/// tolerance invariant in `spec.md §8`.
#[must_use]
pub fn frames_to_out(in_frames: u64, rate_hz: u32) -> u64 {
    let d = frames_to_duration(in_frames, rate_hz);
    duration_to_frames(d, rate_hz)
}
