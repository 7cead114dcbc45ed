//! Linear scalar ramp for mute/unmute/start/stop fades (`spec.md §4.4`).
//!
//! Ported from `cras_ramp.c`'s `{active, ramped_frames, duration_frames,
//! increment, start_scaler, target}` state and its "current scaler
//! becomes the next ramp's start" composition rule.

/// The kind of ramp request, each with its own default `(from, to,
/// duration)` per `spec.md §4.4`'s table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampRequest {
    /// Unmuting: 0 -> 1 over 0.5s.
    UpUnmute,
    /// Starting playback: 0 -> 1 over 10ms.
    UpStartPlayback,
    /// Muting: 1 -> 0 over 0.1s.
    DownMute,
    /// Resuming after a mute hold: 0 -> 0 (silence) over 1s.
    ResumeMute,
    /// Switching outputs while muted: 0 -> 0 over 0.5s.
    SwitchMute,
    /// System volume changed: continuity-preserving ramp to 1 over 0.1s.
    VolumeChange {
        /// Previous system volume scaler.
        old_scaler: f32,
        /// New system volume scaler.
        new_scaler: f32,
    },
}

impl RampRequest {
    /// The `(from, to, duration)` triple for this request kind, given the
    /// device's sample rate (duration is expressed in frames).
    #[must_use]
    pub fn params(self, rate_hz: u32) -> (f32, f32, u32) {
        let frames = |secs: f32| (secs * rate_hz as f32).round() as u32;
        match self {
            RampRequest::UpUnmute => (0.0, 1.0, frames(0.5)),
            RampRequest::UpStartPlayback => (0.0, 1.0, frames(0.010)),
            RampRequest::DownMute => (1.0, 0.0, frames(0.1)),
            RampRequest::ResumeMute => (0.0, 0.0, frames(1.0)),
            RampRequest::SwitchMute => (0.0, 0.0, frames(0.5)),
            RampRequest::VolumeChange { old_scaler, new_scaler } => {
                let from = if new_scaler.abs() > f32::EPSILON {
                    old_scaler / new_scaler
                } else {
                    1.0
                };
                (from, 1.0, frames(0.1))
            }
        }
    }

    /// True if this request mutes (and so should preserve continuity via
    /// the *current* scaler rather than stacking `from` multiplicatively
    /// — `spec.md §4.4`: "If this a mute ramp, we want to match the
    /// previous multiplier... Otherwise... multiply `from` by the
    /// previous scaler so that we can stack volume ramps.").
    #[must_use]
    pub const fn is_mute_ramp(self) -> bool {
        !matches!(self, RampRequest::VolumeChange { .. })
    }
}

/// Linear multiplier generator: `f(t) = start + t * increment`, clipped
/// at `target` once `duration_frames` have elapsed.
#[derive(Debug, Clone, Copy)]
pub struct Ramp {
    active: bool,
    ramped_frames: u32,
    duration_frames: u32,
    increment: f32,
    start_scaler: f32,
    target: f32,
}

impl Ramp {
    /// A ramp at rest, always returning a `1.0` multiplier.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            active: false,
            ramped_frames: 0,
            duration_frames: 0,
            increment: 0.0,
            start_scaler: 1.0,
            target: 1.0,
        }
    }

    /// Current scalar multiplier, without advancing time.
    #[must_use]
    pub fn current_scaler(&self) -> f32 {
        if !self.active {
            return 1.0;
        }
        self.start_scaler + self.ramped_frames as f32 * self.increment
    }

    /// True if a ramp is in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Starts (or composes onto an in-progress) a ramp.
    ///
    /// If `from == to != 0`, this is a no-op (spec: "if from == to == 0
    /// means we want to mute for duration_frames" — implying a nonzero
    /// equal from/to carries no ramp work to do).
    pub fn start(&mut self, request: RampRequest, rate_hz: u32) {
        let (from, to, duration_frames) = request.params(rate_hz);
        if (from - to).abs() < f32::EPSILON && from != 0.0 {
            return;
        }

        let current = self.current_scaler();
        self.start_scaler = if !self.active {
            from
        } else if request.is_mute_ramp() {
            current
        } else {
            current * from
        };

        let duration_frames = duration_frames.max(1);
        self.increment = (to - self.start_scaler) / duration_frames as f32;
        self.target = to;
        self.ramped_frames = 0;
        self.duration_frames = duration_frames;
        self.active = true;
    }

    /// Advances the ramp by `num_frames` of audio produced. Returns
    /// `true` the instant the ramp completes (so the caller can run its
    /// on-done hook: unmute/mute the device, etc.).
    pub fn advance(&mut self, num_frames: u32) -> bool {
        if !self.active {
            return false;
        }
        self.ramped_frames = self.ramped_frames.saturating_add(num_frames);
        if self.ramped_frames >= self.duration_frames {
            self.active = false;
            return true;
        }
        false
    }

    /// Resets to an inactive, unity-scalar ramp.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Ramp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `spec.md §8` invariant 7: after `duration_frames` samples through
    /// an UP ramp starting at 0, the multiplier is exactly `target`; for
    /// a DOWN ramp, exactly 0.
    #[test]
    fn up_ramp_reaches_exactly_target() {
        let mut ramp = Ramp::new();
        ramp.start(RampRequest::UpUnmute, 48_000);
        let duration = ramp.duration_frames;
        let done = ramp.advance(duration);
        assert!(done);
        assert_eq!(ramp.current_scaler(), 1.0);
    }

    #[test]
    fn down_ramp_reaches_exactly_zero() {
        let mut ramp = Ramp::new();
        ramp.start(RampRequest::DownMute, 48_000);
        let duration = ramp.duration_frames;
        ramp.advance(duration);
        assert_eq!(ramp.current_scaler(), 0.0);
    }

    /// `spec.md §8` scenario S5: ramp composition with no discontinuity
    /// greater than `1 / duration_frames` at the transition.
    #[test]
    fn mute_ramp_composes_without_discontinuity() {
        let rate_hz = 48_000u32;
        let mut ramp = Ramp::new();
        ramp.start(RampRequest::UpUnmute, rate_hz); // 0 -> 1 over 24000 frames
        ramp.advance(12_000);
        let before = ramp.current_scaler();
        assert!((before - 0.5).abs() < 0.01, "expected ~0.5 at halfway, got {before}");

        ramp.start(RampRequest::DownMute, rate_hz);
        let after = ramp.current_scaler();
        let jump = (after - before).abs();
        assert!(
            jump <= 1.0 / ramp.duration_frames as f32 + 1e-6,
            "discontinuity {jump} exceeds one increment"
        );

        // Decays to 0 over the new ramp's duration (0.1s = 4800 frames).
        assert_eq!(ramp.duration_frames, rate_hz / 10);
        ramp.advance(ramp.duration_frames);
        assert_eq!(ramp.current_scaler(), 0.0);
    }

    #[test]
    fn volume_change_ramp_starts_from_ratio_of_scalers() {
        let mut ramp = Ramp::new();
        ramp.start(
            RampRequest::VolumeChange {
                old_scaler: 0.5,
                new_scaler: 1.0,
            },
            48_000,
        );
        assert_eq!(ramp.start_scaler, 0.5);
        assert_eq!(ramp.target, 1.0);
    }

    #[test]
    fn inactive_ramp_reports_unity_scalar() {
        let ramp = Ramp::new();
        assert_eq!(ramp.current_scaler(), 1.0);
        assert!(!ramp.is_active());
    }
}
