//! Stage 4: resampling (`spec.md §4.2`).
//!
//! The spec describes an opaque resampler primitive with signature
//! `process_interleaved_int16(state, in, &in_frames, out, &out_frames)`.
//! `spec.md §9` flags the function-pointer-and-state-blob shape for
//! re-architecture into a typed capability trait — mirrored here the
//! same way [`crate::format`]'s channel conversions are plain functions
//! rather than callback tables.

/// A reusable resampling context converting between two fixed rates.
///
/// Implementations own whatever history/phase state they need between
/// calls; `process` must not allocate in steady state (`spec.md §5`).
pub trait Resampler: std::fmt::Debug {
    /// Converts as many input frames as needed to produce up to
    /// `out.len() / channels` output frames, writing interleaved `f32`
    /// samples into `out` and returning `(frames_consumed, frames_produced)`.
    fn process(&mut self, input: &[f32], out: &mut [f32], channels: usize) -> (usize, usize);

    /// Upper bound on output frames for `in_frames` input frames, used
    /// by [`super::FormatConverter::in_frames_to_out`].
    fn in_frames_to_out(&self, in_frames: u64) -> u64;

    /// Upper bound on input frames needed to produce `out_frames` output
    /// frames, used by [`super::FormatConverter::out_frames_to_in`].
    fn out_frames_to_in(&self, out_frames: u64) -> u64;
}

/// Linear-interpolation resampler: the spec's documented default
/// ("lowest usable quality; tunable per-caller").
#[derive(Debug, Clone)]
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    /// Fractional input-frame position of the next output sample,
    /// carried across calls so resampling is continuous at call
    /// boundaries.
    phase: f64,
    /// Last frame of the previous call, used to interpolate across the
    /// boundary before any frames of the new call have arrived.
    tail: Vec<f32>,
    channels: usize,
}

impl LinearResampler {
    /// Creates a resampler from `in_rate` to `out_rate` for interleaved
    /// frames of `channels` channels.
    #[must_use]
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> Self {
        Self {
            in_rate,
            out_rate,
            phase: 0.0,
            tail: vec![0.0; channels],
            channels,
        }
    }

    fn ratio(&self) -> f64 {
        f64::from(self.in_rate) / f64::from(self.out_rate)
    }
}

impl Resampler for LinearResampler {
    fn process(&mut self, input: &[f32], out: &mut [f32], channels: usize) -> (usize, usize) {
        debug_assert_eq!(channels, self.channels);
        if self.in_rate == self.out_rate {
            let frames = (input.len() / channels).min(out.len() / channels);
            out[..frames * channels].copy_from_slice(&input[..frames * channels]);
            return (frames, frames);
        }

        let in_frames = input.len() / channels;
        let out_capacity = out.len() / channels;
        let ratio = self.ratio();
        let mut produced = 0usize;

        let sample_at = |idx: f64| -> Vec<f32> {
            let i0 = idx.floor();
            let frac = (idx - i0) as f32;
            let i0 = i0 as i64;
            (0..channels)
                .map(|c| {
                    let a = if i0 < 0 {
                        self.tail[c]
                    } else if (i0 as usize) < in_frames {
                        input[i0 as usize * channels + c]
                    } else {
                        input[(in_frames - 1) * channels + c]
                    };
                    let i1 = i0 + 1;
                    let b = if i1 < 0 {
                        self.tail[c]
                    } else if (i1 as usize) < in_frames {
                        input[i1 as usize * channels + c]
                    } else {
                        input[(in_frames - 1) * channels + c]
                    };
                    a + (b - a) * frac
                })
                .collect()
        };

        while produced < out_capacity {
            let idx = self.phase;
            if idx.floor() as i64 >= in_frames as i64 - 1 {
                break;
            }
            let frame = sample_at(idx);
            out[produced * channels..(produced + 1) * channels].copy_from_slice(&frame);
            produced += 1;
            self.phase += ratio;
        }

        let consumed_frames = (self.phase.floor() as usize).min(in_frames);
        self.phase -= consumed_frames as f64;

        if in_frames > 0 {
            self.tail.copy_from_slice(&input[(in_frames - 1) * channels..in_frames * channels]);
        }

        (consumed_frames, produced)
    }

    fn in_frames_to_out(&self, in_frames: u64) -> u64 {
        ((in_frames as f64) / self.ratio()).ceil() as u64
    }

    fn out_frames_to_in(&self, out_frames: u64) -> u64 {
        ((out_frames as f64) * self.ratio()).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rates_is_a_memcpy() {
        let mut r = LinearResampler::new(48_000, 48_000, 2);
        let input = vec![0.1, 0.2, 0.3, 0.4];
        let mut out = vec![0.0; 4];
        let (consumed, produced) = r.process(&input, &mut out, 2);
        assert_eq!((consumed, produced), (2, 2));
        assert_eq!(out, input);
    }

    #[test]
    fn upsampling_produces_more_frames_than_consumed() {
        let mut r = LinearResampler::new(24_000, 48_000, 1);
        let input = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let mut out = vec![0.0; 32];
        let (_consumed, produced) = r.process(&input, &mut out, 1);
        assert!(produced > input.len());
    }

    #[test]
    fn round_trip_frame_counts_are_within_one_frame() {
        // spec.md §8 invariant: out_frames_to_in(in_frames_to_out(n)) in {n-1,n,n+1}
        let r = LinearResampler::new(44_100, 48_000, 2);
        for n in [1u64, 100, 4096, 48_000] {
            let out = r.in_frames_to_out(n);
            let back = r.out_frames_to_in(out);
            let diff = (back as i64 - n as i64).abs();
            assert!(diff <= 1, "n={n} out={out} back={back}");
        }
    }
}
