//! Stage 3: channel-layout matrix (`spec.md §4.2`).
//!
//! Applied only when input and output share a channel count but declare
//! different semantic layouts — e.g. a client's stereo stream attaching
//! to a device whose physical channel 0/1 carry side speakers rather
//! than front left/right.

use crate::format::{ChannelLayout, NUM_CHANNEL_POSITIONS};

/// An `out_ch x in_ch` matrix of mix coefficients, applied with
/// add-and-clip on write.
#[derive(Debug, Clone)]
pub struct LayoutMatrix {
    coeffs: Vec<f32>,
    in_ch: usize,
    out_ch: usize,
}

impl LayoutMatrix {
    /// Builds the matrix that remaps `in_layout` onto `out_layout`: for
    /// every semantic position present in both layouts, the
    /// corresponding input channel is routed 1:1 to the output channel.
    /// Positions present only on one side contribute nothing.
    #[must_use]
    pub fn new(in_layout: &ChannelLayout, out_layout: &ChannelLayout, in_ch: usize, out_ch: usize) -> Self {
        let mut coeffs = vec![0.0; out_ch * in_ch];
        for pos in 0..NUM_CHANNEL_POSITIONS {
            let in_idx = in_layout.0[pos];
            let out_idx = out_layout.0[pos];
            if in_idx >= 0 && out_idx >= 0 {
                let (in_idx, out_idx) = (in_idx as usize, out_idx as usize);
                if in_idx < in_ch && out_idx < out_ch {
                    coeffs[out_idx * in_ch + in_idx] = 1.0;
                }
            }
        }
        Self { coeffs, in_ch, out_ch }
    }

    /// True if this matrix is the identity (layouts agree, or the
    /// converter can skip this stage entirely).
    #[must_use]
    pub fn is_identity(&self) -> bool {
        (0..self.out_ch).all(|o| {
            (0..self.in_ch).all(|i| {
                let expected = if i == o { 1.0 } else { 0.0 };
                (self.coeffs[o * self.in_ch + i] - expected).abs() < f32::EPSILON
            })
        })
    }

    /// Applies the matrix to one interleaved frame, clipping each output
    /// sample to `[-1.0, 1.0]`.
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        for o in 0..self.out_ch {
            let mut acc = 0.0f32;
            for i in 0..self.in_ch {
                acc += self.coeffs[o * self.in_ch + i] * input[i];
            }
            output[o] = acc.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ChannelLayout;

    #[test]
    fn identical_layouts_are_identity() {
        let m = LayoutMatrix::new(&ChannelLayout::stereo(), &ChannelLayout::stereo(), 2, 2);
        assert!(m.is_identity());
        let mut out = [0.0; 2];
        m.apply(&[0.3, -0.4], &mut out);
        assert_eq!(out, [0.3, -0.4]);
    }

    #[test]
    fn swapped_layout_routes_channels() {
        // Output layout has FL/FR physically swapped relative to input.
        let mut swapped = ChannelLayout::stereo();
        swapped.0.swap(
            crate::format::ChannelPosition::FrontLeft as usize,
            crate::format::ChannelPosition::FrontRight as usize,
        );
        let m = LayoutMatrix::new(&ChannelLayout::stereo(), &swapped, 2, 2);
        assert!(!m.is_identity());
        let mut out = [0.0; 2];
        m.apply(&[0.3, -0.4], &mut out);
        assert_eq!(out, [-0.4, 0.3]);
    }
}
