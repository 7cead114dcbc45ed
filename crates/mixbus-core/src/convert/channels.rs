//! Stage 2: channel-count conversion (`spec.md §4.2`).
//!
//! Each hand-tuned mixdown below operates on one interleaved frame at a
//! time (`in_frame: &[f32]` length `in_channels`, `out_frame: &mut [f32]`
//! length `out_channels`), add-and-clip into the output.

use crate::format::{ChannelLayout, ChannelPosition as Pos};

fn clip(v: f32) -> f32 {
    v.clamp(-1.0, 1.0)
}

/// mono -> stereo: duplicate.
pub fn mono_to_stereo(input: &[f32], output: &mut [f32]) {
    output[0] = input[0];
    output[1] = input[0];
}

/// stereo -> mono: straight add-and-clip, no averaging (`spec.md §8`
/// invariant 6: a full-scale in-phase sine must actually reach the clip
/// boundary, not just approach half scale).
pub fn stereo_to_mono(input: &[f32], output: &mut [f32]) {
    output[0] = clip(input[0] + input[1]);
}

/// mono -> {quad, 5.1, 7.1}: center channel if the output layout has one,
/// else split across front-left/right at half amplitude each.
pub fn mono_to_multi(input: &[f32], output: &mut [f32], out_layout: &ChannelLayout) {
    output.fill(0.0);
    if let Some(fc) = out_layout.index_of(Pos::FrontCenter) {
        output[fc] = input[0];
    } else {
        if let Some(fl) = out_layout.index_of(Pos::FrontLeft) {
            output[fl] = input[0] * 0.5;
        }
        if let Some(fr) = out_layout.index_of(Pos::FrontRight) {
            output[fr] = input[0] * 0.5;
        }
    }
}

/// stereo -> {quad, 5.1, 7.1}: L -> FL, R -> FR, everything else zero.
pub fn stereo_to_multi(input: &[f32], output: &mut [f32], out_layout: &ChannelLayout) {
    output.fill(0.0);
    if let Some(fl) = out_layout.index_of(Pos::FrontLeft) {
        output[fl] = input[0];
    }
    if let Some(fr) = out_layout.index_of(Pos::FrontRight) {
        output[fr] = input[1];
    }
}

/// quad -> stereo: `L = FL + RL/4`, `R = FR + RR/4` (clipped).
pub fn quad_to_stereo(input: &[f32], output: &mut [f32], in_layout: &ChannelLayout) {
    let fl = in_layout.index_of(Pos::FrontLeft).map_or(0.0, |i| input[i]);
    let fr = in_layout.index_of(Pos::FrontRight).map_or(0.0, |i| input[i]);
    let rl = in_layout.index_of(Pos::RearLeft).map_or(0.0, |i| input[i]);
    let rr = in_layout.index_of(Pos::RearRight).map_or(0.0, |i| input[i]);
    output[0] = clip(fl + rl / 4.0);
    output[1] = clip(fr + rr / 4.0);
}

/// quad -> {5.1, 7.1}: FL,FR,RL,RR mapped through; everything else zero.
pub fn quad_to_multi(input: &[f32], output: &mut [f32], in_layout: &ChannelLayout, out_layout: &ChannelLayout) {
    output.fill(0.0);
    for pos in [Pos::FrontLeft, Pos::FrontRight, Pos::RearLeft, Pos::RearRight] {
        if let (Some(i), Some(o)) = (in_layout.index_of(pos), out_layout.index_of(pos)) {
            output[o] = input[i];
        }
    }
}

/// Coefficients chosen so that maximum input magnitude 1.0 produces
/// output magnitude 1.0 (`spec.md §4.2`). `1 / (|1| + |0.707|)`: the
/// worst case is front plus half-scaled center both at full scale.
const DOWNMIX_MAIN: f32 = 0.585;
const DOWNMIX_CENTER: f32 = 0.707 * 0.585;

/// 5.1 -> stereo: `L = 0.585*FL + 0.707*0.585*FC`, same for R.
pub fn surround_5_1_to_stereo(input: &[f32], output: &mut [f32], in_layout: &ChannelLayout) {
    let at = |p: Pos| in_layout.index_of(p).map_or(0.0, |i| input[i]);
    let (fl, fr, fc) = (at(Pos::FrontLeft), at(Pos::FrontRight), at(Pos::FrontCenter));
    output[0] = clip(DOWNMIX_MAIN * fl + DOWNMIX_CENTER * fc);
    output[1] = clip(DOWNMIX_MAIN * fr + DOWNMIX_CENTER * fc);
}

/// Quad mixdown normalizer: `1 / (|1| + |0.707| + |0.5|)`, the worst
/// case of front, half-scaled center, and half-scaled LFE all at full
/// scale — distinct from [`DOWNMIX_MAIN`] because quad also folds in
/// the LFE channel that stereo drops.
const QUAD_MAIN: f32 = 0.453;
const QUAD_CENTER: f32 = 0.707 * 0.453;
const QUAD_LFE: f32 = 0.5 * 0.453;

/// 5.1 -> quad: front channels get `normalized_factor*front +
/// 0.707*normalized_factor*center + 0.5*normalized_factor*lfe`; the
/// side/rear channels get `normalized_factor*side +
/// 0.5*normalized_factor*lfe` (no center contribution).
pub fn surround_5_1_to_quad(input: &[f32], output: &mut [f32], in_layout: &ChannelLayout) {
    let at = |p: Pos| in_layout.index_of(p).map_or(0.0, |i| input[i]);
    let (fl, fr, fc, lfe, sl, sr) = (
        at(Pos::FrontLeft),
        at(Pos::FrontRight),
        at(Pos::FrontCenter),
        at(Pos::Lfe),
        at(Pos::SideLeft),
        at(Pos::SideRight),
    );
    let half_center = QUAD_CENTER * fc;
    let half_lfe = QUAD_LFE * lfe;
    output[0] = clip(QUAD_MAIN * fl + half_center + half_lfe);
    output[1] = clip(QUAD_MAIN * fr + half_center + half_lfe);
    output[2] = clip(QUAD_MAIN * sl + half_lfe);
    output[3] = clip(QUAD_MAIN * sr + half_lfe);
}

/// 5.1 -> 7.1: channel-layout-aware. If both layouts map front and side
/// positions, copy channel-by-channel (preferring the side-speaker
/// mapping over rear); otherwise default pass-through (shared-position
/// copy, rest zeroed).
pub fn surround_5_1_to_7_1(input: &[f32], output: &mut [f32], in_layout: &ChannelLayout, out_layout: &ChannelLayout) {
    output.fill(0.0);
    let positions = [
        Pos::FrontLeft,
        Pos::FrontRight,
        Pos::FrontCenter,
        Pos::Lfe,
        Pos::SideLeft,
        Pos::SideRight,
        Pos::RearLeft,
        Pos::RearRight,
    ];
    for pos in positions {
        if let (Some(i), Some(o)) = (in_layout.index_of(pos), out_layout.index_of(pos)) {
            output[o] = input[i];
        }
    }
}

/// Mean of all input channels, broadcast to every output channel. Used
/// when no specific mixdown rule applies (`spec.md §4.2`).
pub fn default_all_to_all(input: &[f32], output: &mut [f32]) {
    let mean = input.iter().sum::<f32>() / input.len() as f32;
    for o in output.iter_mut() {
        *o = clip(mean);
    }
}

/// When both channel counts exceed 8: copy `min(in, out)` channels
/// through positionally, zero the rest (`spec.md §4.2`).
pub fn some_to_some(input: &[f32], output: &mut [f32]) {
    output.fill(0.0);
    let n = input.len().min(output.len());
    output[..n].copy_from_slice(&input[..n]);
}
