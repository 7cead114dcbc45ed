//! The four-stage format converter (`spec.md §4.2`): sample-format,
//! channel count, channel layout, and resampling, applied in order
//! between a fixed `in_fmt` and `out_fmt`.

pub mod channels;
pub mod layout;
pub mod resample;
pub mod sample_format;

use crate::format::AudioFormat;
use layout::LayoutMatrix;
use resample::{LinearResampler, Resampler};

/// A reusable format-conversion pipeline between two fixed endpoints.
///
/// Mirrors the spec's `create(in_fmt, out_fmt, max_frames) -> handle`
/// contract: built once, driven every cycle. Owns its working buffers so
/// no stage allocates once the pipeline is running.
#[derive(Debug)]
pub struct FormatConverter {
    in_fmt: AudioFormat,
    out_fmt: AudioFormat,
    layout_matrix: Option<LayoutMatrix>,
    resampler: Box<dyn Resampler + Send>,
    /// Scratch buffer reused between stages, sized for the worst case
    /// (`max_frames * max(in_channels, out_channels)` f32 samples).
    tmp_buf: Vec<f32>,
    num_converters: u32,
}

impl FormatConverter {
    /// Builds a converter for `in_fmt -> out_fmt`, pre-sizing internal
    /// scratch space for cycles of at most `max_frames` frames.
    #[must_use]
    pub fn new(in_fmt: AudioFormat, out_fmt: AudioFormat, max_frames: usize) -> Self {
        let max_channels = in_fmt.num_channels.max(out_fmt.num_channels) as usize;
        let mut num_converters = 0u32;

        if in_fmt.sample_format != out_fmt.sample_format {
            num_converters += 1;
        }
        if in_fmt.num_channels != out_fmt.num_channels {
            num_converters += 1;
        }

        let layout_matrix = if in_fmt.num_channels == out_fmt.num_channels
            && in_fmt.channel_layout != out_fmt.channel_layout
        {
            let m = LayoutMatrix::new(
                &in_fmt.channel_layout,
                &out_fmt.channel_layout,
                in_fmt.num_channels as usize,
                out_fmt.num_channels as usize,
            );
            if m.is_identity() {
                None
            } else {
                num_converters += 1;
                Some(m)
            }
        } else {
            None
        };

        if in_fmt.rate_hz != out_fmt.rate_hz {
            num_converters += 1;
        }

        Self {
            in_fmt,
            out_fmt,
            layout_matrix,
            resampler: Box::new(LinearResampler::new(in_fmt.rate_hz, out_fmt.rate_hz, out_fmt.num_channels as usize)),
            tmp_buf: vec![0.0; max_frames * max_channels],
            num_converters,
        }
    }

    /// Number of pipeline stages that do real work for this pair of
    /// formats (`spec.md §4.2`: "identical formats degenerate to a
    /// memcpy; `num_converters = 0`").
    #[must_use]
    pub const fn num_converters(&self) -> u32 {
        self.num_converters
    }

    /// Upper bound on output frames for `in_frames` input frames.
    #[must_use]
    pub fn in_frames_to_out(&self, in_frames: u64) -> u64 {
        self.resampler.in_frames_to_out(in_frames)
    }

    /// Upper bound on input frames needed to produce `out_frames` output
    /// frames.
    #[must_use]
    pub fn out_frames_to_in(&self, out_frames: u64) -> u64 {
        self.resampler.out_frames_to_in(out_frames)
    }

    /// Runs `input` (raw bytes in `in_fmt`) through all four stages,
    /// writing raw bytes in `out_fmt` to `out`. Returns `(frames_consumed,
    /// frames_produced)`.
    pub fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> (usize, usize) {
        let in_ch = self.in_fmt.num_channels as usize;
        let out_ch = self.out_fmt.num_channels as usize;

        // Stage 1: decode to f32.
        let mut decoded = Vec::with_capacity(input.len() / self.in_fmt.sample_format.bytes().max(1));
        sample_format::decode_to_f32(self.in_fmt.sample_format, input, &mut decoded);
        let in_frames = decoded.len() / in_ch.max(1);

        // Stage 2: channel count conversion.
        self.tmp_buf.clear();
        self.tmp_buf.resize(in_frames * out_ch, 0.0);
        if in_ch == out_ch {
            self.tmp_buf.copy_from_slice(&decoded[..in_frames * in_ch]);
        } else {
            for f in 0..in_frames {
                let in_frame = &decoded[f * in_ch..(f + 1) * in_ch];
                let out_frame = &mut self.tmp_buf[f * out_ch..(f + 1) * out_ch];
                mix_channels(in_frame, out_frame, &self.in_fmt, &self.out_fmt);
            }
        }

        // Stage 3: channel-layout matrix (only set up when channel
        // counts match but layouts differ).
        if let Some(matrix) = &self.layout_matrix {
            let mut remapped = vec![0.0; in_frames * out_ch];
            for f in 0..in_frames {
                matrix.apply(
                    &self.tmp_buf[f * out_ch..(f + 1) * out_ch],
                    &mut remapped[f * out_ch..(f + 1) * out_ch],
                );
            }
            self.tmp_buf.copy_from_slice(&remapped);
        }

        // Stage 4: resample.
        let mut resampled = vec![0.0; self.in_frames_to_out(in_frames as u64) as usize * out_ch];
        let (consumed, produced) = self.resampler.process(&self.tmp_buf[..in_frames * out_ch], &mut resampled, out_ch);
        resampled.truncate(produced * out_ch);

        sample_format::encode_from_f32(self.out_fmt.sample_format, &resampled, out);
        (consumed, produced)
    }
}

/// Dispatches to the specific hand-tuned mixdown for `(in_ch, out_ch)`,
/// falling back to `default_all_to_all` or `some_to_some` per
/// `spec.md §4.2`.
fn mix_channels(input: &[f32], output: &mut [f32], in_fmt: &AudioFormat, out_fmt: &AudioFormat) {
    use channels::*;
    let (in_ch, out_ch) = (in_fmt.num_channels, out_fmt.num_channels);
    let (in_layout, out_layout) = (&in_fmt.channel_layout, &out_fmt.channel_layout);

    match (in_ch, out_ch) {
        (1, 2) => mono_to_stereo(input, output),
        (2, 1) => stereo_to_mono(input, output),
        (1, 4 | 6 | 8) => mono_to_multi(input, output, out_layout),
        (2, 4 | 6 | 8) => stereo_to_multi(input, output, out_layout),
        (4, 2) => quad_to_stereo(input, output, in_layout),
        (4, 6 | 8) => quad_to_multi(input, output, in_layout, out_layout),
        (6, 2) => surround_5_1_to_stereo(input, output, in_layout),
        (6, 4) => surround_5_1_to_quad(input, output, in_layout),
        (6, 8) => surround_5_1_to_7_1(input, output, in_layout, out_layout),
        _ if in_ch > 8 && out_ch > 8 => some_to_some(input, output),
        _ => default_all_to_all(input, output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn identical_formats_need_zero_converters() {
        let fmt = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
        let converter = FormatConverter::new(fmt, fmt, 512);
        assert_eq!(converter.num_converters(), 0);
    }

    #[test]
    fn identical_formats_pass_through_byte_for_byte() {
        let fmt = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
        let mut converter = FormatConverter::new(fmt, fmt, 512);
        let input: Vec<u8> = (0..16u8).collect();
        let mut out = Vec::new();
        let (consumed, produced) = converter.process(&input, &mut out);
        assert_eq!(consumed, 4);
        assert_eq!(produced, 4);
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn mono_to_stereo_duplicates_channel() {
        let in_fmt = AudioFormat::new(SampleFormat::F32LE, 48_000, 1);
        let out_fmt = AudioFormat::new(SampleFormat::F32LE, 48_000, 2);
        let mut converter = FormatConverter::new(in_fmt, out_fmt, 512);
        assert!(converter.num_converters() >= 1);

        let mut input = Vec::new();
        sample_format::encode_from_f32(SampleFormat::F32LE, &[0.25], &mut input);
        let mut out = Vec::new();
        converter.process(&input, &mut out);

        let mut decoded = Vec::new();
        sample_format::decode_to_f32(SampleFormat::F32LE, &out, &mut decoded);
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0] - 0.25).abs() < 0.001);
        assert!((decoded[1] - 0.25).abs() < 0.001);
    }

    #[test]
    fn differing_rate_needs_a_converter_stage() {
        let in_fmt = AudioFormat::new(SampleFormat::S16LE, 44_100, 2);
        let out_fmt = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
        let converter = FormatConverter::new(in_fmt, out_fmt, 512);
        assert!(converter.num_converters() >= 1);
    }
}
