//! Stage 1: sample-format conversion to/from the converter's internal
//! `f32` working buffers (`spec.md §4.2`).
//!
//! The pipeline's stages 2-4 all operate on normalized `f32` interleaved
//! frames (the same representation [`crate::ring::RingBuffer`] stores),
//! so "convert to the internal working format" here means decode from
//! the endpoint's wire [`SampleFormat`] into `f32`, and on the way out,
//! encode back. `exceeds_16_bit` guides nothing further once everything
//! funnels through `f32` — the normalized float range already carries
//! 24/32-bit precision losslessly.

use crate::format::SampleFormat;

const S8_OFFSET: f32 = 128.0;
const S16_SCALE: f32 = 32_768.0;
const S24_SCALE: f32 = 8_388_608.0;
const S32_SCALE: f32 = 2_147_483_648.0;

/// Decodes `bytes` (packed in `fmt`) into normalized `f32` samples,
/// appending one `f32` per decoded sample to `out`.
pub fn decode_to_f32(fmt: SampleFormat, bytes: &[u8], out: &mut Vec<f32>) {
    let stride = fmt.bytes();
    for chunk in bytes.chunks_exact(stride) {
        let sample = match fmt {
            SampleFormat::U8 => (f32::from(chunk[0]) - S8_OFFSET) / S8_OFFSET,
            SampleFormat::S16LE => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / S16_SCALE,
            SampleFormat::S24LE3 => {
                let raw = i32::from(chunk[0]) | (i32::from(chunk[1]) << 8) | (i32::from(chunk[2]) << 16);
                let signed = (raw << 8) >> 8; // sign-extend from 24 bits
                signed as f32 / S24_SCALE
            }
            SampleFormat::S24LE => {
                let raw = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let signed = (raw << 8) >> 8;
                signed as f32 / S24_SCALE
            }
            SampleFormat::S32LE => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32 / S32_SCALE,
            SampleFormat::F32LE => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        out.push(sample);
    }
}

/// Encodes normalized `f32` samples into `fmt`'s wire representation,
/// clipping to the format's representable range (`spec.md §4.2`: "all
/// integer clipping to sample range").
pub fn encode_from_f32(fmt: SampleFormat, samples: &[f32], out: &mut Vec<u8>) {
    for &s in samples {
        let clipped = s.clamp(-1.0, 1.0);
        match fmt {
            SampleFormat::U8 => {
                let v = (clipped * S8_OFFSET + S8_OFFSET).round().clamp(0.0, 255.0) as u8;
                out.push(v);
            }
            SampleFormat::S16LE => {
                let v = (clipped * S16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::S24LE3 => {
                let v = (clipped * S24_SCALE).round().clamp(-S24_SCALE, S24_SCALE - 1.0) as i32;
                let b = v.to_le_bytes();
                out.extend_from_slice(&b[0..3]);
            }
            SampleFormat::S24LE => {
                let v = (clipped * S24_SCALE).round().clamp(-S24_SCALE, S24_SCALE - 1.0) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::S32LE => {
                let v = (clipped * S32_SCALE).round().clamp(i32::MIN as f32, i32::MAX as f32) as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
            SampleFormat::F32LE => out.extend_from_slice(&clipped.to_le_bytes()),
        }
    }
}
