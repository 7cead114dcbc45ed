//! Fixed-capacity power-of-two ring buffer for PCM frames (`spec.md §3`).
//!
//! This is the in-process data structure and index algebra the spec
//! describes for both a device's hardware buffer and a stream's shared
//! buffer. The actual cross-process transport of a stream's buffer (an
//! mmap'd region shared with a client) is a platform/backend concern
//! the same way device enumeration is (`spec.md §1` places "client
//! socket acceptance... wire-level message framing" out of scope); a
//! deployment wires a real shared-memory region behind the same index
//! algebra implemented here.

use crate::error::{Error, Result};

/// A fixed-capacity ring buffer of interleaved audio frames.
///
/// Capacity is frames, not samples; each "frame" is `channels` interleaved
/// `f32` samples. `capacity_frames` must be a power of two. Writer and
/// reader indices are counters that increase without bound and are
/// reduced modulo `2 * capacity` for wrap detection, then modulo
/// `capacity` for the storage offset — exactly the scheme `spec.md §3`
/// describes ("incremented modulo `2*N`... `readable = writer - reader`").
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity_frames: u32,
    writer: u32,
    reader: u32,
}

impl RingBuffer {
    /// Creates a ring buffer. `capacity_frames` must be a power of two and
    /// nonzero; panics otherwise (a contract violation, not a runtime
    /// condition — callers choose buffer sizes at construction time, not
    /// from untrusted input).
    #[must_use]
    pub fn new(capacity_frames: u32, channels: usize) -> Self {
        assert!(capacity_frames.is_power_of_two(), "capacity must be a power of two");
        assert!(channels > 0, "channels must be nonzero");
        Self {
            data: vec![0.0; capacity_frames as usize * channels],
            channels,
            capacity_frames,
            writer: 0,
            reader: 0,
        }
    }

    /// Capacity in frames.
    #[must_use]
    pub const fn capacity_frames(&self) -> u32 {
        self.capacity_frames
    }

    /// Number of channels per frame.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Frames available to read.
    #[must_use]
    pub fn readable(&self) -> u32 {
        self.writer.wrapping_sub(self.reader)
    }

    /// Frames available to write without overrunning the reader.
    #[must_use]
    pub fn writable(&self) -> u32 {
        self.capacity_frames - self.readable()
    }

    fn mask(&self, counter: u32) -> usize {
        (counter & (self.capacity_frames - 1)) as usize
    }

    /// Writes as many whole frames from `frames` (interleaved) as fit
    /// without exceeding [`RingBuffer::writable`], returning the count
    /// actually written. Never panics on oversized input — the spec
    /// requires every derived offset to be bounds-checked, never trusted.
    pub fn write(&mut self, frames: &[f32]) -> u32 {
        let requested = (frames.len() / self.channels) as u32;
        let n = requested.min(self.writable());
        for i in 0..n {
            let src = &frames[(i as usize) * self.channels..(i as usize + 1) * self.channels];
            let dst_frame = self.mask(self.writer.wrapping_add(i));
            let dst = &mut self.data[dst_frame * self.channels..(dst_frame + 1) * self.channels];
            dst.copy_from_slice(src);
        }
        self.writer = self.writer.wrapping_add(n);
        n
    }

    /// Writes silence (zero frames) without touching storage, as a fast
    /// path for underrun zero-fill (`spec.md §4.4` "fill `min_cb_level`
    /// zeros").
    pub fn write_silence(&mut self, frames: u32) -> u32 {
        let n = frames.min(self.writable());
        for i in 0..n {
            let dst_frame = self.mask(self.writer.wrapping_add(i));
            self.data[dst_frame * self.channels..(dst_frame + 1) * self.channels].fill(0.0);
        }
        self.writer = self.writer.wrapping_add(n);
        n
    }

    /// Reads up to `out.len() / channels` frames into `out` (interleaved),
    /// returning the count actually read (may be less than requested).
    pub fn read(&mut self, out: &mut [f32]) -> u32 {
        let requested = (out.len() / self.channels) as u32;
        let n = requested.min(self.readable());
        for i in 0..n {
            let src_frame = self.mask(self.reader.wrapping_add(i));
            let src = &self.data[src_frame * self.channels..(src_frame + 1) * self.channels];
            out[(i as usize) * self.channels..(i as usize + 1) * self.channels]
                .copy_from_slice(src);
        }
        self.reader = self.reader.wrapping_add(n);
        n
    }

    /// Drops (advances the reader past) up to `frames` readable frames
    /// without copying them out, for overrun handling ("caller drops the
    /// oldest frames", `spec.md §4.4`).
    pub fn drop_oldest(&mut self, frames: u32) -> u32 {
        let n = frames.min(self.readable());
        self.reader = self.reader.wrapping_add(n);
        n
    }

    /// Validates and clamps a client-supplied frame offset to a safe,
    /// in-bounds storage index. `spec.md §5`: "clients and the server
    /// access the same memory and must never trust each other's indices
    /// for memory safety (bounds-check every derived offset)."
    #[must_use]
    pub fn clamp_offset(&self, offset: u32) -> usize {
        self.mask(offset)
    }

    /// Reads exactly `frames` starting at an explicit offset relative to
    /// the current reader position, without advancing the reader.
    /// Returns an error if `frames` exceeds what is currently readable.
    pub fn peek_at(&self, relative_frame: u32, frames: u32, out: &mut [f32]) -> Result<()> {
        if frames > self.readable().saturating_sub(relative_frame) {
            return Err(Error::CapacityExceeded {
                requested: frames as usize,
                available: self.readable().saturating_sub(relative_frame) as usize,
            });
        }
        for i in 0..frames {
            let src_frame = self.mask(self.reader.wrapping_add(relative_frame).wrapping_add(i));
            let src = &self.data[src_frame * self.channels..(src_frame + 1) * self.channels];
            out[(i as usize) * self.channels..(i as usize + 1) * self.channels]
                .copy_from_slice(src);
        }
        Ok(())
    }

    /// Resets both indices to zero, discarding all buffered data.
    pub fn reset(&mut self) {
        self.writer = 0;
        self.reader = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut rb = RingBuffer::new(8, 2);
        let input: Vec<f32> = (0..12).map(|i| i as f32).collect(); // 6 frames
        assert_eq!(rb.write(&input), 6);
        let mut out = vec![0.0; 12];
        assert_eq!(rb.read(&mut out), 6);
        assert_eq!(input, out);
    }

    #[test]
    fn write_never_exceeds_capacity() {
        let mut rb = RingBuffer::new(4, 1);
        let input = vec![1.0; 10];
        assert_eq!(rb.write(&input), 4);
        assert_eq!(rb.writable(), 0);
    }

    #[test]
    fn wrap_around_preserves_byte_for_byte_order() {
        let mut rb = RingBuffer::new(4, 1);
        rb.write(&[1.0, 2.0, 3.0]);
        let mut out = [0.0; 2];
        rb.read(&mut out);
        assert_eq!(out, [1.0, 2.0]);
        // Writer wraps past the buffer boundary now.
        rb.write(&[4.0, 5.0, 6.0]);
        let mut out2 = [0.0; 4];
        let n = rb.read(&mut out2);
        assert_eq!(n, 4);
        assert_eq!(out2, [3.0, 4.0, 5.0, 6.0]);
    }

    proptest::proptest! {
        /// `spec.md §8` invariant 4: for any sequence of reads and writes
        /// with `sum(writes) - sum(reads) <= capacity`, the frames read
        /// out equal the frames written in, in order.
        #[test]
        fn reads_reproduce_writes_in_order(
            ops in proptest::collection::vec((0u8..2, 1u32..6), 1..200)
        ) {
            let mut rb = RingBuffer::new(16, 1);
            let mut unread = std::collections::VecDeque::new();
            let mut next_val = 0.0f32;
            for (kind, n) in ops {
                if kind == 0 {
                    let n = n.min(rb.writable());
                    let chunk: Vec<f32> = (0..n).map(|_| { next_val += 1.0; next_val }).collect();
                    let written = rb.write(&chunk);
                    prop_assert_eq!(written, n);
                    unread.extend(chunk.into_iter().take(written as usize));
                } else {
                    let n = n.min(rb.readable());
                    let mut out = vec![0.0; n as usize];
                    let read = rb.read(&mut out);
                    prop_assert_eq!(read, n);
                    for v in out.into_iter().take(read as usize) {
                        prop_assert_eq!(Some(v), unread.pop_front());
                    }
                }
            }
        }
    }
}
