//! Per-device bookkeeping of per-stream progress within a shared device
//! buffer (`spec.md §4.3`).
//!
//! Ported from the table-of-slots design in the original `buffer_share.c`
//! (find-by-linear-scan, double capacity on exhaustion), but as a safe
//! `Vec<Option<Entry>>` slot table instead of a realloc'd C array — the
//! REDESIGN FLAGS in `spec.md §9` ask for exactly this swap.

use crate::error::{Error, Result};

const INITIAL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: u32,
    offset: u32,
}

/// Tracks, per stream id attached to one device, how many frames of the
/// current cycle's buffer that stream has already consumed or provided.
#[derive(Debug, Clone)]
pub struct BufferShare {
    slots: Vec<Option<Entry>>,
    buf_sz: u32,
}

impl BufferShare {
    /// Creates an empty share for a device buffer of `buf_sz` frames.
    #[must_use]
    pub fn new(buf_sz: u32) -> Self {
        Self {
            slots: vec![None; INITIAL_CAPACITY],
            buf_sz,
        }
    }

    fn find(&self, id: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|e| matches!(e, Some(e) if e.id == id))
    }

    /// Registers a new stream id at offset 0. Errors if `id` is already
    /// present. Grows the slot table by doubling when full.
    pub fn add(&mut self, id: u32) -> Result<()> {
        if self.find(id).is_some() {
            return Err(Error::AlreadyExists(id));
        }
        if self.slots.iter().all(Option::is_some) {
            let new_len = self.slots.len() * 2;
            self.slots.resize(new_len, None);
        }
        let slot = self.slots.iter().position(Option::is_none).expect("just grown");
        self.slots[slot] = Some(Entry { id, offset: 0 });
        Ok(())
    }

    /// Removes a stream id. No-op if `id` is unknown (mirrors the C
    /// implementation's `-ENOENT`-but-harmless removal path used at
    /// stream teardown).
    pub fn rm(&mut self, id: u32) {
        if let Some(i) = self.find(id) {
            self.slots[i] = None;
        }
    }

    /// Adds `delta` to `id`'s offset. No-op for an unknown id
    /// (`spec.md §4.3`: "No-op for unknown id").
    pub fn offset_update(&mut self, id: u32, delta: u32) {
        if let Some(i) = self.find(id) {
            let e = self.slots[i].as_mut().unwrap();
            e.offset = e.offset.wrapping_add(delta);
        }
    }

    /// Smallest offset across all registered streams, or 0 if empty.
    #[must_use]
    pub fn minimum_offset(&self) -> u32 {
        self.slots
            .iter()
            .flatten()
            .map(|e| e.offset)
            .min()
            .unwrap_or(0)
    }

    /// The offset for a specific stream id, or 0 if unknown.
    #[must_use]
    pub fn offset(&self, id: u32) -> u32 {
        self.find(id).map_or(0, |i| self.slots[i].unwrap().offset)
    }

    /// Subtracts `n` from every registered stream's offset.
    ///
    /// Validates every entry before mutating any of them (closing the
    /// open question in `spec.md §9`: "the second loop unconditionally
    /// decrements even if the first detected an error... hoist the
    /// validation before mutation"). Errors, leaving state unchanged, if
    /// any entry's offset is less than `n`.
    pub fn update_write_point(&mut self, n: u32) -> Result<()> {
        for e in self.slots.iter().flatten() {
            if e.offset < n {
                return Err(Error::WritePointExceedsAvailable {
                    requested: n,
                    available: e.offset,
                });
            }
        }
        for e in self.slots.iter_mut().flatten() {
            e.offset -= n;
        }
        Ok(())
    }

    /// Advances the write point by [`BufferShare::minimum_offset`] and
    /// returns the amount advanced, or 0 if the table is empty (matching
    /// `update_write_point`'s no-op-on-error behavior, since
    /// `minimum_offset` is always `<=` every entry's offset by
    /// construction and so cannot fail here).
    pub fn new_write_point(&mut self) -> u32 {
        let m = self.minimum_offset();
        match self.update_write_point(m) {
            Ok(()) => m,
            Err(_) => 0,
        }
    }

    /// Clamps an advance to at most `write_limit`, for the "offset
    /// exceeds available" safety path (`spec.md §4.3`): if
    /// `minimum_offset()` alone would already fit within `write_limit`,
    /// advances normally; otherwise advances by `write_limit` and
    /// reports which streams overshot it, for the caller to log an
    /// `offset-exceeds-available` event (`spec.md §8` scenario S6).
    pub fn all_streams_written(&mut self, write_limit: u32) -> (u32, Vec<u32>) {
        let min_offset = self.minimum_offset();
        let advance = min_offset.min(write_limit);
        let overshot: Vec<u32> = self
            .slots
            .iter()
            .flatten()
            .filter(|e| e.offset > write_limit)
            .map(|e| e.id)
            .collect();
        // `update_write_point` cannot fail here: `advance <= min_offset`
        // and every registered entry's offset is `>= min_offset`.
        self.update_write_point(advance).expect("advance is <= minimum_offset");
        (advance, overshot)
    }

    /// Zeros every registered stream's offset.
    pub fn reset_write_point(&mut self) {
        for e in self.slots.iter_mut().flatten() {
            e.offset = 0;
        }
    }

    /// The device buffer size this share was created for.
    #[must_use]
    pub const fn buf_sz(&self) -> u32 {
        self.buf_sz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_rm_round_trips() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        assert_eq!(bs.offset(1), 0);
        bs.rm(1);
        assert_eq!(bs.offset(1), 0); // unknown id reads as 0
    }

    #[test]
    fn add_duplicate_errors() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        assert_eq!(bs.add(1), Err(Error::AlreadyExists(1)));
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut bs = BufferShare::new(1024);
        for id in 0..(INITIAL_CAPACITY as u32 + 3) {
            bs.add(id).unwrap();
        }
        for id in 0..(INITIAL_CAPACITY as u32 + 3) {
            assert_eq!(bs.offset(id), 0);
        }
    }

    #[test]
    fn minimum_offset_tracks_slowest_stream() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        bs.add(2).unwrap();
        bs.offset_update(1, 400);
        bs.offset_update(2, 250);
        assert_eq!(bs.minimum_offset(), 250);
    }

    #[test]
    fn update_write_point_rejects_overshoot_without_mutating() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        bs.offset_update(1, 100);
        let err = bs.update_write_point(200).unwrap_err();
        assert_eq!(
            err,
            Error::WritePointExceedsAvailable {
                requested: 200,
                available: 100
            }
        );
        assert_eq!(bs.offset(1), 100, "state must be unchanged after a rejected update");
    }

    #[test]
    fn new_write_point_advances_by_minimum() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        bs.add(2).unwrap();
        bs.offset_update(1, 400);
        bs.offset_update(2, 250);
        let advanced = bs.new_write_point();
        assert_eq!(advanced, 250);
        assert_eq!(bs.offset(1), 150);
        assert_eq!(bs.offset(2), 0);
    }

    #[test]
    fn offset_update_on_unknown_id_is_noop() {
        let mut bs = BufferShare::new(1024);
        bs.offset_update(42, 100);
        assert_eq!(bs.offset(42), 0);
    }

    #[test]
    fn reset_write_point_zeros_everyone() {
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        bs.offset_update(1, 500);
        bs.reset_write_point();
        assert_eq!(bs.offset(1), 0);
    }

    #[test]
    fn all_streams_written_clips_to_write_limit_and_reports_overshoot() {
        // spec.md §8 scenario S6.
        let mut bs = BufferShare::new(1024);
        bs.add(1).unwrap();
        bs.add(2).unwrap();
        bs.add(3).unwrap();
        bs.offset_update(1, 400);
        bs.offset_update(2, 400);
        bs.offset_update(3, 700);

        let (advanced, overshot) = bs.all_streams_written(500);
        assert_eq!(advanced, 400, "minimum_offset (400) <= write_limit (500)");
        assert_eq!(overshot, vec![3]);
        assert_eq!(bs.offset(1), 0);
        assert_eq!(bs.offset(2), 0);
        assert_eq!(bs.offset(3), 300);
    }

    proptest::proptest! {
        /// `spec.md §8` invariant 2: after any sequence of
        /// `offset_update(id, +delta)` calls with `delta >= 0` and no
        /// reset, `minimum_offset()` is non-decreasing.
        #[test]
        fn minimum_offset_is_monotonic_non_decreasing(
            deltas in proptest::collection::vec((0u32..3, 0u32..100), 1..200)
        ) {
            let mut bs = BufferShare::new(1 << 20);
            bs.add(0).unwrap();
            bs.add(1).unwrap();
            bs.add(2).unwrap();
            let mut last = bs.minimum_offset();
            for (id, delta) in deltas {
                bs.offset_update(id, delta);
                let now = bs.minimum_offset();
                prop_assert!(now >= last);
                last = now;
            }
        }
    }
}
