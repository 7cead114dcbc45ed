//! Couples one stream to one device for the duration of that
//! attachment (`spec.md §3` "Dev-stream").

use mixbus_core::convert::FormatConverter;

use crate::node::StreamId;

/// One stream's attachment to one device. A stream attached to multiple
/// devices gets one `DevStream` per device (`spec.md §3`).
#[derive(Debug)]
pub struct DevStream {
    stream_id: StreamId,
    dev_id: u32,
    converter: FormatConverter,
    /// Frames of the current cycle's device buffer this dev-stream has
    /// already mixed in or consumed from.
    mix_offset: u32,
    is_running: bool,
}

impl DevStream {
    /// Creates a dev-stream with a converter built for `stream_fmt ->
    /// dev_fmt` (output) or `dev_fmt -> stream_fmt` (input) — the
    /// direction is the caller's responsibility to pick when
    /// constructing `converter`.
    #[must_use]
    pub fn new(stream_id: StreamId, dev_id: u32, converter: FormatConverter) -> Self {
        Self {
            stream_id,
            dev_id,
            converter,
            mix_offset: 0,
            is_running: false,
        }
    }

    /// The stream this attachment couples to a device.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The device this attachment couples a stream to.
    #[must_use]
    pub const fn dev_id(&self) -> u32 {
        self.dev_id
    }

    /// This attachment's format converter.
    pub fn converter(&mut self) -> &mut FormatConverter {
        &mut self.converter
    }

    /// Frames mixed/consumed so far this cycle.
    #[must_use]
    pub const fn mix_offset(&self) -> u32 {
        self.mix_offset
    }

    /// Advances the cycle's mix offset by `frames`.
    pub fn advance_mix_offset(&mut self, frames: u32) {
        self.mix_offset = self.mix_offset.saturating_add(frames);
    }

    /// Resets the per-cycle mix offset to zero (called at cycle start).
    pub fn reset_mix_offset(&mut self) {
        self.mix_offset = 0;
    }

    /// True while this attachment is actively being serviced.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.is_running
    }

    /// Marks this attachment running or stopped.
    pub fn set_running(&mut self, running: bool) {
        self.is_running = running;
    }
}
