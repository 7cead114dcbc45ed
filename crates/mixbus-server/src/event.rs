//! Events the audio thread raises while servicing devices (`spec.md
//! §4.4` underrun/overrun/reset section).

use crate::node::StreamId;

/// An event observed by the audio thread during one device's service
/// cycle. The main thread's command loop drains these from a channel
/// (`spec.md §9`: "typed channel-based pub/sub... no hidden callback
/// re-entrancy").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioThreadEvent {
    /// Output buffer drained while streams exist; zero-filled.
    Underrun {
        /// The device that underran.
        dev_id: u32,
        /// Running underrun count for this device.
        count: u32,
    },
    /// Backend reported `-EPIPE`; treated as a reset condition.
    SevereUnderrun {
        /// The device that severely underran.
        dev_id: u32,
    },
    /// Input producer outran its consumer; oldest frames were dropped.
    Overrun {
        /// The device the overrun occurred on.
        dev_id: u32,
        /// Frames dropped.
        frames_dropped: u32,
    },
    /// Hardware level pinned at `buffer_size` while headroom remained;
    /// emitted once per occurrence at a given level (`spec.md §4.4`).
    DeviceOverrun {
        /// The device that overran.
        dev_id: u32,
    },
    /// A dev-stream's buffer-share offset would have exceeded the
    /// cycle's write limit; the device advanced by the limit instead
    /// (`spec.md §4.3`, §8 scenario S6).
    OffsetExceedsAvailable {
        /// The device the breach occurred on.
        dev_id: u32,
        /// The stream(s) whose offset overshot the write limit.
        streams: Vec<StreamId>,
    },
    /// A device-level reset was granted by the token bucket.
    ResetGranted {
        /// The device being reset.
        dev_id: u32,
    },
}
