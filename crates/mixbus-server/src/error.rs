//! Server-level error taxonomy (`spec.md §7`, §9 "single typed error with
//! a cause chain" resolution for `cras_iodev_open`).

use std::fmt;

/// The step of device-open that failed, for [`Error::DeviceOpen`]'s cause
/// chain (`spec.md §9`: "`cras_iodev_open` returns different error codes
/// depending on which step failed... a rewrite should give a single
/// typed error with a cause chain").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStep {
    /// Refreshing/selecting a supported format failed.
    FormatSelection,
    /// The backend's `configure_dev` call failed.
    Configure,
    /// Allocating the DSP context at the chosen rate failed.
    DspAllocation,
}

impl fmt::Display for OpenStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenStep::FormatSelection => "format selection",
            OpenStep::Configure => "backend configure_dev",
            OpenStep::DspAllocation => "dsp allocation",
        };
        f.write_str(s)
    }
}

/// Errors raised by `mixbus-server`'s stream registry, device lifecycle,
/// and message bus.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wraps a core-crate error (buffer share, ring, converter).
    #[error(transparent)]
    Core(#[from] mixbus_core::Error),

    /// No combination of rate/channels/format is compatible between the
    /// requested format and what the device reports supporting
    /// (`spec.md §4.4` step 5: "If any of the three is 0... fail with
    /// `invalid-format`").
    #[error("no compatible format available on device {dev_id}")]
    InvalidFormat {
        /// The device that was asked to open.
        dev_id: u32,
    },

    /// Device open failed at a specific step, per the §9 cause-chain
    /// resolution.
    #[error("device {dev_id} open failed at {step}: {reason}")]
    DeviceOpen {
        /// The device that failed to open.
        dev_id: u32,
        /// Which step of the open sequence failed.
        step: OpenStep,
        /// Backend-supplied detail.
        reason: String,
    },

    /// A stream id's embedded client id did not match the expected
    /// client (`spec.md §6`: "Validation: `(stream_id >> 16) ==
    /// client_id`").
    #[error("stream id {stream_id:#x} does not belong to client {client_id}")]
    StreamClientMismatch {
        /// The stream id presented.
        stream_id: u32,
        /// The client id it was checked against.
        client_id: u16,
    },

    /// A device id referenced an unknown device.
    #[error("device {0} not found")]
    DeviceNotFound(u32),

    /// A stream id referenced an unknown stream.
    #[error("stream {0:#x} not found")]
    StreamNotFound(u32),

    /// The message bus received a tag it does not recognize
    /// (`spec.md §4.5`: "Unknown tags return `-EINVAL`").
    #[error("unknown message tag {0}")]
    UnknownMessageTag(u32),

    /// A reset request was rejected by the token bucket
    /// (`spec.md §4.4`, §8 invariant 9).
    #[error("reset request for device {0} rejected: rate limit exceeded")]
    ResetRateLimited(u32),
}

/// Convenience result alias for `mixbus-server`.
pub type Result<T> = std::result::Result<T, Error>;
