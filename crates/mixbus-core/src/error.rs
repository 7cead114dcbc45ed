//! Core error taxonomy (`spec.md §7`).

/// Errors raised by `mixbus-core`'s buffer, conversion, and estimator APIs.
///
/// These map onto `spec.md §7`'s "invalid argument / contract violation",
/// "resource exhaustion", "already exists / not found", and "format
/// incompatible" surface-level kinds.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A stream id was added to a buffer share that already has it.
    #[error("stream {0} already present")]
    AlreadyExists(u32),

    /// An operation referenced a stream id the buffer share does not know.
    #[error("stream {0} not found")]
    NotFound(u32),

    /// `update_write_point` was asked to advance past the minimum offset
    /// actually written (`spec.md §4.3` invariant 3).
    #[error("write point {requested} exceeds minimum offset {available}")]
    WritePointExceedsAvailable {
        /// The number of frames the caller asked to advance by.
        requested: u32,
        /// The minimum offset actually available across all streams.
        available: u32,
    },

    /// No common rate/channel-count/sample-format exists between two
    /// endpoints being matched for device open (`spec.md §4.4`).
    #[error("no compatible format: {0}")]
    IncompatibleFormat(&'static str),

    /// A ring buffer operation would read or write more frames than are
    /// available.
    #[error("ring buffer capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded {
        /// Frames requested.
        requested: usize,
        /// Frames actually available.
        available: usize,
    },
}

/// Convenience result alias for `mixbus-core`.
pub type Result<T> = std::result::Result<T, Error>;
