//! CLI-level error type.

/// Errors surfaced at the command-line boundary: backend failures that
/// have no equivalent in `mixbus-server`'s own taxonomy, plus a
/// transparent wrapper for everything that does.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A `cpal` call failed; `cpal`'s own error types don't implement
    /// `std::error::Error` uniformly across platforms, so the message is
    /// captured as a string at the call site.
    #[error("audio backend error: {0}")]
    Cpal(String),

    /// No default device is configured on this host.
    #[error("no default audio device is available")]
    NoDevice,

    /// `--input`/`--output` named no matching device.
    #[error("no device matching '{0}' was found")]
    DeviceNotFound(String),

    /// A WAV file could not be written.
    #[error("wav write error: {0}")]
    Wav(#[from] hound::Error),

    /// An I/O failure outside of `cpal`/`hound`'s own error types.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wraps `mixbus-server`'s own error taxonomy.
    #[error(transparent)]
    Server(#[from] mixbus_server::error::Error),
}

/// Convenience result alias for this crate.
pub type CliResult<T> = std::result::Result<T, CliError>;
