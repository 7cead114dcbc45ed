//! Core primitives for the mixbus audio routing server: formats, the
//! shared ring buffer, buffer-share bookkeeping, rate estimation,
//! ramping, and format conversion.
//!
//! This crate has no knowledge of devices, streams, or threads — see
//! `mixbus-server` for the pieces that tie these primitives into a
//! running audio thread.

pub mod buffer_share;
pub mod convert;
pub mod error;
pub mod format;
pub mod ramp;
pub mod rate_estimator;
pub mod ring;
pub mod time;

pub use buffer_share::BufferShare;
pub use convert::FormatConverter;
pub use error::{Error, Result};
pub use format::{AudioFormat, ChannelLayout, ChannelPosition, SampleFormat};
pub use ramp::{Ramp, RampRequest};
pub use rate_estimator::RateEstimator;
pub use ring::RingBuffer;
