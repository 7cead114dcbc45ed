//! Client-facing stream state (`rstream`, `spec.md §3`).

use mixbus_core::format::AudioFormat;
use mixbus_core::ring::RingBuffer;
use std::time::Instant;

use crate::node::StreamId;

/// The direction data flows for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client sends audio to be played.
    Output,
    /// Client receives captured audio.
    Input,
    /// Receives a tee of device input/output before DSP is applied.
    LoopbackPreDsp,
    /// Receives a tee of device input/output after DSP is applied.
    LoopbackPostDsp,
}

/// Informational classification of the connecting client, opaque to
/// core scheduling (`spec.md §6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    /// Client type not reported.
    Unknown,
    /// Pre-multi-client-type legacy clients.
    Legacy,
    /// Internal test harness client.
    Test,
    /// Raw PCM client.
    Pcm,
    /// Chrome browser client.
    Chrome,
    /// Android ARC client.
    Arc,
    /// crosvm virtual-machine client.
    Crosvm,
    /// Server-internal synthetic stream.
    ServerStream,
    /// Lacros browser client.
    Lacros,
    /// Plugin/extension client.
    Plugin,
    /// ARCVM client.
    Arcvm,
    /// Borealis (Steam) client.
    Borealis,
    /// Sound-card-init diagnostic client.
    SoundCardInit,
}

/// Informational classification of the stream's purpose
/// (`spec.md §6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// No particular classification.
    Default,
    /// General multimedia playback.
    Multimedia,
    /// Voice call / communication audio.
    VoiceCommunication,
    /// Speech-recognition capture.
    SpeechRecognition,
    /// Low-latency professional audio.
    ProAudio,
    /// Accessibility (e.g. screen reader) audio.
    Accessibility,
}

bitflags::bitflags! {
    /// Per-stream behavior flags (`spec.md §3`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamFlags: u8 {
        /// Client tolerates larger, bursty wake-ups.
        const BULK_AUDIO_OK = 1 << 0;
        /// Wake the client on the device's timing rather than its own.
        const USE_DEV_TIMING = 1 << 1;
        /// Stream only delivers audio when a hotword is detected.
        const HOTWORD = 1 << 2;
        /// Stream exists only to trigger downstream effects, carries no audio out.
        const TRIGGER_ONLY = 1 << 3;
        /// Stream is server-internal, never exposed to a client socket.
        const SERVER_ONLY = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Opaque-to-core-scheduling effects bitmask (`spec.md §3`: "AEC, NS,
    /// AGC, voice detection, etc. — opaque to core").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Effects: u8 {
        /// Acoustic echo cancellation.
        const AEC = 1 << 0;
        /// Noise suppression.
        const NS = 1 << 1;
        /// Automatic gain control.
        const AGC = 1 << 2;
        /// Voice-activity detection.
        const VOICE_DETECTION = 1 << 3;
    }
}

/// A client-facing audio stream: one shared ring buffer, one declared
/// format, and scheduling metadata.
///
/// `spec.md §3` invariants: `stream_id`, `direction`, and `format` are
/// immutable once created; `buffer_frames` is a power of two, at most
/// the configured system cap (default 8192).
#[derive(Debug)]
pub struct RStream {
    id: StreamId,
    direction: Direction,
    /// Informational; does not affect core scheduling.
    pub client_type: ClientType,
    /// Informational; does not affect core scheduling.
    pub stream_type: StreamType,
    format: AudioFormat,
    cb_threshold: u32,
    flags: StreamFlags,
    effects: Effects,
    next_cb_ts: Instant,
    volume_scaler: f32,
    is_draining: bool,
    draining_deadline: Option<Instant>,
    shm: RingBuffer,
    pinned_dev_idx: Option<u32>,
}

/// Default cap on `buffer_frames` absent an explicit system
/// configuration (`spec.md §3`).
pub const DEFAULT_MAX_BUFFER_FRAMES: u32 = 8192;

impl RStream {
    /// Creates a stream. Panics if `buffer_frames` is not a power of two
    /// (a caller contract violation, not a runtime condition — buffer
    /// sizes are chosen by server policy at stream-creation time).
    #[must_use]
    pub fn new(
        id: StreamId,
        direction: Direction,
        format: AudioFormat,
        buffer_frames: u32,
        cb_threshold: u32,
        flags: StreamFlags,
        effects: Effects,
        now: Instant,
    ) -> Self {
        assert!(buffer_frames.is_power_of_two(), "buffer_frames must be a power of two");
        Self {
            id,
            direction,
            client_type: ClientType::Unknown,
            stream_type: StreamType::Default,
            format,
            cb_threshold,
            flags,
            effects,
            next_cb_ts: now,
            volume_scaler: 1.0,
            is_draining: false,
            draining_deadline: None,
            shm: RingBuffer::new(buffer_frames, format.num_channels as usize),
            pinned_dev_idx: None,
        }
    }

    /// The stream's identifier (immutable).
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    /// The stream's direction (immutable).
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// The client's declared format (immutable).
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Frame threshold for waking the client.
    #[must_use]
    pub const fn cb_threshold(&self) -> u32 {
        self.cb_threshold
    }

    /// Behavior flags.
    #[must_use]
    pub const fn flags(&self) -> StreamFlags {
        self.flags
    }

    /// Enabled effects, opaque to core scheduling.
    #[must_use]
    pub const fn effects(&self) -> Effects {
        self.effects
    }

    /// This stream's shared ring buffer.
    pub fn shm(&mut self) -> &mut RingBuffer {
        &mut self.shm
    }

    /// Monotonic deadline for the next client wake-up.
    #[must_use]
    pub const fn next_cb_ts(&self) -> Instant {
        self.next_cb_ts
    }

    /// Advances `next_cb_ts`. Per-stream invariant: non-decreasing except
    /// on fresh add or an explicit skew correction (`spec.md §3`) — both
    /// of which call this directly, so no monotonicity check is enforced
    /// here beyond the caller's discipline.
    pub fn set_next_cb_ts(&mut self, ts: Instant) {
        self.next_cb_ts = ts;
    }

    /// Current volume scaler in `[0.0, 1.0]`.
    #[must_use]
    pub const fn volume_scaler(&self) -> f32 {
        self.volume_scaler
    }

    /// Sets the volume scaler, clamped to `[0.0, 1.0]`.
    pub fn set_volume_scaler(&mut self, v: f32) {
        self.volume_scaler = v.clamp(0.0, 1.0);
    }

    /// True while the stream is draining toward removal.
    #[must_use]
    pub const fn is_draining(&self) -> bool {
        self.is_draining
    }

    /// Marks the stream as draining with a deadline after which it is
    /// considered drained regardless of remaining shm fill level
    /// (`spec.md §5`: "Drain is bounded... or `draining_deadline`
    /// elapses").
    pub fn start_draining(&mut self, deadline: Instant) {
        self.is_draining = true;
        self.draining_deadline = Some(deadline);
    }

    /// True if a draining stream has reached zero fill or its deadline.
    #[must_use]
    pub fn is_drained(&self, now: Instant) -> bool {
        if !self.is_draining {
            return false;
        }
        self.shm.readable() == 0 || self.draining_deadline.is_some_and(|d| now >= d)
    }

    /// The device this stream is pinned to, if any.
    #[must_use]
    pub const fn pinned_dev_idx(&self) -> Option<u32> {
        self.pinned_dev_idx
    }

    /// Pins the stream to a single device.
    pub fn set_pinned_dev_idx(&mut self, idx: Option<u32>) {
        self.pinned_dev_idx = idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixbus_core::format::SampleFormat;

    fn fmt() -> AudioFormat {
        AudioFormat::new(SampleFormat::S16LE, 48_000, 2)
    }

    #[test]
    fn flags_combine_and_are_queryable() {
        let f = StreamFlags::BULK_AUDIO_OK | StreamFlags::HOTWORD;
        assert!(f.contains(StreamFlags::BULK_AUDIO_OK));
        assert!(f.contains(StreamFlags::HOTWORD));
        assert!(!f.contains(StreamFlags::SERVER_ONLY));
    }

    #[test]
    fn new_stream_starts_with_unity_volume_and_not_draining() {
        let s = RStream::new(
            0x0001_0002,
            Direction::Output,
            fmt(),
            1024,
            256,
            StreamFlags::empty(),
            Effects::empty(),
            Instant::now(),
        );
        assert_eq!(s.volume_scaler(), 1.0);
        assert!(!s.is_draining());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_buffer_frames_panics() {
        RStream::new(1, Direction::Output, fmt(), 1000, 256, StreamFlags::empty(), Effects::empty(), Instant::now());
    }
}
