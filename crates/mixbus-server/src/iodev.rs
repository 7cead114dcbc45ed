//! I/O device capability trait and format-selection logic (`spec.md
//! §4.4`).
//!
//! `spec.md §9` flags the original "polymorphism via struct of function
//! pointers" for re-architecture: "replace with a capability-set
//! interface... a concrete backend is a distinct record type
//! implementing the capability set." [`IoDevice`] is that interface;
//! most of its methods are optional in the spec ("may be no-ops") and so
//! carry default implementations, matching the capability-trait pattern
//! `ampactor-sonido`'s DSP node traits use for optional processing
//! stages.

use std::time::{Duration, Instant};

use mixbus_core::format::{AudioFormat, SampleFormat};

use crate::error::{Error, OpenStep, Result};

/// Lifecycle state of a device (`spec.md §3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Not open; no hardware resources held.
    Close,
    /// Open but not yet decided between normal-run and no-stream-run.
    Open,
    /// Actively mixing/capturing stream data.
    NormalRun,
    /// Open, but no stream currently has data to offer/consume.
    NoStreamRun,
}

/// Direction a device moves audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    /// Renders audio to hardware.
    Output,
    /// Captures audio from hardware.
    Input,
}

/// Stable device identity (`spec.md §3`: "`info.idx`, `info.name`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Unique device index, stable for the life of the process.
    pub idx: u32,
    /// Human-readable device name.
    pub name: String,
}

/// What rates/channel-counts/sample-formats a device currently reports
/// supporting (`spec.md §4.4` step 1: "Device refreshes its
/// `supported_{rates,channel_counts,formats}`").
#[derive(Debug, Clone, Default)]
pub struct SupportedFormats {
    /// Supported sample rates, in the backend's preferred order.
    pub rates: Vec<u32>,
    /// Supported channel counts, in the backend's preferred order.
    pub channel_counts: Vec<u8>,
    /// Supported sample formats, in the backend's preferred order.
    pub formats: Vec<SampleFormat>,
}

/// Preferred minimum rate when no exact match exists
/// (`spec.md §4.4` step 2).
const PREFERRED_MIN_RATE_HZ: u32 = 44_100;
/// Preferred channel count when no exact match exists (`spec.md §4.4`
/// step 3).
const PREFERRED_CHANNELS: u8 = 2;

/// Picks a device format for `requested`, following `spec.md §4.4`'s
/// format-selection-on-open rules in order: exact match, then a
/// documented fallback rule per field, failing with
/// [`Error::InvalidFormat`] if any field has no candidate at all.
pub fn select_format(dev_id: u32, requested: AudioFormat, supported: &SupportedFormats) -> Result<AudioFormat> {
    if supported.rates.is_empty() || supported.channel_counts.is_empty() || supported.formats.is_empty() {
        return Err(Error::InvalidFormat { dev_id });
    }

    let rate_hz = supported
        .rates
        .iter()
        .copied()
        .find(|&r| r == requested.rate_hz && r >= PREFERRED_MIN_RATE_HZ)
        .or_else(|| {
            supported
                .rates
                .iter()
                .copied()
                .find(|&r| r % requested.rate_hz == 0 || requested.rate_hz % r == 0)
        })
        .unwrap_or(supported.rates[0]);

    let num_channels = supported
        .channel_counts
        .iter()
        .copied()
        .find(|&c| c == requested.num_channels)
        .or_else(|| supported.channel_counts.iter().copied().find(|&c| c == PREFERRED_CHANNELS))
        .unwrap_or(supported.channel_counts[0]);

    let sample_format = supported
        .formats
        .iter()
        .copied()
        .find(|&f| f == requested.sample_format)
        .unwrap_or(supported.formats[0]);

    Ok(AudioFormat::new(sample_format, rate_hz, num_channels))
}

/// Device use-case hint, informational (`spec.md §4.4`:
/// `get_use_case`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UseCase {
    /// No particular use case declared.
    #[default]
    Default,
    /// Low-latency voice communication path.
    VoiceCommunication,
    /// Hi-fi media playback path.
    HiFi,
}

/// Capability set every backend implements; most methods are optional
/// in the spec and default to a conservative no-op (`spec.md §4.4`:
/// "may be no-ops").
pub trait IoDevice: std::fmt::Debug + Send {
    /// Stable device identity.
    fn info(&self) -> &DeviceInfo;

    /// Direction this device moves audio.
    fn direction(&self) -> DeviceDirection;

    /// Hardware ring capacity in frames.
    fn buffer_size(&self) -> u32;

    /// Refreshes and returns the device's current supported formats
    /// (`spec.md §4.4` step 1).
    fn update_supported_formats(&mut self) -> SupportedFormats;

    /// Opens the device at `format` (already chosen by
    /// [`select_format`]). Backends allocate hardware resources here.
    fn open_dev(&mut self, format: AudioFormat) -> Result<()>;

    /// Applies final configuration after `open_dev` (e.g. period size).
    /// Most backends have nothing further to configure.
    fn configure_dev(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases hardware resources.
    fn close_dev(&mut self);

    /// Frames currently queued in the hardware buffer, or a negative
    /// value signalling severe underrun (`-EPIPE`) per `spec.md §4.4`
    /// step 1.
    fn frames_queued(&mut self, now: Instant) -> i32;

    /// Estimated output latency in frames (0 for input devices without
    /// a meaningful notion of playback delay).
    fn delay_frames(&self) -> i32 {
        0
    }

    /// Exposes up to `num_frames` frames of the hardware buffer for
    /// in-place read/write, returning the actual frame count available
    /// (may be less than requested).
    fn get_buffer(&mut self, num_frames: u32) -> (&mut [f32], u32);

    /// Commits `nwritten` frames written (output) or consumed (input)
    /// via the slice from [`IoDevice::get_buffer`].
    fn put_buffer(&mut self, nwritten: u32);

    /// Discards any buffered hardware frames. Optional; most backends
    /// have nothing to flush outside the ring itself.
    fn flush_buffer(&mut self) {}

    /// Starts hardware playback/capture. Absent in the spec for devices
    /// that auto-start on open; the default reflects that.
    fn start(&mut self) -> bool {
        true
    }

    /// True if the device is currently able to start.
    fn can_start(&self) -> bool {
        true
    }

    /// True if the backend free-runs (keeps producing/consuming frames)
    /// without the audio thread's involvement between cycles.
    fn is_free_running(&self) -> bool {
        false
    }

    /// Gives the backend a chance to handle an underrun itself (e.g. a
    /// free-running device that self-heals). Returns `true` if handled;
    /// `false` falls back to the default zero-fill path.
    fn output_underrun(&mut self) -> bool {
        false
    }

    /// Enters or leaves the no-stream state (output-only;
    /// `spec.md §4.4`).
    fn no_stream(&mut self, _enable: bool) -> Result<()> {
        Ok(())
    }

    /// Notifies the backend which node is now active.
    fn update_active_node(&mut self, _node_idx: u32) {}

    /// Notifies the backend the channel layout changed.
    fn update_channel_layout(&mut self) {}

    /// Sets hardware (not software) volume, if the backend supports it.
    fn set_volume(&mut self, _scaler: f32) {}

    /// Sets hardware mute, if the backend supports it.
    fn set_mute(&mut self, _mute: bool) {}

    /// Cumulative count of severe (`-EPIPE`) underruns.
    fn get_num_severe_underruns(&self) -> u32 {
        0
    }

    /// Valid (non-garbage) frames currently in the hardware buffer;
    /// defaults to `frames_queued` clamped to non-negative.
    fn get_valid_frames(&mut self, now: Instant) -> u32 {
        self.frames_queued(now).max(0) as u32
    }

    /// Default wake-up scheduling algorithm (`spec.md §4.4` "Wake-up
    /// scheduling"): serve the next cycle after `hw_level - min_cb_level`
    /// frames drain when streams have data ready; otherwise after
    /// `hw_level` drops to the given idle wake-up floor, itself floored
    /// by `min_cb_level`.
    fn frames_to_play_in_sleep(
        &mut self,
        hw_level: u32,
        min_cb_level: u32,
        has_streams_with_data: bool,
        idle_wake_up_level: u32,
    ) -> u32 {
        if has_streams_with_data {
            hw_level.saturating_sub(min_cb_level)
        } else {
            hw_level.saturating_sub(idle_wake_up_level.max(min_cb_level))
        }
    }

    /// True if the backend's noise-cancellation pipeline is available.
    fn support_noise_cancellation(&self) -> bool {
        false
    }

    /// Enables/disables the backend's RTC processing chain.
    fn set_rtc_proc_enabled(&mut self, _enabled: bool) {}

    /// Whether the backend's RTC processing chain is currently enabled.
    fn get_rtc_proc_enabled(&self) -> bool {
        false
    }

    /// Group id for devices that must be opened/closed together (e.g.
    /// a stereo pair split across two hardware devices).
    fn get_dev_group(&self) -> Option<u32> {
        None
    }

    /// Whether a stream pinned to a specific device should attach here.
    fn should_attach_stream(&self, pinned_dev_idx: Option<u32>) -> bool {
        pinned_dev_idx.is_none_or(|idx| idx == self.info().idx)
    }

    /// Declared use-case for this device.
    fn get_use_case(&self) -> UseCase {
        UseCase::Default
    }

    /// Hardware timestamp of the last buffer position update, if the
    /// backend can report one.
    fn get_htimestamp(&self) -> Option<Instant> {
        None
    }
}

/// Minimum interval the default no-stream path waits before re-checking
/// for data, expressed as an equivalent frame count at a nominal rate
/// (`spec.md §4.4`: "≈5 ms equivalent").
pub const DEV_NO_STREAM_WAKE_UP_MS: u64 = 5;

/// Normal-run idle wake-up interval (`spec.md §4.4`: "≈1 ms
/// equivalent").
pub const DEV_NORMAL_RUN_WAKE_UP_MS: u64 = 1;

/// Converts one of the above millisecond constants to a frame count at
/// `rate_hz`.
#[must_use]
pub fn wake_up_ms_to_frames(ms: u64, rate_hz: u32) -> u32 {
    mixbus_core::time::duration_to_frames(Duration::from_millis(ms), rate_hz) as u32
}

/// Translates a device-open failure at a specific step into the
/// single typed error with a cause chain called for by `spec.md §9`.
pub fn open_device(device: &mut dyn IoDevice, dev_id: u32, requested: AudioFormat) -> Result<AudioFormat> {
    let supported = device.update_supported_formats();
    let chosen = select_format(dev_id, requested, &supported).map_err(|_| Error::DeviceOpen {
        dev_id,
        step: OpenStep::FormatSelection,
        reason: "no rate/channel/format combination is compatible".to_owned(),
    })?;

    device.open_dev(chosen).map_err(|e| Error::DeviceOpen {
        dev_id,
        step: OpenStep::Configure,
        reason: e.to_string(),
    })?;

    device.configure_dev().map_err(|e| Error::DeviceOpen {
        dev_id,
        step: OpenStep::Configure,
        reason: e.to_string(),
    })?;

    Ok(chosen)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn fmts(rates: &[u32], channels: &[u8], formats: &[SampleFormat]) -> SupportedFormats {
        SupportedFormats {
            rates: rates.to_vec(),
            channel_counts: channels.to_vec(),
            formats: formats.to_vec(),
        }
    }

    #[test]
    fn exact_match_is_preferred() {
        let requested = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
        let supported = fmts(&[44_100, 48_000], &[2, 6], &[SampleFormat::S16LE, SampleFormat::F32LE]);
        let chosen = select_format(0, requested, &supported).unwrap();
        assert_eq!(chosen.rate_hz, 48_000);
        assert_eq!(chosen.num_channels, 2);
        assert_eq!(chosen.sample_format, SampleFormat::S16LE);
    }

    #[test]
    fn rate_falls_back_to_integer_multiple() {
        let requested = AudioFormat::new(SampleFormat::S16LE, 44_100, 2);
        let supported = fmts(&[88_200], &[2], &[SampleFormat::S16LE]);
        let chosen = select_format(0, requested, &supported).unwrap();
        assert_eq!(chosen.rate_hz, 88_200);
    }

    #[test]
    fn channels_fall_back_to_preferred_stereo() {
        let requested = AudioFormat::new(SampleFormat::S16LE, 48_000, 4);
        let supported = fmts(&[48_000], &[2, 6], &[SampleFormat::S16LE]);
        let chosen = select_format(0, requested, &supported).unwrap();
        assert_eq!(chosen.num_channels, 2);
    }

    #[test]
    fn empty_supported_set_is_invalid_format() {
        let requested = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
        let supported = SupportedFormats::default();
        assert!(matches!(select_format(3, requested, &supported), Err(Error::InvalidFormat { dev_id: 3 })));
    }

    #[test]
    fn wake_up_scheduling_serves_next_cycle_at_cb_level() {
        let mut dev = mock::MockDevice::new(0, DeviceDirection::Output, 1024);
        let frames = dev.frames_to_play_in_sleep(800, 256, true, 48);
        assert_eq!(frames, 544);
    }

    #[test]
    fn wake_up_scheduling_without_streams_uses_idle_floor() {
        let mut dev = mock::MockDevice::new(0, DeviceDirection::Output, 1024);
        let frames = dev.frames_to_play_in_sleep(800, 256, false, 240);
        assert_eq!(frames, 560);
    }
}
