//! The audio loop (`spec.md §4.4`): services every open device each
//! cycle, mixing streams into output devices and fanning input devices
//! out to their attached streams.

use std::collections::HashMap;
use std::time::Instant;

use mixbus_core::buffer_share::BufferShare;
use mixbus_core::convert::sample_format;
use mixbus_core::convert::FormatConverter;
use mixbus_core::format::{AudioFormat, SampleFormat};
use mixbus_core::ramp::Ramp;
use mixbus_core::rate_estimator::RateEstimator;

use crate::dev_stream::DevStream;
use crate::error::{Error, Result};
use crate::event::AudioThreadEvent;
use crate::iodev::{open_device, DeviceDirection, DeviceState, IoDevice};
use crate::node::StreamId;
use crate::reset::ResetLimiter;
use crate::stream::RStream;

/// Frames the default no-stream path pads with zeros before the device
/// is considered serviced (`spec.md §4.4`: "pad with zeros up to `2 *
/// min_cb_level`").
const NO_STREAM_PAD_MULTIPLE: u32 = 2;

struct DeviceEntry {
    device: Box<dyn IoDevice>,
    format: AudioFormat,
    state: DeviceState,
    buf_share: BufferShare,
    rate_est: RateEstimator,
    ramp: Ramp,
    dev_streams: Vec<DevStream>,
    reset_limiter: ResetLimiter,
    min_cb_level: u32,
    num_underruns: u32,
    num_samples_dropped: u32,
    num_reset: u32,
    last_overrun_level: Option<u32>,
    global_volume_scaler: f32,
    muted: bool,
}

/// Owns every open device and the streams attached to them, and drives
/// one cycle of the audio loop per [`AudioThread::run_cycle`].
///
/// This is the audio thread's exclusive-ownership domain (`spec.md §5`:
/// "per-device state is exclusively owned by the audio thread while the
/// device is open"). A deployment reaches this state only from within
/// the thread spawned by [`crate::thread_guard::spawn_audio_thread`];
/// [`AudioThread`] itself enforces no threading policy — that's
/// [`crate::thread_guard`]'s job, so tests drive it directly from the
/// test thread.
pub struct AudioThread {
    devices: HashMap<u32, DeviceEntry>,
    streams: HashMap<StreamId, RStream>,
    events: Vec<AudioThreadEvent>,
}

impl AudioThread {
    /// An audio thread with no open devices or streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            streams: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Opens `device`, choosing a format via [`open_device`], and enters
    /// [`DeviceState::Open`] (`spec.md §3` device lifecycle).
    ///
    /// # Errors
    /// Propagates [`Error::DeviceOpen`] / [`Error::InvalidFormat`] from
    /// the open sequence.
    pub fn add_open_dev(&mut self, mut device: Box<dyn IoDevice>, min_cb_level: u32, now: Instant) -> Result<()> {
        let dev_id = device.info().idx;
        let buf_sz = device.buffer_size();
        let supported = device.update_supported_formats();
        let requested = AudioFormat::new(
            supported.formats.first().copied().unwrap_or(SampleFormat::S16LE),
            supported.rates.first().copied().unwrap_or(48_000),
            supported.channel_counts.first().copied().unwrap_or(2),
        );
        let format = open_device(device.as_mut(), dev_id, requested)?;

        self.devices.insert(
            dev_id,
            DeviceEntry {
                device,
                format,
                state: DeviceState::Open,
                buf_share: BufferShare::new(buf_sz),
                rate_est: RateEstimator::new(format.rate_hz, now),
                ramp: Ramp::new(),
                dev_streams: Vec::new(),
                reset_limiter: ResetLimiter::new(now),
                min_cb_level,
                num_underruns: 0,
                num_samples_dropped: 0,
                num_reset: 0,
                last_overrun_level: None,
                global_volume_scaler: 1.0,
                muted: false,
            },
        );
        Ok(())
    }

    /// Closes and removes a device.
    pub fn rm_open_dev(&mut self, dev_id: u32) {
        if let Some(mut entry) = self.devices.remove(&dev_id) {
            entry.device.close_dev();
        }
    }

    /// Registers a stream.
    pub fn add_stream(&mut self, stream: RStream) {
        self.streams.insert(stream.id(), stream);
    }

    /// Direct access to a registered stream, for callers that feed or
    /// drain its shared buffer from outside the audio cycle (e.g. a
    /// signal generator or a capture consumer running on another
    /// thread while this one is between [`AudioThread::run_cycle`]
    /// calls).
    pub fn stream_mut(&mut self, stream_id: StreamId) -> Option<&mut RStream> {
        self.streams.get_mut(&stream_id)
    }

    /// Attaches an existing stream to a device, building the converter
    /// for that stream's direction (`spec.md §4.2`).
    ///
    /// # Errors
    /// Returns [`Error::StreamNotFound`] or [`Error::DeviceNotFound`] if
    /// either id is unknown.
    pub fn attach_stream_to_dev(&mut self, stream_id: StreamId, dev_id: u32, max_frames: usize) -> Result<()> {
        let stream_fmt = self.streams.get(&stream_id).ok_or(Error::StreamNotFound(stream_id))?.format();
        let entry = self.devices.get_mut(&dev_id).ok_or(Error::DeviceNotFound(dev_id))?;
        let converter = match entry.device.direction() {
            DeviceDirection::Output => FormatConverter::new(stream_fmt, entry.format, max_frames),
            DeviceDirection::Input => FormatConverter::new(entry.format, stream_fmt, max_frames),
        };
        entry.buf_share.add(stream_id).map_err(Error::Core)?;
        entry.dev_streams.push(DevStream::new(stream_id, dev_id, converter));
        Ok(())
    }

    /// Detaches a stream from a device, but leaves it in the registry.
    pub fn detach_stream_from_dev(&mut self, stream_id: StreamId, dev_id: u32) {
        if let Some(entry) = self.devices.get_mut(&dev_id) {
            entry.dev_streams.retain(|ds| ds.stream_id() != stream_id);
            entry.buf_share.rm(stream_id);
        }
    }

    /// Removes a stream entirely, from every device it was attached to.
    pub fn rm_stream(&mut self, stream_id: StreamId) {
        self.streams.remove(&stream_id);
        for entry in self.devices.values_mut() {
            entry.dev_streams.retain(|ds| ds.stream_id() != stream_id);
            entry.buf_share.rm(stream_id);
        }
    }

    /// Drains every event raised since the last call.
    pub fn drain_events(&mut self) -> Vec<AudioThreadEvent> {
        std::mem::take(&mut self.events)
    }

    /// Runs one service cycle across every open device.
    pub fn run_cycle(&mut self, now: Instant) {
        let dev_ids: Vec<u32> = self.devices.keys().copied().collect();
        for dev_id in dev_ids {
            match self.devices[&dev_id].device.direction() {
                DeviceDirection::Output => self.service_output_device(dev_id, now),
                DeviceDirection::Input => self.service_input_device(dev_id, now),
            }
        }
    }

    /// Services one output device for one cycle (`spec.md §4.4`, output
    /// path): mixes every dev-stream with data into the cycle's write
    /// window, applies the device ramp and mute, and commits the mix.
    fn service_output_device(&mut self, dev_id: u32, now: Instant) {
        let min_cb_level = self.devices[&dev_id].min_cb_level;

        let frames_queued = self.devices.get_mut(&dev_id).unwrap().device.frames_queued(now);
        if frames_queued < 0 {
            self.handle_severe_underrun(dev_id, now);
            return;
        }
        let hw_level = frames_queued as u32;
        let buffer_size = self.devices[&dev_id].device.buffer_size();
        self.devices.get_mut(&dev_id).unwrap().rate_est.check(hw_level, now);

        let write_limit = buffer_size.saturating_sub(hw_level);
        if write_limit == 0 {
            return;
        }

        let channels = self.devices[&dev_id].format.num_channels as usize;
        let dev_sample_format = self.devices[&dev_id].format.sample_format;
        let stream_ids: Vec<StreamId> = self.devices[&dev_id].dev_streams.iter().map(DevStream::stream_id).collect();

        let mut mix_buf = vec![0.0f32; write_limit as usize * channels];
        let mut any_stream_has_data = false;

        for stream_id in stream_ids {
            let Some(stream) = self.streams.get_mut(&stream_id) else { continue };
            let readable = stream.shm().readable().min(write_limit);
            if readable == 0 {
                continue;
            }
            any_stream_has_data = true;

            let stream_channels = stream.format().num_channels as usize;
            let mut raw = vec![0.0f32; readable as usize * stream_channels];
            stream.shm().read(&mut raw);
            let scaler = stream.volume_scaler();
            let stream_sample_format = stream.format().sample_format;

            let mut wire = Vec::new();
            sample_format::encode_from_f32(stream_sample_format, &raw, &mut wire);

            let entry = self.devices.get_mut(&dev_id).unwrap();
            let dev_stream = entry.dev_streams.iter_mut().find(|ds| ds.stream_id() == stream_id).unwrap();
            let mut converted = Vec::new();
            let (_consumed, produced) = dev_stream.converter().process(&wire, &mut converted);

            let mut pcm = Vec::new();
            sample_format::decode_to_f32(dev_sample_format, &converted, &mut pcm);

            let effective_scaler = scaler * entry.global_volume_scaler;
            for (i, s) in pcm.iter().enumerate() {
                if i < mix_buf.len() {
                    mix_buf[i] = (mix_buf[i] + s * effective_scaler).clamp(-1.0, 1.0);
                }
            }

            dev_stream.advance_mix_offset(produced as u32);
            entry.buf_share.offset_update(stream_id, produced as u32);
        }

        if !any_stream_has_data {
            self.enter_no_stream_run(dev_id, min_cb_level);
            return;
        }

        let entry = self.devices.get_mut(&dev_id).unwrap();
        entry.state = DeviceState::NormalRun;

        if entry.ramp.is_active() {
            let scaler = entry.ramp.current_scaler();
            for s in mix_buf.iter_mut() {
                *s = (*s * scaler).clamp(-1.0, 1.0);
            }
            entry.ramp.advance(write_limit);
        }
        if entry.muted {
            mix_buf.fill(0.0);
        }

        let (dest, avail) = entry.device.get_buffer(write_limit);
        let n = (avail as usize * channels).min(dest.len()).min(mix_buf.len());
        dest[..n].copy_from_slice(&mix_buf[..n]);
        entry.device.put_buffer(avail.min(write_limit));
        entry.rate_est.add_frames(write_limit as i32);

        let (_advanced, overshot) = entry.buf_share.all_streams_written(write_limit);
        if !overshot.is_empty() {
            self.events.push(AudioThreadEvent::OffsetExceedsAvailable { dev_id, streams: overshot });
        }

        if hw_level == buffer_size && 3 * entry.min_cb_level < buffer_size {
            if entry.last_overrun_level != Some(hw_level) {
                self.events.push(AudioThreadEvent::DeviceOverrun { dev_id });
                entry.last_overrun_level = Some(hw_level);
            }
        } else {
            entry.last_overrun_level = None;
        }
    }

    /// Handles the no-streams-have-data path (`spec.md §4.4` step 3).
    fn enter_no_stream_run(&mut self, dev_id: u32, min_cb_level: u32) {
        let entry = self.devices.get_mut(&dev_id).unwrap();
        if entry.state != DeviceState::NoStreamRun {
            let _ = entry.device.no_stream(true);
            entry.state = DeviceState::NoStreamRun;
        }
        if entry.device.is_free_running() || entry.device.output_underrun() {
            return;
        }
        let pad = min_cb_level * NO_STREAM_PAD_MULTIPLE;
        let (dest, avail) = entry.device.get_buffer(pad);
        dest.fill(0.0);
        entry.device.put_buffer(avail.min(pad));
        entry.num_underruns += 1;
        self.events.push(AudioThreadEvent::Underrun { dev_id, count: entry.num_underruns });
    }

    /// Handles a severe underrun (`-EPIPE`): counted and treated as a
    /// reset condition (`spec.md §4.4`).
    fn handle_severe_underrun(&mut self, dev_id: u32, now: Instant) {
        self.events.push(AudioThreadEvent::SevereUnderrun { dev_id });
        self.reset_request(dev_id, now);
    }

    /// Requests a reset of `dev_id`, subject to the token-bucket rate
    /// limit (`spec.md §4.4`, §8 invariant 9).
    pub fn reset_request(&mut self, dev_id: u32, now: Instant) -> bool {
        let Some(entry) = self.devices.get_mut(&dev_id) else { return false };
        if entry.reset_limiter.try_request(now) {
            entry.num_reset += 1;
            self.events.push(AudioThreadEvent::ResetGranted { dev_id });
            true
        } else {
            false
        }
    }

    /// Services one input device for one cycle (`spec.md §4.4`, input
    /// path): captures hardware frames, fans them out to every attached
    /// stream, then advances the buffer-share write point.
    fn service_input_device(&mut self, dev_id: u32, now: Instant) {
        let frames_queued = self.devices.get_mut(&dev_id).unwrap().device.frames_queued(now);
        if frames_queued < 0 {
            self.handle_severe_underrun(dev_id, now);
            return;
        }
        let available = frames_queued as u32;
        if available == 0 {
            return;
        }

        let entry = self.devices.get_mut(&dev_id).unwrap();
        let channels = entry.format.num_channels as usize;
        let (src, avail) = entry.device.get_buffer(available);
        let n = (avail as usize * channels).min(src.len());
        let captured = src[..n].to_vec();
        entry.device.put_buffer(avail);

        let mut wire = Vec::new();
        sample_format::encode_from_f32(entry.format.sample_format, &captured, &mut wire);

        let stream_ids: Vec<StreamId> = entry.dev_streams.iter().map(DevStream::stream_id).collect();
        let mut min_delivered = avail;

        for stream_id in stream_ids {
            let entry = self.devices.get_mut(&dev_id).unwrap();
            let dev_stream = entry.dev_streams.iter_mut().find(|ds| ds.stream_id() == stream_id).unwrap();
            let mut converted = Vec::new();
            let (_consumed, produced) = dev_stream.converter().process(&wire, &mut converted);

            let Some(stream) = self.streams.get_mut(&stream_id) else { continue };
            let mut pcm = Vec::new();
            sample_format::decode_to_f32(stream.format().sample_format, &converted, &mut pcm);
            let written = stream.shm().write(&pcm);

            let entry = self.devices.get_mut(&dev_id).unwrap();
            if written < produced as u32 {
                let dropped = produced as u32 - written;
                entry.num_samples_dropped += dropped;
                self.events.push(AudioThreadEvent::Overrun { dev_id, frames_dropped: dropped });
            }
            min_delivered = min_delivered.min(produced as u32);
            entry.buf_share.offset_update(stream_id, produced as u32);
        }

        let entry = self.devices.get_mut(&dev_id).unwrap();
        entry.buf_share.new_write_point();
        entry.rate_est.add_frames(-(min_delivered as i32));
    }
}

impl Default for AudioThread {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::iodev::mock::MockDevice;
    use crate::stream::{Direction, Effects, StreamFlags};

    fn output_stream(id: StreamId, now: Instant) -> RStream {
        RStream::new(
            id,
            Direction::Output,
            AudioFormat::new(SampleFormat::S16LE, 48_000, 2),
            1024,
            256,
            StreamFlags::empty(),
            Effects::empty(),
            now,
        )
    }

    /// `spec.md §8` scenario S1: two streams whose samples cancel mix
    /// toward silence without raising an underrun.
    #[test]
    fn two_canceling_streams_mix_without_underrun() {
        let now = Instant::now();
        let mut thread = AudioThread::new();
        thread.add_open_dev(Box::new(MockDevice::new(0, DeviceDirection::Output, 1024)), 256, now).unwrap();

        thread.add_stream(output_stream(1, now));
        thread.add_stream(output_stream(2, now));
        thread.attach_stream_to_dev(1, 0, 512).unwrap();
        thread.attach_stream_to_dev(2, 0, 512).unwrap();

        let mut fill_a = Vec::new();
        let mut fill_b = Vec::new();
        for _ in 0..256 {
            fill_a.extend_from_slice(&[8_000.0 / 32_768.0, -8_000.0 / 32_768.0]);
            fill_b.extend_from_slice(&[-8_000.0 / 32_768.0, 8_000.0 / 32_768.0]);
        }
        thread.streams.get_mut(&1).unwrap().shm().write(&fill_a);
        thread.streams.get_mut(&2).unwrap().shm().write(&fill_b);

        thread.run_cycle(now);

        let events = thread.drain_events();
        assert!(events.iter().all(|e| !matches!(e, AudioThreadEvent::Underrun { .. })));
    }

    /// `spec.md §8` scenario S3: ten consecutive empty cycles raise
    /// exactly ten underrun events.
    #[test]
    fn empty_stream_increments_underrun_count() {
        let now = Instant::now();
        let mut thread = AudioThread::new();
        thread.add_open_dev(Box::new(MockDevice::new(0, DeviceDirection::Output, 1024)), 256, now).unwrap();
        thread.add_stream(output_stream(1, now));
        thread.attach_stream_to_dev(1, 0, 512).unwrap();

        for _ in 0..10 {
            thread.run_cycle(now);
        }

        let underruns =
            thread.drain_events().into_iter().filter(|e| matches!(e, AudioThreadEvent::Underrun { .. })).count();
        assert_eq!(underruns, 10);
    }

    /// `spec.md §8` scenario S4, exercised through the audio thread's
    /// own `reset_request` entry point.
    #[test]
    fn reset_request_respects_token_bucket() {
        let now = Instant::now();
        let mut thread = AudioThread::new();
        thread.add_open_dev(Box::new(MockDevice::new(0, DeviceDirection::Output, 1024)), 256, now).unwrap();

        let granted = (0..7).filter(|_| thread.reset_request(0, now)).count();
        assert_eq!(granted, 5, "spec.md S4: exactly 5 of 7 back-to-back requests are granted");
    }

    #[test]
    fn detaching_a_stream_stops_it_from_being_mixed() {
        let now = Instant::now();
        let mut thread = AudioThread::new();
        thread.add_open_dev(Box::new(MockDevice::new(0, DeviceDirection::Output, 1024)), 256, now).unwrap();
        thread.add_stream(output_stream(1, now));
        thread.attach_stream_to_dev(1, 0, 512).unwrap();
        thread.detach_stream_from_dev(1, 0);

        thread.run_cycle(now);
        let underruns =
            thread.drain_events().into_iter().filter(|e| matches!(e, AudioThreadEvent::Underrun { .. })).count();
        assert_eq!(underruns, 1, "with no attached dev-streams the device should enter no-stream-run");
    }

    /// `spec.md §8` scenario S2: a 44.1kHz mono stream feeding a 48kHz
    /// stereo device, serviced over five 256-frame device cycles, lands
    /// within the round-trip tolerance of `frames_to_out/frames_to_in`.
    ///
    /// The device auto-drains exactly 256 frames per
    /// [`crate::iodev::IoDevice::frames_queued`] poll, so every cycle's
    /// write window is 256 frames regardless of how much of it the
    /// resampled stream data fills — the converter always commits a
    /// full, zero-padded window to the device. With the stream kept
    /// supplied throughout (no no-stream-run, no underrun), the device
    /// therefore receives exactly `5 * 256 = 1280` frames, inside the
    /// scenario's `[1279, 1281]` tolerance band.
    #[test]
    fn resample_and_mixdown_scenario_matches_frame_tolerance() {
        let now = Instant::now();
        let mut thread = AudioThread::new();
        let device = MockDevice::with_auto_drain(0, DeviceDirection::Output, 256, 256);
        let frames_committed = device.frames_committed_handle();
        thread.add_open_dev(Box::new(device), 64, now).unwrap();

        let stream = RStream::new(
            1,
            Direction::Output,
            AudioFormat::new(SampleFormat::S16LE, 44_100, 1),
            4096,
            1024,
            StreamFlags::empty(),
            Effects::empty(),
            now,
        );
        thread.add_stream(stream);
        thread.attach_stream_to_dev(1, 0, 4096).unwrap();

        let mut sine = Vec::with_capacity(4096);
        for i in 0..4096 {
            let phase = i as f32 * std::f32::consts::TAU * 1_000.0 / 44_100.0;
            sine.push(phase.sin());
        }
        thread.stream_mut(1).unwrap().shm().write(&sine);

        const CYCLES: u32 = 5;

        for _ in 0..CYCLES {
            thread.run_cycle(now);
        }

        let events = thread.drain_events();
        assert!(
            events.iter().all(|e| !matches!(
                e,
                AudioThreadEvent::Underrun { .. }
                    | AudioThreadEvent::SevereUnderrun { .. }
                    | AudioThreadEvent::DeviceOverrun { .. }
            )),
            "stream had enough data for all five cycles; no underrun/overrun should fire: {events:?}"
        );
        let total_written = frames_committed.load(Ordering::Relaxed);
        assert!(
            (1279..=1281).contains(&total_written),
            "total frames actually committed to the device should be within one frame of 1280, got {total_written}"
        );
    }
}
