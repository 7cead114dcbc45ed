//! Bridges `mixbus-server`'s pull-based [`IoDevice`] capability trait to
//! `cpal`'s push/callback stream model.
//!
//! The audio thread's own service cycle calls `get_buffer`/`put_buffer`
//! on its own schedule; `cpal` instead calls into a closure from its own
//! realtime thread whenever the platform backend wants more (or has
//! more) data. A shared [`RingBuffer`] behind a [`Mutex`] bridges the
//! two: the `cpal` callback is the producer for input devices and the
//! consumer for output devices, and [`IoDevice::get_buffer`]/
//! [`IoDevice::put_buffer`] are the other end of the same ring, exactly
//! the "hardware buffer" role `mixbus-core`'s ring buffer documents
//! itself as filling.
//!
//! Every device this adapter opens is negotiated as 32-bit float
//! (`cpal::SampleFormat::F32`) so no sample-format conversion happens at
//! the `cpal` boundary itself — the ring already stores `f32`, and the
//! mixing/converter pipeline in `mixbus-server` handles any further
//! conversion against the stream's own declared format.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};

use mixbus_core::format::{AudioFormat, SampleFormat};
use mixbus_core::ring::RingBuffer;
use mixbus_server::error::{Error as ServerError, OpenStep, Result as ServerResult};
use mixbus_server::iodev::{DeviceDirection, DeviceInfo, IoDevice, SupportedFormats};

use crate::error::{CliError, CliResult};

pub struct CpalIoDevice {
    info: DeviceInfo,
    direction: DeviceDirection,
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream: Option<cpal::Stream>,
    ring: Arc<Mutex<RingBuffer>>,
    buffer_frames: u32,
    scratch: Vec<f32>,
}

impl CpalIoDevice {
    /// Wraps a `cpal::Device` as an [`IoDevice`]. `buffer_frames` must be
    /// a power of two; it becomes the shared ring's capacity and is
    /// independent of whatever period size `cpal` ends up choosing.
    pub fn new(idx: u32, direction: DeviceDirection, device: cpal::Device, buffer_frames: u32) -> CliResult<Self> {
        let name = device.name().unwrap_or_else(|_| format!("cpal-{idx}"));
        let default_config = match direction {
            DeviceDirection::Output => device.default_output_config(),
            DeviceDirection::Input => device.default_input_config(),
        }
        .map_err(|e| CliError::Cpal(e.to_string()))?;
        let channels = default_config.channels() as usize;

        Ok(Self {
            info: DeviceInfo { idx, name },
            direction,
            device,
            config: default_config,
            stream: None,
            ring: Arc::new(Mutex::new(RingBuffer::new(buffer_frames, channels))),
            buffer_frames,
            scratch: vec![0.0; buffer_frames as usize * channels],
        })
    }

    /// Picks the highest-rate `f32` config available, clamped toward
    /// 48 kHz, since everything downstream of `cpal` speaks `f32`
    /// natively and there is no reason to prefer a narrower range.
    fn select_f32_config(&self) -> CliResult<cpal::SupportedStreamConfig> {
        let ranges: Vec<cpal::SupportedStreamConfigRange> = match self.direction {
            DeviceDirection::Output => self.device.supported_output_configs(),
            DeviceDirection::Input => self.device.supported_input_configs(),
        }
        .map_err(|e| CliError::Cpal(e.to_string()))?
        .collect();

        let chosen = ranges
            .into_iter()
            .filter(|r| r.sample_format() == cpal::SampleFormat::F32)
            .max_by_key(|r| r.max_sample_rate().0)
            .ok_or_else(|| CliError::Cpal("no f32 stream configuration available on this device".to_owned()))?;

        let desired = 48_000u32.clamp(chosen.min_sample_rate().0, chosen.max_sample_rate().0);
        Ok(chosen.with_sample_rate(cpal::SampleRate(desired)))
    }
}

impl std::fmt::Debug for CpalIoDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalIoDevice")
            .field("info", &self.info)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl IoDevice for CpalIoDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn direction(&self) -> DeviceDirection {
        self.direction
    }

    fn buffer_size(&self) -> u32 {
        self.buffer_frames
    }

    fn update_supported_formats(&mut self) -> SupportedFormats {
        match self.select_f32_config() {
            Ok(cfg) => {
                self.config = cfg.clone();
                SupportedFormats {
                    rates: vec![cfg.sample_rate().0],
                    channel_counts: vec![cfg.channels() as u8],
                    formats: vec![SampleFormat::F32LE],
                }
            }
            Err(e) => {
                tracing::warn!(dev_id = self.info.idx, error = %e, "no usable f32 config");
                SupportedFormats::default()
            }
        }
    }

    fn open_dev(&mut self, format: AudioFormat) -> ServerResult<()> {
        let stream_config = cpal::StreamConfig {
            channels: format.num_channels as u16,
            sample_rate: cpal::SampleRate(format.rate_hz),
            buffer_size: cpal::BufferSize::Default,
        };
        let dev_id = self.info.idx;
        let ring = Arc::clone(&self.ring);

        let build = match self.direction {
            DeviceDirection::Output => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut ring = ring.lock().unwrap();
                    let channels = ring.channels();
                    let n = ring.read(data) as usize;
                    data[n * channels..].fill(0.0);
                },
                move |err| tracing::error!(dev_id, %err, "cpal output stream error"),
                None,
            ),
            DeviceDirection::Input => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    ring.lock().unwrap().write(data);
                },
                move |err| tracing::error!(dev_id, %err, "cpal input stream error"),
                None,
            ),
        };

        let stream = build.map_err(|e| ServerError::DeviceOpen {
            dev_id,
            step: OpenStep::Configure,
            reason: e.to_string(),
        })?;
        stream.play().map_err(|e| ServerError::DeviceOpen {
            dev_id,
            step: OpenStep::Configure,
            reason: e.to_string(),
        })?;

        self.stream = Some(stream);
        tracing::info!(
            dev_id,
            channels = stream_config.channels,
            sample_rate = stream_config.sample_rate.0,
            "cpal stream opened"
        );
        Ok(())
    }

    fn close_dev(&mut self) {
        self.stream = None;
        self.ring.lock().unwrap().reset();
    }

    fn frames_queued(&mut self, _now: std::time::Instant) -> i32 {
        self.ring.lock().unwrap().readable() as i32
    }

    fn get_buffer(&mut self, num_frames: u32) -> (&mut [f32], u32) {
        let mut ring = self.ring.lock().unwrap();
        let channels = ring.channels();
        let n = match self.direction {
            DeviceDirection::Output => num_frames.min(ring.writable()),
            DeviceDirection::Input => num_frames.min(ring.readable()),
        };
        let needed = n as usize * channels;
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
        match self.direction {
            DeviceDirection::Output => self.scratch[..needed].fill(0.0),
            DeviceDirection::Input => {
                ring.read(&mut self.scratch[..needed]);
            }
        }
        drop(ring);
        (&mut self.scratch[..needed], n)
    }

    fn put_buffer(&mut self, nwritten: u32) {
        if self.direction == DeviceDirection::Output {
            let mut ring = self.ring.lock().unwrap();
            let channels = ring.channels();
            let n = (nwritten as usize * channels).min(self.scratch.len());
            ring.write(&self.scratch[..n]);
        }
    }
}
