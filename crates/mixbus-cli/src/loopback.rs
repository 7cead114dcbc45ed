//! Loopback smoke test: opens a real output device through `cpal`,
//! attaches a sine-tone stream, and drives the audio thread's own
//! service cycle against it for a fixed duration. This is the minimal
//! end-to-end exercise of the server crate against a real backend; it
//! is not itself part of the routing core, the way `sonido-cli`'s
//! `play`/`realtime` commands aren't part of `sonido-core`.

use std::time::{Duration, Instant};

use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait};

use mixbus_core::format::{AudioFormat, SampleFormat};
use mixbus_server::{AudioThread, Direction, Effects, RStream, StreamFlags, StreamId};

use crate::cpal_device::CpalIoDevice;
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct LoopbackArgs {
    /// Output device name filter (substring match); the system default
    /// is used if omitted.
    #[arg(long)]
    pub output: Option<String>,

    /// How long to run the tone before exiting.
    #[arg(long, default_value_t = 2)]
    pub seconds: u64,

    /// Tone frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    pub tone_hz: f32,
}

const BUFFER_FRAMES: u32 = 2048;
const STREAM_ID: StreamId = 0x0001_0001;
const TONE_AMPLITUDE: f32 = 0.2;

pub fn run(args: LoopbackArgs) -> CliResult<()> {
    let host = cpal::default_host();
    let device = match &args.output {
        Some(name) => find_output(&host, name)?,
        None => host.default_output_device().ok_or(CliError::NoDevice)?,
    };

    let cpal_device = CpalIoDevice::new(0, mixbus_server::DeviceDirection::Output, device, BUFFER_FRAMES)?;

    let mut thread = AudioThread::new();
    let now = Instant::now();
    thread.add_open_dev(Box::new(cpal_device), BUFFER_FRAMES / 4, now)?;

    let stream_format = AudioFormat::new(SampleFormat::F32LE, 48_000, 2);
    thread.add_stream(RStream::new(
        STREAM_ID,
        Direction::Output,
        stream_format,
        BUFFER_FRAMES,
        BUFFER_FRAMES / 4,
        StreamFlags::empty(),
        Effects::empty(),
        now,
    ));
    thread.attach_stream_to_dev(STREAM_ID, 0, BUFFER_FRAMES as usize)?;

    tracing::info!(seconds = args.seconds, tone_hz = args.tone_hz, "starting loopback tone");

    let channels = stream_format.num_channels as usize;
    let phase_step = std::f32::consts::TAU * args.tone_hz / stream_format.rate_hz as f32;
    let mut phase = 0.0f32;
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let cycle_period = Duration::from_millis(10);

    while Instant::now() < deadline {
        if let Some(stream) = thread.stream_mut(STREAM_ID) {
            let writable = stream.shm().writable();
            if writable > 0 {
                let mut samples = vec![0.0f32; writable as usize * channels];
                for frame in samples.chunks_mut(channels) {
                    let v = phase.sin() * TONE_AMPLITUDE;
                    frame.fill(v);
                    phase += phase_step;
                }
                stream.shm().write(&samples);
            }
        }

        thread.run_cycle(Instant::now());
        for event in thread.drain_events() {
            tracing::debug!(?event, "audio thread event");
        }

        std::thread::sleep(cycle_period);
    }

    thread.rm_open_dev(0);
    Ok(())
}

fn find_output(host: &cpal::Host, name: &str) -> CliResult<cpal::Device> {
    let needle = name.to_lowercase();
    host.output_devices()
        .map_err(|e| CliError::Cpal(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n.to_lowercase().contains(&needle)))
        .ok_or_else(|| CliError::DeviceNotFound(name.to_owned()))
}
