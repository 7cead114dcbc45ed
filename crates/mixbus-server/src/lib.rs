//! Audio thread, stream registry, device backends, and message bus for
//! the mixbus routing server (`spec.md §4`).

pub mod audio_thread;
pub mod dev_stream;
pub mod error;
pub mod event;
pub mod iodev;
pub mod message_bus;
pub mod node;
pub mod reset;
pub mod shared_state;
pub mod stream;
pub mod thread_guard;

pub use audio_thread::AudioThread;
pub use error::{Error, Result};
pub use event::AudioThreadEvent;
pub use iodev::{DeviceDirection, DeviceInfo, DeviceState, IoDevice, SupportedFormats};
pub use node::{NodeId, StreamId};
pub use stream::{Direction, Effects, RStream, StreamFlags};
