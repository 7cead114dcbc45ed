//! Synchronous main-thread <-> audio-thread command channel (`spec.md
//! §4.5`).
//!
//! `spec.md §9` flags "alerts/callbacks with data pointers" for
//! re-architecture into "typed channel-based pub/sub... no hidden
//! callback re-entrancy." The command direction here is simpler than a
//! pub/sub fan-out: exactly one audio thread listens, and the main
//! thread blocks for a synchronous reply, so a pair of
//! `std::sync::mpsc` channels (command in, reply out) is the idiomatic
//! fit rather than a broadcast primitive.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};

use crate::error::{Error, Result};
use crate::node::StreamId;

/// A command sent from the main thread to the audio thread.
///
/// `spec.md §4.5`: "Every message from main thread to audio thread
/// carries a length and a tag" — the tag is this enum's discriminant;
/// length is implicit in Rust's typed payloads.
#[derive(Debug, Clone)]
pub enum Message {
    /// Attaches a stream to a device.
    AddStream {
        /// Stream to attach.
        stream_id: StreamId,
        /// Device to attach it to.
        dev_id: u32,
    },
    /// Detaches a stream from a device.
    RmStream {
        /// Stream to detach.
        stream_id: StreamId,
    },
    /// Opens a device on the audio thread.
    AddOpenDev {
        /// Device to open.
        dev_id: u32,
    },
    /// Closes a device on the audio thread.
    RmOpenDev {
        /// Device to close.
        dev_id: u32,
    },
    /// Begins draining a stream toward removal.
    DrainStream {
        /// Stream to drain.
        stream_id: StreamId,
        /// Deadline after which the stream is considered drained
        /// regardless of remaining shm fill level.
        deadline_ms: u64,
    },
    /// Requests a debug-info dump (diagnostics only; no audio-thread
    /// state is mutated).
    DumpDebugInfo,
    /// Asks the audio thread to exit its loop.
    Stop,
}

/// The main thread's half of the bus: send a message, block for its
/// reply (`spec.md §4.5`: "writes the message, then synchronously reads
/// a reply... before returning to its caller").
pub struct MainEndpoint {
    commands: Sender<(Message, SyncSender<Result<()>>)>,
}

impl MainEndpoint {
    /// Sends `msg` and blocks until the audio thread replies.
    ///
    /// # Errors
    /// Returns whatever error the audio thread's handler produced, or
    /// [`Error::UnknownMessageTag`] if the audio thread has already
    /// exited (the reply channel was dropped without a reply — treated
    /// the same as an unrecognized request since no handler ran).
    pub fn send(&self, msg: Message) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.commands
            .send((msg, reply_tx))
            .map_err(|_| Error::UnknownMessageTag(0))?;
        reply_rx.recv().map_err(|_| Error::UnknownMessageTag(0))?
    }
}

/// The audio thread's half of the bus: pulls messages and must send
/// exactly one reply per message it receives before continuing.
pub struct AudioEndpoint {
    commands: Receiver<(Message, SyncSender<Result<()>>)>,
}

impl AudioEndpoint {
    /// Blocks until a message arrives, or returns `None` once every
    /// [`MainEndpoint`] has been dropped.
    pub fn recv(&self) -> Option<(Message, SyncSender<Result<()>>)> {
        self.commands.recv().ok()
    }

    /// Non-blocking poll, for interleaving with the audio cycle's own
    /// wait (`spec.md §4.5`: the audio thread "suspends only at the
    /// epoll-like... wait between cycles").
    pub fn try_recv(&self) -> Option<(Message, SyncSender<Result<()>>)> {
        self.commands.try_recv().ok()
    }
}

/// Creates a connected `(MainEndpoint, AudioEndpoint)` pair.
#[must_use]
pub fn channel() -> (MainEndpoint, AudioEndpoint) {
    let (tx, rx) = mpsc::channel();
    (MainEndpoint { commands: tx }, AudioEndpoint { commands: rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_stream_round_trips_a_reply() {
        let (main, audio) = channel();
        let handle = std::thread::spawn(move || {
            let (msg, reply) = audio.recv().unwrap();
            assert!(matches!(msg, Message::AddStream { stream_id: 7, dev_id: 0 }));
            reply.send(Ok(())).unwrap();
        });
        main.send(Message::AddStream { stream_id: 7, dev_id: 0 }).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn handler_error_propagates_to_sender() {
        let (main, audio) = channel();
        let handle = std::thread::spawn(move || {
            let (_msg, reply) = audio.recv().unwrap();
            reply.send(Err(Error::DeviceNotFound(5))).unwrap();
        });
        let err = main.send(Message::RmOpenDev { dev_id: 5 }).unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(5)));
        handle.join().unwrap();
    }
}
