//! Destinations for raw stream bytes
//!
//! Decoding is outside this crate; the engine only hands encoded chunks to an
//! [`AudioSink`] supplied by the host.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Consumer of encoded stream chunks.
///
/// Called from the transport task, so implementations must not block.
pub trait AudioSink: Send + Sync + 'static {
    fn write(&self, chunk: Bytes);

    /// Output gain in `0.0..=1.0`
    fn set_volume(&self, volume: f32);
}

/// Sink that discards all data
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&self, _chunk: Bytes) {}

    fn set_volume(&self, _volume: f32) {}
}

/// Forwards chunks to a decoder thread over a bounded channel.
///
/// A full channel drops the chunk rather than stalling the network read.
pub struct ChannelSink {
    tx: Sender<Bytes>,
    /// f32 bits
    volume: AtomicU32,
    chunks_forwarded: AtomicU64,
    chunks_dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiving end for the decoder
    pub fn new(capacity: usize) -> (Self, Receiver<Bytes>) {
        let (tx, rx) = bounded(capacity);
        let sink = Self {
            tx,
            volume: AtomicU32::new(1.0f32.to_bits()),
            chunks_forwarded: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            chunks_forwarded: self.chunks_forwarded.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
        }
    }
}

impl AudioSink for ChannelSink {
    fn write(&self, chunk: Bytes) {
        match self.tx.try_send(chunk) {
            Ok(()) => {
                self.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// Sink statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkStats {
    pub chunks_forwarded: u64,
    pub chunks_dropped: u64,
}

impl SinkStats {
    pub fn drop_rate(&self) -> f32 {
        let total = self.chunks_forwarded + self.chunks_dropped;
        if total == 0 {
            0.0
        } else {
            self.chunks_dropped as f32 / total as f32
        }
    }
}
