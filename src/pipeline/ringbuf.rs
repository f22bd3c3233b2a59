//! Drop-oldest ring buffer for handing frames off the completion thread

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::Frame;

/// Bounded frame queue that overwrites the oldest frame when full.
///
/// Consumer callbacks run on the engine's dispatcher and must return quickly;
/// pushing here is O(1) and never waits on the reader.
pub struct FrameRingBuffer {
    ring: HeapRb<Frame>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_written: AtomicUsize,
    frames_read: AtomicUsize,
    frames_dropped: AtomicUsize,
}

impl FrameRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: push a frame, evicting the oldest one if full.
    ///
    /// Returns true if a frame was evicted.
    pub fn push(&mut self, frame: Frame) -> bool {
        let evicted = self.ring.push_overwrite(frame).is_some();
        if evicted {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
        evicted
    }

    /// Consumer: oldest frame still held
    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.ring.try_pop()?;
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// (written, read, dropped)
    pub fn stats(&self) -> (usize, usize, usize) {
        (
            self.stats.frames_written.load(Ordering::Relaxed),
            self.stats.frames_read.load(Ordering::Relaxed),
            self.stats.frames_dropped.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{Encoding, FrameMetadata, PixelFormat, Stamp};
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(frame_id: u64) -> Frame {
        Frame {
            data: Bytes::from_static(&[0u8; 4]),
            meta: Arc::new(FrameMetadata {
                frame_id,
                width: 2,
                height: 2,
                step: 2,
                encoding: Encoding::Mono8,
                format: PixelFormat::MONO8,
                is_bigendian: false,
                stamp: Stamp::default(),
            }),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let mut ring = FrameRingBuffer::new(2);
        assert!(!ring.push(frame(1)));
        assert!(!ring.push(frame(2)));
        assert!(ring.push(frame(3)));

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop().map(|f| f.meta.frame_id), Some(2));
        assert_eq!(ring.pop().map(|f| f.meta.frame_id), Some(3));
        assert!(ring.pop().is_none());
        assert_eq!(ring.stats(), (3, 2, 1));
    }
}
