pub mod ringbuf;
pub mod stats;

pub use ringbuf::FrameRingBuffer;
pub use stats::{StatsSnapshot, StreamStats};
