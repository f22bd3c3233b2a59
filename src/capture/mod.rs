pub mod buffer;
pub mod command;
pub mod device;
pub mod engine;
pub mod frame;
pub mod sim;
pub mod timestamp;
pub mod transform;

pub use buffer::{AllocationMode, FrameBuffer, PixelFormatDescriptor};
pub use device::{CameraDevice, CaptureApi, FeatureAccess};
pub use engine::{StreamState, StreamingEngine};
pub use frame::{Encoding, Frame, FrameMetadata, PixelFormat, Stamp};
