//! Boundary to the vendor capture API
//!
//! The engine never talks to the vendor library directly. A binding
//! implements [`CameraDevice`] for an open camera session and the engine
//! drives it through these calls only.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::capture::frame::PixelFormat;
use crate::error::{ErrorCode, Result};
use crate::pipeline::StreamStats;

/// Standard feature names used by the engine
pub mod features {
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const ACQUISITION_START: &str = "AcquisitionStart";
    pub const ACQUISITION_STOP: &str = "AcquisitionStop";
    pub const DEVICE_TIMESTAMP_FREQUENCY: &str = "DeviceTimestampFrequency";
}

/// Metadata about a single device feature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureInfo {
    pub name: String,
    /// SFNC namespace the feature is declared in, e.g. "Standard"
    pub namespace: Option<String>,
}

/// Read access to device features and command execution
pub trait FeatureAccess: Send + Sync {
    fn get_integer(&self, name: &str) -> Result<i64>;

    fn get_enum(&self, name: &str) -> Result<String>;

    /// Integer value of an enum entry, e.g. the PFNC code of "Mono12"
    fn enum_as_int(&self, name: &str, option: &str) -> Result<i64>;

    fn feature_info(&self, name: &str) -> Result<FeatureInfo>;

    /// Issue a command without waiting for it; see [`crate::capture::command`]
    fn run_command(&self, name: &str) -> Result<()>;

    fn is_command_done(&self, name: &str) -> bool;
}

/// Identifies one announced buffer across the vendor boundary.
///
/// Stands in for the raw context pointer the subsystem would otherwise
/// carry back to us. The generation changes on every streaming episode so
/// completions from a torn-down pool can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferToken {
    pub generation: u64,
    pub index: usize,
}

/// Backing memory of one capture buffer. Fixed length once allocated.
pub type FrameMemory = Arc<Mutex<Box<[u8]>>>;

/// What the subsystem is told about a buffer at announce time
#[derive(Debug, Clone)]
pub struct Announcement {
    pub token: BufferToken,
    /// Size of one payload in bytes
    pub size: usize,
    /// Requested alignment of subsystem-owned memory
    pub alignment: usize,
    /// Host memory to write into, `None` when the transport layer allocates
    pub memory: Option<FrameMemory>,
}

/// Receive status reported with a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Complete,
    Incomplete,
    TooSmall,
    Invalid,
}

/// One completion notification from the subsystem
#[derive(Debug, Clone)]
pub struct Completion {
    pub token: BufferToken,
    pub status: FrameStatus,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_id: u64,
    /// Device clock ticks
    pub timestamp: u64,
    /// Subsystem-owned image data for transport-layer allocated buffers
    pub image: Option<Bytes>,
}

pub(crate) enum Dispatch {
    Completion(Completion),
    Shutdown,
}

/// Handle the subsystem uses to report completions.
///
/// Cloneable and safe to call from any thread. Never blocks: the channel
/// behind it has a slot for every buffer in the pool.
#[derive(Clone)]
pub struct CompletionSink {
    tx: flume::Sender<Dispatch>,
    stats: Arc<StreamStats>,
}

impl CompletionSink {
    pub(crate) fn new(tx: flume::Sender<Dispatch>, stats: Arc<StreamStats>) -> Self {
        Self { tx, stats }
    }

    /// Hand a completion to the engine. Returns false if it was dropped.
    pub fn notify(&self, completion: Completion) -> bool {
        match self.tx.try_send(Dispatch::Completion(completion)) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                tracing::error!("completion queue full, dropping notification");
                self.stats.record_dropped();
                false
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                tracing::debug!("completion arrived after streaming ended");
                false
            }
        }
    }
}

/// Capture primitives of the vendor subsystem
pub trait CaptureApi: Send + Sync {
    fn query_payload_size(&self) -> Result<u32>;

    fn announce(&self, announcement: &Announcement) -> std::result::Result<(), ErrorCode>;

    fn revoke_all(&self) -> Result<()>;

    fn capture_start(&self) -> Result<()>;

    fn capture_end(&self) -> Result<()>;

    fn queue_flush(&self) -> Result<()>;

    /// Queue a buffer; `sink` is notified once it has been filled
    fn enqueue(&self, token: BufferToken, sink: CompletionSink) -> Result<()>;
}

/// An open camera session.
///
/// Closing the session is the implementor's `Drop`.
pub trait CameraDevice: FeatureAccess + CaptureApi {
    /// Features of the local device module, e.g. the timestamp clock
    fn local_device(&self) -> &dyn FeatureAccess;
}
