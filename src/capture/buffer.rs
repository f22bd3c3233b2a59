//! Capture buffers shared between the engine and the vendor subsystem

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::capture::device::{
    features, Announcement, BufferToken, CaptureApi, Completion, CompletionSink, FeatureAccess,
    FrameMemory,
};
use crate::capture::frame::{Frame, FrameMetadata, PixelFormat, Stamp};
use crate::capture::timestamp::TimestampNormalizer;
use crate::capture::transform;
use crate::error::{ErrorCode, Result, StreamError};

/// Who owns the memory the subsystem writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// Payload is exactly the image, the subsystem writes into our buffer
    ByImage,
    /// Subsystem writes into its own buffer, we copy out on completion
    ByTransportLayer,
}

/// Pixel layout derived from the current device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    pub format: PixelFormat,
    pub bits_per_pixel: u32,
    pub bytes_per_line: u32,
}

impl PixelFormatDescriptor {
    /// Read the `PixelFormat` and `Width` features.
    ///
    /// The pixel format must be an SFNC `Standard` feature, otherwise the
    /// enum's integer value is not a PFNC code.
    pub fn query(device: &dyn FeatureAccess) -> Result<Self> {
        let info = device.feature_info(features::PIXEL_FORMAT)?;
        match info.namespace.as_deref() {
            Some("Standard") => {}
            Some(other) => {
                debug!("PixelFormat declared in namespace {}", other);
                return Err(StreamError::device("FeatureInfoQuery", ErrorCode::NOT_AVAILABLE));
            }
            None => {
                return Err(StreamError::device("FeatureInfoQuery", ErrorCode::INVALID_ADDRESS));
            }
        }

        let current = device.get_enum(features::PIXEL_FORMAT)?;
        let code = device.enum_as_int(features::PIXEL_FORMAT, &current)?;
        let format = PixelFormat(code as u32);
        let bits_per_pixel = format.bits_per_pixel();
        let width = device.get_integer(features::WIDTH)?;
        let bytes_per_line = u64::try_from(width)
            .ok()
            .and_then(|w| w.checked_mul(bits_per_pixel as u64))
            .and_then(|bits| u32::try_from(bits / 8).ok())
            .ok_or(StreamError::device("FeatureIntGet", ErrorCode::INVALID_VALUE))?;

        Ok(Self {
            format,
            bits_per_pixel,
            bytes_per_line,
        })
    }
}

/// One announced capture buffer.
///
/// The memory is a boxed slice, so it keeps its address and length for as
/// long as the subsystem may hold it.
#[derive(Debug)]
pub struct FrameBuffer {
    token: BufferToken,
    size: usize,
    alignment: usize,
    mode: AllocationMode,
    descriptor: PixelFormatDescriptor,
    height: u32,
    memory: FrameMemory,
}

impl FrameBuffer {
    /// Allocate a buffer for a payload of `size` bytes using the current geometry
    pub fn create(
        device: &dyn FeatureAccess,
        token: BufferToken,
        size: usize,
        alignment: usize,
    ) -> Result<Self> {
        let descriptor = PixelFormatDescriptor::query(device)?;
        let height = u32::try_from(device.get_integer(features::HEIGHT)?)
            .map_err(|_| StreamError::device("FeatureIntGet", ErrorCode::INVALID_VALUE))?;

        let image_size = height as usize * descriptor.bytes_per_line as usize;
        let (mode, len) = if image_size == size {
            (AllocationMode::ByImage, size)
        } else {
            (AllocationMode::ByTransportLayer, image_size)
        };

        debug!(
            index = token.index,
            ?mode,
            size,
            image_size,
            "Allocating frame buffer"
        );

        Ok(Self {
            token,
            size,
            alignment,
            mode,
            descriptor,
            height,
            memory: Arc::new(Mutex::new(vec![0u8; len].into_boxed_slice())),
        })
    }

    pub fn token(&self) -> BufferToken {
        self.token
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn descriptor(&self) -> &PixelFormatDescriptor {
        &self.descriptor
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Length of the normalized image storage
    pub fn len(&self) -> usize {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registration record; hands out our memory only in `ByImage` mode
    pub fn announcement(&self) -> Announcement {
        Announcement {
            token: self.token,
            size: self.size,
            alignment: self.alignment,
            memory: (self.mode == AllocationMode::ByImage).then(|| self.memory.clone()),
        }
    }

    /// Put the buffer (back) into the subsystem's input queue
    pub fn queue(&self, capture: &dyn CaptureApi, sink: &CompletionSink) -> Result<()> {
        capture.enqueue(self.token, sink.clone())
    }

    /// Normalize a successful completion and produce the consumer's frame
    pub fn complete(&self, completion: &Completion, clock: &TimestampNormalizer<'_>) -> Frame {
        let received = Instant::now();
        let encoding = transform::encoding_for(completion.pixel_format);
        let stamp = Stamp::from_nanos(clock.to_nanos(completion.timestamp));

        let data = {
            let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
            transform::transform(
                completion.pixel_format,
                self.mode,
                completion.image.as_deref(),
                &mut memory[..],
            );
            Bytes::copy_from_slice(&memory[..])
        };

        let meta = Arc::new(FrameMetadata {
            frame_id: completion.frame_id,
            width: completion.width,
            height: completion.height,
            step: self.descriptor.bytes_per_line,
            encoding,
            format: completion.pixel_format,
            is_bigendian: false,
            stamp,
        });

        Frame {
            data,
            meta,
            timestamp: received,
        }
    }
}
