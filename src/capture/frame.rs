use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Normalized frame handed to the consumer - read-only, cheap to clone
#[derive(Clone)]
pub struct Frame {
    /// Immutable normalized pixel data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Host time the completion was handled, for latency tracking
    pub timestamp: Instant,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Subsystem-assigned frame id. Opaque and comparable, not guaranteed gap-free.
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub step: u32,
    pub encoding: Encoding,
    pub format: PixelFormat,
    /// Always false, samples are little-endian
    pub is_bigendian: bool,
    /// Device timestamp converted to nanoseconds
    pub stamp: Stamp,
}

/// Seconds + nanoseconds split of a device timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub sec: i32,
    pub nanosec: u32,
}

impl Stamp {
    const NANOS_PER_SEC: u64 = 1_000_000_000;

    /// Split nanoseconds; saturates at the largest representable stamp
    pub fn from_nanos(ns: u64) -> Self {
        match i32::try_from(ns / Self::NANOS_PER_SEC) {
            Ok(sec) => Self {
                sec,
                nanosec: (ns % Self::NANOS_PER_SEC) as u32,
            },
            Err(_) => Self {
                sec: i32::MAX,
                nanosec: (Self::NANOS_PER_SEC - 1) as u32,
            },
        }
    }

    pub fn as_nanos(&self) -> u64 {
        self.sec as u64 * Self::NANOS_PER_SEC + self.nanosec as u64
    }
}

/// PFNC pixel format code as reported by the device.
///
/// Bits 16..24 of the code hold the number of bits each pixel occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const MONO8: Self = Self(0x0108_0001);
    pub const MONO10: Self = Self(0x0110_0003);
    pub const MONO12: Self = Self(0x0110_0005);
    pub const MONO14: Self = Self(0x0110_0025);
    pub const MONO16: Self = Self(0x0110_0007);

    pub const BAYER_GR8: Self = Self(0x0108_0008);
    pub const BAYER_RG8: Self = Self(0x0108_0009);
    pub const BAYER_GB8: Self = Self(0x0108_000A);
    pub const BAYER_BG8: Self = Self(0x0108_000B);
    pub const BAYER_GR10: Self = Self(0x0110_000C);
    pub const BAYER_RG10: Self = Self(0x0110_000D);
    pub const BAYER_GB10: Self = Self(0x0110_000E);
    pub const BAYER_BG10: Self = Self(0x0110_000F);
    pub const BAYER_GR12: Self = Self(0x0110_0010);
    pub const BAYER_RG12: Self = Self(0x0110_0011);
    pub const BAYER_GB12: Self = Self(0x0110_0012);
    pub const BAYER_BG12: Self = Self(0x0110_0013);
    pub const BAYER_GR16: Self = Self(0x0110_002E);
    pub const BAYER_RG16: Self = Self(0x0110_002F);
    pub const BAYER_GB16: Self = Self(0x0110_0030);
    pub const BAYER_BG16: Self = Self(0x0110_0031);

    pub const RGB8: Self = Self(0x0218_0014);
    pub const BGR8: Self = Self(0x0218_0015);
    pub const RGB16: Self = Self(0x0230_0033);
    pub const BGR16: Self = Self(0x0230_004B);
    pub const RGBA8: Self = Self(0x0220_0016);
    pub const BGRA8: Self = Self(0x0220_0017);
    pub const RGBA16: Self = Self(0x0240_0064);
    pub const BGRA16: Self = Self(0x0240_004C);

    pub const YUV422_8_UYVY: Self = Self(0x0210_001F);
    pub const YUV422_8: Self = Self(0x0210_0032);
    pub const YCBCR422_8: Self = Self(0x0210_003B);
    pub const YCBCR601_422_8: Self = Self(0x0210_003E);
    pub const YCBCR709_422_8: Self = Self(0x0210_0041);
    pub const YCBCR422_8_CBYCRY: Self = Self(0x0210_0043);
    pub const YCBCR601_422_8_CBYCRY: Self = Self(0x0210_0044);
    pub const YCBCR709_422_8_CBYCRY: Self = Self(0x0210_0045);

    /// Every format the encoding table knows about
    pub const KNOWN: [Self; 37] = [
        Self::MONO8,
        Self::MONO10,
        Self::MONO12,
        Self::MONO14,
        Self::MONO16,
        Self::BAYER_GR8,
        Self::BAYER_RG8,
        Self::BAYER_GB8,
        Self::BAYER_BG8,
        Self::BAYER_GR10,
        Self::BAYER_RG10,
        Self::BAYER_GB10,
        Self::BAYER_BG10,
        Self::BAYER_GR12,
        Self::BAYER_RG12,
        Self::BAYER_GB12,
        Self::BAYER_BG12,
        Self::BAYER_GR16,
        Self::BAYER_RG16,
        Self::BAYER_GB16,
        Self::BAYER_BG16,
        Self::RGB8,
        Self::BGR8,
        Self::RGB16,
        Self::BGR16,
        Self::RGBA8,
        Self::BGRA8,
        Self::RGBA16,
        Self::BGRA16,
        Self::YUV422_8_UYVY,
        Self::YUV422_8,
        Self::YCBCR422_8,
        Self::YCBCR601_422_8,
        Self::YCBCR709_422_8,
        Self::YCBCR422_8_CBYCRY,
        Self::YCBCR601_422_8_CBYCRY,
        Self::YCBCR709_422_8_CBYCRY,
    ];

    /// Bits one pixel occupies in the buffer, taken from the format code
    pub fn bits_per_pixel(self) -> u32 {
        (self.0 >> 16) & 0xFF
    }
}

/// Semantic image encodings understood by downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Mono8,
    Mono16,
    BayerGrbg8,
    BayerRggb8,
    BayerGbrg8,
    BayerBggr8,
    BayerGrbg16,
    BayerRggb16,
    BayerGbrg16,
    BayerBggr16,
    Rgb8,
    Bgr8,
    Rgb16,
    Bgr16,
    Rgba8,
    Bgra8,
    Rgba16,
    Bgra16,
    Yuv422,
    Yuv422Yuy2,
    /// Untyped single-channel 8-bit fallback
    Type8UC1,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Mono8 => "mono8",
            Encoding::Mono16 => "mono16",
            Encoding::BayerGrbg8 => "bayer_grbg8",
            Encoding::BayerRggb8 => "bayer_rggb8",
            Encoding::BayerGbrg8 => "bayer_gbrg8",
            Encoding::BayerBggr8 => "bayer_bggr8",
            Encoding::BayerGrbg16 => "bayer_grbg16",
            Encoding::BayerRggb16 => "bayer_rggb16",
            Encoding::BayerGbrg16 => "bayer_gbrg16",
            Encoding::BayerBggr16 => "bayer_bggr16",
            Encoding::Rgb8 => "rgb8",
            Encoding::Bgr8 => "bgr8",
            Encoding::Rgb16 => "rgb16",
            Encoding::Bgr16 => "bgr16",
            Encoding::Rgba8 => "rgba8",
            Encoding::Bgra8 => "bgra8",
            Encoding::Rgba16 => "rgba16",
            Encoding::Bgra16 => "bgra16",
            Encoding::Yuv422 => "yuv422",
            Encoding::Yuv422Yuy2 => "yuv422_yuy2",
            Encoding::Type8UC1 => "8UC1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
