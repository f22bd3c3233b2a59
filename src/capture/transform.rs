//! Pixel normalization: bit-depth alignment and encoding lookup

use super::buffer::AllocationMode;
use super::frame::{Encoding, PixelFormat};

/// Map a device pixel format to its semantic encoding.
///
/// Total over `u32`: unknown codes fall back to `8UC1`.
pub fn encoding_for(format: PixelFormat) -> Encoding {
    match format {
        PixelFormat::MONO8 => Encoding::Mono8,
        PixelFormat::MONO10 | PixelFormat::MONO12 | PixelFormat::MONO14 | PixelFormat::MONO16 => {
            Encoding::Mono16
        }
        PixelFormat::BAYER_GR8 => Encoding::BayerGrbg8,
        PixelFormat::BAYER_RG8 => Encoding::BayerRggb8,
        PixelFormat::BAYER_GB8 => Encoding::BayerGbrg8,
        PixelFormat::BAYER_BG8 => Encoding::BayerBggr8,
        PixelFormat::BAYER_GR10 | PixelFormat::BAYER_GR12 | PixelFormat::BAYER_GR16 => {
            Encoding::BayerGrbg16
        }
        PixelFormat::BAYER_RG10 | PixelFormat::BAYER_RG12 | PixelFormat::BAYER_RG16 => {
            Encoding::BayerRggb16
        }
        PixelFormat::BAYER_GB10 | PixelFormat::BAYER_GB12 | PixelFormat::BAYER_GB16 => {
            Encoding::BayerGbrg16
        }
        PixelFormat::BAYER_BG10 | PixelFormat::BAYER_BG12 | PixelFormat::BAYER_BG16 => {
            Encoding::BayerBggr16
        }
        PixelFormat::RGB8 => Encoding::Rgb8,
        PixelFormat::BGR8 => Encoding::Bgr8,
        PixelFormat::RGB16 => Encoding::Rgb16,
        PixelFormat::BGR16 => Encoding::Bgr16,
        PixelFormat::RGBA8 => Encoding::Rgba8,
        PixelFormat::BGRA8 => Encoding::Bgra8,
        PixelFormat::RGBA16 => Encoding::Rgba16,
        PixelFormat::BGRA16 => Encoding::Bgra16,
        PixelFormat::YUV422_8_UYVY | PixelFormat::YCBCR422_8_CBYCRY => Encoding::Yuv422,
        PixelFormat::YUV422_8
        | PixelFormat::YCBCR422_8
        | PixelFormat::YCBCR601_422_8
        | PixelFormat::YCBCR709_422_8
        | PixelFormat::YCBCR601_422_8_CBYCRY
        | PixelFormat::YCBCR709_422_8_CBYCRY => Encoding::Yuv422Yuy2,
        _ => Encoding::Type8UC1,
    }
}

/// Left shift that moves 10/12/14-bit samples to the top of a 16-bit word
pub fn shift_for(format: PixelFormat) -> Option<u32> {
    match format {
        PixelFormat::MONO10
        | PixelFormat::BAYER_BG10
        | PixelFormat::BAYER_GB10
        | PixelFormat::BAYER_GR10
        | PixelFormat::BAYER_RG10 => Some(6),
        PixelFormat::MONO12
        | PixelFormat::BAYER_BG12
        | PixelFormat::BAYER_GB12
        | PixelFormat::BAYER_GR12
        | PixelFormat::BAYER_RG12 => Some(4),
        PixelFormat::MONO14 => Some(2),
        _ => None,
    }
}

/// Shift every little-endian u16 sample of `src` into `dst`.
///
/// Processes as many whole samples as both slices hold.
pub fn left_shift16(dst: &mut [u8], src: &[u8], shift: u32) {
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let sample = u16::from_le_bytes([s[0], s[1]]) << shift;
        d.copy_from_slice(&sample.to_le_bytes());
    }
}

pub fn left_shift16_in_place(buf: &mut [u8], shift: u32) {
    for d in buf.chunks_exact_mut(2) {
        let sample = u16::from_le_bytes([d[0], d[1]]) << shift;
        d.copy_from_slice(&sample.to_le_bytes());
    }
}

/// Normalize a completed frame into `dst`.
///
/// `image` is the subsystem's own buffer and is only consulted in
/// `ByTransportLayer` mode. In `ByImage` mode the subsystem already wrote
/// into `dst`, so shifted formats are fixed up in place and everything
/// else is left alone.
pub fn transform(format: PixelFormat, mode: AllocationMode, image: Option<&[u8]>, dst: &mut [u8]) {
    match (mode, image) {
        (AllocationMode::ByImage, _) => {
            if let Some(shift) = shift_for(format) {
                left_shift16_in_place(dst, shift);
            }
        }
        (AllocationMode::ByTransportLayer, Some(src)) => match shift_for(format) {
            Some(shift) => left_shift16(dst, src, shift),
            None => {
                let len = dst.len().min(src.len());
                dst[..len].copy_from_slice(&src[..len]);
            }
        },
        (AllocationMode::ByTransportLayer, None) => {
            tracing::warn!(?format, "transport layer frame arrived without image data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(bytes: &[u8]) -> Vec<u16> {
        bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    fn raw_from(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_packed_depths_are_left_aligned() {
        let cases = [
            (PixelFormat::MONO10, 10u32),
            (PixelFormat::BAYER_RG10, 10),
            (PixelFormat::MONO12, 12),
            (PixelFormat::BAYER_GB12, 12),
            (PixelFormat::MONO14, 14),
        ];
        let input: Vec<u16> = vec![0, 1, 0x0155, 0x03FF, 0x0ABC, 0x3FFF, 0xFFFF, 0x1234];
        let raw = raw_from(&input);

        for (format, depth) in cases {
            let mut out = vec![0u8; raw.len()];
            transform(format, AllocationMode::ByTransportLayer, Some(&raw), &mut out);

            let low_mask = (1u16 << (16 - depth)) - 1;
            let depth_mask = ((1u32 << depth) - 1) as u16;
            for (o, i) in samples(&out).into_iter().zip(&input) {
                assert_eq!(o & low_mask, 0, "{format:?} low bits must be zero");
                assert_eq!(o >> (16 - depth), i & depth_mask, "{format:?} top bits");
            }
        }
    }

    #[test]
    fn test_in_place_shift_for_by_image() {
        let mut buf = raw_from(&[0x03FF, 0x0001]);
        transform(PixelFormat::MONO10, AllocationMode::ByImage, None, &mut buf);
        assert_eq!(samples(&buf), vec![0xFFC0, 0x0040]);
    }

    #[test]
    fn test_transport_layer_copy_is_verbatim() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(3 * 17).collect();
        for format in [PixelFormat::MONO8, PixelFormat::RGB8, PixelFormat::MONO16, PixelFormat(0xDEAD)] {
            let mut out = vec![0u8; raw.len()];
            transform(format, AllocationMode::ByTransportLayer, Some(&raw), &mut out);
            assert_eq!(out, raw);
        }
    }

    #[test]
    fn test_by_image_leaves_unshifted_formats_alone() {
        let mut buf = vec![7u8, 9, 11, 13];
        transform(PixelFormat::BGR8, AllocationMode::ByImage, Some(&[0, 0, 0, 0]), &mut buf);
        assert_eq!(buf, vec![7, 9, 11, 13]);
    }

    #[test]
    fn test_encoding_is_total() {
        for format in PixelFormat::KNOWN {
            let encoding = encoding_for(format);
            assert!(!encoding.as_str().is_empty());
            assert_ne!(encoding, Encoding::Type8UC1, "{format:?} should be mapped");
        }
        for code in [0u32, 1, 0x0108_00FF, 0xFFFF_FFFF] {
            assert_eq!(encoding_for(PixelFormat(code)), Encoding::Type8UC1);
        }
    }

    #[test]
    fn test_encoding_table_spot_checks() {
        assert_eq!(encoding_for(PixelFormat::MONO12).as_str(), "mono16");
        assert_eq!(encoding_for(PixelFormat::BAYER_GR8).as_str(), "bayer_grbg8");
        assert_eq!(encoding_for(PixelFormat::BAYER_BG12).as_str(), "bayer_bggr16");
        assert_eq!(encoding_for(PixelFormat::RGBA8).as_str(), "rgba8");
        assert_eq!(encoding_for(PixelFormat::YUV422_8_UYVY).as_str(), "yuv422");
        assert_eq!(encoding_for(PixelFormat::YCBCR709_422_8).as_str(), "yuv422_yuy2");
    }
}
