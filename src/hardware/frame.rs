//! Frame types and pixel conversions.
//!
//! Every source hands out [`CameraFrame`]s in one display-ready layout
//! (`Bgr8`, 3 bytes per pixel). Sensor formats are converted on the producer
//! thread before publishing.

use crate::error::{CellError, CellResult};
use chrono::{DateTime, Utc};

/// Layout of the pixel buffer in a [`CameraFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// 8-bit blue, green, red interleaved
    Bgr8,
}

impl FrameFormat {
    /// Bytes per pixel for this layout
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr8 => 3,
        }
    }
}

/// One decoded frame.
///
/// Immutable once produced; ownership moves to whichever consumer takes it.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: FrameFormat,
    /// Pixel buffer, `width * height * format.bytes_per_pixel()` bytes
    pub data: Vec<u8>,
    /// Source-assigned monotonic frame number
    pub frame_number: u64,
    /// Capture time
    pub captured_at: DateTime<Utc>,
}

impl CameraFrame {
    /// Wrap an already converted BGR buffer.
    ///
    /// # Errors
    /// `FrameDecode` if the buffer length does not match the geometry.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>, frame_number: u64) -> CellResult<Self> {
        let expected = width as usize * height as usize * FrameFormat::Bgr8.bytes_per_pixel();
        if data.len() != expected {
            return Err(CellError::FrameDecode(format!(
                "BGR buffer for {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format: FrameFormat::Bgr8,
            data,
            frame_number,
            captured_at: Utc::now(),
        })
    }

    /// BGR triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }
}

/// Sensor pixel formats the industrial camera can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit monochrome
    Mono8,
    /// 8-bit Bayer, RGGB tile (R at even row / even column)
    BayerRg8,
}

impl PixelFormat {
    /// All supported formats, in the order they are listed to users
    pub const ALL: [PixelFormat; 2] = [PixelFormat::Mono8, PixelFormat::BayerRg8];

    /// GenICam pixel type code used by the SDK
    pub const fn sdk_code(self) -> u32 {
        match self {
            Self::Mono8 => 0x0108_0001,
            Self::BayerRg8 => 0x0108_0009,
        }
    }

    /// Configuration name (`Mono8`, `BayerRG8`)
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono8 => "Mono8",
            Self::BayerRg8 => "BayerRG8",
        }
    }

    /// Look up a format by its SDK pixel type code
    pub fn from_sdk_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.sdk_code() == code)
    }

    /// Parse a configured format name.
    ///
    /// # Errors
    /// `UnsupportedPixelFormat` listing the accepted names.
    pub fn from_name(name: &str) -> CellResult<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| CellError::UnsupportedPixelFormat {
                name: name.to_string(),
                supported: Self::ALL.map(PixelFormat::name).join(", "),
            })
    }

    /// Convert a raw single-channel sensor buffer to BGR.
    ///
    /// Only the first `width * height` bytes are meaningful; a shorter or
    /// longer `raw` is a decode error.
    pub fn to_bgr(self, raw: &[u8], width: u32, height: u32) -> CellResult<Vec<u8>> {
        let pixels = width as usize * height as usize;
        if raw.len() != pixels {
            return Err(CellError::FrameDecode(format!(
                "{} frame {}x{} expects {} bytes, got {}",
                self.name(),
                width,
                height,
                pixels,
                raw.len()
            )));
        }
        Ok(match self {
            Self::Mono8 => mono_to_bgr(raw),
            Self::BayerRg8 => demosaic_rggb(raw, width as usize, height as usize),
        })
    }
}

fn mono_to_bgr(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 3);
    for &v in raw {
        out.extend_from_slice(&[v, v, v]);
    }
    out
}

#[derive(Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

fn rggb_channel(x: usize, y: usize) -> Channel {
    match (y % 2, x % 2) {
        (0, 0) => Channel::Red,
        (1, 1) => Channel::Blue,
        _ => Channel::Green,
    }
}

/// Bilinear-style demosaic: each output channel is the mean of the samples of
/// that colour in the 3x3 neighbourhood (clamped at the borders).
fn demosaic_rggb(raw: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height * 3];
    if width == 0 || height == 0 {
        return out;
    }

    for y in 0..height {
        for x in 0..width {
            // [blue, green, red] sums and counts
            let mut sum = [0u32; 3];
            let mut count = [0u32; 3];

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let ny = (y as i64 + dy).clamp(0, height as i64 - 1) as usize;
                    let nx = (x as i64 + dx).clamp(0, width as i64 - 1) as usize;
                    let slot = match rggb_channel(nx, ny) {
                        Channel::Blue => 0,
                        Channel::Green => 1,
                        Channel::Red => 2,
                    };
                    sum[slot] += u32::from(raw[ny * width + nx]);
                    count[slot] += 1;
                }
            }

            let idx = (y * width + x) * 3;
            for c in 0..3 {
                out[idx + c] = if count[c] > 0 {
                    (sum[c] / count[c]) as u8
                } else {
                    0
                };
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_names() {
        assert_eq!(PixelFormat::from_name("Mono8").unwrap(), PixelFormat::Mono8);
        assert_eq!(
            PixelFormat::from_name("BayerRG8").unwrap(),
            PixelFormat::BayerRg8
        );

        let err = PixelFormat::from_name("RGB8Packed").unwrap_err();
        assert!(err.to_string().contains("Mono8, BayerRG8"));
    }

    #[test]
    fn test_sdk_code_lookup() {
        assert_eq!(
            PixelFormat::from_sdk_code(0x0108_0009),
            Some(PixelFormat::BayerRg8)
        );
        assert_eq!(PixelFormat::from_sdk_code(0x0218_0014), None);
    }

    #[test]
    fn test_mono_to_bgr_replicates_channels() {
        let bgr = PixelFormat::Mono8.to_bgr(&[10, 200], 2, 1).unwrap();
        assert_eq!(bgr, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_length_mismatch_is_decode_error() {
        let err = PixelFormat::Mono8.to_bgr(&[0; 5], 2, 2).unwrap_err();
        assert!(matches!(err, CellError::FrameDecode(_)));
    }

    #[test]
    fn test_demosaic_uniform_colour() {
        // A pure red scene: only R sites carry signal
        let (w, h) = (4usize, 4usize);
        let mut raw = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                if y % 2 == 0 && x % 2 == 0 {
                    raw[y * w + x] = 200;
                }
            }
        }
        let bgr = PixelFormat::BayerRg8.to_bgr(&raw, w as u32, h as u32).unwrap();
        for px in bgr.chunks_exact(3) {
            assert_eq!(px[0], 0, "blue");
            assert_eq!(px[1], 0, "green");
            assert_eq!(px[2], 200, "red");
        }
    }

    #[test]
    fn test_frame_from_bgr_checks_size() {
        assert!(CameraFrame::from_bgr(2, 2, vec![0; 12], 0).is_ok());
        assert!(CameraFrame::from_bgr(2, 2, vec![0; 11], 0).is_err());

        let frame = CameraFrame::from_bgr(1, 1, vec![1, 2, 3], 7).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(frame.pixel(1, 0), None);
        assert_eq!(frame.frame_number, 7);
    }
}
