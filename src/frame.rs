//! Frame type shared by capture, display, and recording paths.

use std::sync::Arc;
use std::time::Instant;

/// Pixel layout of a captured frame, as delivered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb,
    /// Packed YUV 4:2:2
    Yuyv,
    /// Planar Y + interleaved UV
    Nv12,
    /// JPEG-compressed frames straight from the device
    Mjpeg,
}

impl PixelFormat {
    /// The ffmpeg name for this layout, used when feeding raw frames to an
    /// encoder process.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb => "rgb24",
            PixelFormat::Yuyv => "yuyv422",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Mjpeg => "mjpeg",
        }
    }
}

/// One captured image buffer plus its capture timestamp.
///
/// Cloning is cheap: the pixel data is shared. Callbacks that want to keep a
/// frame beyond the callback invocation hold a clone.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in `format` layout
    pub data: Arc<Vec<u8>>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Pixel layout of `data`
    pub format: PixelFormat,

    /// When the frame was acquired from the device
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: Arc::new(data),
            width,
            height,
            format,
            captured_at: Instant::now(),
        }
    }
}

/// Scale `source` dimensions to fit within `target`, preserving aspect ratio.
///
/// Returns the largest size that fits entirely inside `target` while keeping
/// the source proportions. Degenerate inputs collapse to zero.
pub fn fit_within(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (sw, sh) = source;
    let (tw, th) = target;
    if sw == 0 || sh == 0 || tw == 0 || th == 0 {
        return (0, 0);
    }
    // Compare aspect ratios without floating point: sw/sh vs tw/th.
    if sw as u64 * th as u64 >= tw as u64 * sh as u64 {
        (tw, (tw as u64 * sh as u64 / sw as u64) as u32)
    } else {
        ((th as u64 * sw as u64 / sh as u64) as u32, th)
    }
}
