//! Webcam capture using nokhwa
//!
//! Enumeration and frame acquisition for physical cameras. Frames are passed
//! through in the device's native pixel format; conversion and encoding are
//! downstream concerns.

use crate::capture::device::{DeviceSpec, VideoDevice};
use crate::error::{VideoError, VideoResult};
use crate::frame::{Frame, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::collections::HashSet;
use std::sync::Arc;

/// Enumerate the cameras currently visible to the platform backend.
///
/// Labels are the device's human-readable name, suffixed with the device
/// index when two devices report the same name.
pub fn enumerate() -> Vec<Arc<dyn DeviceSpec>> {
    let cameras = match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras,
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {e}");
            return Vec::new();
        }
    };

    let mut taken: HashSet<String> = HashSet::new();
    cameras
        .into_iter()
        .map(|info| {
            let index = info.index().clone();
            let name = info.human_name().to_string();
            let label = if taken.contains(&name) {
                let idx = match &index {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.clone(),
                };
                format!("{name} ({idx})")
            } else {
                name
            };
            taken.insert(label.clone());
            Arc::new(WebcamSpec { index, label }) as Arc<dyn DeviceSpec>
        })
        .collect()
}

/// A physical camera addressed by its nokhwa index.
pub struct WebcamSpec {
    index: CameraIndex,
    label: String,
}

impl WebcamSpec {
    pub fn new(index: CameraIndex, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }
}

impl DeviceSpec for WebcamSpec {
    fn label(&self) -> &str {
        &self.label
    }

    fn open(&self) -> VideoResult<Box<dyn VideoDevice>> {
        let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(self.index.clone(), format)
            .map_err(|e| VideoError::DeviceUnavailable(format!("{}: {e}", self.label)))?;
        camera
            .open_stream()
            .map_err(|e| VideoError::DeviceUnavailable(format!("{}: {e}", self.label)))?;

        let camera_format = camera.camera_format();
        let width = camera_format.resolution().width();
        let height = camera_format.resolution().height();
        let pixel_format = match camera_format.format() {
            FrameFormat::YUYV => PixelFormat::Yuyv,
            FrameFormat::NV12 => PixelFormat::Nv12,
            FrameFormat::MJPEG => PixelFormat::Mjpeg,
            FrameFormat::RAWRGB => PixelFormat::Rgb,
            other => {
                tracing::warn!("Unknown camera format {other:?}, assuming yuyv422");
                PixelFormat::Yuyv
            }
        };

        tracing::info!(
            "Webcam {} opened: {}x{} @ {}fps, format {:?}",
            self.label,
            width,
            height,
            camera_format.frame_rate(),
            camera_format.format()
        );

        Ok(Box::new(WebcamDevice {
            camera,
            width,
            height,
            pixel_format,
        }))
    }
}

struct WebcamDevice {
    camera: Camera,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl VideoDevice for WebcamDevice {
    fn grab(&mut self) -> VideoResult<Frame> {
        // Blocks until the camera delivers the next frame; the camera
        // controls the timing.
        let buffer = self
            .camera
            .frame()
            .map_err(|e| VideoError::CaptureFailure(e.to_string()))?;
        Ok(Frame::new(
            buffer.buffer().to_vec(),
            self.width,
            self.height,
            self.pixel_format,
        ))
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {e}");
        }
    }
}
