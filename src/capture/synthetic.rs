//! Synthetic test-pattern camera
//!
//! A software device that produces a moving gradient at a fixed rate. Used
//! for headless setups without hardware and throughout the test suite, where
//! it can be armed to start failing after a number of frames to drive the
//! capture-failure paths.

use crate::capture::device::{DeviceSpec, VideoDevice};
use crate::error::{VideoError, VideoResult};
use crate::frame::{Frame, PixelFormat};
use std::time::Duration;

pub struct SyntheticSpec {
    label: String,
    width: u32,
    height: u32,
    fps: u32,
    fail_after: Option<u64>,
}

impl SyntheticSpec {
    pub fn new(label: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            fps: fps.max(1),
            fail_after: None,
        }
    }

    /// Arm the device to fail every `grab` after it has delivered `frames`
    /// frames, simulating a camera that dies mid-stream.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl DeviceSpec for SyntheticSpec {
    fn label(&self) -> &str {
        &self.label
    }

    fn open(&self) -> VideoResult<Box<dyn VideoDevice>> {
        Ok(Box::new(SyntheticDevice {
            width: self.width,
            height: self.height,
            interval: Duration::from_secs(1) / self.fps,
            fail_after: self.fail_after,
            delivered: 0,
        }))
    }
}

struct SyntheticDevice {
    width: u32,
    height: u32,
    interval: Duration,
    fail_after: Option<u64>,
    delivered: u64,
}

impl VideoDevice for SyntheticDevice {
    fn grab(&mut self) -> VideoResult<Frame> {
        std::thread::sleep(self.interval);

        if let Some(limit) = self.fail_after {
            if self.delivered >= limit {
                return Err(VideoError::CaptureFailure(
                    "synthetic device fault injected".into(),
                ));
            }
        }

        let shift = (self.delivered % 256) as u8;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push((x as u8).wrapping_add(shift));
                data.push((y as u8).wrapping_add(shift));
                data.push(shift);
            }
        }

        self.delivered += 1;
        Ok(Frame::new(data, self.width, self.height, PixelFormat::Rgb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_frames_then_fails() {
        let spec = SyntheticSpec::new("test", 8, 8, 1000).failing_after(2);
        let mut device = spec.open().unwrap();

        let frame = device.grab().unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.data.len(), 8 * 8 * 3);
        device.grab().unwrap();

        assert!(matches!(
            device.grab(),
            Err(VideoError::CaptureFailure(_))
        ));
        // Failure is persistent once armed.
        assert!(device.grab().is_err());
    }
}
