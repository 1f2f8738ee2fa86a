//! Device trait definitions
//!
//! Backend-agnostic traits separating "what can be opened" from "what is
//! currently open". A `DeviceSpec` describes one discoverable camera; opening
//! it yields a `VideoDevice` whose handle is owned exclusively by the capture
//! loop that opened it.

use crate::error::VideoResult;
use crate::frame::Frame;

/// An open camera device. Created inside a capture thread and never shared;
/// the device handle is released when the value is dropped.
pub trait VideoDevice {
    /// Acquire the next frame. Blocking until the device delivers a frame is
    /// expected; the capture loop is the one place in the system where
    /// blocking waits are intentional.
    fn grab(&mut self) -> VideoResult<Frame>;
}

/// One openable camera, as produced by device discovery.
pub trait DeviceSpec: Send + Sync {
    /// Stable label, unique within the registry. This is the unit of
    /// addressing for UI and network commands.
    fn label(&self) -> &str;

    /// Open the device. Fails with `DeviceUnavailable` if the hardware
    /// cannot be opened.
    fn open(&self) -> VideoResult<Box<dyn VideoDevice>>;
}
