//! Capture pipeline
//!
//! Per-camera frame sources with dedicated capture threads, the dynamic
//! device registry, and the view binding that retargets a display slot
//! between sources at runtime.

pub mod device;
pub mod registry;
pub mod source;
pub mod synthetic;
pub mod view;
pub mod webcam;

pub use device::{DeviceSpec, VideoDevice};
pub use registry::{spawn_discovery_monitor, DeviceRegistry, RegistryEvent};
pub use source::{FrameSource, SourceState};
pub use synthetic::SyntheticSpec;
pub use view::{DisplaySink, ViewBinding};
