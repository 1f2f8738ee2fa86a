//! Recording system
//!
//! - `FrameWriter`/`WriterHandle`: the sink contract and the ffmpeg-backed
//!   default implementation
//! - `RecordingCoordinator`: per-source and aggregate recording state,
//!   start/stop/toggle, forced stops on failure or device removal
//! - recording state machine and events

pub mod coordinator;
pub mod state;
pub mod writer;

pub use coordinator::RecordingCoordinator;
pub use state::{RecordState, RecordingEvent, StopReason};
pub use writer::{FfmpegWriter, FrameWriter, WriterHandle};
