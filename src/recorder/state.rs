//! Recording state machine and events
//!
//! Per-source state is a two-state machine: `Stopped --start--> Recording`,
//! back via an explicit stop or a forced stop (capture failure, device
//! removal). The aggregate "any source recording" value is always computed
//! from the per-source states, never stored, so it cannot diverge.

use serde::{Deserialize, Serialize};

/// Per-source recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Not writing frames
    Stopped,
    /// Frames are being written to the sink
    Recording,
}

impl Default for RecordState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Why a recording stopped. Lets observers distinguish operator action from
/// fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// An explicit stop command
    Requested,
    /// The source exhausted its capture retry budget
    CaptureFailure,
    /// The device disappeared from the registry
    DeviceRemoved,
}

/// Events emitted by the coordinator on every actual state transition,
/// whether or not a command caused it.
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// A source transitioned Stopped -> Recording
    Started { label: String },
    /// A source transitioned Recording -> Stopped
    Stopped { label: String, reason: StopReason },
    /// The derived any-source-recording value flipped
    AggregateChanged(bool),
    /// The sink failed while a start was attempted or a write was running
    WriterError { label: String, message: String },
}
