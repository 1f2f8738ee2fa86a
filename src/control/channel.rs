//! Typed control commands and notifications
//!
//! The transport-agnostic contract between the network adapter and the
//! pipeline: inbound `Command`s map onto coordinator calls, state changes
//! flow back out as `Notification`s. Command-scoped replies (and errors) go
//! only to the command's origin; everything else is broadcast proactively
//! through the notification bridge, whether or not a command caused it.

use crate::capture::registry::{DeviceRegistry, RegistryEvent};
use crate::error::VideoResult;
use crate::recorder::coordinator::RecordingCoordinator;
use crate::recorder::state::{RecordingEvent, StopReason};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Addressing for recording commands and state notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every currently attached camera / the aggregate state
    All,
    /// One camera by label
    One(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartRecording(Target),
    StopRecording(Target),
    ToggleRecording,
    ListCameras,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    RecordingState { target: Target, recording: bool },
    CameraAdded(String),
    CameraRemoved(String),
    CameraList(Vec<String>),
    Status(String),
    CommandError(String),
}

/// Decodes inbound commands into coordinator calls.
#[derive(Clone)]
pub struct ControlChannel {
    registry: Arc<DeviceRegistry>,
    coordinator: Arc<RecordingCoordinator>,
}

impl ControlChannel {
    pub fn new(registry: Arc<DeviceRegistry>, coordinator: Arc<RecordingCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Execute one command, returning its command-scoped replies. State
    /// changes caused here still flow through the notification bridge like
    /// any other.
    pub fn handle(&self, command: Command) -> VideoResult<Vec<Notification>> {
        tracing::debug!("Handling command {command:?}");
        match command {
            Command::StartRecording(Target::One(label)) => {
                self.coordinator.start(&label)?;
                Ok(Vec::new())
            }
            Command::StartRecording(Target::All) => {
                self.coordinator.start_all();
                Ok(Vec::new())
            }
            Command::StopRecording(Target::One(label)) => {
                self.coordinator.stop(&label)?;
                Ok(Vec::new())
            }
            Command::StopRecording(Target::All) => {
                self.coordinator.stop_all();
                Ok(Vec::new())
            }
            Command::ToggleRecording => {
                self.coordinator.toggle();
                Ok(Vec::new())
            }
            Command::ListCameras => Ok(vec![Notification::CameraList(self.registry.labels())]),
        }
    }
}

/// Forward coordinator events and registry add/remove events into the
/// outbound notification queue. The registry subscription lives as long as
/// the registry; the broadcast forwarder task exits when the coordinator is
/// dropped.
pub fn spawn_notification_bridge(
    registry: &DeviceRegistry,
    coordinator: &RecordingCoordinator,
    outbound: mpsc::UnboundedSender<Notification>,
) {
    {
        let outbound = outbound.clone();
        registry.subscribe(Arc::new(move |event: &RegistryEvent| {
            let notification = match event {
                RegistryEvent::Added(source) => {
                    Notification::CameraAdded(source.label().to_string())
                }
                RegistryEvent::Removed(source) => {
                    Notification::CameraRemoved(source.label().to_string())
                }
            };
            let _ = outbound.send(notification);
        }));
    }

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    for notification in notifications_for(&event) {
                        if outbound.send(notification).is_err() {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification bridge lagged, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

/// Map one coordinator event onto its outbound notifications.
pub fn notifications_for(event: &RecordingEvent) -> Vec<Notification> {
    match event {
        RecordingEvent::Started { label } => vec![Notification::RecordingState {
            target: Target::One(label.clone()),
            recording: true,
        }],
        RecordingEvent::Stopped { label, reason } => {
            let mut out = vec![Notification::RecordingState {
                target: Target::One(label.clone()),
                recording: false,
            }];
            match reason {
                StopReason::Requested => {}
                StopReason::CaptureFailure => out.push(Notification::Status(format!(
                    "recording of {label} stopped: capture failure"
                ))),
                StopReason::DeviceRemoved => out.push(Notification::Status(format!(
                    "recording of {label} stopped: camera removed"
                ))),
            }
            out
        }
        RecordingEvent::AggregateChanged(recording) => vec![Notification::RecordingState {
            target: Target::All,
            recording: *recording,
        }],
        RecordingEvent::WriterError { label, message } => vec![Notification::Status(format!(
            "writer error on {label}: {message}"
        ))],
    }
}
