//! Recording coordinator
//!
//! Authoritative owner of per-source recording state and the derived
//! aggregate. Turns start/stop/toggle commands into consistent transitions,
//! feeds frames from capture threads into writer handles, and reacts to
//! capture failures and device removals with forced stops. Every actual
//! transition is broadcast; observers never see per-source and aggregate
//! state disagree.

use crate::capture::registry::{DeviceRegistry, RegistryEvent};
use crate::capture::source::FrameSource;
use crate::error::{VideoError, VideoResult};
use crate::frame::Frame;
use crate::observer::SubscriptionId;
use crate::recorder::state::{RecordState, RecordingEvent, StopReason};
use crate::recorder::writer::{FrameWriter, WriterHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

struct ActiveRecording {
    source: Arc<FrameSource>,
    frame_sub: SubscriptionId,
    failure_sub: SubscriptionId,
    /// Shared with the frame callback; taken on stop so no write can happen
    /// after the handle is closed.
    sink: Arc<Mutex<Option<Box<dyn WriterHandle>>>>,
}

pub struct RecordingCoordinator {
    registry: Arc<DeviceRegistry>,
    writer: Arc<dyn FrameWriter>,
    output_dir: PathBuf,
    active: Mutex<HashMap<String, ActiveRecording>>,
    event_tx: broadcast::Sender<RecordingEvent>,
    /// Capture threads report failures here; a task on the control context
    /// drains the queue and performs the forced stops. Capture threads never
    /// run coordinator logic.
    failure_tx: mpsc::UnboundedSender<String>,
    failure_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl RecordingCoordinator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        writer: Arc<dyn FrameWriter>,
        output_dir: PathBuf,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            registry,
            writer,
            output_dir,
            active: Mutex::new(HashMap::new()),
            event_tx,
            failure_tx,
            failure_rx: Mutex::new(Some(failure_rx)),
        })
    }

    /// Subscribe to recording events.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn state_of(&self, label: &str) -> RecordState {
        if self.active.lock().contains_key(label) {
            RecordState::Recording
        } else {
            RecordState::Stopped
        }
    }

    /// Derived aggregate: true iff at least one source is recording.
    pub fn any_recording(&self) -> bool {
        !self.active.lock().is_empty()
    }

    /// Begin writing frames for `label`. Idempotent while recording; fails
    /// with `UnknownSource` for labels not in the registry, and leaves the
    /// state at Stopped (with a notification) when the sink or the device
    /// cannot be opened.
    pub fn start(&self, label: &str) -> VideoResult<()> {
        let source = self
            .registry
            .get(label)
            .ok_or_else(|| VideoError::UnknownSource(label.to_string()))?;

        let mut active = self.active.lock();
        if active.contains_key(label) {
            tracing::debug!("{label} already recording");
            return Ok(());
        }
        let was_any = !active.is_empty();

        let handle = match self.writer.open(label, &self.output_dir) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.event_tx.send(RecordingEvent::WriterError {
                    label: label.to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = source.acquire() {
            if let Err(close_err) = handle.close() {
                tracing::warn!("Closing unused writer for {label}: {close_err}");
            }
            let _ = self.event_tx.send(RecordingEvent::WriterError {
                label: label.to_string(),
                message: e.to_string(),
            });
            return Err(e);
        }

        let sink = Arc::new(Mutex::new(Some(handle)));
        let frame_sub = {
            let sink = sink.clone();
            let label = label.to_string();
            source.register_frame_callback(Arc::new(move |frame: &Frame| {
                if let Some(handle) = sink.lock().as_mut() {
                    // Write failures are non-fatal; the recording continues.
                    if let Err(e) = handle.write(frame) {
                        tracing::warn!("Frame write failed for {label}: {e}");
                    }
                }
            }))
        };
        let failure_sub = {
            let failure_tx = self.failure_tx.clone();
            source.register_failure_callback(Arc::new(move |label: &String| {
                let _ = failure_tx.send(label.clone());
            }))
        };

        active.insert(
            label.to_string(),
            ActiveRecording {
                source,
                frame_sub,
                failure_sub,
                sink,
            },
        );
        tracing::info!("Recording started for {label}");
        let _ = self.event_tx.send(RecordingEvent::Started {
            label: label.to_string(),
        });
        if !was_any {
            let _ = self.event_tx.send(RecordingEvent::AggregateChanged(true));
        }
        Ok(())
    }

    /// Stop writing frames for `label`. Idempotent; `UnknownSource` only if
    /// the label is not in the registry at all.
    pub fn stop(&self, label: &str) -> VideoResult<()> {
        if self.registry.get(label).is_none() && !self.active.lock().contains_key(label) {
            return Err(VideoError::UnknownSource(label.to_string()));
        }
        self.stop_internal(label, StopReason::Requested);
        Ok(())
    }

    /// Start every currently attached source. Per-source failures are
    /// reported through events and do not abort the rest.
    pub fn start_all(&self) {
        for source in self.registry.list() {
            if let Err(e) = self.start(source.label()) {
                tracing::warn!("Could not start recording {}: {e}", source.label());
            }
        }
    }

    pub fn stop_all(&self) {
        let labels: Vec<String> = self.active.lock().keys().cloned().collect();
        for label in labels {
            self.stop_internal(&label, StopReason::Requested);
        }
    }

    /// The single record control: stop everything if anything is recording,
    /// otherwise start all attached sources.
    pub fn toggle(&self) {
        if self.any_recording() {
            self.stop_all();
        } else {
            self.start_all();
        }
    }

    /// Drain capture-failure reports on the control context. Call once from
    /// within a runtime.
    pub fn spawn_failure_drain(self: &Arc<Self>) {
        let Some(mut rx) = self.failure_rx.lock().take() else {
            return;
        };
        let coordinator = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(label) = rx.recv().await {
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                tracing::warn!("Capture failed while recording {label}, forcing stop");
                coordinator.stop_internal(&label, StopReason::CaptureFailure);
            }
        });
    }

    /// Track registry removals so recording state only ever refers to
    /// attached sources: a removed source gets a forced stop.
    pub fn watch_registry(self: &Arc<Self>) -> SubscriptionId {
        let coordinator = Arc::downgrade(self);
        self.registry.subscribe(Arc::new(move |event: &RegistryEvent| {
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            if let RegistryEvent::Removed(source) = event {
                coordinator.stop_internal(source.label(), StopReason::DeviceRemoved);
            }
        }))
    }

    /// The one place recordings are torn down. Removes the entry, detaches
    /// callbacks (no frame is written after this returns), closes the writer
    /// best-effort, releases the source, and emits the per-source and, when
    /// it flips, the aggregate event.
    fn stop_internal(&self, label: &str, reason: StopReason) {
        let mut active = self.active.lock();
        let Some(recording) = active.remove(label) else {
            return;
        };

        recording.source.unregister_frame_callback(recording.frame_sub);
        recording
            .source
            .unregister_failure_callback(recording.failure_sub);

        if let Some(handle) = recording.sink.lock().take() {
            if let Err(e) = handle.close() {
                tracing::warn!("Closing writer for {label}: {e}");
                let _ = self.event_tx.send(RecordingEvent::WriterError {
                    label: label.to_string(),
                    message: e.to_string(),
                });
            }
        }
        recording.source.release();

        tracing::info!("Recording stopped for {label} ({reason:?})");
        let _ = self.event_tx.send(RecordingEvent::Stopped {
            label: label.to_string(),
            reason,
        });
        if active.is_empty() {
            let _ = self.event_tx.send(RecordingEvent::AggregateChanged(false));
        }
    }
}
