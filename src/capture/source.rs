//! FrameSource: per-camera capture unit
//!
//! Each source owns a dedicated capture thread that blocks on the device for
//! frames, maintains a windowed frame-rate estimate, and fans frames out to
//! registered callbacks. The device handle never leaves the capture thread:
//! `start()` hands the spec to the thread and waits for the open result, so
//! open failures are reported synchronously while ownership stays exclusive.

use crate::capture::device::DeviceSpec;
use crate::error::{VideoError, VideoResult};
use crate::frame::Frame;
use crate::observer::{Callback, Observers, SubscriptionId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Consecutive `grab` failures tolerated before the source is declared dead.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// How often the frame-rate estimate is recomputed and published.
const RATE_WINDOW: Duration = Duration::from_millis(500);

/// Lifecycle state of a source.
///
/// `Failed` is terminal: recovery requires rediscovering the device, which
/// produces a fresh source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Capturing,
    Failed,
}

/// State shared between the capture thread and the control context.
struct SourceShared {
    label: String,
    state: Mutex<SourceState>,
    running: AtomicBool,
    frames: Observers<Frame>,
    rates: Observers<f64>,
    failures: Observers<String>,
    fps: Mutex<f64>,
}

pub struct FrameSource {
    shared: Arc<SourceShared>,
    spec: Arc<dyn DeviceSpec>,
    thread: Mutex<Option<JoinHandle<()>>>,
    users: Mutex<usize>,
}

impl FrameSource {
    pub fn new(spec: Arc<dyn DeviceSpec>) -> Self {
        Self {
            shared: Arc::new(SourceShared {
                label: spec.label().to_string(),
                state: Mutex::new(SourceState::Idle),
                running: AtomicBool::new(false),
                frames: Observers::new(),
                rates: Observers::new(),
                failures: Observers::new(),
                fps: Mutex::new(0.0),
            }),
            spec,
            thread: Mutex::new(None),
            users: Mutex::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> SourceState {
        *self.shared.state.lock()
    }

    /// Current smoothed frame-rate estimate; 0.0 until the first window
    /// completes.
    pub fn fps(&self) -> f64 {
        *self.shared.fps.lock()
    }

    /// Transition `Idle -> Capturing`. No-op while already capturing;
    /// `DeviceUnavailable` if the device cannot be opened or the source has
    /// permanently failed.
    pub fn start(&self) -> VideoResult<()> {
        let mut state = self.shared.state.lock();
        match *state {
            SourceState::Capturing => return Ok(()),
            SourceState::Failed => {
                return Err(VideoError::DeviceUnavailable(format!(
                    "{} has failed; rediscovery required",
                    self.shared.label
                )))
            }
            SourceState::Idle => {}
        }

        // The thread opens the device and reports back before entering the
        // capture loop, so open failures surface here and the device handle
        // stays thread-local for its whole life.
        let (open_tx, open_rx) = mpsc::sync_channel::<VideoResult<()>>(1);
        let shared = self.shared.clone();
        let spec = self.spec.clone();
        self.shared.running.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name(format!("capture-{}", self.shared.label))
            .spawn(move || {
                let device = match spec.open() {
                    Ok(device) => {
                        let _ = open_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(&shared, device);
            })?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                *state = SourceState::Capturing;
                *self.thread.lock() = Some(handle);
                tracing::info!("Capture started for {}", self.shared.label);
                Ok(())
            }
            Ok(Err(e)) => {
                self.shared.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                tracing::warn!("Failed to open {}: {e}", self.shared.label);
                Err(e)
            }
            Err(_) => {
                self.shared.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(VideoError::DeviceUnavailable(format!(
                    "capture thread for {} exited during open",
                    self.shared.label
                )))
            }
        }
    }

    /// Signal the capture loop to exit after its current iteration and wait
    /// for it to release the device. Idempotent. Must not be called from the
    /// source's own capture thread.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
            tracing::info!("Capture stopped for {}", self.shared.label);
        }
        let mut state = self.shared.state.lock();
        if *state == SourceState::Capturing {
            *state = SourceState::Idle;
        }
    }

    /// Shared-start discipline: the first user starts capture, the last one
    /// stops it. Views and the recorder only ever go through these, so
    /// neither can stop a source the other still needs. A `Failed` source is
    /// rejected even while earlier users still hold it; dead sources must
    /// not gain new consumers.
    pub fn acquire(&self) -> VideoResult<()> {
        let mut users = self.users.lock();
        if self.state() == SourceState::Failed {
            return Err(VideoError::DeviceUnavailable(format!(
                "{} has failed; rediscovery required",
                self.shared.label
            )));
        }
        if *users == 0 {
            self.start()?;
        }
        *users += 1;
        Ok(())
    }

    pub fn release(&self) {
        let mut users = self.users.lock();
        match *users {
            0 => tracing::warn!("release() without acquire() on {}", self.shared.label),
            1 => {
                *users = 0;
                self.stop();
            }
            _ => *users -= 1,
        }
    }

    pub fn register_frame_callback(&self, callback: Callback<Frame>) -> SubscriptionId {
        self.shared.frames.subscribe(callback)
    }

    pub fn unregister_frame_callback(&self, id: SubscriptionId) -> bool {
        self.shared.frames.unsubscribe(id)
    }

    pub fn register_rate_callback(&self, callback: Callback<f64>) -> SubscriptionId {
        self.shared.rates.subscribe(callback)
    }

    pub fn unregister_rate_callback(&self, id: SubscriptionId) -> bool {
        self.shared.rates.unsubscribe(id)
    }

    /// Failure observers receive the source label once, when the capture
    /// loop gives up after its retry budget. Callbacks run on the capture
    /// thread; hand real work off to another context.
    pub fn register_failure_callback(&self, callback: Callback<String>) -> SubscriptionId {
        self.shared.failures.subscribe(callback)
    }

    pub fn unregister_failure_callback(&self, id: SubscriptionId) -> bool {
        self.shared.failures.unsubscribe(id)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// One iteration: grab a frame, update the rate estimate, deliver the frame
/// to every frame callback, then publish the rate on window boundaries.
/// Callbacks run on this thread and must not block materially.
fn capture_loop(shared: &Arc<SourceShared>, mut device: Box<dyn crate::capture::device::VideoDevice>) {
    let mut consecutive_failures = 0u32;
    let mut window_start = Instant::now();
    let mut window_frames = 0u32;

    while shared.running.load(Ordering::SeqCst) {
        match device.grab() {
            Ok(frame) => {
                consecutive_failures = 0;
                window_frames += 1;

                let elapsed = window_start.elapsed();
                let rate_update = if elapsed >= RATE_WINDOW {
                    let fps = window_frames as f64 / elapsed.as_secs_f64();
                    *shared.fps.lock() = fps;
                    window_start = Instant::now();
                    window_frames = 0;
                    Some(fps)
                } else {
                    None
                };

                shared.frames.emit(&frame);
                if let Some(fps) = rate_update {
                    shared.rates.emit(&fps);
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    "Frame acquisition failed on {} ({consecutive_failures}/{MAX_CONSECUTIVE_FAILURES}): {e}",
                    shared.label
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(
                        "{} exceeded its retry budget, marking failed",
                        shared.label
                    );
                    *shared.state.lock() = SourceState::Failed;
                    shared.running.store(false, Ordering::SeqCst);
                    shared.failures.emit(&shared.label);
                    break;
                }
            }
        }
    }

    tracing::debug!("Capture loop for {} exited", shared.label);
    drop(device);
}
