//! ViewBinding: live association between a display slot and a frame source
//!
//! A binding holds at most one source at a time. Rebinding detaches the old
//! source's callbacks before attaching to the new one, and a generation stamp
//! discards any frame from a superseded binding, so rebind is atomic from the
//! display's point of view. The binding never keeps a source alive past its
//! removal from the registry (it holds a weak reference) and never calls raw
//! `stop()` on a source another consumer may still need.

use crate::capture::registry::{DeviceRegistry, RegistryEvent};
use crate::capture::source::FrameSource;
use crate::error::VideoResult;
use crate::frame::Frame;
use crate::observer::SubscriptionId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Rendering collaborator. Implementations receive frames on the capture
/// thread and must not block materially; dropping frames is preferable to
/// back-pressuring capture.
pub trait DisplaySink: Send + Sync {
    fn show_frame(&self, frame: &Frame);
    fn show_rate(&self, fps: f64);
    /// The view has no source; render the reason (e.g. "no camera") instead
    /// of freezing on the last frame.
    fn show_placeholder(&self, reason: &str);
}

struct Bound {
    source: Weak<FrameSource>,
    label: String,
    frame_sub: SubscriptionId,
    rate_sub: SubscriptionId,
}

pub struct ViewBinding {
    sink: Arc<dyn DisplaySink>,
    bound: Mutex<Option<Bound>>,
    /// Bumped on every bind/unbind; callbacks stamped with an older value
    /// drop their frames.
    generation: Arc<AtomicU64>,
}

impl ViewBinding {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            sink,
            bound: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Label of the currently bound source, if any.
    pub fn bound_label(&self) -> Option<String> {
        self.bound.lock().as_ref().map(|b| b.label.clone())
    }

    /// Atomically retarget the view: detach from the previous source, then
    /// attach to `source` and ensure it is capturing. On failure the binding
    /// ends up unbound with a placeholder shown, never on a stale frame.
    pub fn bind(&self, source: &Arc<FrameSource>) -> VideoResult<()> {
        let mut bound = self.bound.lock();
        Self::detach(&self.generation, &mut bound);

        if let Err(e) = source.acquire() {
            self.sink.show_placeholder("no camera");
            return Err(e);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let frame_sub = {
            let sink = self.sink.clone();
            let stamp = self.generation.clone();
            source.register_frame_callback(Arc::new(move |frame: &Frame| {
                if stamp.load(Ordering::SeqCst) == generation {
                    sink.show_frame(frame);
                }
            }))
        };
        let rate_sub = {
            let sink = self.sink.clone();
            let stamp = self.generation.clone();
            source.register_rate_callback(Arc::new(move |fps: &f64| {
                if stamp.load(Ordering::SeqCst) == generation {
                    sink.show_rate(*fps);
                }
            }))
        };

        tracing::info!("View bound to {}", source.label());
        *bound = Some(Bound {
            source: Arc::downgrade(source),
            label: source.label().to_string(),
            frame_sub,
            rate_sub,
        });
        Ok(())
    }

    /// Detach from the current source without stopping it outright; the
    /// source winds down only if this view was its last user.
    pub fn unbind(&self) {
        let mut bound = self.bound.lock();
        Self::detach(&self.generation, &mut bound);
    }

    /// Subscribe this binding to registry removals: losing the bound source
    /// transitions the view to an explicit placeholder state.
    pub fn watch(self: &Arc<Self>, registry: &DeviceRegistry) -> SubscriptionId {
        let binding = Arc::downgrade(self);
        registry.subscribe(Arc::new(move |event: &RegistryEvent| {
            let Some(binding) = binding.upgrade() else {
                return;
            };
            if let RegistryEvent::Removed(source) = event {
                if binding.bound_label().as_deref() == Some(source.label()) {
                    tracing::info!("Bound camera {} removed", source.label());
                    binding.unbind();
                    binding.sink.show_placeholder("no camera");
                }
            }
        }))
    }

    fn detach(generation: &Arc<AtomicU64>, bound: &mut Option<Bound>) {
        // Invalidate in-flight deliveries before touching the observer lists.
        generation.fetch_add(1, Ordering::SeqCst);
        if let Some(old) = bound.take() {
            if let Some(source) = old.source.upgrade() {
                source.unregister_frame_callback(old.frame_sub);
                source.unregister_rate_callback(old.rate_sub);
                source.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::registry::DeviceRegistry;
    use crate::capture::source::SourceState;
    use crate::capture::synthetic::SyntheticSpec;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct TestSink {
        widths: Mutex<Vec<u32>>,
        placeholders: Mutex<Vec<String>>,
        rates: AtomicUsize,
    }

    impl DisplaySink for TestSink {
        fn show_frame(&self, frame: &Frame) {
            self.widths.lock().push(frame.width);
        }
        fn show_rate(&self, _fps: f64) {
            self.rates.fetch_add(1, Ordering::SeqCst);
        }
        fn show_placeholder(&self, reason: &str) {
            self.placeholders.lock().push(reason.to_string());
        }
    }

    fn source(label: &str, width: u32) -> Arc<FrameSource> {
        Arc::new(FrameSource::new(Arc::new(SyntheticSpec::new(
            label, width, 8, 200,
        ))))
    }

    fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn rebind_delivers_only_new_source_frames() {
        let sink = Arc::new(TestSink::default());
        let binding = ViewBinding::new(sink.clone());
        let cam1 = source("cam1", 32);
        let cam2 = source("cam2", 64);

        binding.bind(&cam1).unwrap();
        assert!(wait_for(
            || !sink.widths.lock().is_empty(),
            Duration::from_secs(2)
        ));

        binding.bind(&cam2).unwrap();
        let mark = sink.widths.lock().len();
        assert!(wait_for(
            || sink.widths.lock().len() > mark + 3,
            Duration::from_secs(2)
        ));

        // Nothing delivered after the rebind returned may come from cam1.
        assert!(sink.widths.lock()[mark..].iter().all(|w| *w == 64));
        assert_eq!(cam1.state(), SourceState::Idle);
        binding.unbind();
        assert_eq!(cam2.state(), SourceState::Idle);
    }

    #[test]
    fn no_frames_after_unbind() {
        let sink = Arc::new(TestSink::default());
        let binding = ViewBinding::new(sink.clone());
        let cam = source("cam", 16);

        binding.bind(&cam).unwrap();
        assert!(wait_for(
            || sink.widths.lock().len() >= 3,
            Duration::from_secs(2)
        ));

        binding.unbind();
        let frozen = sink.widths.lock().len();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sink.widths.lock().len(), frozen);
    }

    #[test]
    fn bind_failure_leaves_view_unbound_with_placeholder() {
        let sink = Arc::new(TestSink::default());
        let binding = ViewBinding::new(sink.clone());
        // A failed source rejects start(), which makes bind() fail.
        let cam = source("cam", 16);
        let dying = Arc::new(FrameSource::new(Arc::new(
            SyntheticSpec::new("dying", 8, 8, 1000).failing_after(0),
        )));
        dying.start().unwrap();
        assert!(wait_for(
            || dying.state() == SourceState::Failed,
            Duration::from_secs(5)
        ));

        binding.bind(&cam).unwrap();
        assert!(binding.bind(&dying).is_err());
        assert!(binding.bound_label().is_none());
        assert_eq!(sink.placeholders.lock().last().unwrap(), "no camera");
        // The previous source was released by the failed rebind.
        assert_eq!(cam.state(), SourceState::Idle);
    }

    #[test]
    fn bind_rejects_failed_source_still_held_by_another_consumer() {
        let dying = Arc::new(FrameSource::new(Arc::new(
            SyntheticSpec::new("dying", 8, 8, 1000).failing_after(0),
        )));
        // Another consumer keeps the user count positive across the failure.
        dying.acquire().unwrap();
        assert!(wait_for(
            || dying.state() == SourceState::Failed,
            Duration::from_secs(5)
        ));

        let sink = Arc::new(TestSink::default());
        let binding = ViewBinding::new(sink.clone());
        assert!(binding.bind(&dying).is_err());
        assert!(binding.bound_label().is_none());
        assert_eq!(sink.placeholders.lock().last().unwrap(), "no camera");
        dying.release();
    }

    #[test]
    fn removal_of_bound_camera_unbinds_and_shows_placeholder() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.attach(Arc::new(SyntheticSpec::new("cam1", 16, 8, 200)));

        let sink = Arc::new(TestSink::default());
        let binding = Arc::new(ViewBinding::new(sink.clone()));
        binding.watch(&registry);

        let cam1 = registry.get("cam1").unwrap();
        binding.bind(&cam1).unwrap();

        registry.detach("cam1");
        assert!(binding.bound_label().is_none());
        assert_eq!(sink.placeholders.lock().as_slice(), ["no camera"]);
    }
}
