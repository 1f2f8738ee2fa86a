//! Device registry
//!
//! Label-keyed map of the currently attached frame sources, mutated only by
//! device discovery (single writer), read by everyone else. Subscribers get
//! ordered add/remove events; there is no replay for late subscribers.

use crate::capture::device::DeviceSpec;
use crate::capture::source::FrameSource;
use crate::observer::{Callback, Observers, SubscriptionId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Attach/detach notification. Carries the source so subscribers can bind to
/// a freshly added camera without a registry lookup.
#[derive(Clone)]
pub enum RegistryEvent {
    Added(Arc<FrameSource>),
    Removed(Arc<FrameSource>),
}

struct Entry {
    source: Arc<FrameSource>,
    /// Whether the entry came from discovery (and may be detached by a
    /// rescan) or was pinned from configuration.
    discovered: bool,
}

pub struct DeviceRegistry {
    sources: Mutex<BTreeMap<String, Entry>>,
    events: Observers<RegistryEvent>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(BTreeMap::new()),
            events: Observers::new(),
        }
    }

    /// Label-sorted snapshot of the attached sources. The snapshot can go
    /// stale as soon as it is returned; callers must tolerate a source that
    /// has since been removed.
    pub fn list(&self) -> Vec<Arc<FrameSource>> {
        self.sources
            .lock()
            .values()
            .map(|entry| entry.source.clone())
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.sources.lock().keys().cloned().collect()
    }

    pub fn get(&self, label: &str) -> Option<Arc<FrameSource>> {
        self.sources.lock().get(label).map(|entry| entry.source.clone())
    }

    /// Attach a configuration-pinned source. Rescans never remove it.
    pub fn attach(&self, spec: Arc<dyn DeviceSpec>) -> bool {
        self.attach_inner(spec, false)
    }

    fn attach_inner(&self, spec: Arc<dyn DeviceSpec>, discovered: bool) -> bool {
        let label = spec.label().to_string();
        let source = Arc::new(FrameSource::new(spec));
        {
            let mut sources = self.sources.lock();
            if sources.contains_key(&label) {
                tracing::warn!("Ignoring duplicate camera label {label}");
                return false;
            }
            sources.insert(
                label.clone(),
                Entry {
                    source: source.clone(),
                    discovered,
                },
            );
        }
        tracing::info!("Camera attached: {label}");
        self.events.emit(&RegistryEvent::Added(source));
        true
    }

    /// Detach a source: remove it from the map, force its capture loop down,
    /// then notify subscribers. Returns false if the label was not attached.
    pub fn detach(&self, label: &str) -> bool {
        let entry = self.sources.lock().remove(label);
        match entry {
            Some(entry) => {
                entry.source.stop();
                tracing::info!("Camera detached: {label}");
                self.events.emit(&RegistryEvent::Removed(entry.source));
                true
            }
            None => false,
        }
    }

    /// Reconcile the discovered device set against the registry: attach new
    /// labels, detach discovered labels that disappeared. Pinned entries are
    /// left alone. Called from the single discovery context.
    pub fn sync_discovered(&self, specs: Vec<Arc<dyn DeviceSpec>>) {
        let present: Vec<String> = specs.iter().map(|s| s.label().to_string()).collect();

        let vanished: Vec<String> = self
            .sources
            .lock()
            .iter()
            .filter(|(label, entry)| entry.discovered && !present.contains(label))
            .map(|(label, _)| label.clone())
            .collect();
        for label in vanished {
            self.detach(&label);
        }

        for spec in specs {
            let known = self.sources.lock().contains_key(spec.label());
            if !known {
                self.attach_inner(spec, true);
            }
        }
    }

    pub fn subscribe(&self, callback: Callback<RegistryEvent>) -> SubscriptionId {
        self.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Detach everything. Used on shutdown; every subscriber sees a Removed
    /// event per source.
    pub fn shutdown(&self) {
        for label in self.labels() {
            self.detach(&label);
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically rescan the platform camera list and reconcile the registry.
/// The monitor runs until the caller calls `abort()` on the returned handle;
/// dropping the handle detaches the task without stopping it.
pub fn spawn_discovery_monitor(
    registry: Arc<DeviceRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let specs = crate::capture::webcam::enumerate();
            registry.sync_discovered(specs);
            tokio::time::sleep(interval).await;
        }
    })
}
