//! oscvideo - OSC-controlled multi-camera video capture and recording
//!
//! Per camera a dedicated capture thread produces frames and a frame-rate
//! estimate; a dynamic registry tracks attach/detach; a recording
//! coordinator owns per-source and aggregate recording state; an OSC/UDP
//! adapter exposes start/stop/toggle/list over the network and pushes state
//! notifications back out.

pub mod capture;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod observer;
pub mod recorder;

pub use capture::{DeviceRegistry, FrameSource, ViewBinding};
pub use config::Settings;
pub use control::{Command, ControlChannel, Notification};
pub use error::{VideoError, VideoResult};
pub use frame::Frame;
pub use recorder::RecordingCoordinator;

use crate::capture::SyntheticSpec;
use crate::recorder::FfmpegWriter;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oscvideo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the capture/control pipeline until interrupted.
pub async fn run(settings: Settings) -> VideoResult<()> {
    tracing::info!("Starting oscvideo v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(DeviceRegistry::new());
    for synthetic in &settings.camera.synthetic {
        registry.attach(Arc::new(SyntheticSpec::new(
            synthetic.label.clone(),
            synthetic.width,
            synthetic.height,
            synthetic.fps,
        )));
    }
    let monitor = settings.camera.discover.then(|| {
        capture::spawn_discovery_monitor(
            registry.clone(),
            Duration::from_millis(settings.camera.rescan_interval_ms.max(100)),
        )
    });

    let writer = Arc::new(FfmpegWriter::new(
        settings.recording.ffmpeg.clone(),
        settings.recording.framerate,
    ));
    let coordinator = RecordingCoordinator::new(
        registry.clone(),
        writer,
        settings.recording.output_dir.clone(),
    );
    coordinator.spawn_failure_drain();
    coordinator.watch_registry();

    let channel = ControlChannel::new(registry.clone(), coordinator.clone());
    let (notification_tx, notification_rx) = tokio::sync::mpsc::unbounded_channel();
    control::spawn_notification_bridge(&registry, &coordinator, notification_tx);

    if settings.gui.enabled {
        // Rendering lives outside this build; the pipeline runs regardless.
        tracing::warn!("gui.enabled is set but this build has no window; running headless");
    }

    let server = control::OscServer::bind(&settings.osc).await?;
    tokio::select! {
        result = server.run(channel, notification_rx) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    coordinator.stop_all();
    if let Some(monitor) = monitor {
        monitor.abort();
    }
    registry.shutdown();
    Ok(())
}
