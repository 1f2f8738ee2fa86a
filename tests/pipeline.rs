//! End-to-end scenarios for the capture/control pipeline, driven through the
//! public API with synthetic cameras and an in-memory recording sink.

use oscvideo::capture::{DeviceRegistry, DisplaySink, SyntheticSpec, ViewBinding};
use oscvideo::control::{Command, ControlChannel, Notification, Target};
use oscvideo::error::{VideoError, VideoResult};
use oscvideo::frame::Frame;
use oscvideo::recorder::{
    FrameWriter, RecordState, RecordingCoordinator, RecordingEvent, StopReason, WriterHandle,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Recording sink that counts frames per label instead of encoding them.
#[derive(Default)]
struct MemoryWriter {
    fail_open: AtomicBool,
    frames: Arc<Mutex<HashMap<String, u64>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

struct MemoryHandle {
    label: String,
    frames: Arc<Mutex<HashMap<String, u64>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl FrameWriter for MemoryWriter {
    fn open(&self, label: &str, _output_dir: &Path) -> VideoResult<Box<dyn WriterHandle>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(VideoError::WriterFailure("disk full (simulated)".into()));
        }
        Ok(Box::new(MemoryHandle {
            label: label.to_string(),
            frames: self.frames.clone(),
            closed: self.closed.clone(),
        }))
    }
}

impl WriterHandle for MemoryHandle {
    fn write(&mut self, _frame: &Frame) -> VideoResult<()> {
        *self.frames.lock().entry(self.label.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> VideoResult<()> {
        self.closed.lock().push(self.label.clone());
        Ok(())
    }
}

struct Rig {
    registry: Arc<DeviceRegistry>,
    coordinator: Arc<RecordingCoordinator>,
    writer: Arc<MemoryWriter>,
    events: broadcast::Receiver<RecordingEvent>,
}

fn rig(cameras: &[&str]) -> Rig {
    let registry = Arc::new(DeviceRegistry::new());
    for label in cameras {
        registry.attach(Arc::new(SyntheticSpec::new(*label, 16, 12, 200)));
    }
    let writer = Arc::new(MemoryWriter::default());
    let coordinator = RecordingCoordinator::new(
        registry.clone(),
        writer.clone(),
        PathBuf::from("unused"),
    );
    let events = coordinator.subscribe();
    Rig {
        registry,
        coordinator,
        writer,
        events,
    }
}

fn drain(rx: &mut broadcast::Receiver<RecordingEvent>) -> Vec<RecordingEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

async fn next_event(rx: &mut broadcast::Receiver<RecordingEvent>) -> RecordingEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a recording event")
        .expect("event channel closed")
}

#[tokio::test]
async fn start_one_camera_opens_writer_and_notifies_once() {
    let mut rig = rig(&["cam1"]);

    rig.coordinator.start("cam1").unwrap();
    assert_eq!(rig.coordinator.state_of("cam1"), RecordState::Recording);
    assert!(rig.coordinator.any_recording());

    let events = drain(&mut rig.events);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], RecordingEvent::Started { label } if label == "cam1"));
    assert!(matches!(&events[1], RecordingEvent::AggregateChanged(true)));

    // Frames flow from the capture thread into the writer.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(*rig.writer.frames.lock().get("cam1").unwrap_or(&0) > 0);

    rig.coordinator.stop("cam1").unwrap();
    let events = drain(&mut rig.events);
    assert!(matches!(
        &events[0],
        RecordingEvent::Stopped { label, reason: StopReason::Requested } if label == "cam1"
    ));
    assert!(matches!(&events[1], RecordingEvent::AggregateChanged(false)));
    assert_eq!(rig.writer.closed.lock().as_slice(), ["cam1"]);

    // No writes after stop returned.
    let frozen = *rig.writer.frames.lock().get("cam1").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*rig.writer.frames.lock().get("cam1").unwrap(), frozen);
}

#[tokio::test]
async fn start_is_idempotent() {
    let mut rig = rig(&["cam1"]);

    rig.coordinator.start("cam1").unwrap();
    drain(&mut rig.events);

    rig.coordinator.start("cam1").unwrap();
    assert!(drain(&mut rig.events).is_empty());

    rig.coordinator.stop("cam1").unwrap();
}

#[tokio::test]
async fn aggregate_notification_suppressed_while_another_source_records() {
    let mut rig = rig(&["cam1", "cam2"]);

    rig.coordinator.start("cam1").unwrap();
    drain(&mut rig.events);

    // Second source: per-source event only, aggregate already true.
    rig.coordinator.start("cam2").unwrap();
    let events = drain(&mut rig.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], RecordingEvent::Started { label } if label == "cam2"));

    // Stopping one of two: aggregate notification suppressed.
    rig.coordinator.stop("cam1").unwrap();
    let events = drain(&mut rig.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        RecordingEvent::Stopped { label, reason: StopReason::Requested } if label == "cam1"
    ));
    assert!(rig.coordinator.any_recording());

    rig.coordinator.stop("cam2").unwrap();
    let events = drain(&mut rig.events);
    assert!(matches!(&events[1], RecordingEvent::AggregateChanged(false)));
}

#[tokio::test]
async fn unknown_label_is_rejected_without_state_change() {
    let mut rig = rig(&["cam1"]);

    assert!(matches!(
        rig.coordinator.start("doesnotexist"),
        Err(VideoError::UnknownSource(label)) if label == "doesnotexist"
    ));
    assert!(!rig.coordinator.any_recording());
    assert!(drain(&mut rig.events).is_empty());
    assert!(rig.writer.frames.lock().is_empty());
}

#[tokio::test]
async fn writer_open_failure_aborts_start() {
    let mut rig = rig(&["cam1"]);
    rig.writer.fail_open.store(true, Ordering::SeqCst);

    assert!(matches!(
        rig.coordinator.start("cam1"),
        Err(VideoError::WriterFailure(_))
    ));
    assert_eq!(rig.coordinator.state_of("cam1"), RecordState::Stopped);
    assert!(!rig.coordinator.any_recording());

    let events = drain(&mut rig.events);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], RecordingEvent::WriterError { label, .. } if label == "cam1"));
}

#[tokio::test]
async fn capture_failure_forces_a_distinct_stop() {
    let registry = Arc::new(DeviceRegistry::new());
    registry.attach(Arc::new(
        SyntheticSpec::new("cam1", 16, 12, 1000).failing_after(3),
    ));
    let writer = Arc::new(MemoryWriter::default());
    let coordinator =
        RecordingCoordinator::new(registry.clone(), writer.clone(), PathBuf::from("unused"));
    coordinator.spawn_failure_drain();
    let mut events = coordinator.subscribe();

    coordinator.start("cam1").unwrap();
    assert!(matches!(next_event(&mut events).await, RecordingEvent::Started { .. }));
    assert!(matches!(
        next_event(&mut events).await,
        RecordingEvent::AggregateChanged(true)
    ));

    // The device dies after three frames; the source burns its retry budget
    // and the coordinator forces the recording down.
    assert!(matches!(
        next_event(&mut events).await,
        RecordingEvent::Stopped { label, reason: StopReason::CaptureFailure } if label == "cam1"
    ));
    assert!(matches!(
        next_event(&mut events).await,
        RecordingEvent::AggregateChanged(false)
    ));
    assert_eq!(writer.closed.lock().as_slice(), ["cam1"]);

    // A later explicit stop is a no-op.
    coordinator.stop("cam1").unwrap();
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn device_removal_while_recording_forces_stop() {
    let mut rig = rig(&["cam1"]);
    rig.coordinator.watch_registry();

    rig.coordinator.start("cam1").unwrap();
    drain(&mut rig.events);

    rig.registry.detach("cam1");
    let events = drain(&mut rig.events);
    assert!(matches!(
        &events[0],
        RecordingEvent::Stopped { label, reason: StopReason::DeviceRemoved } if label == "cam1"
    ));
    assert!(matches!(&events[1], RecordingEvent::AggregateChanged(false)));
    assert_eq!(rig.writer.closed.lock().as_slice(), ["cam1"]);

    // The label is gone from the registry, so commands now reject it.
    assert!(matches!(
        rig.coordinator.stop("cam1"),
        Err(VideoError::UnknownSource(_))
    ));
}

#[tokio::test]
async fn toggle_round_trip_restores_the_aggregate() {
    let mut rig = rig(&["cam1", "cam2"]);
    let channel = ControlChannel::new(rig.registry.clone(), rig.coordinator.clone());

    assert!(!rig.coordinator.any_recording());
    channel.handle(Command::ToggleRecording).unwrap();
    assert_eq!(rig.coordinator.state_of("cam1"), RecordState::Recording);
    assert_eq!(rig.coordinator.state_of("cam2"), RecordState::Recording);

    channel.handle(Command::ToggleRecording).unwrap();
    assert!(!rig.coordinator.any_recording());

    // Aggregate flipped up exactly once and down exactly once.
    let flips: Vec<bool> = drain(&mut rig.events)
        .into_iter()
        .filter_map(|event| match event {
            RecordingEvent::AggregateChanged(value) => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(flips, vec![true, false]);
}

#[tokio::test]
async fn list_cameras_replies_to_the_command_origin() {
    let rig = rig(&["cam2", "cam1"]);
    let channel = ControlChannel::new(rig.registry.clone(), rig.coordinator.clone());

    let replies = channel.handle(Command::ListCameras).unwrap();
    assert_eq!(
        replies,
        vec![Notification::CameraList(vec![
            "cam1".to_string(),
            "cam2".to_string()
        ])]
    );

    let error = channel
        .handle(Command::StartRecording(Target::One("ghost".into())))
        .unwrap_err();
    assert!(matches!(error, VideoError::UnknownSource(_)));
}

#[derive(Default)]
struct CountingSink {
    frames: Mutex<Vec<u32>>,
    placeholders: Mutex<Vec<String>>,
}

impl DisplaySink for CountingSink {
    fn show_frame(&self, frame: &Frame) {
        self.frames.lock().push(frame.width);
    }
    fn show_rate(&self, _fps: f64) {}
    fn show_placeholder(&self, reason: &str) {
        self.placeholders.lock().push(reason.to_string());
    }
}

#[tokio::test]
async fn view_and_recorder_share_a_source_without_stealing_it() {
    let rig = rig(&["cam1"]);
    let source = rig.registry.get("cam1").unwrap();

    let sink = Arc::new(CountingSink::default());
    let binding = Arc::new(ViewBinding::new(sink.clone()));
    binding.bind(&source).unwrap();

    rig.coordinator.start("cam1").unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Stopping the recording must not stop the view's capture.
    rig.coordinator.stop("cam1").unwrap();
    assert_eq!(
        source.state(),
        oscvideo::capture::SourceState::Capturing
    );
    let before = sink.frames.lock().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sink.frames.lock().len() > before);

    // The last user winds the source down.
    binding.unbind();
    assert_eq!(source.state(), oscvideo::capture::SourceState::Idle);
}

mod osc_round_trip {
    use super::*;
    use oscvideo::config::OscSettings;
    use oscvideo::control::{spawn_notification_bridge, OscServer};
    use rosc::{OscMessage, OscPacket, OscType};

    async fn recv_message(socket: &tokio::net::UdpSocket) -> OscMessage {
        let mut buf = vec![0u8; rosc::decoder::MTU];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for an OSC message")
            .expect("recv failed");
        match rosc::decoder::decode_udp(&buf[..len]).expect("bad packet").1 {
            OscPacket::Message(message) => message,
            OscPacket::Bundle(_) => panic!("unexpected bundle"),
        }
    }

    async fn send_command(socket: &tokio::net::UdpSocket, to: std::net::SocketAddr, addr: &str) {
        let bytes = rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args: vec![],
        }))
        .unwrap();
        socket.send_to(&bytes, to).await.unwrap();
    }

    #[tokio::test]
    async fn commands_in_notifications_out() {
        let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        registry.attach(Arc::new(SyntheticSpec::new("cam1", 16, 12, 200)));
        let writer = Arc::new(MemoryWriter::default());
        let coordinator =
            RecordingCoordinator::new(registry.clone(), writer, PathBuf::from("unused"));
        let channel = ControlChannel::new(registry.clone(), coordinator.clone());

        let (notification_tx, notification_rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_notification_bridge(&registry, &coordinator, notification_tx);

        let server = OscServer::bind(&OscSettings {
            listen: "127.0.0.1:0".to_string(),
            notify: Some(client_addr.to_string()),
        })
        .await
        .unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(server.run(channel, notification_rx));

        // Camera list reply goes back to this socket.
        send_command(&client, server_addr, "/oscvideo/cameras/list").await;
        let reply = recv_message(&client).await;
        assert_eq!(reply.addr, "/oscvideo/cameras");
        assert_eq!(reply.args, vec![OscType::String("cam1".into())]);

        // Starting the recording pushes per-source and aggregate state.
        send_command(&client, server_addr, "/oscvideo/record/start").await;
        let first = recv_message(&client).await;
        assert_eq!(first.addr, "/oscvideo/recording");
        assert_eq!(
            first.args,
            vec![OscType::String("cam1".into()), OscType::Int(1)]
        );
        let second = recv_message(&client).await;
        assert_eq!(
            second.args,
            vec![OscType::String("*".into()), OscType::Int(1)]
        );

        send_command(&client, server_addr, "/oscvideo/record/stop").await;
        let first = recv_message(&client).await;
        assert_eq!(
            first.args,
            vec![OscType::String("cam1".into()), OscType::Int(0)]
        );
        let second = recv_message(&client).await;
        assert_eq!(
            second.args,
            vec![OscType::String("*".into()), OscType::Int(0)]
        );

        // Unknown labels come back as an error to the sender only.
        let bytes = rosc::encoder::encode(&OscPacket::Message(OscMessage {
            addr: "/oscvideo/record/start".to_string(),
            args: vec![OscType::String("ghost".into())],
        }))
        .unwrap();
        client.send_to(&bytes, server_addr).await.unwrap();
        let error = recv_message(&client).await;
        assert_eq!(error.addr, "/oscvideo/error");
    }
}
