//! OSC transport adapter
//!
//! UDP server decoding OSC packets into typed commands and encoding
//! notifications back out. Command replies and errors go to the packet's
//! origin; proactive notifications go to the configured notify address.
//! Malformed packets are logged and dropped, never fatal.
//!
//! Address space:
//!   in:  /oscvideo/record/start [label]     (no label, "" or "all" = all)
//!        /oscvideo/record/stop  [label]
//!        /oscvideo/record/toggle
//!        /oscvideo/cameras/list
//!   out: /oscvideo/recording <label|"*"> <0|1>
//!        /oscvideo/camera/added <label>
//!        /oscvideo/camera/removed <label>
//!        /oscvideo/cameras <label...>
//!        /oscvideo/status <text>
//!        /oscvideo/error <text>

use crate::config::OscSettings;
use crate::control::channel::{Command, ControlChannel, Notification, Target};
use crate::error::{VideoError, VideoResult};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub struct OscServer {
    socket: Arc<UdpSocket>,
    notify: Option<SocketAddr>,
}

impl OscServer {
    pub async fn bind(settings: &OscSettings) -> VideoResult<Self> {
        let socket = UdpSocket::bind(&settings.listen).await?;
        let notify = settings
            .notify
            .as_deref()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .map_err(|e| VideoError::Config(format!("osc.notify {addr}: {e}")))
            })
            .transpose()?;
        tracing::info!("OSC control listening on {}", socket.local_addr()?);
        if let Some(addr) = notify {
            tracing::info!("OSC notifications go to {addr}");
        }
        Ok(Self {
            socket: Arc::new(socket),
            notify,
        })
    }

    pub fn local_addr(&self) -> VideoResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve commands and forward notifications until the socket fails.
    pub async fn run(
        self,
        channel: ControlChannel,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> VideoResult<()> {
        if let Some(addr) = self.notify {
            let socket = self.socket.clone();
            tokio::spawn(async move {
                while let Some(notification) = notifications.recv().await {
                    send_message(&socket, addr, encode_notification(&notification)).await;
                }
            });
        } else {
            // Keep the queue drained so senders never accumulate.
            tokio::spawn(async move {
                while let Some(notification) = notifications.recv().await {
                    tracing::debug!("No notify address, dropping {notification:?}");
                }
            });
        }

        let mut buf = vec![0u8; rosc::decoder::MTU];
        loop {
            let (len, origin) = self.socket.recv_from(&mut buf).await?;
            let packet = match rosc::decoder::decode_udp(&buf[..len]) {
                Ok((_, packet)) => packet,
                Err(e) => {
                    tracing::warn!("Dropping malformed OSC packet from {origin}: {e:?}");
                    continue;
                }
            };
            let mut messages = Vec::new();
            collect_messages(packet, &mut messages);
            for message in messages {
                self.handle_message(&channel, message, origin).await;
            }
        }
    }

    async fn handle_message(&self, channel: &ControlChannel, message: OscMessage, origin: SocketAddr) {
        let Some(command) = decode_command(&message) else {
            tracing::warn!("Unrecognized OSC address {} from {origin}", message.addr);
            let error = Notification::CommandError(format!(
                "unrecognized address {}",
                message.addr
            ));
            send_message(&self.socket, origin, encode_notification(&error)).await;
            return;
        };

        match channel.handle(command) {
            Ok(replies) => {
                for reply in replies {
                    send_message(&self.socket, origin, encode_notification(&reply)).await;
                }
            }
            Err(e) => {
                // Command-level errors go back to the origin only.
                let error = Notification::CommandError(e.to_string());
                send_message(&self.socket, origin, encode_notification(&error)).await;
            }
        }
    }
}

/// Flatten a packet (bundles may nest) into its messages, in order.
fn collect_messages(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                collect_messages(inner, out);
            }
        }
    }
}

/// Map an OSC message onto a typed command. The first non-empty string
/// argument selects the camera; absent, empty, or "all" addresses all.
pub fn decode_command(message: &OscMessage) -> Option<Command> {
    let target = || {
        message
            .args
            .iter()
            .find_map(|arg| match arg {
                OscType::String(s) if !s.is_empty() && s != "all" => Some(Target::One(s.clone())),
                _ => None,
            })
            .unwrap_or(Target::All)
    };

    match message.addr.as_str() {
        "/oscvideo/record/start" => Some(Command::StartRecording(target())),
        "/oscvideo/record/stop" => Some(Command::StopRecording(target())),
        "/oscvideo/record/toggle" => Some(Command::ToggleRecording),
        "/oscvideo/cameras/list" => Some(Command::ListCameras),
        _ => None,
    }
}

pub fn encode_notification(notification: &Notification) -> OscMessage {
    match notification {
        Notification::RecordingState { target, recording } => OscMessage {
            addr: "/oscvideo/recording".into(),
            args: vec![
                OscType::String(match target {
                    Target::All => "*".to_string(),
                    Target::One(label) => label.clone(),
                }),
                OscType::Int(i32::from(*recording)),
            ],
        },
        Notification::CameraAdded(label) => OscMessage {
            addr: "/oscvideo/camera/added".into(),
            args: vec![OscType::String(label.clone())],
        },
        Notification::CameraRemoved(label) => OscMessage {
            addr: "/oscvideo/camera/removed".into(),
            args: vec![OscType::String(label.clone())],
        },
        Notification::CameraList(labels) => OscMessage {
            addr: "/oscvideo/cameras".into(),
            args: labels.iter().cloned().map(OscType::String).collect(),
        },
        Notification::Status(text) => OscMessage {
            addr: "/oscvideo/status".into(),
            args: vec![OscType::String(text.clone())],
        },
        Notification::CommandError(text) => error_message(text),
    }
}

fn error_message(text: &str) -> OscMessage {
    OscMessage {
        addr: "/oscvideo/error".into(),
        args: vec![OscType::String(text.to_string())],
    }
}

async fn send_message(socket: &UdpSocket, to: SocketAddr, message: OscMessage) {
    match rosc::encoder::encode(&OscPacket::Message(message)) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, to).await {
                tracing::warn!("Failed to send OSC message to {to}: {e}");
            }
        }
        Err(e) => tracing::warn!("Failed to encode OSC message: {e:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn decodes_labeled_and_unlabeled_commands() {
        assert_eq!(
            decode_command(&message(
                "/oscvideo/record/start",
                vec![OscType::String("cam1".into())]
            )),
            Some(Command::StartRecording(Target::One("cam1".into())))
        );
        assert_eq!(
            decode_command(&message("/oscvideo/record/stop", vec![])),
            Some(Command::StopRecording(Target::All))
        );
        assert_eq!(
            decode_command(&message(
                "/oscvideo/record/start",
                vec![OscType::String("all".into())]
            )),
            Some(Command::StartRecording(Target::All))
        );
        assert_eq!(
            decode_command(&message("/oscvideo/record/toggle", vec![])),
            Some(Command::ToggleRecording)
        );
        assert_eq!(
            decode_command(&message("/oscvideo/cameras/list", vec![])),
            Some(Command::ListCameras)
        );
        assert_eq!(decode_command(&message("/oscvideo/nope", vec![])), None);
    }

    #[test]
    fn encodes_recording_state_for_aggregate_and_label() {
        let aggregate = encode_notification(&Notification::RecordingState {
            target: Target::All,
            recording: true,
        });
        assert_eq!(aggregate.addr, "/oscvideo/recording");
        assert_eq!(
            aggregate.args,
            vec![OscType::String("*".into()), OscType::Int(1)]
        );

        let labeled = encode_notification(&Notification::RecordingState {
            target: Target::One("cam1".into()),
            recording: false,
        });
        assert_eq!(
            labeled.args,
            vec![OscType::String("cam1".into()), OscType::Int(0)]
        );
    }

    #[test]
    fn command_errors_encode_to_the_error_address() {
        let message =
            encode_notification(&Notification::CommandError("unknown source: ghost".into()));
        assert_eq!(message.addr, "/oscvideo/error");
        assert_eq!(
            message.args,
            vec![OscType::String("unknown source: ghost".into())]
        );
    }

    #[test]
    fn bundles_flatten_in_order() {
        let bundle = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime {
                seconds: 0,
                fractional: 0,
            },
            content: vec![
                OscPacket::Message(message("/oscvideo/record/start", vec![])),
                OscPacket::Message(message("/oscvideo/record/stop", vec![])),
            ],
        });
        let mut messages = Vec::new();
        collect_messages(bundle, &mut messages);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].addr, "/oscvideo/record/start");
    }
}
