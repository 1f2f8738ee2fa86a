//! Network control surface
//!
//! Typed commands and notifications (`channel`) plus the OSC/UDP transport
//! adapter (`osc`). The pipeline core never sees wire encoding.

pub mod channel;
pub mod osc;

pub use channel::{spawn_notification_bridge, Command, ControlChannel, Notification, Target};
pub use osc::OscServer;
