//! Settings
//!
//! JSON settings file with `camera`, `osc`, `recording`, and `gui` sections.
//! Every field has a default, so a missing file or an empty object yields a
//! working headless configuration.

use crate::error::VideoResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub osc: OscSettings,
    pub recording: RecordingSettings,
    pub gui: GuiSettings,
}

impl Settings {
    pub fn load(path: &Path) -> VideoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Rescan the platform camera list and attach/detach automatically
    pub discover: bool,

    /// Milliseconds between discovery rescans
    pub rescan_interval_ms: u64,

    /// Software test-pattern cameras attached at startup (never removed by
    /// discovery)
    pub synthetic: Vec<SyntheticCameraSettings>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            discover: true,
            rescan_interval_ms: 2000,
            synthetic: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticCameraSettings {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SyntheticCameraSettings {
    fn default() -> Self {
        Self {
            label: "synthetic".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    /// Bind address for inbound commands
    pub listen: String,

    /// Where proactive notifications are sent; none means notifications are
    /// dropped
    pub notify: Option<String>,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:57220".to_string(),
            notify: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory recordings are written into
    pub output_dir: PathBuf,

    /// ffmpeg executable
    pub ffmpeg: String,

    /// Framerate advertised to the encoder
    pub framerate: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            ffmpeg: "ffmpeg".to_string(),
            framerate: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiSettings {
    /// Absent or false means headless operation
    pub enabled: bool,
}
