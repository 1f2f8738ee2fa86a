//! Recording sink
//!
//! The coordinator only knows open/write/close; the default implementation
//! pipes raw frames into an ffmpeg child process that encodes H.264 MP4.
//! The child is spawned lazily on the first frame, once the actual frame
//! dimensions and pixel format are known.

use crate::error::{VideoError, VideoResult};
use crate::frame::{Frame, PixelFormat};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Recording/encoding backend: one open handle per recording source.
pub trait FrameWriter: Send + Sync {
    fn open(&self, label: &str, output_dir: &Path) -> VideoResult<Box<dyn WriterHandle>>;
}

/// An open recording. Write errors are non-fatal to the recording; `close`
/// flushes and releases the sink.
pub trait WriterHandle: Send {
    fn write(&mut self, frame: &Frame) -> VideoResult<()>;
    fn close(self: Box<Self>) -> VideoResult<()>;
}

/// ffmpeg-backed writer.
pub struct FfmpegWriter {
    /// ffmpeg executable, usually just "ffmpeg"
    command: String,
    /// Framerate advertised to the encoder
    framerate: u32,
}

impl FfmpegWriter {
    pub fn new(command: impl Into<String>, framerate: u32) -> Self {
        Self {
            command: command.into(),
            framerate: framerate.max(1),
        }
    }
}

impl FrameWriter for FfmpegWriter {
    fn open(&self, label: &str, output_dir: &Path) -> VideoResult<Box<dyn WriterHandle>> {
        std::fs::create_dir_all(output_dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = output_dir.join(format!("{label}-{stamp}.mp4"));
        tracing::info!("Recording {label} to {}", path.display());
        Ok(Box::new(FfmpegHandle {
            command: self.command.clone(),
            framerate: self.framerate,
            path,
            label: label.to_string(),
            child: None,
            disabled: false,
            frames_written: 0,
        }))
    }
}

struct FfmpegHandle {
    command: String,
    framerate: u32,
    path: PathBuf,
    label: String,
    child: Option<Child>,
    /// Set when the encoder could not be spawned; later writes are dropped
    /// instead of retrying once per frame.
    disabled: bool,
    frames_written: u64,
}

impl FfmpegHandle {
    fn spawn(&self, frame: &Frame) -> VideoResult<Child> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-y");
        match frame.format {
            PixelFormat::Mjpeg => {
                cmd.args(["-f", "mjpeg", "-framerate", &self.framerate.to_string()]);
            }
            other => {
                cmd.args([
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    other.ffmpeg_name(),
                    "-video_size",
                    &format!("{}x{}", frame.width, frame.height),
                    "-framerate",
                    &self.framerate.to_string(),
                ]);
            }
        }
        cmd.args([
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&self.path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| VideoError::WriterFailure(format!("spawning {}: {e}", self.command)))?;
        tracing::info!(
            "Started ffmpeg for {}: {}x{} {} @ {}fps",
            self.label,
            frame.width,
            frame.height,
            frame.format.ffmpeg_name(),
            self.framerate
        );
        Ok(child)
    }
}

impl WriterHandle for FfmpegHandle {
    fn write(&mut self, frame: &Frame) -> VideoResult<()> {
        if self.disabled {
            return Ok(());
        }
        if self.child.is_none() {
            match self.spawn(frame) {
                Ok(child) => self.child = Some(child),
                Err(e) => {
                    self.disabled = true;
                    return Err(e);
                }
            }
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| VideoError::WriterFailure("encoder stdin closed".into()))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| VideoError::WriterFailure(format!("writing frame: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> VideoResult<()> {
        let Some(mut child) = self.child.take() else {
            // Never received a frame; nothing was encoded.
            tracing::info!("Recording of {} closed with no frames", self.label);
            return Ok(());
        };
        // EOF on stdin tells ffmpeg to flush and finalize the file.
        drop(child.stdin.take());
        let status = child
            .wait()
            .map_err(|e| VideoError::WriterFailure(format!("waiting for encoder: {e}")))?;
        if !status.success() {
            return Err(VideoError::WriterFailure(format!(
                "encoder exited with {status}"
            )));
        }
        tracing::info!(
            "Finished {}: {} frames, {}",
            self.label,
            self.frames_written,
            self.path.display()
        );
        Ok(())
    }
}
