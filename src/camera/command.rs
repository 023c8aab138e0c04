//! Camera backed by an external still-capture program
//!
//! Drives tools such as `fswebcam`, `libcamera-still` or `imagesnap`. Each
//! frame is one run of the configured command. The `{output}` placeholder is
//! replaced with a scratch file path; without a placeholder the image is
//! read from the program's stdout.
//!
//! Opening the camera performs one probe capture: it surfaces permission and
//! hardware errors up front and provides the frame dimensions.

use crate::camera::{CameraDevice, CameraError, CameraStream, CapturedFrame};
use crate::data_uri::{detect_image_format, image_dimensions, FrameDimensions};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::process::Command;

const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Camera device running a capture command per frame
#[derive(Debug, Clone)]
pub struct CommandCamera {
    command: Vec<String>,
}

impl CommandCamera {
    /// Creates a camera from a program and its arguments
    ///
    /// # Examples
    ///
    /// ```
    /// use examsnap::camera::CommandCamera;
    ///
    /// let camera = CommandCamera::new(vec!["fswebcam".into(), "{output}".into()]);
    /// assert_eq!(camera.program(), Some("fswebcam"));
    /// ```
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// The capture program
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

#[async_trait]
impl CameraDevice for CommandCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        if self.program().is_none() {
            return Err(CameraError::Unavailable(
                "empty capture command".to_string(),
            ));
        }

        tracing::debug!("Probing capture command {:?}", self.command);
        let probe = run_capture(&self.command).await.map_err(|e| match e {
            CameraError::Capture(reason) => CameraError::Unavailable(reason),
            other => other,
        })?;

        Ok(Box::new(CommandStream {
            command: self.command.clone(),
            dimensions: Mutex::new(Some(probe.dimensions)),
            live: AtomicBool::new(true),
        }))
    }
}

struct CommandStream {
    command: Vec<String>,
    dimensions: Mutex<Option<FrameDimensions>>,
    live: AtomicBool,
}

#[async_trait]
impl CameraStream for CommandStream {
    fn dimensions(&self) -> Option<FrameDimensions> {
        *self.dimensions.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn capture_frame(&self) -> Result<CapturedFrame, CameraError> {
        if !self.is_live() {
            return Err(CameraError::Stopped);
        }
        let frame = run_capture(&self.command).await?;
        *self.dimensions.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame.dimensions);
        Ok(frame)
    }

    fn stop_all_tracks(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Removes the scratch file when the capture finishes or is cancelled
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

async fn run_capture(command: &[String]) -> Result<CapturedFrame, CameraError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| CameraError::Unavailable("empty capture command".to_string()))?;

    let scratch = ScratchFile(
        std::env::temp_dir().join(format!("examsnap-frame-{}", uuid::Uuid::new_v4())),
    );
    let uses_file = args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER));
    let scratch_path = scratch.0.to_string_lossy().to_string();
    let args: Vec<String> = args
        .iter()
        .map(|a| a.replace(OUTPUT_PLACEHOLDER, &scratch_path))
        .collect();

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CameraError::Unavailable(format!("capture program `{}` not found", program))
            }
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::Unavailable(format!("failed to run `{}`: {}", program, e)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::warn!("Capture command exited with {}: {}", output.status, stderr);
        if stderr.to_lowercase().contains("permission denied") {
            return Err(CameraError::PermissionDenied);
        }
        return Err(CameraError::Capture(if stderr.is_empty() {
            format!("`{}` exited with {}", program, output.status)
        } else {
            stderr
        }));
    }

    let bytes = if uses_file {
        tokio::fs::read(&scratch.0)
            .await
            .map_err(|e| CameraError::Capture(format!("no image written: {}", e)))?
    } else {
        output.stdout
    };

    frame_from_bytes(bytes)
}

fn frame_from_bytes(bytes: Vec<u8>) -> Result<CapturedFrame, CameraError> {
    if bytes.is_empty() {
        return Err(CameraError::Capture("the camera produced no image".to_string()));
    }
    let format = detect_image_format(&bytes)
        .ok_or_else(|| CameraError::Capture("unrecognised image format".to_string()))?;
    let dimensions = image_dimensions(&bytes)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| CameraError::Capture("could not read frame dimensions".to_string()))?;

    Ok(CapturedFrame {
        mime: format.mime_type().to_string(),
        bytes,
        dimensions,
    })
}
