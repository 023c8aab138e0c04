//! Camera devices and live streams
//!
//! A [`CameraDevice`] hands out [`CameraStream`]s. Once opened, a stream
//! holds the camera hardware until all of its tracks are stopped. The
//! controller never holds a raw stream: it wraps it in a [`LiveStream`],
//! which stops every track when dropped, so releasing the camera cannot be
//! forgotten on any exit path.

use crate::config::CameraConfig;
use crate::data_uri::{DataUri, DataUriError, FrameDimensions};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod command;
pub mod fake;

pub use command::CommandCamera;
pub use fake::{FakeCamera, FakeCameraBehavior};

/// Camera failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user or the OS refused camera access
    #[error("Camera access was denied")]
    PermissionDenied,

    /// No usable camera (missing hardware, missing driver, busy device)
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    /// The stream has not reported frame dimensions yet
    #[error("Camera is not ready yet; wait a moment and try again")]
    NotReady,

    /// Grabbing a frame failed
    #[error("Could not capture a frame: {0}")]
    Capture(String),

    /// The stream was already stopped
    #[error("Camera stream has been stopped")]
    Stopped,
}

/// A still frame grabbed from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Encoded image MIME type
    pub mime: String,
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Frame size
    pub dimensions: FrameDimensions,
}

impl CapturedFrame {
    /// Encodes the frame as a data URI
    pub fn to_data_uri(&self) -> Result<DataUri, DataUriError> {
        DataUri::from_bytes(&self.mime, &self.bytes)
    }
}

/// Source of live camera streams
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Requests access to the camera and opens a stream
    ///
    /// May take arbitrarily long (a permission prompt left unanswered) or
    /// never complete at all; callers bound the wait themselves.
    async fn open(&self) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An open camera stream
#[async_trait]
pub trait CameraStream: Send + Sync {
    /// Frame size, or `None` until the stream metadata has loaded
    fn dimensions(&self) -> Option<FrameDimensions>;

    /// Grabs the current frame as an encoded still image
    async fn capture_frame(&self) -> Result<CapturedFrame, CameraError>;

    /// Stops every media track; calling it again has no effect
    fn stop_all_tracks(&self);

    /// True until the tracks are stopped
    fn is_live(&self) -> bool;
}

/// Owning guard around an open stream
///
/// Dropping the guard stops all tracks of the stream.
pub struct LiveStream {
    inner: Box<dyn CameraStream>,
    released: bool,
}

impl LiveStream {
    /// Takes ownership of an opened stream
    pub fn new(inner: Box<dyn CameraStream>) -> Self {
        tracing::info!("Camera stream acquired");
        Self {
            inner,
            released: false,
        }
    }

    /// Frame size once metadata is available
    pub fn dimensions(&self) -> Option<FrameDimensions> {
        if self.released {
            return None;
        }
        self.inner.dimensions().filter(|d| !d.is_empty())
    }

    /// Grabs a still frame
    ///
    /// # Errors
    ///
    /// `CameraError::NotReady` when dimensions are not loaded yet,
    /// `CameraError::Stopped` after release, or the backend's capture error.
    pub async fn capture_frame(&self) -> Result<CapturedFrame, CameraError> {
        if self.released || !self.inner.is_live() {
            return Err(CameraError::Stopped);
        }
        if self.dimensions().is_none() {
            return Err(CameraError::NotReady);
        }
        self.inner.capture_frame().await
    }

    /// True while the underlying tracks are running
    pub fn is_live(&self) -> bool {
        !self.released && self.inner.is_live()
    }

    /// Stops all tracks now
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.released {
            self.inner.stop_all_tracks();
            self.released = true;
            tracing::info!("Camera stream released");
        }
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStream")
            .field("dimensions", &self.dimensions())
            .field("released", &self.released)
            .finish()
    }
}

/// Device used when no camera is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        Err(CameraError::Unavailable(
            "no camera is configured (set camera.capture_command)".to_string(),
        ))
    }
}

/// Create a camera device based on configuration
pub fn create_camera(config: &CameraConfig) -> Arc<dyn CameraDevice> {
    match &config.capture_command {
        Some(command) if !command.is_empty() => Arc::new(CommandCamera::new(command.clone())),
        _ => Arc::new(NoCamera),
    }
}
