//! In-process fake camera for tests and demos
//!
//! [`FakeCamera`] plays scripted permission outcomes and keeps counters of
//! opened and stopped streams, so tests can assert that no stream is left
//! running after the controller moves on.

use crate::camera::{CameraDevice, CameraError, CameraStream, CapturedFrame};
use crate::data_uri::FrameDimensions;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Dimensions reported by granted fake streams
pub const FAKE_FRAME: FrameDimensions = FrameDimensions {
    width: 16,
    height: 12,
};

/// What a single `open()` call does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCameraBehavior {
    /// Grants access; the stream reports [`FAKE_FRAME`] immediately
    Grant,
    /// Grants access; dimensions stay unknown until [`FakeCamera::load_metadata`]
    GrantWithoutMetadata,
    /// Refuses permission
    Deny,
    /// Fails with a hardware error
    Unavailable(String),
    /// Never answers, like an ignored permission prompt
    Hang,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    stops: AtomicUsize,
}

struct FakeStreamState {
    dimensions: Mutex<Option<FrameDimensions>>,
    live: AtomicBool,
}

/// Scriptable camera device
pub struct FakeCamera {
    script: Mutex<VecDeque<FakeCameraBehavior>>,
    fallback: FakeCameraBehavior,
    delay: Option<Duration>,
    counters: Arc<Counters>,
    streams: Mutex<Vec<Arc<FakeStreamState>>>,
}

impl FakeCamera {
    /// Creates a camera that behaves the same way on every `open()`
    pub fn new(behavior: FakeCameraBehavior) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: behavior,
            delay: None,
            counters: Arc::new(Counters::default()),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Plays `behaviors` in order, then falls back to the last one
    pub fn scripted(behaviors: Vec<FakeCameraBehavior>) -> Self {
        let fallback = behaviors
            .last()
            .cloned()
            .unwrap_or(FakeCameraBehavior::Grant);
        let camera = Self::new(fallback);
        *camera.script.lock().unwrap_or_else(|e| e.into_inner()) = behaviors.into();
        camera
    }

    /// Delays every permission answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Simulates the stream metadata arriving on every open stream
    pub fn load_metadata(&self, dimensions: FrameDimensions) {
        for stream in self.streams.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            *stream.dimensions.lock().unwrap_or_else(|e| e.into_inner()) = Some(dimensions);
        }
    }

    /// Number of `open()` calls that started
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Number of streams whose tracks were stopped
    pub fn stop_count(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Number of granted streams still holding the camera
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.live.load(Ordering::SeqCst))
            .count()
    }

    fn next_behavior(&self) -> FakeCameraBehavior {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let dimensions = match behavior {
            FakeCameraBehavior::Grant => Some(FAKE_FRAME),
            FakeCameraBehavior::GrantWithoutMetadata => None,
            FakeCameraBehavior::Deny => return Err(CameraError::PermissionDenied),
            FakeCameraBehavior::Unavailable(reason) => {
                return Err(CameraError::Unavailable(reason))
            }
            FakeCameraBehavior::Hang => std::future::pending().await,
        };

        let state = Arc::new(FakeStreamState {
            dimensions: Mutex::new(dimensions),
            live: AtomicBool::new(true),
        });
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state.clone());

        Ok(Box::new(FakeStream {
            state,
            counters: self.counters.clone(),
        }))
    }
}

struct FakeStream {
    state: Arc<FakeStreamState>,
    counters: Arc<Counters>,
}

#[async_trait]
impl CameraStream for FakeStream {
    fn dimensions(&self) -> Option<FrameDimensions> {
        *self
            .state
            .dimensions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    async fn capture_frame(&self) -> Result<CapturedFrame, CameraError> {
        if !self.is_live() {
            return Err(CameraError::Stopped);
        }
        let dimensions = self.dimensions().ok_or(CameraError::NotReady)?;

        let img = image::RgbImage::from_pixel(
            dimensions.width,
            dimensions.height,
            image::Rgb([255, 255, 255]),
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| CameraError::Capture(e.to_string()))?;

        Ok(CapturedFrame {
            mime: "image/png".to_string(),
            bytes: cursor.into_inner(),
            dimensions,
        })
    }

    fn stop_all_tracks(&self) {
        if self.state.live.swap(false, Ordering::SeqCst) {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_behaviors_then_fallback() {
        let camera = FakeCamera::scripted(vec![FakeCameraBehavior::Deny, FakeCameraBehavior::Grant]);
        assert!(matches!(
            camera.open().await,
            Err(CameraError::PermissionDenied)
        ));
        assert!(camera.open().await.is_ok());
        assert!(camera.open().await.is_ok());
        assert_eq!(camera.open_count(), 3);
        assert_eq!(camera.live_streams(), 2);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let camera = FakeCamera::new(FakeCameraBehavior::Grant);
        let stream = camera.open().await.unwrap();
        stream.stop_all_tracks();
        stream.stop_all_tracks();
        assert_eq!(camera.stop_count(), 1);
        assert!(!stream.is_live());
        assert!(matches!(
            stream.capture_frame().await,
            Err(CameraError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_hang_never_resolves() {
        let camera = FakeCamera::new(FakeCameraBehavior::Hang);
        let result = tokio::time::timeout(Duration::from_millis(20), camera.open()).await;
        assert!(result.is_err());
        assert_eq!(camera.open_count(), 1);
    }
}
