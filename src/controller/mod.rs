//! Capture/analysis controller
//!
//! [`CaptureController`] owns one capture session: it negotiates the camera,
//! accepts snapshots and uploads, runs the analysis call, stores successful
//! results in the history and reads advice aloud.
//!
//! All state lives in a [`CaptureState`] changed only through
//! [`CaptureState::apply`]. Asynchronous work is tied to the session:
//!
//! - camera requests run in a background task; at most one is in flight and
//!   a stream that arrives after the controller lost interest is released
//!   at once
//! - analysis requests carry an [`AnalysisTicket`]; a completion for a
//!   ticket that is no longer current is logged and ignored
//! - speech runs under a child of the session's [`CancellationToken`], so
//!   a reset or drop stops it

use crate::analysis::{AnalysisError, AnalyzeProblemInput, AnalyzeProblemOutput, ProblemAnalyzer};
use crate::camera::{CameraDevice, CameraError, LiveStream};
use crate::config::CameraConfig;
use crate::data_uri::{DataUri, FrameDimensions};
use crate::history::{AnalyzedProblem, HistoryStore};
use crate::speech::{SpeechEvent, SpeechOutcome, SpeechStatus, SpeechSynthesizer};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod state;

pub use state::{
    AnalysisTicket, CaptureEvent, CapturePhase, CaptureState, InvalidTransition, Notice,
    NoticeLevel, ResumeMode, SessionId,
};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Failures surfaced by controller operations
///
/// None of them is fatal: the controller stays usable after every error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The stream has not reported frame dimensions yet
    #[error("Camera is not ready yet; wait a moment and try again")]
    CameraNotReady,

    /// The image could not be encoded or decoded as a data URI
    #[error("Not a usable image: {0}")]
    InvalidImage(String),

    /// The analysis call failed; the message comes from the backend verbatim
    #[error("{message}")]
    AnalysisFailed {
        /// Backend error message
        message: String,
    },

    /// The camera was refused or is unavailable
    #[error("{reason}")]
    CameraDenied {
        /// User-facing explanation
        reason: String,
    },

    /// Grabbing a frame failed
    #[error("Could not take the photo: {reason}")]
    CaptureFailed {
        /// Backend error message
        reason: String,
    },

    /// The operation is not available in the current phase
    #[error("Cannot {operation} while in {phase}")]
    NotAllowed {
        /// The rejected operation
        operation: &'static str,
        /// Phase at the time of the call
        phase: CapturePhase,
    },

    /// The result belongs to a request the session no longer waits for
    #[error("This result belongs to an abandoned request")]
    Superseded,

    /// No speech synthesizer is configured
    #[error("Reading aloud is not available")]
    SpeechUnavailable,
}

/// What the controller remembers about camera permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPermission {
    /// Not asked yet in this session
    #[default]
    Unknown,
    /// A stream was granted
    Granted,
    /// The last request was refused or failed
    Denied,
}

/// Timing settings of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// How long `acquire_camera` waits before reporting the request as pending
    pub acquire_timeout: Duration,
    /// How long `wait_for_camera_ready` waits for frame dimensions
    pub ready_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

impl From<&CameraConfig> for ControllerSettings {
    fn from(config: &CameraConfig) -> Self {
        Self {
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
        }
    }
}

/// Collaborators of a controller
#[derive(Clone)]
pub struct ControllerDeps {
    /// Camera device
    pub camera: Arc<dyn CameraDevice>,
    /// Analysis backend
    pub analyzer: Arc<dyn ProblemAnalyzer>,
    /// History store
    pub history: HistoryStore,
    /// Optional speech synthesizer
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
}

/// A file chosen in upload mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// File name, for logs
    pub name: String,
    /// Declared MIME type, if known
    pub mime: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Reads a file from disk
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read.
    pub async fn from_path(path: &Path) -> crate::error::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            mime: None,
            bytes,
        })
    }
}

/// An analysis request that has been started but not resolved
///
/// Produced by [`CaptureController::begin_analysis`]. Resolving it performs
/// the single remote call; hand the completion back through
/// [`CaptureController::complete_analysis`].
pub struct PendingAnalysis {
    ticket: AnalysisTicket,
    image: DataUri,
    analyzer: Arc<dyn ProblemAnalyzer>,
    session_token: CancellationToken,
}

impl PendingAnalysis {
    /// Identity of the request
    pub fn ticket(&self) -> AnalysisTicket {
        self.ticket
    }

    /// True once the session that started the request has been reset
    pub fn is_abandoned(&self) -> bool {
        self.session_token.is_cancelled()
    }

    /// Performs the analysis call
    ///
    /// The call is not aborted when the session moves on; the late result is
    /// simply discarded by `complete_analysis`.
    pub async fn resolve(self) -> AnalysisCompletion {
        let input = AnalyzeProblemInput {
            problem_image: self.image.to_string(),
        };
        tracing::debug!("Analysis request {} sent", self.ticket);
        let result = self.analyzer.analyze(input).await;
        AnalysisCompletion {
            ticket: self.ticket,
            image: self.image,
            result,
        }
    }
}

/// Outcome of a resolved [`PendingAnalysis`]
#[derive(Debug, Clone)]
pub struct AnalysisCompletion {
    /// Request the outcome belongs to
    pub ticket: AnalysisTicket,
    /// The analyzed image
    pub image: DataUri,
    /// Backend answer
    pub result: Result<AnalyzeProblemOutput, AnalysisError>,
}

#[derive(Default)]
struct AcquisitionSlot {
    wanted: bool,
    done: bool,
    outcome: Option<Result<LiveStream, CameraError>>,
}

struct Acquisition {
    slot: Arc<Mutex<AcquisitionSlot>>,
    task: JoinHandle<()>,
    joined: bool,
}

struct SpeechTask {
    cancel: CancellationToken,
    handle: JoinHandle<SpeechEvent>,
}

fn lock_slot(slot: &Mutex<AcquisitionSlot>) -> MutexGuard<'_, AcquisitionSlot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Controller for one capture → analyze → result cycle
///
/// # Examples
///
/// ```
/// use examsnap::analysis::ScriptedAnalyzer;
/// use examsnap::camera::NoCamera;
/// use examsnap::controller::{CaptureController, CapturePhase, ControllerDeps, UploadedFile};
/// use examsnap::history::HistoryStore;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() {
/// let analyzer = Arc::new(ScriptedAnalyzer::new());
/// analyzer.push_success("Isolate x first.", "Linear equations");
///
/// let mut controller = CaptureController::new(
///     ControllerDeps {
///         camera: Arc::new(NoCamera),
///         analyzer,
///         history: HistoryStore::in_memory(),
///         speech: None,
///     },
///     Default::default(),
/// );
/// controller.switch_to_upload().unwrap();
///
/// let file = UploadedFile { name: "p.png".into(), mime: Some("image/png".into()), bytes: vec![1, 2, 3] };
/// let problem = controller.select_uploaded_file(Some(file)).await.unwrap().unwrap();
/// assert_eq!(problem.advice, "Isolate x first.");
/// assert_eq!(controller.phase(), CapturePhase::Results);
/// # }
/// ```
pub struct CaptureController {
    camera: Arc<dyn CameraDevice>,
    analyzer: Arc<dyn ProblemAnalyzer>,
    history: HistoryStore,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    settings: ControllerSettings,

    state: CaptureState,
    session: SessionId,
    session_token: CancellationToken,
    next_request: u64,
    permission: CameraPermission,
    error: Option<String>,
    notices: Vec<Notice>,
    acquisition: Option<Acquisition>,
    speaking: Option<SpeechTask>,
}

impl CaptureController {
    /// Creates a controller in `camera_pending`
    ///
    /// No camera request is made until [`start`](Self::start) or
    /// [`acquire_camera`](Self::acquire_camera), so a host that only wants
    /// uploads can switch straight to upload mode.
    pub fn new(deps: ControllerDeps, settings: ControllerSettings) -> Self {
        let session = SessionId::first();
        tracing::debug!("Capture controller created ({})", session);
        Self {
            camera: deps.camera,
            analyzer: deps.analyzer,
            history: deps.history,
            speech: deps.speech,
            settings,
            state: CaptureState::CameraPending,
            session,
            session_token: CancellationToken::new(),
            next_request: 1,
            permission: CameraPermission::Unknown,
            error: None,
            notices: Vec::new(),
            acquisition: None,
            speaking: None,
        }
    }

    /// Starts the optimistic camera request
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&mut self) {
        if matches!(self.state, CaptureState::CameraPending) {
            self.ensure_acquisition();
        }
    }

    // ----- observation -----

    /// Current phase
    pub fn phase(&self) -> CapturePhase {
        self.state.phase()
    }

    /// Current state
    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Current session
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Last user-facing error, cleared by the next action that succeeds
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Image being analyzed or retained after a failure
    pub fn pending_image(&self) -> Option<&DataUri> {
        self.state.pending_image()
    }

    /// The displayed result
    pub fn result(&self) -> Option<&AnalyzedProblem> {
        match &self.state {
            CaptureState::Results { problem, .. } => Some(problem),
            _ => None,
        }
    }

    /// Camera permission knowledge of this session
    pub fn camera_permission(&self) -> CameraPermission {
        self.permission
    }

    /// Size of the live camera frame, when the stream is ready
    pub fn camera_dimensions(&self) -> Option<FrameDimensions> {
        match &self.state {
            CaptureState::CameraActive { stream } => stream.dimensions(),
            _ => None,
        }
    }

    /// True while a camera request is running in the background
    pub fn camera_request_in_flight(&self) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(|a| !lock_slot(&a.slot).done && !a.task.is_finished())
    }

    /// The history store results are saved to
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Drains the notices produced since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Picks up a camera result that arrived in the background
    ///
    /// Returns the phase afterwards. Never waits.
    pub fn refresh(&mut self) -> CapturePhase {
        self.settle_acquisition();
        self.phase()
    }

    // ----- camera -----

    /// Requests a live camera stream
    ///
    /// Waits up to the configured acquire timeout. A request still
    /// unanswered after that is not an error: the controller stays in
    /// `camera_pending` and the request keeps running. Calling it again
    /// waits on the same request instead of starting another one.
    ///
    /// # Errors
    ///
    /// `ControllerError::CameraDenied` when access was refused or the camera
    /// is unavailable (also in `camera_denied`, until
    /// [`retry_camera`](Self::retry_camera)), `ControllerError::NotAllowed`
    /// while analyzing, in upload mode or showing results.
    pub async fn acquire_camera(&mut self) -> Result<CapturePhase, ControllerError> {
        self.settle_acquisition();
        match &self.state {
            CaptureState::CameraPending => {}
            CaptureState::CameraActive { .. } => return Ok(CapturePhase::CameraActive),
            CaptureState::CameraDenied { reason } => {
                return Err(ControllerError::CameraDenied {
                    reason: reason.clone(),
                })
            }
            state => {
                return Err(ControllerError::NotAllowed {
                    operation: "acquire the camera",
                    phase: state.phase(),
                })
            }
        }

        self.ensure_acquisition();
        let wait = self.settings.acquire_timeout;
        if let Some(acquisition) = self.acquisition.as_mut() {
            if !acquisition.joined {
                match tokio::time::timeout(wait, &mut acquisition.task).await {
                    Ok(joined) => {
                        acquisition.joined = true;
                        if let Err(e) = joined {
                            tracing::error!("Camera request task failed: {}", e);
                        }
                    }
                    Err(_) => {
                        tracing::info!(
                            "Camera request still pending after {:?}; waiting for permission",
                            wait
                        );
                        return Ok(CapturePhase::CameraPending);
                    }
                }
            }
        }

        self.settle_acquisition();
        match &self.state {
            CaptureState::CameraDenied { reason } => Err(ControllerError::CameraDenied {
                reason: reason.clone(),
            }),
            state => Ok(state.phase()),
        }
    }

    /// Waits until the live stream reports frame dimensions
    ///
    /// # Errors
    ///
    /// `ControllerError::CameraNotReady` when the stream is still without
    /// dimensions after the ready timeout, `ControllerError::NotAllowed`
    /// outside `camera_active`.
    pub async fn wait_for_camera_ready(&self) -> Result<FrameDimensions, ControllerError> {
        let stream = match &self.state {
            CaptureState::CameraActive { stream } => stream,
            state => {
                return Err(ControllerError::NotAllowed {
                    operation: "wait for the camera",
                    phase: state.phase(),
                })
            }
        };

        let deadline = tokio::time::Instant::now() + self.settings.ready_timeout;
        loop {
            if let Some(dimensions) = stream.dimensions() {
                tracing::debug!("Camera ready at {}", dimensions);
                return Ok(dimensions);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ControllerError::CameraNotReady);
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Takes a still from the live stream and starts analyzing it
    ///
    /// The camera is released as soon as the frame is captured.
    ///
    /// # Errors
    ///
    /// `ControllerError::CameraNotReady` (state unchanged) when the stream
    /// has no dimensions yet, `ControllerError::CaptureFailed` when the
    /// frame cannot be grabbed, `ControllerError::NotAllowed` outside
    /// `camera_active`.
    pub async fn begin_snapshot(&mut self) -> Result<PendingAnalysis, ControllerError> {
        self.settle_acquisition();
        let stream = match &self.state {
            CaptureState::CameraActive { stream } => stream,
            state => {
                return Err(ControllerError::NotAllowed {
                    operation: "take a photo",
                    phase: state.phase(),
                })
            }
        };

        if stream.dimensions().is_none() {
            tracing::debug!("Snapshot requested before the stream was ready");
            return Err(ControllerError::CameraNotReady);
        }

        let frame = stream.capture_frame().await.map_err(|e| match e {
            CameraError::NotReady => ControllerError::CameraNotReady,
            other => ControllerError::CaptureFailed {
                reason: other.to_string(),
            },
        })?;
        tracing::info!("Captured {} frame ({} bytes)", frame.dimensions, frame.bytes.len());

        let image = frame
            .to_data_uri()
            .map_err(|e| ControllerError::InvalidImage(e.to_string()))?;
        self.begin_analysis(image)
    }

    /// Takes a still and runs the analysis to completion
    ///
    /// # Errors
    ///
    /// Any error of [`begin_snapshot`](Self::begin_snapshot) or
    /// [`complete_analysis`](Self::complete_analysis).
    pub async fn snapshot_from_camera(&mut self) -> Result<AnalyzedProblem, ControllerError> {
        let pending = self.begin_snapshot().await?;
        let completion = pending.resolve().await;
        self.complete_analysis(completion)
    }

    /// Releases the camera and makes the file picker the input path
    ///
    /// A no-op in `upload_mode`. A camera request still in flight is
    /// abandoned; its stream is released when it arrives.
    ///
    /// # Errors
    ///
    /// `ControllerError::NotAllowed` while analyzing or showing results.
    pub fn switch_to_upload(&mut self) -> Result<(), ControllerError> {
        self.settle_acquisition();
        let from = self.phase();
        if matches!(from, CapturePhase::Analyzing | CapturePhase::Results) {
            return Err(ControllerError::NotAllowed {
                operation: "switch to upload",
                phase: from,
            });
        }

        self.withdraw_acquisition();
        self.transition(CaptureEvent::SwitchToUpload)?;
        if from != CapturePhase::UploadMode {
            tracing::info!("Switched to upload mode from {}", from);
        }
        Ok(())
    }

    /// Tries the camera again after a denial or from upload mode
    ///
    /// Forgets the previous permission answer and starts a fresh request;
    /// await [`acquire_camera`](Self::acquire_camera) to observe it.
    ///
    /// # Errors
    ///
    /// `ControllerError::NotAllowed` outside `camera_denied` and
    /// `upload_mode`.
    pub fn retry_camera(&mut self) -> Result<(), ControllerError> {
        self.settle_acquisition();
        self.transition(CaptureEvent::RetryCamera)?;
        self.permission = CameraPermission::Unknown;
        self.error = None;
        self.ensure_acquisition();
        tracing::info!("Retrying camera access");
        Ok(())
    }

    // ----- upload and analysis -----

    /// Analyzes an uploaded file
    ///
    /// `None` or an empty file is ignored and returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// `ControllerError::InvalidImage` when the file cannot be encoded,
    /// `ControllerError::NotAllowed` outside `upload_mode`, or any error of
    /// [`complete_analysis`](Self::complete_analysis).
    pub async fn select_uploaded_file(
        &mut self,
        file: Option<UploadedFile>,
    ) -> Result<Option<AnalyzedProblem>, ControllerError> {
        let Some(file) = file.filter(|f| !f.bytes.is_empty()) else {
            tracing::debug!("Empty file selection ignored");
            return Ok(None);
        };

        self.settle_acquisition();
        let phase = self.phase();
        if phase != CapturePhase::UploadMode {
            return Err(ControllerError::NotAllowed {
                operation: "upload a file",
                phase,
            });
        }

        let image = DataUri::from_bytes_sniffed(file.mime.as_deref(), &file.bytes)
            .map_err(|e| ControllerError::InvalidImage(e.to_string()))?;
        tracing::info!("Uploaded {} ({})", file.name, image.mime());

        let pending = self.begin_analysis(image)?;
        let completion = pending.resolve().await;
        self.complete_analysis(completion).map(Some)
    }

    /// Runs the analysis of a data URI to completion
    ///
    /// # Errors
    ///
    /// `ControllerError::InvalidImage` (state unchanged) when the URI has no
    /// MIME type or payload or the payload is not base64, otherwise the errors of
    /// [`begin_analysis`](Self::begin_analysis) and
    /// [`complete_analysis`](Self::complete_analysis).
    pub async fn run_analysis(
        &mut self,
        image_data_uri: &str,
    ) -> Result<AnalyzedProblem, ControllerError> {
        let image = DataUri::parse(image_data_uri)
            .map_err(|e| ControllerError::InvalidImage(e.to_string()))?;
        let pending = self.begin_analysis(image)?;
        let completion = pending.resolve().await;
        self.complete_analysis(completion)
    }

    /// Moves to `analyzing` and prepares the remote call
    ///
    /// Accepted in `camera_active` (the stream is released) and
    /// `upload_mode`.
    ///
    /// # Errors
    ///
    /// `ControllerError::NotAllowed` in any other phase, including while
    /// another analysis is in flight.
    pub fn begin_analysis(&mut self, image: DataUri) -> Result<PendingAnalysis, ControllerError> {
        self.settle_acquisition();
        let ticket = AnalysisTicket {
            session: self.session,
            request: self.next_request,
        };
        self.transition(CaptureEvent::AnalysisStarted {
            image: image.clone(),
            ticket,
        })?;
        self.next_request += 1;
        self.error = None;
        tracing::info!("Analyzing problem image ({})", ticket);

        Ok(PendingAnalysis {
            ticket,
            image,
            analyzer: Arc::clone(&self.analyzer),
            session_token: self.session_token.clone(),
        })
    }

    /// Applies the outcome of an analysis call
    ///
    /// On success a new [`AnalyzedProblem`] is stored in the history and
    /// shown. A history write failure does not hide the result; it adds a
    /// warning notice and marks the result unsaved. On failure the backend
    /// message is kept as the current error and the image is retained in
    /// `upload_mode` for another attempt.
    ///
    /// # Errors
    ///
    /// `ControllerError::AnalysisFailed` with the backend message, or
    /// `ControllerError::Superseded` when the session no longer waits for
    /// this request.
    pub fn complete_analysis(
        &mut self,
        completion: AnalysisCompletion,
    ) -> Result<AnalyzedProblem, ControllerError> {
        let AnalysisCompletion {
            ticket,
            image,
            result,
        } = completion;

        let current = matches!(&self.state, CaptureState::Analyzing { ticket: t, .. } if *t == ticket);
        if !current {
            tracing::warn!(
                "Ignoring result of abandoned analysis {} (now {} in {})",
                ticket,
                self.phase(),
                self.session
            );
            return Err(ControllerError::Superseded);
        }

        match result {
            Ok(output) => {
                let problem = AnalyzedProblem::new(image, output.advice, output.concepts);
                let saved = self
                    .history
                    .append(&problem)
                    .first()
                    .is_some_and(|p| p.id == problem.id);
                if !saved {
                    self.notices.push(Notice::warning(
                        "This result could not be saved to history; it will not be kept",
                    ));
                }
                tracing::info!("Analysis {} succeeded: problem {}", ticket, problem.id);

                self.transition(CaptureEvent::AnalysisSucceeded {
                    ticket,
                    problem: problem.clone(),
                    saved,
                })?;
                self.error = None;
                Ok(problem)
            }
            Err(e) => {
                let message = e.message().to_string();
                tracing::warn!("Analysis {} failed: {}", ticket, message);
                let retain_image = !matches!(e, AnalysisError::InvalidInput(_));

                self.transition(CaptureEvent::AnalysisFailed {
                    ticket,
                    retain_image,
                })?;
                if matches!(self.state, CaptureState::CameraPending) {
                    self.ensure_acquisition();
                }
                self.error = Some(message.clone());
                self.notices.push(Notice::error(message.clone()));
                Err(ControllerError::AnalysisFailed { message })
            }
        }
    }

    // ----- reset -----

    /// Starts over
    ///
    /// Clears the pending image, result, error and permission knowledge,
    /// stops speech, abandons in-flight analysis, releases the camera and
    /// re-enters `camera_pending` with a camera request running. A request
    /// that is still in flight is reused rather than duplicated; an answer
    /// that already arrived is discarded and the camera is asked again.
    /// Must be called within a Tokio runtime.
    pub fn reset(&mut self) {
        self.session_token.cancel();
        self.session = self.session.next();
        self.session_token = CancellationToken::new();
        self.speaking = None;

        // Accepted from every state.
        let _ = self.transition(CaptureEvent::Reset);
        self.withdraw_acquisition();
        self.permission = CameraPermission::Unknown;
        self.error = None;
        self.ensure_acquisition();
        tracing::info!("Capture session reset ({})", self.session);
    }

    // ----- speech -----

    /// Reads the advice of the displayed result aloud
    ///
    /// Replaces any playback already running.
    ///
    /// # Errors
    ///
    /// `ControllerError::SpeechUnavailable` without a synthesizer,
    /// `ControllerError::NotAllowed` outside `results`.
    pub fn speak_advice(&mut self) -> Result<(), ControllerError> {
        let Some(speech) = self.speech.clone() else {
            return Err(ControllerError::SpeechUnavailable);
        };
        let text = match &self.state {
            CaptureState::Results { problem, .. } => problem.advice.trim().to_string(),
            state => {
                return Err(ControllerError::NotAllowed {
                    operation: "read the advice aloud",
                    phase: state.phase(),
                })
            }
        };
        if text.is_empty() {
            self.notices.push(Notice::info("There is no advice to read aloud"));
            return Ok(());
        }

        self.stop_speaking();
        let cancel = self.session_token.child_token();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            match speech.speak(&text, token).await {
                Ok(outcome) => SpeechEvent::Ended(outcome),
                Err(e) => {
                    tracing::warn!("Speech failed: {}", e);
                    SpeechEvent::Error(e.to_string())
                }
            }
        });

        self.notices.push(Notice::info(SpeechEvent::Started.to_string()));
        self.speaking = Some(SpeechTask { cancel, handle });
        Ok(())
    }

    /// Stops playback; returns whether anything was playing
    pub fn stop_speaking(&mut self) -> bool {
        match &self.speaking {
            Some(task) if !task.handle.is_finished() => {
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Playback status
    pub fn speech_status(&self) -> SpeechStatus {
        match &self.speaking {
            Some(task) if !task.handle.is_finished() => SpeechStatus::Speaking,
            _ => SpeechStatus::Idle,
        }
    }

    /// Waits for the current playback to end and reports how it ended
    ///
    /// Returns `None` when nothing was started since the last call.
    pub async fn wait_for_speech(&mut self) -> Option<SpeechEvent> {
        let task = self.speaking.take()?;
        let event = match task.handle.await {
            Ok(event) => event,
            Err(e) if e.is_cancelled() => SpeechEvent::Ended(SpeechOutcome::Cancelled),
            Err(e) => SpeechEvent::Error(e.to_string()),
        };
        let notice = match &event {
            SpeechEvent::Error(_) => Notice::warning(event.to_string()),
            _ => Notice::info(event.to_string()),
        };
        self.notices.push(notice);
        Some(event)
    }

    // ----- internals -----

    fn transition(&mut self, event: CaptureEvent) -> Result<(), ControllerError> {
        let name = event.name();
        let current = std::mem::replace(&mut self.state, CaptureState::CameraPending);
        let from = current.phase();
        match current.apply(event) {
            Ok(next) => {
                tracing::debug!("{} --{}--> {}", from, name, next.phase());
                self.state = next;
                Ok(())
            }
            Err(InvalidTransition { state, event }) => {
                tracing::debug!("Event {} rejected in {}", event.name(), from);
                self.state = state;
                Err(ControllerError::NotAllowed {
                    operation: operation_name(&event),
                    phase: from,
                })
            }
        }
    }

    /// Ensures a camera request is running and wanted
    fn ensure_acquisition(&mut self) {
        if let Some(acquisition) = &self.acquisition {
            let mut slot = lock_slot(&acquisition.slot);
            let spent = slot.outcome.is_none() && (slot.done || acquisition.task.is_finished());
            if !spent {
                slot.wanted = true;
                tracing::debug!("Reusing camera request already in flight");
                return;
            }
        }

        let slot = Arc::new(Mutex::new(AcquisitionSlot {
            wanted: true,
            ..AcquisitionSlot::default()
        }));
        let camera = Arc::clone(&self.camera);
        let task_slot = Arc::clone(&slot);
        let task = tokio::spawn(async move {
            let result = camera.open().await.map(LiveStream::new);
            let mut slot = lock_slot(&task_slot);
            slot.done = true;
            if slot.wanted {
                slot.outcome = Some(result);
            } else if result.is_ok() {
                tracing::debug!("Camera granted after the request was abandoned");
            }
        });

        tracing::debug!("Camera request started");
        self.permission = CameraPermission::Unknown;
        self.acquisition = Some(Acquisition {
            slot,
            task,
            joined: false,
        });
    }

    /// Gives up interest in the camera request; a late stream is released
    fn withdraw_acquisition(&mut self) {
        if let Some(acquisition) = &self.acquisition {
            let late = {
                let mut slot = lock_slot(&acquisition.slot);
                slot.wanted = false;
                slot.outcome.take()
            };
            if late.is_some() {
                tracing::debug!("Discarding camera result nobody waits for");
            }
        }
    }

    /// Applies a finished camera request to a pending session
    fn settle_acquisition(&mut self) {
        if !matches!(self.state, CaptureState::CameraPending) {
            return;
        }
        let Some(acquisition) = &self.acquisition else {
            return;
        };

        let outcome = lock_slot(&acquisition.slot).outcome.take();
        let result = match outcome {
            Some(result) => result,
            None if acquisition.task.is_finished() || acquisition.joined => Err(
                CameraError::Unavailable("the camera request ended unexpectedly".to_string()),
            ),
            None => return,
        };
        self.acquisition = None;

        match result {
            Ok(stream) => {
                self.permission = CameraPermission::Granted;
                if let Err(e) = self.transition(CaptureEvent::CameraGranted(stream)) {
                    tracing::warn!("Camera stream dropped: {}", e);
                }
            }
            Err(e) => {
                if e == CameraError::PermissionDenied {
                    self.permission = CameraPermission::Denied;
                }
                let reason = format!("{}. You can upload a photo of the problem instead.", e);
                tracing::warn!("Camera unavailable: {}", e);
                self.error = Some(reason.clone());
                self.notices.push(Notice::warning(reason.clone()));
                // Cannot fail: the state was checked above.
                let _ = self.transition(CaptureEvent::CameraFailed { reason });
            }
        }
    }
}

fn operation_name(event: &CaptureEvent) -> &'static str {
    match event {
        CaptureEvent::CameraGranted(_) => "use the camera",
        CaptureEvent::CameraFailed { .. } => "report a camera failure",
        CaptureEvent::SwitchToUpload => "switch to upload",
        CaptureEvent::RetryCamera => "retry the camera",
        CaptureEvent::AnalysisStarted { .. } => "start an analysis",
        CaptureEvent::AnalysisSucceeded { .. } | CaptureEvent::AnalysisFailed { .. } => {
            "complete the analysis"
        }
        CaptureEvent::Reset => "reset",
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.session_token.cancel();
        self.withdraw_acquisition();
        if let Some(acquisition) = self.acquisition.take() {
            acquisition.task.abort();
        }
        tracing::debug!("Capture controller dropped ({})", self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{MockProblemAnalyzer, ScriptedAnalyzer};
    use crate::camera::{FakeCamera, FakeCameraBehavior, NoCamera};
    use crate::history::kv::KeyValueStore;
    use crate::speech::FakeSpeech;
    use crate::test_utils::{tiny_png, tiny_png_uri};

    struct FullDisk;

    impl KeyValueStore for FullDisk {
        fn get(&self, _key: &str) -> crate::error::Result<Option<Vec<u8>>> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &[u8]) -> crate::error::Result<()> {
            anyhow::bail!("quota exceeded")
        }
        fn remove(&self, _key: &str) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn settings() -> ControllerSettings {
        ControllerSettings {
            acquire_timeout: Duration::from_millis(200),
            ready_timeout: Duration::from_millis(100),
        }
    }

    fn controller_with(
        camera: Arc<dyn CameraDevice>,
        analyzer: Arc<dyn ProblemAnalyzer>,
    ) -> CaptureController {
        CaptureController::new(
            ControllerDeps {
                camera,
                analyzer,
                history: HistoryStore::in_memory(),
                speech: None,
            },
            settings(),
        )
    }

    fn png_file() -> UploadedFile {
        UploadedFile {
            name: "problem.png".to_string(),
            mime: Some("image/png".to_string()),
            bytes: tiny_png(),
        }
    }

    fn mock_success(advice: &'static str) -> MockProblemAnalyzer {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze().times(1).returning(move |input| {
            assert!(input.problem_image.starts_with("data:image/png;base64,"));
            Ok(AnalyzeProblemOutput {
                advice: advice.to_string(),
                concepts: "Algebra".to_string(),
            })
        });
        mock
    }

    #[tokio::test]
    async fn test_upload_success_calls_analyzer_once_and_saves() {
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock_success("Step 1")));
        controller.switch_to_upload().unwrap();

        let problem = controller
            .select_uploaded_file(Some(png_file()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(controller.phase(), CapturePhase::Results);
        assert_eq!(controller.result(), Some(&problem));
        assert!(controller.pending_image().is_none());
        assert!(controller.error().is_none());
        assert_eq!(controller.history().read_all(), vec![problem]);
        assert!(matches!(
            controller.state(),
            CaptureState::Results { saved: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_failure_keeps_image_and_message() {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze()
            .times(1)
            .returning(|_| Err(AnalysisError::Transport("network timeout".to_string())));
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock));
        controller.switch_to_upload().unwrap();

        let err = controller
            .select_uploaded_file(Some(png_file()))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ControllerError::AnalysisFailed {
                message: "network timeout".to_string()
            }
        );
        assert_eq!(err.to_string(), "network timeout");
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
        assert_eq!(controller.error(), Some("network timeout"));
        assert!(controller.pending_image().is_some());
        assert!(controller.history().read_all().is_empty());
        assert_eq!(
            controller.take_notices(),
            vec![Notice::error("network timeout")]
        );
    }

    #[tokio::test]
    async fn test_invalid_input_failure_does_not_retain_image() {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze()
            .times(1)
            .returning(|_| Err(AnalysisError::InvalidInput("unsupported image".to_string())));
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock));
        controller.switch_to_upload().unwrap();

        assert!(controller
            .select_uploaded_file(Some(png_file()))
            .await
            .is_err());
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
        assert!(controller.pending_image().is_none());
    }

    #[tokio::test]
    async fn test_empty_selection_is_noop() {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze().times(0);
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock));
        controller.switch_to_upload().unwrap();

        assert_eq!(controller.select_uploaded_file(None).await, Ok(None));
        let empty = UploadedFile {
            bytes: Vec::new(),
            ..png_file()
        };
        assert_eq!(controller.select_uploaded_file(Some(empty)).await, Ok(None));
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
    }

    #[tokio::test]
    async fn test_invalid_data_uri_leaves_state() {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze().times(0);
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock));
        controller.switch_to_upload().unwrap();

        let err = controller.run_analysis("data:image/png;base64,").await;
        assert!(matches!(err, Err(ControllerError::InvalidImage(_))));
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
    }

    #[tokio::test]
    async fn test_malformed_payload_never_reaches_analyzer() {
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze().times(0);
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock));
        controller.switch_to_upload().unwrap();

        let err = controller
            .run_analysis("data:image/png;base64,@@@not base64@@@")
            .await;
        assert!(matches!(err, Err(ControllerError::InvalidImage(_))));
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
        assert!(controller.error().is_none());
        assert!(controller.history().read_all().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejected_outside_upload_mode() {
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(ScriptedAnalyzer::new()));
        let err = controller.select_uploaded_file(Some(png_file())).await;
        assert_eq!(
            err,
            Err(ControllerError::NotAllowed {
                operation: "upload a file",
                phase: CapturePhase::CameraPending
            })
        );
    }

    #[tokio::test]
    async fn test_history_write_failure_still_shows_result() {
        let mut controller = CaptureController::new(
            ControllerDeps {
                camera: Arc::new(NoCamera),
                analyzer: Arc::new(mock_success("Try substitution")),
                history: HistoryStore::new(Arc::new(FullDisk)),
                speech: None,
            },
            settings(),
        );
        controller.switch_to_upload().unwrap();

        let problem = controller
            .select_uploaded_file(Some(png_file()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(problem.advice, "Try substitution");
        assert!(matches!(
            controller.state(),
            CaptureState::Results { saved: false, .. }
        ));
        let notices = controller.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_camera_granted_then_snapshot_releases_stream() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Grant));
        let mut controller = controller_with(camera.clone(), Arc::new(mock_success("Draw it")));

        assert_eq!(
            controller.acquire_camera().await,
            Ok(CapturePhase::CameraActive)
        );
        assert_eq!(controller.camera_permission(), CameraPermission::Granted);
        assert_eq!(camera.live_streams(), 1);
        controller.wait_for_camera_ready().await.unwrap();

        let problem = controller.snapshot_from_camera().await.unwrap();
        assert_eq!(problem.problem_image_uri.mime(), "image/png");
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(controller.phase(), CapturePhase::Results);
    }

    #[tokio::test]
    async fn test_snapshot_before_ready() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::GrantWithoutMetadata));
        let mut mock = MockProblemAnalyzer::new();
        mock.expect_analyze().times(0);
        let mut controller = controller_with(camera.clone(), Arc::new(mock));

        controller.acquire_camera().await.unwrap();
        assert_eq!(
            controller.wait_for_camera_ready().await,
            Err(ControllerError::CameraNotReady)
        );
        assert_eq!(
            controller.snapshot_from_camera().await,
            Err(ControllerError::CameraNotReady)
        );
        assert_eq!(controller.phase(), CapturePhase::CameraActive);
        assert_eq!(camera.live_streams(), 1);
    }

    #[tokio::test]
    async fn test_denied_camera() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Deny));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));

        let err = controller.acquire_camera().await.unwrap_err();
        assert!(matches!(err, ControllerError::CameraDenied { .. }));
        assert!(err.to_string().contains("upload"));
        assert_eq!(controller.phase(), CapturePhase::CameraDenied);
        assert_eq!(controller.camera_permission(), CameraPermission::Denied);
        assert_eq!(camera.live_streams(), 0);

        // Asking again reports the same denial without a new prompt.
        assert_eq!(controller.acquire_camera().await.unwrap_err(), err);
        assert_eq!(camera.open_count(), 1);
    }

    #[tokio::test]
    async fn test_hanging_permission_stays_pending() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Hang));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));

        assert_eq!(
            controller.acquire_camera().await,
            Ok(CapturePhase::CameraPending)
        );
        assert!(controller.camera_request_in_flight());
        assert_eq!(
            controller.acquire_camera().await,
            Ok(CapturePhase::CameraPending)
        );
        assert_eq!(camera.open_count(), 1);
    }

    #[tokio::test]
    async fn test_late_grant_after_switch_is_released() {
        let camera = Arc::new(
            FakeCamera::new(FakeCameraBehavior::Grant).with_delay(Duration::from_millis(50)),
        );
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));
        controller.start();
        controller.switch_to_upload().unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(controller.refresh(), CapturePhase::UploadMode);
        assert_eq!(camera.open_count(), 1);
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_switch_to_upload_rules() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Grant));
        let mut controller = controller_with(camera.clone(), Arc::new(mock_success("ok")));
        controller.acquire_camera().await.unwrap();

        controller.switch_to_upload().unwrap();
        assert_eq!(camera.live_streams(), 0);
        controller.switch_to_upload().unwrap();
        assert_eq!(controller.phase(), CapturePhase::UploadMode);

        controller.run_analysis(&tiny_png_uri().to_string()).await.unwrap();
        assert!(matches!(
            controller.switch_to_upload(),
            Err(ControllerError::NotAllowed {
                phase: CapturePhase::Results,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        analyzer.push_success("late", "");
        let mut controller = controller_with(Arc::new(NoCamera), analyzer);
        controller.switch_to_upload().unwrap();

        let pending = controller.begin_analysis(tiny_png_uri()).unwrap();
        controller.reset();
        assert!(pending.is_abandoned());

        let completion = pending.resolve().await;
        assert_eq!(
            controller.complete_analysis(completion),
            Err(ControllerError::Superseded)
        );
        assert_eq!(controller.phase(), CapturePhase::CameraPending);
        assert!(controller.history().read_all().is_empty());
    }

    #[tokio::test]
    async fn test_begin_rejected_while_analyzing() {
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(ScriptedAnalyzer::new()));
        controller.switch_to_upload().unwrap();
        let _pending = controller.begin_analysis(tiny_png_uri()).unwrap();

        assert!(matches!(
            controller.begin_analysis(tiny_png_uri()),
            Err(ControllerError::NotAllowed {
                phase: CapturePhase::Analyzing,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reset_twice_matches_reset_once() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Hang));
        let mut controller = controller_with(camera.clone(), Arc::new(mock_success("a")));
        controller.switch_to_upload().unwrap();
        controller.run_analysis(&tiny_png_uri().to_string()).await.unwrap();

        controller.reset();
        let once = (
            controller.phase(),
            controller.pending_image().cloned(),
            controller.result().cloned(),
            controller.error().map(str::to_string),
        );
        controller.reset();
        let twice = (
            controller.phase(),
            controller.pending_image().cloned(),
            controller.result().cloned(),
            controller.error().map(str::to_string),
        );

        assert_eq!(once, (CapturePhase::CameraPending, None, None, None));
        assert_eq!(once, twice);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(camera.open_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_denial_makes_fresh_request() {
        let camera = Arc::new(FakeCamera::scripted(vec![
            FakeCameraBehavior::Deny,
            FakeCameraBehavior::Grant,
        ]));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));
        assert!(controller.acquire_camera().await.is_err());

        controller.retry_camera().unwrap();
        assert_eq!(controller.phase(), CapturePhase::CameraPending);
        assert!(controller.error().is_none());
        assert_eq!(
            controller.acquire_camera().await,
            Ok(CapturePhase::CameraActive)
        );
        assert_eq!(camera.open_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_discards_unread_denial_and_asks_again() {
        let camera = Arc::new(FakeCamera::scripted(vec![
            FakeCameraBehavior::Deny,
            FakeCameraBehavior::Grant,
        ]));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));
        controller.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(camera.open_count(), 1);

        controller.reset();
        assert_eq!(controller.phase(), CapturePhase::CameraPending);
        assert_eq!(
            controller.acquire_camera().await,
            Ok(CapturePhase::CameraActive)
        );
        assert_eq!(camera.open_count(), 2);
        assert_eq!(controller.camera_permission(), CameraPermission::Granted);
    }

    #[tokio::test]
    async fn test_reset_releases_live_stream_through_transition() {
        let camera = Arc::new(FakeCamera::scripted(vec![
            FakeCameraBehavior::Grant,
            FakeCameraBehavior::Hang,
        ]));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));
        controller.acquire_camera().await.unwrap();
        assert_eq!(camera.live_streams(), 1);

        controller.reset();
        assert_eq!(controller.phase(), CapturePhase::CameraPending);
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(camera.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_stream() {
        let camera = Arc::new(FakeCamera::new(FakeCameraBehavior::Grant));
        let mut controller = controller_with(camera.clone(), Arc::new(ScriptedAnalyzer::new()));
        controller.acquire_camera().await.unwrap();
        assert_eq!(camera.live_streams(), 1);

        drop(controller);
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_speak_advice_and_stop() {
        let speech = Arc::new(FakeSpeech::new(Duration::from_secs(30)));
        let mut controller = CaptureController::new(
            ControllerDeps {
                camera: Arc::new(NoCamera),
                analyzer: Arc::new(mock_success("Read the question twice")),
                history: HistoryStore::in_memory(),
                speech: Some(speech.clone()),
            },
            settings(),
        );
        assert!(matches!(
            controller.speak_advice(),
            Err(ControllerError::NotAllowed { .. })
        ));

        controller.switch_to_upload().unwrap();
        controller.run_analysis(&tiny_png_uri().to_string()).await.unwrap();
        controller.speak_advice().unwrap();
        assert_eq!(controller.speech_status(), SpeechStatus::Speaking);

        assert!(controller.stop_speaking());
        assert_eq!(
            controller.wait_for_speech().await,
            Some(SpeechEvent::Ended(SpeechOutcome::Cancelled))
        );
        assert_eq!(controller.speech_status(), SpeechStatus::Idle);
        assert_eq!(speech.spoken(), vec!["Read the question twice".to_string()]);
    }

    #[tokio::test]
    async fn test_speak_without_synthesizer() {
        let mut controller = controller_with(Arc::new(NoCamera), Arc::new(mock_success("x")));
        controller.switch_to_upload().unwrap();
        controller.run_analysis(&tiny_png_uri().to_string()).await.unwrap();
        assert_eq!(
            controller.speak_advice(),
            Err(ControllerError::SpeechUnavailable)
        );
    }

    #[tokio::test]
    async fn test_reset_cancels_speech() {
        let speech = Arc::new(FakeSpeech::new(Duration::from_secs(30)));
        let mut controller = CaptureController::new(
            ControllerDeps {
                camera: Arc::new(NoCamera),
                analyzer: Arc::new(mock_success("advice")),
                history: HistoryStore::in_memory(),
                speech: Some(speech),
            },
            settings(),
        );
        controller.switch_to_upload().unwrap();
        controller.run_analysis(&tiny_png_uri().to_string()).await.unwrap();
        controller.speak_advice().unwrap();

        controller.reset();
        assert_eq!(controller.speech_status(), SpeechStatus::Idle);
        assert!(controller.wait_for_speech().await.is_none());
    }
}
