//! Capture session states and the transition function
//!
//! [`CaptureState`] is the single source of truth for where a capture
//! session is. Each variant owns the data that only exists in that state:
//! the live camera stream, the denial reason, the retained image, the image
//! under analysis or the stored result. [`CaptureState::apply`] is the only
//! way to move between states.
//!
//! Leaving `CameraActive` drops its [`LiveStream`], which stops the camera
//! tracks. A rejected event carrying a stream hands it back to the caller,
//! who releases it by dropping it.

use crate::camera::LiveStream;
use crate::data_uri::DataUri;
use crate::history::AnalyzedProblem;
use std::fmt;

/// Observable phase of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapturePhase {
    /// Camera permission or stream request in flight
    CameraPending,
    /// Live camera stream available
    CameraActive,
    /// Camera refused or unavailable
    CameraDenied,
    /// File upload is the input path
    UploadMode,
    /// An analysis call is in flight
    Analyzing,
    /// A successful result is displayed
    Results,
}

impl CapturePhase {
    /// Snake-case name used in logs and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePhase::CameraPending => "camera_pending",
            CapturePhase::CameraActive => "camera_active",
            CapturePhase::CameraDenied => "camera_denied",
            CapturePhase::UploadMode => "upload_mode",
            CapturePhase::Analyzing => "analyzing",
            CapturePhase::Results => "results",
        }
    }

    /// True in the states from which a new image can be submitted
    pub fn accepts_image(&self) -> bool {
        matches!(self, CapturePhase::CameraActive | CapturePhase::UploadMode)
    }
}

impl fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one controller session
///
/// A new session starts on every reset; work started under an older
/// session is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// The first session of a controller
    pub fn first() -> Self {
        Self(1)
    }

    /// The session following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Identifies one analysis request within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisTicket {
    /// Session that issued the request
    pub session: SessionId,
    /// Request number, unique per controller
    pub request: u64,
}

impl fmt::Display for AnalysisTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/request-{}", self.session, self.request)
    }
}

/// Input mode that was active when an analysis started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// The image came from a camera snapshot
    Camera,
    /// The image came from the file picker
    Upload,
}

/// Session state with the data each state owns
#[derive(Debug)]
pub enum CaptureState {
    /// Camera request in flight
    CameraPending,
    /// Live stream held until a snapshot or another exit
    CameraActive {
        /// The open stream; dropping it stops the camera
        stream: LiveStream,
    },
    /// Camera could not be used
    CameraDenied {
        /// User-facing explanation
        reason: String,
    },
    /// Waiting for a file
    UploadMode {
        /// Image kept from a failed analysis, for re-display or retry
        retained_image: Option<DataUri>,
    },
    /// Analysis call in flight
    Analyzing {
        /// The image being analyzed
        image: DataUri,
        /// Request the state is waiting for
        ticket: AnalysisTicket,
        /// Where to return if the image is not retained after a failure
        resume_to: ResumeMode,
    },
    /// Analysis succeeded
    Results {
        /// The created record
        problem: AnalyzedProblem,
        /// False when the history write failed
        saved: bool,
    },
}

/// Inputs to the state machine
#[derive(Debug)]
pub enum CaptureEvent {
    /// The camera request produced a stream
    CameraGranted(LiveStream),
    /// The camera request failed
    CameraFailed {
        /// User-facing explanation
        reason: String,
    },
    /// The user chose the file picker
    SwitchToUpload,
    /// The user asked to try the camera again
    RetryCamera,
    /// An image was submitted for analysis
    AnalysisStarted {
        /// Snapshot or uploaded image
        image: DataUri,
        /// Request identity
        ticket: AnalysisTicket,
    },
    /// The analysis call returned a result
    AnalysisSucceeded {
        /// Request the result belongs to
        ticket: AnalysisTicket,
        /// The created record
        problem: AnalyzedProblem,
        /// Whether the history write succeeded
        saved: bool,
    },
    /// The analysis call failed
    AnalysisFailed {
        /// Request the failure belongs to
        ticket: AnalysisTicket,
        /// Keep the image for another attempt
        retain_image: bool,
    },
    /// Start over from scratch
    Reset,
}

impl CaptureEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            CaptureEvent::CameraGranted(_) => "camera_granted",
            CaptureEvent::CameraFailed { .. } => "camera_failed",
            CaptureEvent::SwitchToUpload => "switch_to_upload",
            CaptureEvent::RetryCamera => "retry_camera",
            CaptureEvent::AnalysisStarted { .. } => "analysis_started",
            CaptureEvent::AnalysisSucceeded { .. } => "analysis_succeeded",
            CaptureEvent::AnalysisFailed { .. } => "analysis_failed",
            CaptureEvent::Reset => "reset",
        }
    }
}

/// An event the current state does not accept
///
/// Gives back both the unchanged state and the event.
#[derive(Debug)]
pub struct InvalidTransition {
    /// The state, unchanged
    pub state: CaptureState,
    /// The rejected event
    pub event: CaptureEvent,
}

impl CaptureState {
    /// The observable phase
    pub fn phase(&self) -> CapturePhase {
        match self {
            CaptureState::CameraPending => CapturePhase::CameraPending,
            CaptureState::CameraActive { .. } => CapturePhase::CameraActive,
            CaptureState::CameraDenied { .. } => CapturePhase::CameraDenied,
            CaptureState::UploadMode { .. } => CapturePhase::UploadMode,
            CaptureState::Analyzing { .. } => CapturePhase::Analyzing,
            CaptureState::Results { .. } => CapturePhase::Results,
        }
    }

    /// Image retained for display, if any
    pub fn pending_image(&self) -> Option<&DataUri> {
        match self {
            CaptureState::Analyzing { image, .. } => Some(image),
            CaptureState::UploadMode { retained_image } => retained_image.as_ref(),
            _ => None,
        }
    }

    /// Applies an event, returning the next state
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the event is not accepted in the
    /// current state, including analysis outcomes whose ticket does not
    /// match the request in flight.
    ///
    /// # Examples
    ///
    /// ```
    /// use examsnap::controller::{CaptureEvent, CapturePhase, CaptureState};
    ///
    /// let state = CaptureState::CameraPending
    ///     .apply(CaptureEvent::CameraFailed { reason: "denied".into() })
    ///     .unwrap();
    /// assert_eq!(state.phase(), CapturePhase::CameraDenied);
    ///
    /// let state = state.apply(CaptureEvent::SwitchToUpload).unwrap();
    /// assert_eq!(state.phase(), CapturePhase::UploadMode);
    /// ```
    pub fn apply(self, event: CaptureEvent) -> Result<CaptureState, InvalidTransition> {
        use CaptureEvent as E;
        use CaptureState as S;

        match (self, event) {
            (_, E::Reset) => Ok(S::CameraPending),

            (S::CameraPending, E::CameraGranted(stream)) => Ok(S::CameraActive { stream }),
            (S::CameraPending, E::CameraFailed { reason }) => Ok(S::CameraDenied { reason }),

            (S::UploadMode { retained_image }, E::SwitchToUpload) => {
                Ok(S::UploadMode { retained_image })
            }
            (
                S::CameraPending | S::CameraActive { .. } | S::CameraDenied { .. },
                E::SwitchToUpload,
            ) => Ok(S::UploadMode {
                retained_image: None,
            }),

            (S::CameraDenied { .. } | S::UploadMode { .. }, E::RetryCamera) => {
                Ok(S::CameraPending)
            }

            (S::CameraActive { .. }, E::AnalysisStarted { image, ticket }) => Ok(S::Analyzing {
                image,
                ticket,
                resume_to: ResumeMode::Camera,
            }),
            (S::UploadMode { .. }, E::AnalysisStarted { image, ticket }) => Ok(S::Analyzing {
                image,
                ticket,
                resume_to: ResumeMode::Upload,
            }),

            (
                S::Analyzing {
                    ticket: current, ..
                },
                E::AnalysisSucceeded {
                    ticket,
                    problem,
                    saved,
                },
            ) if current == ticket => Ok(S::Results { problem, saved }),

            (
                S::Analyzing {
                    image,
                    ticket: current,
                    resume_to,
                },
                E::AnalysisFailed {
                    ticket,
                    retain_image,
                },
            ) if current == ticket => Ok(if retain_image {
                S::UploadMode {
                    retained_image: Some(image),
                }
            } else {
                match resume_to {
                    ResumeMode::Upload => S::UploadMode {
                        retained_image: None,
                    },
                    ResumeMode::Camera => S::CameraPending,
                }
            }),

            (state, event) => Err(InvalidTransition { state, event }),
        }
    }
}

/// Severity of a [`Notice`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Progress information
    Info,
    /// Degraded but non-blocking condition
    Warning,
    /// A failed user action
    Error,
}

/// User-facing message produced by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Text shown to the user
    pub message: String,
}

impl Notice {
    /// Informational notice
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Warning notice
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Error notice
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}
