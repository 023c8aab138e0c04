//! Text-to-speech playback of tutoring advice
//!
//! Playback is an awaitable operation tied to a [`CancellationToken`]: the
//! controller hands out a child of its session token, so resetting the
//! session or dropping the controller stops any speech still running.

use crate::config::SpeechConfig;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod command;
pub mod fake;

pub use command::CommandSpeech;
pub use fake::FakeSpeech;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// The whole text was spoken
    Finished,
    /// Playback was stopped through its token
    Cancelled,
}

/// Speech playback failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    /// The synthesizer could not be started
    #[error("Speech synthesizer unavailable: {0}")]
    Unavailable(String),

    /// The synthesizer failed while speaking
    #[error("Speech playback failed: {0}")]
    Playback(String),
}

/// Playback lifecycle events reported to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Playback began
    Started,
    /// Playback ended, either finished or stopped
    Ended(SpeechOutcome),
    /// Playback failed
    Error(String),
}

impl fmt::Display for SpeechEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechEvent::Started => write!(f, "Reading the advice aloud"),
            SpeechEvent::Ended(SpeechOutcome::Finished) => write!(f, "Finished reading"),
            SpeechEvent::Ended(SpeechOutcome::Cancelled) => write!(f, "Stopped reading"),
            SpeechEvent::Error(message) => write!(f, "Speech failed: {}", message),
        }
    }
}

/// Observable playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechStatus {
    /// Nothing is playing
    #[default]
    Idle,
    /// Playback is running
    Speaking,
}

/// Speech synthesizer
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speaks `text`, returning early with `Cancelled` once `cancel` fires
    async fn speak(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<SpeechOutcome, SpeechError>;
}

/// Create a speech synthesizer from configuration
///
/// Returns `None` when speech is disabled or no command is configured.
pub fn create_speech(config: &SpeechConfig) -> Option<Arc<dyn SpeechSynthesizer>> {
    if !config.enabled || config.command.is_empty() {
        return None;
    }
    tracing::debug!("Speech enabled with command {:?}", config.command);
    Some(Arc::new(CommandSpeech::new(config.command.clone())))
}
