//! In-process speech synthesizer for tests and demos

use crate::speech::{SpeechError, SpeechOutcome, SpeechSynthesizer};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Synthesizer that "speaks" by sleeping
#[derive(Default)]
pub struct FakeSpeech {
    duration: Duration,
    failure: Option<String>,
    spoken: Mutex<Vec<String>>,
}

impl FakeSpeech {
    /// Playback that takes `duration` to finish
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Playback that always fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Texts passed to `speak`, oldest first
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn speak(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<SpeechOutcome, SpeechError> {
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());

        if let Some(message) = &self.failure {
            return Err(SpeechError::Playback(message.clone()));
        }

        tokio::select! {
            _ = cancel.cancelled() => Ok(SpeechOutcome::Cancelled),
            _ = tokio::time::sleep(self.duration) => Ok(SpeechOutcome::Finished),
        }
    }
}
