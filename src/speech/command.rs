//! Speech through an external TTS program (`espeak-ng`, `say`, ...)

use crate::speech::{SpeechError, SpeechOutcome, SpeechSynthesizer};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Synthesizer that runs a program with the text as its last argument
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    command: Vec<String>,
}

impl CommandSpeech {
    /// Creates a synthesizer from a program and its leading arguments
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSpeech {
    async fn speak(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<SpeechOutcome, SpeechError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SpeechError::Unavailable("empty speech command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Unavailable(format!("`{}`: {}", program, e)))?;

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to stop speech process: {}", e);
                }
                Ok(SpeechOutcome::Cancelled)
            }

            status = child.wait() => {
                let status = status.map_err(|e| SpeechError::Playback(e.to_string()))?;
                if status.success() {
                    Ok(SpeechOutcome::Finished)
                } else {
                    Err(SpeechError::Playback(format!("`{}` exited with {}", program, status)))
                }
            }
        }
    }
}
