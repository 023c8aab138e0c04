//! Problem analysis backends
//!
//! The analysis call is the single external operation that turns a problem
//! image into tutoring text. This module defines the [`ProblemAnalyzer`]
//! seam the controller depends on, plus vision-model backends for Ollama and
//! Gemini and a scripted fake for tests and demos.

use crate::config::AnalyzerConfig;
use crate::error::{ExamSnapError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod fake;
pub mod gemini;
pub mod ollama;

pub use fake::ScriptedAnalyzer;
pub use gemini::GeminiAnalyzer;
pub use ollama::OllamaAnalyzer;

/// Input of the analysis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeProblemInput {
    /// The problem image as a `data:<mime>;base64,<payload>` URI
    pub problem_image: String,
}

/// Output of the analysis call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeProblemOutput {
    /// Tutoring explanation; may be empty
    pub advice: String,
    /// Key concepts summary; may be empty
    pub concepts: String,
}

/// Failure of the analysis call
///
/// The display text is meant to be shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The backend answered with an error
    #[error("{0}")]
    Remote(String),

    /// The request never got a usable answer (network, timeout, bad body)
    #[error("{0}")]
    Transport(String),

    /// The image could not be sent
    #[error("{0}")]
    InvalidInput(String),
}

impl AnalysisError {
    /// The user-facing message
    pub fn message(&self) -> &str {
        match self {
            Self::Remote(m) | Self::Transport(m) | Self::InvalidInput(m) => m,
        }
    }
}

/// Performs OCR and tutoring on a problem image
///
/// Implementations make exactly one remote call per invocation and never
/// retry on their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProblemAnalyzer: Send + Sync {
    /// Analyzes the problem image and returns advice and key concepts
    async fn analyze(
        &self,
        input: AnalyzeProblemInput,
    ) -> std::result::Result<AnalyzeProblemOutput, AnalysisError>;

    /// Short backend description for logs and status output
    fn describe(&self) -> String {
        "analyzer".to_string()
    }
}

/// Create an analyzer instance based on configuration
///
/// # Errors
///
/// Returns error if the backend type is unknown or initialization fails
/// (for example a missing Gemini API key).
pub fn create_analyzer(config: &AnalyzerConfig) -> Result<Arc<dyn ProblemAnalyzer>> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    match config.analyzer_type.as_str() {
        "ollama" => Ok(Arc::new(OllamaAnalyzer::new(
            config.ollama.clone(),
            timeout,
        )?)),
        "gemini" => {
            let api_key = std::env::var(&config.gemini.api_key_env).map_err(|_| {
                ExamSnapError::Analysis(format!(
                    "Gemini API key not found; set the {} environment variable",
                    config.gemini.api_key_env
                ))
            })?;
            Ok(Arc::new(GeminiAnalyzer::new(
                config.gemini.clone(),
                api_key,
                timeout,
            )?))
        }
        other => Err(ExamSnapError::Analysis(format!("Unknown analyzer type: {}", other)).into()),
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("examsnap/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ExamSnapError::Analysis(format!("Failed to create HTTP client: {}", e)).into())
}

pub(crate) fn transport_error(backend: &str, error: reqwest::Error) -> AnalysisError {
    tracing::error!("{} request failed: {}", backend, error);
    if error.is_timeout() {
        AnalysisError::Transport("The analysis request timed out. Please try again.".to_string())
    } else if error.is_connect() {
        AnalysisError::Transport(format!("Could not reach the {} service.", backend))
    } else {
        AnalysisError::Transport(format!("{} request failed: {}", backend, error))
    }
}
