//! Ollama analysis backend
//!
//! Sends the problem image to a vision-capable model (for example `llava`)
//! on a local or remote Ollama server through the `/api/chat` endpoint,
//! asking for a JSON reply.

use crate::analysis::{
    build_http_client, transport_error, AnalysisError, AnalyzeProblemInput, AnalyzeProblemOutput,
    ProblemAnalyzer,
};
use crate::config::OllamaConfig;
use crate::data_uri::DataUri;
use crate::error::Result;
use crate::prompts::{generate_tutor_prompt, parse_tutor_reply, TUTOR_SYSTEM_PROMPT};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama vision analyzer
///
/// # Examples
///
/// ```
/// use examsnap::analysis::OllamaAnalyzer;
/// use examsnap::config::OllamaConfig;
/// use std::time::Duration;
///
/// let analyzer = OllamaAnalyzer::new(OllamaConfig::default(), Duration::from_secs(30));
/// assert!(analyzer.is_ok());
/// ```
pub struct OllamaAnalyzer {
    client: Client,
    config: OllamaConfig,
}

/// Request structure for Ollama's chat API
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaChatMessage>,
    format: String,
    stream: bool,
}

/// Message structure for Ollama's chat API
#[derive(Debug, Serialize)]
struct OllamaChatMessage {
    role: String,
    content: String,
    /// Raw base64 image payloads (no `data:` prefix)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Response from Ollama's chat API
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaReplyMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaReplyMessage {
    #[serde(default)]
    content: String,
}

/// Error body returned by Ollama on failure
#[derive(Debug, Deserialize)]
struct OllamaErrorBody {
    error: String,
}

impl OllamaAnalyzer {
    /// Create a new Ollama analyzer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: OllamaConfig, timeout: Duration) -> Result<Self> {
        let client = build_http_client(timeout)?;

        tracing::info!(
            "Initialized Ollama analyzer: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, image: &DataUri) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OllamaChatMessage {
                    role: "system".to_string(),
                    content: TUTOR_SYSTEM_PROMPT.to_string(),
                    images: Vec::new(),
                },
                OllamaChatMessage {
                    role: "user".to_string(),
                    content: generate_tutor_prompt(),
                    images: vec![image.payload().to_string()],
                },
            ],
            format: "json".to_string(),
            stream: false,
        }
    }
}

#[async_trait]
impl ProblemAnalyzer for OllamaAnalyzer {
    async fn analyze(
        &self,
        input: AnalyzeProblemInput,
    ) -> std::result::Result<AnalyzeProblemOutput, AnalysisError> {
        let image = DataUri::parse(&input.problem_image)
            .map_err(|e| AnalysisError::InvalidInput(format!("Invalid problem image: {}", e)))?;

        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        let request = self.build_request(&image);

        tracing::debug!(
            "Sending Ollama analysis request: model={}, image={} ({} bytes)",
            request.model,
            image.mime(),
            image.approx_decoded_len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error("Ollama", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            let message = serde_json::from_str::<OllamaErrorBody>(&error_text)
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("Ollama returned error {}: {}", status, error_text));
            return Err(AnalysisError::Remote(message));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            AnalysisError::Transport(format!("Failed to parse Ollama response: {}", e))
        })?;

        tracing::debug!(
            "Ollama response: done={}, {} chars",
            body.done,
            body.message.content.len()
        );

        Ok(parse_tutor_reply(&body.message.content))
    }

    fn describe(&self) -> String {
        format!("ollama ({} at {})", self.config.model, self.config.host)
    }
}
