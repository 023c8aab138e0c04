//! Gemini analysis backend
//!
//! Calls the Generative Language `generateContent` endpoint with the tutor
//! prompt and the problem image as inline data, requesting a JSON reply.

use crate::analysis::{
    build_http_client, transport_error, AnalysisError, AnalyzeProblemInput, AnalyzeProblemOutput,
    ProblemAnalyzer,
};
use crate::config::GeminiConfig;
use crate::data_uri::DataUri;
use crate::error::Result;
use crate::prompts::{generate_tutor_prompt, parse_tutor_reply, TUTOR_SYSTEM_PROMPT};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini vision analyzer
pub struct GeminiAnalyzer {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
}

impl GeminiAnalyzer {
    /// Create a new Gemini analyzer
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: GeminiConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let client = build_http_client(timeout)?;
        tracing::info!("Initialized Gemini analyzer: model={}", config.model);
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(image: &DataUri) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(TUTOR_SYSTEM_PROMPT.to_string()),
                    inline_data: None,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![
                    GeminiPart {
                        text: Some(generate_tutor_prompt()),
                        inline_data: None,
                    },
                    GeminiPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.mime().to_string(),
                            data: image.payload().to_string(),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        }
    }
}

fn reply_text(response: GenerateContentResponse) -> std::result::Result<String, AnalysisError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::Remote(format!(
            "The image was rejected by the model ({})",
            reason
        )));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::Remote("The model returned no answer".to_string()))?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(AnalysisError::Remote(format!(
            "The model returned an empty answer (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}

#[async_trait]
impl ProblemAnalyzer for GeminiAnalyzer {
    async fn analyze(
        &self,
        input: AnalyzeProblemInput,
    ) -> std::result::Result<AnalyzeProblemOutput, AnalysisError> {
        let image = DataUri::parse(&input.problem_image)
            .map_err(|e| AnalysisError::InvalidInput(format!("Invalid problem image: {}", e)))?;

        tracing::debug!(
            "Sending Gemini analysis request: model={}, image={}",
            self.config.model,
            image.mime()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_request(&image))
            .send()
            .await
            .map_err(|e| transport_error("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini returned error {}: {}", status, error_text);
            let message = serde_json::from_str::<GeminiErrorBody>(&error_text)
                .ok()
                .map(|body| body.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Gemini returned error {}", status));
            return Err(AnalysisError::Remote(message));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}", e);
            AnalysisError::Transport(format!("Failed to parse Gemini response: {}", e))
        })?;

        Ok(parse_tutor_reply(&reply_text(body)?))
    }

    fn describe(&self) -> String {
        format!("gemini ({})", self.config.model)
    }
}
