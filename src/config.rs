//! Configuration management for ExamSnap
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ExamSnapError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for ExamSnap
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Analysis backend configuration (Ollama, Gemini)
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Camera configuration
    #[serde(default)]
    pub camera: CameraConfig,
    /// History persistence configuration
    #[serde(default)]
    pub history: HistoryConfig,
    /// Speech playback configuration
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analysis backend configuration
///
/// Specifies which vision model backend performs OCR and tutoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Type of backend to use
    #[serde(rename = "type", default = "default_analyzer_type")]
    pub analyzer_type: String,

    /// Timeout for a single analysis call (seconds)
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_seconds: u64,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
}

fn default_analyzer_type() -> String {
    "ollama".to_string()
}

fn default_analyzer_timeout() -> u64 {
    120
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            analyzer_type: default_analyzer_type(),
            timeout_seconds: default_analyzer_timeout(),
            ollama: OllamaConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

/// Ollama backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Vision-capable model to use
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llava:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Gemini backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API base URL (overridable for tests and proxies)
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_gemini_api_key_env")]
    pub api_key_env: String,
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_gemini_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: default_gemini_api_base(),
            model: default_gemini_model(),
            api_key_env: default_gemini_api_key_env(),
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Still-capture command; `{output}` is replaced by the target file path
    ///
    /// When unset, no camera is available and the controller falls back to
    /// upload mode.
    #[serde(default)]
    pub capture_command: Option<Vec<String>>,

    /// How long to wait for camera access before reporting it as still pending
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// How long to wait for stream dimensions before a snapshot
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_ready_timeout_ms() -> u64 {
    3_000
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            capture_command: None,
            acquire_timeout_ms: default_acquire_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

/// History persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Database path; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<String>,

    /// Whether history is persisted at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
        }
    }
}

/// Speech playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Whether advice can be read aloud
    #[serde(default)]
    pub enabled: bool,

    /// Text-to-speech command; the text is appended as the last argument
    #[serde(default = "default_speech_command")]
    pub command: Vec<String>,
}

fn default_speech_command() -> Vec<String> {
    vec!["espeak-ng".to_string()]
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_speech_command(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Emit JSON-formatted log lines
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ExamSnapError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ExamSnapError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(analyzer_type) = std::env::var("EXAMSNAP_ANALYZER") {
            self.analyzer.analyzer_type = analyzer_type;
        }

        if let Ok(timeout) = std::env::var("EXAMSNAP_ANALYZER_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.analyzer.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid EXAMSNAP_ANALYZER_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(host) = std::env::var("EXAMSNAP_OLLAMA_HOST") {
            self.analyzer.ollama.host = host;
        }

        if let Ok(model) = std::env::var("EXAMSNAP_OLLAMA_MODEL") {
            self.analyzer.ollama.model = model;
        }

        if let Ok(model) = std::env::var("EXAMSNAP_GEMINI_MODEL") {
            self.analyzer.gemini.model = model;
        }

        if let Ok(command) = std::env::var("EXAMSNAP_CAMERA_COMMAND") {
            let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
            self.camera.capture_command = if parts.is_empty() { None } else { Some(parts) };
        }

        if let Ok(db_path) = std::env::var("EXAMSNAP_HISTORY_DB") {
            self.history.path = Some(db_path);
        }

        if let Ok(command) = std::env::var("EXAMSNAP_SPEECH_COMMAND") {
            self.speech.command = command.split_whitespace().map(str::to_string).collect();
            self.speech.enabled = true;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if cli.json_logs {
            self.logging.json = true;
        }

        if let Some(db_path) = &cli.history_db {
            tracing::info!("Using history DB override from CLI: {}", db_path);
            self.history.path = Some(db_path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let valid_analyzers = ["ollama", "gemini"];
        if !valid_analyzers.contains(&self.analyzer.analyzer_type.as_str()) {
            return Err(ExamSnapError::Config(format!(
                "Invalid analyzer type: {}. Must be one of: {}",
                self.analyzer.analyzer_type,
                valid_analyzers.join(", ")
            ))
            .into());
        }

        if self.analyzer.timeout_seconds == 0 {
            return Err(ExamSnapError::Config(
                "analyzer.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        url::Url::parse(&self.analyzer.ollama.host).map_err(|e| {
            ExamSnapError::Config(format!(
                "analyzer.ollama.host is not a valid URL ({}): {}",
                self.analyzer.ollama.host, e
            ))
        })?;

        url::Url::parse(&self.analyzer.gemini.api_base).map_err(|e| {
            ExamSnapError::Config(format!(
                "analyzer.gemini.api_base is not a valid URL ({}): {}",
                self.analyzer.gemini.api_base, e
            ))
        })?;

        if self.camera.acquire_timeout_ms == 0 || self.camera.ready_timeout_ms == 0 {
            return Err(ExamSnapError::Config(
                "camera timeouts must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(command) = &self.camera.capture_command {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(ExamSnapError::Config(
                    "camera.capture_command must name a program".to_string(),
                )
                .into());
            }
        }

        if self.speech.enabled && self.speech.command.is_empty() {
            return Err(ExamSnapError::Config(
                "speech.command must name a program when speech is enabled".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
