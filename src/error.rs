//! Error types for ExamSnap
//!
//! This module defines the crate-wide error type, using `thiserror` for
//! ergonomic error handling. Seams with their own failure vocabulary
//! (analysis, camera, speech, data URIs, the controller) define precise
//! error enums next to the code that raises them.

use thiserror::Error;

/// Main error type for ExamSnap operations
///
/// Covers configuration loading, backend construction, persistence and the
/// conversions needed by the CLI handlers.
#[derive(Error, Debug)]
pub enum ExamSnapError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Analysis backend errors (construction, unknown backend type)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Camera backend errors
    #[error("Camera error: {0}")]
    Camera(String),

    /// History storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Speech playback errors
    #[error("Speech error: {0}")]
    Speech(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ExamSnap operations
///
/// Uses `anyhow::Error` as the error type, allowing rich error context and
/// easy propagation from the CLI handlers.
pub type Result<T> = anyhow::Result<T>;
