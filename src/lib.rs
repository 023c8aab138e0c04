//! ExamSnap - exam problem capture and tutoring library
//!
//! This library provides the core functionality for ExamSnap: a capture
//! controller that takes a photo or an uploaded scan of an exam problem,
//! sends it to a vision model for OCR and tutoring advice, and keeps a
//! local revision history.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `controller`: The capture/analysis state machine
//! - `camera`: Camera devices and the live stream guard
//! - `analysis`: Analysis backends (Ollama, Gemini) and the analyzer trait
//! - `history`: Revision history over a key-value store
//! - `speech`: Reading advice aloud
//! - `data_uri`: `data:<mime>;base64,<payload>` images
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` and `commands`: Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use examsnap::commands::build_controller;
//! use examsnap::controller::UploadedFile;
//! use examsnap::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let mut controller = build_controller(&config)?;
//!     controller.switch_to_upload()?;
//!     let file = UploadedFile::from_path("problem.png".as_ref()).await?;
//!     if let Some(problem) = controller.select_uploaded_file(Some(file)).await? {
//!         println!("{}", problem.advice);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod camera;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod data_uri;
pub mod error;
pub mod history;
pub mod prompts;
pub mod speech;

// Re-export commonly used types
pub use analysis::{create_analyzer, ProblemAnalyzer};
pub use config::Config;
pub use controller::{CaptureController, CapturePhase, ControllerError};
pub use data_uri::DataUri;
pub use error::{ExamSnapError, Result};
pub use history::{AnalyzedProblem, HistoryStore};

#[cfg(test)]
pub mod test_utils;
