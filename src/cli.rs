//! Command-line interface definition for ExamSnap
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for analyzing problems, capturing from the camera,
//! browsing history and running an interactive session.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ExamSnap - photograph an exam problem, get tutoring advice
///
/// Sends a photo or scan of a problem to a vision model for OCR and
/// step-by-step advice, and keeps a local revision history.
#[derive(Parser, Debug, Clone)]
#[command(name = "examsnap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the history database path
    #[arg(long, value_name = "PATH")]
    pub history_db: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ExamSnap
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Analyze a photo or scan of a problem
    Analyze {
        /// Image file to upload
        file: PathBuf,

        /// Read the advice aloud
        #[arg(long)]
        speak: bool,
    },

    /// Take a photo with the camera and analyze it
    Capture {
        /// Image to upload instead when the camera is unavailable
        #[arg(long, value_name = "FILE")]
        fallback: Option<PathBuf>,

        /// Read the advice aloud
        #[arg(long)]
        speak: bool,
    },

    /// Browse or clear the revision history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Start an interactive capture session
    Session,
}

/// History subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum HistoryCommand {
    /// List analyzed problems, newest first
    List {
        /// Show at most this many entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one analyzed problem
    Show {
        /// Problem id or unique id prefix
        id: String,

        /// Write the problem image to this file
        #[arg(long, value_name = "OUT")]
        image: Option<PathBuf>,
    },

    /// Delete the whole history
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            history_db: None,
            command: Commands::Session,
        }
    }
}
