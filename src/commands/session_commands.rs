//! Slash-command parser for the interactive capture session
//!
//! Commands are prefixed with `/` and are case-insensitive; file paths
//! passed to `/upload` keep their case.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing session commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it does not take
    #[error("{command} takes no argument (got '{arg}')")]
    UnexpectedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands accepted by the capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Take a photo with the live camera and analyze it
    Snap,

    /// Analyze an image file
    Upload(PathBuf),

    /// Wait for the camera request and report the result
    Camera,

    /// Try the camera again after a denial or from upload mode
    Retry,

    /// Switch to upload mode, releasing the camera
    UploadMode,

    /// Start over
    Reset,

    /// Read the advice aloud
    Speak,

    /// Stop reading aloud
    Stop,

    /// Show the session state
    Status,

    /// Show recent history entries
    History,

    /// Display help information
    Help,

    /// Exit the session
    Exit,

    /// Not a command
    None,
}

/// Parse a line of user input into a session command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for unknown `/` commands,
/// `CommandError::MissingArgument` for `/upload` without a path and
/// `CommandError::UnexpectedArgument` for arguments to commands that take
/// none.
///
/// # Examples
///
/// ```
/// use examsnap::commands::session_commands::{parse_session_command, SessionCommand};
/// use std::path::PathBuf;
///
/// assert_eq!(parse_session_command("/SNAP").unwrap(), SessionCommand::Snap);
/// assert_eq!(
///     parse_session_command("/upload Scans/Q1.png").unwrap(),
///     SessionCommand::Upload(PathBuf::from("Scans/Q1.png"))
/// );
/// assert_eq!(parse_session_command("hello").unwrap(), SessionCommand::None);
/// assert!(parse_session_command("/upload").is_err());
/// ```
pub fn parse_session_command(input: &str) -> Result<SessionCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SessionCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SessionCommand::None);
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    let command = match name.as_str() {
        "/upload" | "/u" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/upload".to_string(),
                    usage: "/upload <path>".to_string(),
                });
            }
            return Ok(SessionCommand::Upload(PathBuf::from(arg)));
        }
        "/snap" | "/s" => SessionCommand::Snap,
        "/camera" => SessionCommand::Camera,
        "/retry" => SessionCommand::Retry,
        "/files" => SessionCommand::UploadMode,
        "/reset" | "/new" => SessionCommand::Reset,
        "/speak" => SessionCommand::Speak,
        "/stop" => SessionCommand::Stop,
        "/status" => SessionCommand::Status,
        "/history" => SessionCommand::History,
        "/help" | "/?" => SessionCommand::Help,
        "/exit" | "/quit" | "/q" => SessionCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnexpectedArgument {
            command: name,
            arg: arg.to_string(),
        });
    }
    Ok(command)
}

/// Display help for session commands
pub fn print_help() {
    println!(
        r#"
Capture Session Commands
========================

CAMERA:
  /camera         - Wait for camera access and show the result
  /snap, /s       - Take a photo and analyze it
  /retry          - Try the camera again after it was refused
  /files          - Stop using the camera and upload files instead

UPLOAD:
  /upload <path>  - Analyze an image file (also /u <path>)

RESULTS:
  /speak          - Read the advice aloud
  /stop           - Stop reading aloud
  /reset, /new    - Start over with a new problem

SESSION INFORMATION:
  /status         - Show the session state
  /history        - Show recent analyzed problems
  /help           - Show this help message
  /quit, exit     - Leave the session
"#
    );
}
