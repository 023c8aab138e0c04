/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `analyze`  — Upload a file through the capture controller
- `capture`  — Camera snapshot, with an optional upload fallback
- `history`  — List, show and clear the revision history
- `session`  — Interactive capture session

The handlers are thin: they build a `CaptureController` from the
configuration and render its state and notices.
*/

use crate::analysis::create_analyzer;
use crate::camera::create_camera;
use crate::config::Config;
use crate::controller::{
    CaptureController, CaptureState, ControllerDeps, ControllerSettings, NoticeLevel,
};
use crate::error::Result;
use crate::history::{AnalyzedProblem, HistoryStore};
use crate::speech::create_speech;
use colored::Colorize;

pub mod analyze;
pub mod capture;
pub mod history;
pub mod session;
pub mod session_commands;

/// Build a capture controller from configuration
///
/// # Errors
///
/// Returns error if the analyzer cannot be created or the history store
/// cannot be opened.
pub fn build_controller(config: &Config) -> Result<CaptureController> {
    let analyzer = create_analyzer(&config.analyzer)?;
    let history = HistoryStore::open(&config.history)?;
    let deps = ControllerDeps {
        camera: create_camera(&config.camera),
        analyzer,
        history,
        speech: create_speech(&config.speech),
    };
    Ok(CaptureController::new(
        deps,
        ControllerSettings::from(&config.camera),
    ))
}

/// Print and drain the controller's notices
///
/// Error notices are skipped when `include_errors` is false, for callers
/// that report the error themselves.
pub fn print_notices(controller: &mut CaptureController, include_errors: bool) {
    for notice in controller.take_notices() {
        match notice.level {
            NoticeLevel::Info => println!("{}", notice.message.cyan()),
            NoticeLevel::Warning => println!("{}", notice.message.yellow()),
            NoticeLevel::Error if include_errors => println!("{}", notice.message.red()),
            NoticeLevel::Error => {}
        }
    }
}

/// Print an analyzed problem
pub fn print_problem(problem: &AnalyzedProblem) {
    println!();
    println!("{} {}", "Problem".bold(), problem.id.cyan());
    println!(
        "{} {}",
        "Analyzed".bold(),
        problem.created_at().format("%Y-%m-%d %H:%M")
    );
    println!();
    println!("{}", "Key concepts".bold().underline());
    println!("{}", or_placeholder(&problem.concepts));
    println!();
    println!("{}", "Advice".bold().underline());
    println!("{}", or_placeholder(&problem.advice));
    println!();
}

/// Print the result the controller is showing, if any
pub fn print_current_result(controller: &CaptureController) {
    if let CaptureState::Results { problem, saved } = controller.state() {
        print_problem(problem);
        if !saved {
            println!("{}", "(not saved to history)".yellow());
        }
    }
}

/// Reads the advice aloud and waits until playback ends
///
/// # Errors
///
/// Returns error if speech cannot be started.
pub async fn read_aloud(controller: &mut CaptureController) -> Result<()> {
    controller.speak_advice()?;
    print_notices(controller, true);
    if let Some(event) = controller.wait_for_speech().await {
        tracing::debug!("Speech ended: {:?}", event);
    }
    print_notices(controller, true);
    Ok(())
}

fn or_placeholder(text: &str) -> String {
    if text.trim().is_empty() {
        "(none)".dimmed().to_string()
    } else {
        text.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{CapturePhase, Notice};

    #[test]
    fn test_or_placeholder() {
        assert_eq!(or_placeholder("  Fractions "), "Fractions");
        assert!(or_placeholder("   ").contains("(none)"));
    }

    #[tokio::test]
    async fn test_build_controller_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.history.path = Some(dir.path().join("h.sled").to_string_lossy().to_string());

        let mut controller = build_controller(&config).unwrap();
        assert_eq!(controller.phase(), CapturePhase::CameraPending);
        assert!(controller.history().read_all().is_empty());
        assert!(controller.take_notices().is_empty());
        print_notices(&mut controller, true);
    }

    #[test]
    fn test_notice_levels_are_distinct() {
        assert_ne!(Notice::info("a"), Notice::warning("a"));
    }
}
