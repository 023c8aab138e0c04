//! Interactive capture session
//!
//! A readline loop driving one [`CaptureController`]. The prompt shows the
//! current phase; camera results arriving in the background are picked up
//! before each prompt.

use crate::commands::history::print_history_table;
use crate::commands::session_commands::{parse_session_command, print_help, SessionCommand};
use crate::commands::{build_controller, print_current_result, print_notices};
use crate::config::Config;
use crate::controller::{
    CaptureController, CapturePhase, ControllerError, NoticeLevel, UploadedFile,
};
use crate::error::Result;
use crate::speech::SpeechStatus;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::Path;

const HISTORY_PREVIEW: usize = 10;

/// Whether the loop keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next command
    Continue,
    /// Leave the session
    Exit,
}

/// Start the interactive capture session
///
/// # Errors
///
/// Returns error if the controller cannot be built or the terminal cannot
/// be read.
pub async fn run_session(config: Config) -> Result<()> {
    let mut controller = build_controller(&config)?;
    controller.start();

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner();

    loop {
        let phase = controller.refresh();
        if controller.speech_status() == SpeechStatus::Idle {
            controller.wait_for_speech().await;
        }
        print_notices(&mut controller, true);

        match rl.readline(&format_prompt(phase)) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                let command = match parse_session_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e.to_string().red());
                        continue;
                    }
                };
                if execute(&mut controller, command).await == Flow::Exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    controller.stop_speaking();
    println!("Goodbye!");
    Ok(())
}

/// Execute one session command and print its outcome
pub async fn execute(controller: &mut CaptureController, command: SessionCommand) -> Flow {
    let outcome: std::result::Result<(), ControllerError> = match command {
        SessionCommand::Exit => return Flow::Exit,
        SessionCommand::None => {
            println!("Type '/help' for available commands");
            Ok(())
        }
        SessionCommand::Help => {
            print_help();
            Ok(())
        }
        SessionCommand::Status => {
            print_status(controller);
            Ok(())
        }
        SessionCommand::History => {
            let mut problems = controller.history().read_all();
            problems.truncate(HISTORY_PREVIEW);
            print_history_table(&problems);
            Ok(())
        }
        SessionCommand::Camera => camera(controller).await,
        SessionCommand::Retry => match controller.retry_camera() {
            Ok(()) => camera(controller).await,
            Err(e) => Err(e),
        },
        SessionCommand::UploadMode => controller.switch_to_upload().map(|()| {
            println!("{}", "Upload mode: use /upload <path>".cyan());
        }),
        SessionCommand::Snap => match controller.snapshot_from_camera().await {
            Ok(_) => {
                print_current_result(controller);
                Ok(())
            }
            Err(e) => Err(e),
        },
        SessionCommand::Upload(path) => upload(controller, &path).await,
        SessionCommand::Reset => {
            controller.reset();
            println!("{}", "Starting over.".cyan());
            camera(controller).await
        }
        SessionCommand::Speak => controller.speak_advice(),
        SessionCommand::Stop => {
            if !controller.stop_speaking() {
                println!("Nothing is being read aloud.");
            }
            Ok(())
        }
    };

    if let Err(e) = outcome {
        report(controller, &e);
    }
    Flow::Continue
}

async fn camera(controller: &mut CaptureController) -> std::result::Result<(), ControllerError> {
    println!("{}", "Waiting for the camera ...".cyan());
    match controller.acquire_camera().await? {
        CapturePhase::CameraActive => match controller.wait_for_camera_ready().await {
            Ok(dimensions) => {
                println!(
                    "{}",
                    format!("Camera ready ({}). Use /snap to take a photo.", dimensions).green()
                );
                Ok(())
            }
            Err(ControllerError::CameraNotReady) => {
                println!(
                    "{}",
                    "Camera is on but not ready yet; try /snap in a moment.".yellow()
                );
                Ok(())
            }
            Err(e) => Err(e),
        },
        _ => {
            println!(
                "{}",
                "Still waiting for camera permission. Use /camera to keep waiting or /files to upload."
                    .yellow()
            );
            Ok(())
        }
    }
}

async fn upload(
    controller: &mut CaptureController,
    path: &Path,
) -> std::result::Result<(), ControllerError> {
    if matches!(
        controller.refresh(),
        CapturePhase::CameraPending | CapturePhase::CameraActive | CapturePhase::CameraDenied
    ) {
        controller.switch_to_upload()?;
    }

    let file = match UploadedFile::from_path(path).await {
        Ok(file) => file,
        Err(e) => {
            println!(
                "{}",
                format!("Cannot read {}: {}", path.display(), e).red()
            );
            return Ok(());
        }
    };

    println!("{}", format!("Analyzing {} ...", path.display()).cyan());
    match controller.select_uploaded_file(Some(file)).await? {
        Some(_) => print_current_result(controller),
        None => println!("{}", "The file is empty; nothing to analyze.".yellow()),
    }
    Ok(())
}

fn report(controller: &mut CaptureController, error: &ControllerError) {
    match error {
        // Surfaced as a notice the first time; repeated denials are not.
        ControllerError::AnalysisFailed { .. } | ControllerError::CameraDenied { .. } => {
            let notices = controller.take_notices();
            if notices.is_empty() {
                println!("{}", error.to_string().red());
            }
            for notice in notices {
                match notice.level {
                    NoticeLevel::Error => println!("{}", notice.message.red()),
                    _ => println!("{}", notice.message.yellow()),
                }
            }
            if controller.pending_image().is_some() {
                println!(
                    "{}",
                    "Your photo was kept. Upload it again or pick another file.".yellow()
                );
            }
        }
        other => println!("{}", other.to_string().red()),
    }
}

fn print_status(controller: &mut CaptureController) {
    let phase = controller.refresh();
    println!("\n{}", "Session Status".bold());
    println!("  Session:     {}", controller.session());
    println!("  State:       {}", phase.to_string().cyan());
    println!("  Camera:      {:?}", controller.camera_permission());
    if let Some(dimensions) = controller.camera_dimensions() {
        println!("  Frame:       {}", dimensions);
    }
    if controller.camera_request_in_flight() {
        println!("  Request:     waiting for camera permission");
    }
    if let Some(image) = controller.pending_image() {
        println!(
            "  Image:       {} (~{} KB)",
            image.mime(),
            image.approx_decoded_len().div_ceil(1024)
        );
    }
    if let Some(problem) = controller.result() {
        println!("  Result:      {}", problem.id);
    }
    if let Some(error) = controller.error() {
        println!("  Last error:  {}", error.red());
    }
    println!("  Speech:      {:?}\n", controller.speech_status());
}

fn format_prompt(phase: CapturePhase) -> String {
    let tag = match phase {
        CapturePhase::CameraActive => phase.as_str().green(),
        CapturePhase::CameraDenied => phase.as_str().red(),
        CapturePhase::Results => phase.as_str().bright_green(),
        CapturePhase::Analyzing => phase.as_str().yellow(),
        _ => phase.as_str().cyan(),
    };
    format!("[{}] >> ", tag)
}

fn print_welcome_banner() {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║            ExamSnap Capture Session - Welcome!               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Photograph a problem with /snap or analyze a file with /upload <path>.");
    println!("Type '/help' for available commands, 'exit' to quit\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ScriptedAnalyzer;
    use crate::camera::{FakeCamera, FakeCameraBehavior};
    use crate::controller::{ControllerDeps, ControllerSettings};
    use crate::history::HistoryStore;
    use crate::test_utils::{create_test_file, temp_dir, tiny_png};
    use std::sync::Arc;
    use std::time::Duration;

    fn controller(camera: FakeCamera, analyzer: Arc<ScriptedAnalyzer>) -> CaptureController {
        CaptureController::new(
            ControllerDeps {
                camera: Arc::new(camera),
                analyzer,
                history: HistoryStore::in_memory(),
                speech: None,
            },
            ControllerSettings {
                acquire_timeout: Duration::from_millis(200),
                ready_timeout: Duration::from_millis(100),
            },
        )
    }

    #[tokio::test]
    async fn test_camera_then_snap() {
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        analyzer.push_success("Use the chain rule", "Derivatives");
        let mut controller = controller(FakeCamera::new(FakeCameraBehavior::Grant), analyzer);

        assert_eq!(execute(&mut controller, SessionCommand::Camera).await, Flow::Continue);
        assert_eq!(controller.phase(), CapturePhase::CameraActive);
        execute(&mut controller, SessionCommand::Snap).await;
        assert_eq!(controller.phase(), CapturePhase::Results);
        assert_eq!(controller.history().read_all().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_switches_from_camera() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "q.png", &tiny_png());
        let analyzer = Arc::new(ScriptedAnalyzer::new());
        analyzer.push_failure("model overloaded");
        let mut controller = controller(FakeCamera::new(FakeCameraBehavior::Deny), analyzer);

        execute(&mut controller, SessionCommand::Camera).await;
        assert_eq!(controller.phase(), CapturePhase::CameraDenied);

        execute(&mut controller, SessionCommand::Upload(path)).await;
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
        assert_eq!(controller.error(), Some("model overloaded"));
        assert!(controller.pending_image().is_some());
    }

    #[tokio::test]
    async fn test_missing_upload_file_keeps_state() {
        let mut controller = controller(
            FakeCamera::new(FakeCameraBehavior::Deny),
            Arc::new(ScriptedAnalyzer::new()),
        );
        controller.switch_to_upload().unwrap();
        execute(
            &mut controller,
            SessionCommand::Upload("/no/such/file.png".into()),
        )
        .await;
        assert_eq!(controller.phase(), CapturePhase::UploadMode);
    }

    #[tokio::test]
    async fn test_reset_and_exit() {
        let mut controller = controller(
            FakeCamera::new(FakeCameraBehavior::Grant),
            Arc::new(ScriptedAnalyzer::new()),
        );
        execute(&mut controller, SessionCommand::Reset).await;
        assert_eq!(controller.phase(), CapturePhase::CameraActive);
        assert_eq!(execute(&mut controller, SessionCommand::Exit).await, Flow::Exit);
    }

    #[test]
    fn test_prompt_names_phase() {
        assert!(format_prompt(CapturePhase::UploadMode).contains("upload_mode"));
    }
}
