//! `examsnap capture`: the camera path

use crate::commands::{build_controller, print_current_result, print_notices, read_aloud};
use crate::config::Config;
use crate::controller::{CaptureController, CapturePhase, ControllerError, UploadedFile};
use crate::error::{ExamSnapError, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Take a photo and analyze it
///
/// Waits for camera permission, waits until the stream is ready, takes a
/// still and analyzes it. When the camera is refused, unavailable or does
/// not answer in time, `fallback` is uploaded instead if given.
///
/// # Errors
///
/// Returns error if neither the camera nor the fallback file can be used,
/// or if the analysis fails.
pub async fn run_capture(mut config: Config, fallback: Option<PathBuf>, speak: bool) -> Result<()> {
    if speak {
        config.speech.enabled = true;
    }

    let mut controller = build_controller(&config)?;
    controller.start();
    println!("{}", "Waiting for the camera ...".cyan());

    let camera_problem = match controller.acquire_camera().await {
        Ok(CapturePhase::CameraActive) => None,
        Ok(_) => Some(format!(
            "The camera did not answer within {} ms",
            config.camera.acquire_timeout_ms
        )),
        Err(ControllerError::CameraDenied { reason }) => Some(reason),
        Err(e) => return Err(e.into()),
    };
    print_notices(&mut controller, false);

    match camera_problem {
        None => snap(&mut controller).await?,
        Some(reason) => match fallback {
            Some(path) => {
                println!("{}", reason.yellow());
                println!("{}", format!("Uploading {} instead", path.display()).cyan());
                upload(&mut controller, &path).await?;
            }
            None => return Err(ExamSnapError::Camera(reason).into()),
        },
    }

    print_notices(&mut controller, false);
    print_current_result(&controller);
    if speak {
        read_aloud(&mut controller).await?;
    }
    Ok(())
}

async fn snap(controller: &mut CaptureController) -> Result<()> {
    let dimensions = controller.wait_for_camera_ready().await?;
    println!(
        "{}",
        format!("Camera ready ({}), taking a photo ...", dimensions).cyan()
    );
    let outcome = controller.snapshot_from_camera().await;
    print_notices(controller, false);
    outcome?;
    Ok(())
}

async fn upload(controller: &mut CaptureController, path: &Path) -> Result<()> {
    controller.switch_to_upload()?;
    let file = UploadedFile::from_path(path).await?;
    let outcome = controller.select_uploaded_file(Some(file)).await;
    print_notices(controller, false);
    if outcome?.is_none() {
        return Err(ExamSnapError::Analysis(format!("{} is empty", path.display())).into());
    }
    Ok(())
}
