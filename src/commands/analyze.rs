//! `examsnap analyze <FILE>`: the upload path

use crate::commands::{build_controller, print_current_result, print_notices, read_aloud};
use crate::config::Config;
use crate::controller::UploadedFile;
use crate::error::{ExamSnapError, Result};
use colored::Colorize;
use std::path::Path;

/// Analyze an image file and print the advice
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `file` - Image to upload
/// * `speak` - Read the advice aloud afterwards
///
/// # Errors
///
/// Returns error if the file cannot be read, is empty, or the analysis
/// fails. The analysis error message is the backend's, unchanged.
pub async fn run_analyze(mut config: Config, file: &Path, speak: bool) -> Result<()> {
    if speak {
        config.speech.enabled = true;
    }

    let mut controller = build_controller(&config)?;
    controller.switch_to_upload()?;

    let upload = UploadedFile::from_path(file).await.map_err(|e| {
        ExamSnapError::Analysis(format!("Cannot read {}: {}", file.display(), e))
    })?;
    println!("{}", format!("Analyzing {} ...", file.display()).cyan());

    let outcome = controller.select_uploaded_file(Some(upload)).await;
    print_notices(&mut controller, false);

    match outcome? {
        Some(_) => {
            print_current_result(&controller);
            if speak {
                read_aloud(&mut controller).await?;
            }
            Ok(())
        }
        None => Err(ExamSnapError::Analysis(format!("{} is empty", file.display())).into()),
    }
}
