use examsnap::analysis::ProblemAnalyzer;
use examsnap::camera::CameraDevice;
use examsnap::controller::{CaptureController, ControllerDeps, ControllerSettings};
use examsnap::history::HistoryStore;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// A small white PNG the image decoders accept
#[allow(dead_code)]
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(6, 4, image::Rgb([255, 255, 255]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("failed to encode png");
    cursor.into_inner()
}

#[allow(dead_code)]
pub fn write_image(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, tiny_png()).expect("failed to write image");
    path
}

#[allow(dead_code)]
pub fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        acquire_timeout: Duration::from_millis(300),
        ready_timeout: Duration::from_millis(150),
    }
}

#[allow(dead_code)]
pub fn controller(
    camera: Arc<dyn CameraDevice>,
    analyzer: Arc<dyn ProblemAnalyzer>,
    history: HistoryStore,
) -> CaptureController {
    CaptureController::new(
        ControllerDeps {
            camera,
            analyzer,
            history,
            speech: None,
        },
        fast_settings(),
    )
}
