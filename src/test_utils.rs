//! Test utilities for ExamSnap
//!
//! This module provides common test utilities including temporary directory
//! management, sample image bytes, and assertion helpers.

use crate::data_uri::DataUri;
use crate::history::AnalyzedProblem;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// Returns a TempDir that will be cleaned up when dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given bytes
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Encodes a 4x3 PNG for tests that need a real, decodable image
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 3, image::Rgb([250, 250, 250]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    cursor.into_inner()
}

/// Data URI wrapping [`tiny_png`]
pub fn tiny_png_uri() -> DataUri {
    DataUri::from_bytes("image/png", &tiny_png()).expect("Failed to build test data URI")
}

/// Builds a history entry with the given id and timestamp
pub fn sample_problem(id: &str, timestamp: i64) -> AnalyzedProblem {
    AnalyzedProblem {
        id: id.to_string(),
        problem_image_uri: tiny_png_uri(),
        advice: format!("advice for {}", id),
        concepts: format!("concepts for {}", id),
        timestamp,
    }
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T, E: std::fmt::Display>(result: Result<T, E>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}', got Ok", expected),
        Err(e) => {
            let message = e.to_string();
            assert!(
                message.contains(expected),
                "Expected error containing '{}', got '{}'",
                expected,
                message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.bin", b"bytes");
        assert_eq!(std::fs::read(path).unwrap(), b"bytes");
    }

    #[test]
    fn test_tiny_png_is_png() {
        assert!(tiny_png().starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), String> = Err("network timeout".to_string());
        assert_error_contains(result, "timeout");
    }

    #[test]
    #[should_panic(expected = "Expected error")]
    fn test_assert_error_contains_ok_result() {
        let result: Result<(), String> = Ok(());
        assert_error_contains(result, "error");
    }
}
