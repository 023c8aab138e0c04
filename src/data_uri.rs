//! Data URI and image utilities for ExamSnap
//!
//! Captured frames and uploaded files travel through the controller as
//! self-describing data URIs (`data:<mime>;base64,<payload>`). This module
//! parses and builds them, sniffs image formats from magic bytes, and reads
//! frame dimensions with the `image` crate.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// MIME type used when a file's content cannot be identified
pub const FALLBACK_MIME: &str = "application/octet-stream";

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Error type for data URI operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataUriError {
    /// The string does not start with `data:`
    #[error("not a data URI (missing 'data:' prefix)")]
    MissingPrefix,

    /// The string lacks the `;base64,` marker
    #[error("data URI is not base64-encoded")]
    NotBase64,

    /// The MIME type segment is empty
    #[error("data URI has no MIME type")]
    EmptyMime,

    /// The payload segment is empty
    #[error("data URI has an empty payload")]
    EmptyPayload,

    /// The payload is not valid base64
    #[error("data URI payload is not valid base64: {0}")]
    InvalidPayload(String),
}

/// Supported image formats
///
/// Represents the image formats ExamSnap recognises from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// WebP image
    Webp,
    /// GIF image
    Gif,
    /// BMP image
    Bmp,
    /// TIFF image
    Tiff,
}

impl ImageFormat {
    /// Returns the MIME type for this image format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    /// Returns the conventional file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Maps a MIME type back to a known image format
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/webp" => Some(ImageFormat::Webp),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" => Some(ImageFormat::Bmp),
            "image/tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

/// Pixel dimensions of a frame or image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameDimensions {
    /// Returns true when either side is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Detects an image format from the leading magic bytes
///
/// # Examples
///
/// ```
/// use examsnap::data_uri::{detect_image_format, ImageFormat};
///
/// assert_eq!(detect_image_format(b"\x89PNG\r\n\x1a\n"), Some(ImageFormat::Png));
/// assert_eq!(detect_image_format(b"hello"), None);
/// ```
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(b"\x89PNG") {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(b"\xff\xd8\xff") {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"RIFF") && bytes.len() > 12 && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else if bytes.starts_with(b"II\x2a\x00") || bytes.starts_with(b"MM\x00\x2a") {
        Some(ImageFormat::Tiff)
    } else {
        None
    }
}

/// Reads the pixel dimensions of an encoded image
///
/// Returns `None` when the bytes cannot be decoded.
pub fn image_dimensions(bytes: &[u8]) -> Option<FrameDimensions> {
    let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(FrameDimensions { width, height })
}

/// A parsed `data:<mime>;base64,<payload>` URI
///
/// The payload is kept in its encoded form; [`DataUri::decode_payload`]
/// returns the raw bytes. Serializes as the plain URI string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataUri {
    mime: String,
    payload: String,
}

impl DataUri {
    /// Parses a data URI string
    ///
    /// Only the content shape is checked: a MIME type and a non-empty base64
    /// payload must be present. Image content is not validated.
    ///
    /// # Errors
    ///
    /// Returns `DataUriError` when the prefix, the base64 marker, the MIME
    /// type or the payload is missing, and `DataUriError::InvalidPayload`
    /// when the payload does not decode as base64.
    ///
    /// # Examples
    ///
    /// ```
    /// use examsnap::data_uri::DataUri;
    ///
    /// let uri = DataUri::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
    /// assert_eq!(uri.mime(), "image/png");
    /// assert!(DataUri::parse("data:image/png;base64,").is_err());
    /// assert!(DataUri::parse("data:image/png;base64,@@@").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, DataUriError> {
        let rest = input
            .trim()
            .strip_prefix(DATA_PREFIX)
            .ok_or(DataUriError::MissingPrefix)?;
        let (mime, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or(DataUriError::NotBase64)?;

        // Drop media-type parameters such as `;charset=...` from the MIME.
        let mime = mime.split(';').next().unwrap_or_default().trim();
        if mime.is_empty() {
            return Err(DataUriError::EmptyMime);
        }
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| DataUriError::InvalidPayload(e.to_string()))?;

        Ok(Self {
            mime: mime.to_ascii_lowercase(),
            payload: payload.to_string(),
        })
    }

    /// Builds a data URI from raw bytes and a MIME type
    ///
    /// # Errors
    ///
    /// Returns `DataUriError::EmptyPayload` for empty input and
    /// `DataUriError::EmptyMime` for an empty MIME type.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Result<Self, DataUriError> {
        if mime.trim().is_empty() {
            return Err(DataUriError::EmptyMime);
        }
        if bytes.is_empty() {
            return Err(DataUriError::EmptyPayload);
        }
        Ok(Self {
            mime: mime.trim().to_ascii_lowercase(),
            payload: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    /// Builds a data URI from raw bytes, sniffing the MIME type
    ///
    /// Uses the declared MIME type when given, otherwise the magic bytes,
    /// otherwise [`FALLBACK_MIME`].
    pub fn from_bytes_sniffed(declared: Option<&str>, bytes: &[u8]) -> Result<Self, DataUriError> {
        let mime = declared
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| detect_image_format(bytes).map(|f| f.mime_type().to_string()))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());
        Self::from_bytes(&mime, bytes)
    }

    /// Reads a file and encodes it as a data URI
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a `DataUriError`
    /// (wrapped) when the file is empty.
    pub async fn from_file(path: &Path) -> crate::error::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes_sniffed(None, &bytes)?)
    }

    /// MIME type declared by the URI
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Base64 payload as it appears in the URI
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Image format matching the declared MIME type, if any
    pub fn image_format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime(&self.mime)
    }

    /// Decodes the base64 payload into raw bytes
    ///
    /// # Errors
    ///
    /// Returns `DataUriError::InvalidPayload` if the payload is not base64.
    pub fn decode_payload(&self) -> Result<Vec<u8>, DataUriError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| DataUriError::InvalidPayload(e.to_string()))
    }

    /// Approximate size of the decoded payload in bytes
    pub fn approx_decoded_len(&self) -> usize {
        self.payload.len() / 4 * 3
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", DATA_PREFIX, self.mime, BASE64_MARKER, self.payload)
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DataUri {
    type Error = DataUriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DataUri> for String {
    fn from(value: DataUri) -> Self {
        value.to_string()
    }
}
