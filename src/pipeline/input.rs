//! Input validation: confirm the caller's image file is something the engines
//! can read before any engine is started.
//!
//! An unreadable input is a caller contract violation, not an engine failure:
//! if it slipped through to the engines every one of them would fail, the
//! fallback chain would report an empty transcription, and the real problem
//! (a bad upload) would be hidden. Checking up front turns it into an
//! immediate [`ExtractError`] that the boundary layer maps to "invalid input".

use crate::config::Language;
use crate::error::ExtractError;
use image::{ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions accepted for homework images.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

/// One extraction call: which image, and which language it is written in.
///
/// The image is owned by the caller; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub image_path: PathBuf,
    pub language: Language,
}

impl ExtractionRequest {
    pub fn new(image_path: impl Into<PathBuf>, language: Language) -> Self {
        Self {
            image_path: image_path.into(),
            language,
        }
    }
}

/// An image file that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
}

/// Validate that `path` is a readable, decodable image within `max_bytes`.
///
/// The whole image is decoded, so a truncated or corrupt body is reported
/// here rather than surfacing later as an empty transcription. CPU bound;
/// async callers run it in `spawn_blocking`.
pub fn validate_image_file(path: &Path, max_bytes: u64) -> Result<ValidatedImage, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ExtractError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: format!(".{extension}"),
        });
    }

    let metadata = std::fs::metadata(path).map_err(|e| io_to_input_error(path, e))?;
    if !metadata.is_file() {
        return Err(ExtractError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let size_bytes = metadata.len();
    if size_bytes == 0 {
        return Err(ExtractError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    if size_bytes > max_bytes {
        return Err(ExtractError::FileTooLarge {
            path: path.to_path_buf(),
            size: size_bytes,
            max: max_bytes,
        });
    }

    let file = File::open(path).map_err(|e| io_to_input_error(path, e))?;
    let reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| unreadable(path, e))?;
    let format = reader
        .format()
        .ok_or_else(|| unreadable(path, "unrecognised image header"))?;
    let decoded = reader.decode().map_err(|e| unreadable(path, e))?;
    let (width, height) = (decoded.width(), decoded.height());

    debug!(
        "Validated {}: {:?} {}x{} px, {} bytes",
        path.display(),
        format,
        width,
        height,
        size_bytes
    );

    Ok(ValidatedImage {
        path: path.to_path_buf(),
        format,
        width,
        height,
        size_bytes,
    })
}

fn io_to_input_error(path: &Path, e: std::io::Error) -> ExtractError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => unreadable(path, e),
    }
}

fn unreadable(path: &Path, detail: impl std::fmt::Display) -> ExtractError {
    ExtractError::UnreadableImage {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}
