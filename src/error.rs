//! Error types for the homework-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — **Fatal**: the extraction cannot proceed at all
//!   (missing or unreadable image, unsupported file type, bad configuration).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!   Every input-file variant is a caller contract violation and should map to
//!   an "invalid input" response at the boundary layer, see
//!   [`ExtractError::is_client_error`].
//!
//! * [`EngineError`] — **Non-fatal**: a single engine failed (model error,
//!   missing binary, timeout) but the fallback chain continues. It is logged
//!   and recorded on the failed [`crate::output::EngineResult`], never
//!   propagated to the caller.
//!
//! A run in which every engine comes back empty is not an error at all: the
//! caller receives an empty transcription with the default subject.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the homework-ocr library.
///
/// Engine-level failures use [`EngineError`] and are absorbed by the
/// fallback coordinator rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The path exists but points at a directory or special file.
    #[error("'{path}' is not a regular file")]
    NotAFile { path: PathBuf },

    /// The file exists but contains no bytes.
    #[error("Image file '{path}' is empty")]
    EmptyFile { path: PathBuf },

    /// The file is larger than the configured upload limit.
    #[error("Image file '{path}' is too large: {size} bytes (maximum {max} bytes)")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    /// The file extension is not one of the accepted image types.
    #[error("File type '{extension}' not allowed for '{path}'. Allowed types: .jpg, .jpeg, .png, .bmp, .tiff, .tif")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The file has an accepted extension but could not be decoded.
    #[error("Could not read image '{path}': {detail}")]
    UnreadableImage { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// True when the error stems from the caller's input file rather than
    /// from this library or its configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExtractError::FileNotFound { .. }
                | ExtractError::PermissionDenied { .. }
                | ExtractError::NotAFile { .. }
                | ExtractError::EmptyFile { .. }
                | ExtractError::FileTooLarge { .. }
                | ExtractError::UnsupportedFormat { .. }
                | ExtractError::UnreadableImage { .. }
        )
    }
}

/// A non-fatal error for a single engine run.
///
/// Stored alongside a failed [`crate::output::EngineResult`]. The
/// coordinator moves on to the next engine whatever the variant.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    /// The backing engine is not installed or not reachable.
    #[error("{engine}: engine unavailable: {detail}")]
    Unavailable { engine: String, detail: String },

    /// Lazy initialisation of the engine failed; it will be retried on the
    /// next request.
    #[error("{engine}: initialisation failed: {detail}")]
    Init { engine: String, detail: String },

    /// The engine ran but reported an error.
    #[error("{engine}: inference failed: {detail}")]
    Inference { engine: String, detail: String },

    /// The engine did not answer within the per-engine timeout.
    #[error("{engine}: timed out after {millis}ms")]
    Timeout { engine: String, millis: u64 },
}

impl EngineError {
    pub(crate) fn inference(engine: &str, detail: impl std::fmt::Display) -> Self {
        EngineError::Inference {
            engine: engine.to_string(),
            detail: detail.to_string(),
        }
    }
}
