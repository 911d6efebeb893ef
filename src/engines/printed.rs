//! Printed-text engine: tesseract run under four page-segmentation modes.
//!
//! No single segmentation assumption works for homework photos: a worksheet
//! is one uniform block, a page of scattered answers is sparse text, a
//! photographed single sum is one line. The engine runs all four and keeps
//! the longest result:
//!
//! | # | mode | `--psm` | image |
//! |---|---|---|---|
//! | 1 | uniform block | 6 | preprocessed (binarised + denoised) |
//! | 2 | fully automatic | 3 | grayscale |
//! | 3 | sparse text | 11 | grayscale |
//! | 4 | single line | 7 | grayscale |
//!
//! Each sub-attempt is an independent `Result`; a failing one contributes no
//! candidate and the others still run.

use super::ExtractionEngine;
use crate::config::{EngineKind, ExtractionConfig, LanguageCodeMap};
use crate::error::EngineError;
use crate::pipeline::input::ExtractionRequest;
use crate::pipeline::postprocess::clean_text;
use crate::pipeline::preprocess::prepare_for_ocr;
use async_trait::async_trait;
use image::ImageFormat;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

const NAME: &str = "printed-text";

/// Tesseract page-segmentation assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationMode {
    UniformBlock,
    Auto,
    SparseText,
    SingleLine,
}

impl SegmentationMode {
    /// Tesseract `--psm` value.
    pub fn psm(self) -> u8 {
        match self {
            SegmentationMode::UniformBlock => 6,
            SegmentationMode::Auto => 3,
            SegmentationMode::SparseText => 11,
            SegmentationMode::SingleLine => 7,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SegmentationMode::UniformBlock => "uniform-block",
            SegmentationMode::Auto => "auto",
            SegmentationMode::SparseText => "sparse-text",
            SegmentationMode::SingleLine => "single-line",
        }
    }
}

/// Which rendition of the page a sub-attempt reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVariant {
    Preprocessed,
    Grayscale,
}

/// Sub-attempts in run order. Ties in length keep the earlier entry.
pub const SUB_ATTEMPTS: [(SegmentationMode, ImageVariant); 4] = [
    (SegmentationMode::UniformBlock, ImageVariant::Preprocessed),
    (SegmentationMode::Auto, ImageVariant::Grayscale),
    (SegmentationMode::SparseText, ImageVariant::Grayscale),
    (SegmentationMode::SingleLine, ImageVariant::Grayscale),
];

/// Runs one classical OCR pass over an image file.
#[async_trait]
pub trait SegmentationRunner: Send + Sync {
    async fn recognize(
        &self,
        image: &Path,
        language_code: &str,
        mode: SegmentationMode,
    ) -> Result<String, EngineError>;
}

/// [`SegmentationRunner`] that shells out to the `tesseract` executable.
///
/// Every pass is its own process, so concurrent requests need no lock.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>, tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tessdata_dir,
        }
    }

    fn args(&self, image: &Path, language_code: &str, mode: SegmentationMode) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            image.as_os_str().to_owned(),
            "stdout".into(),
            "-l".into(),
            language_code.into(),
            "--oem".into(),
            "3".into(),
            "--psm".into(),
            mode.psm().to_string().into(),
        ];
        if let Some(ref dir) = self.tessdata_dir {
            args.push("--tessdata-dir".into());
            args.push(dir.as_os_str().to_owned());
        }
        args
    }
}

#[async_trait]
impl SegmentationRunner for TesseractCli {
    async fn recognize(
        &self,
        image: &Path,
        language_code: &str,
        mode: SegmentationMode,
    ) -> Result<String, EngineError> {
        let output = Command::new(&self.program)
            .args(self.args(image, language_code, mode))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    EngineError::Unavailable {
                        engine: NAME.to_string(),
                        detail: format!("cannot run '{}': {e}", self.program.display()),
                    }
                }
                _ => EngineError::inference(NAME, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::inference(
                NAME,
                format!("psm {} exited with {}: {}", mode.psm(), output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Outcome of one segmentation pass.
#[derive(Debug, Clone)]
pub struct SubAttempt {
    pub mode: SegmentationMode,
    pub outcome: Result<String, EngineError>,
}

impl SubAttempt {
    fn char_len(&self) -> usize {
        self.outcome.as_ref().map(|t| t.chars().count()).unwrap_or(0)
    }
}

/// Longest non-empty successful sub-attempt; the earliest wins on ties.
pub fn select_longest(attempts: &[SubAttempt]) -> Option<&SubAttempt> {
    let mut best: Option<&SubAttempt> = None;
    for attempt in attempts {
        let len = attempt.char_len();
        if len == 0 {
            continue;
        }
        if best.is_none_or(|b| len > b.char_len()) {
            best = Some(attempt);
        }
    }
    best
}

/// Multi-mode classical OCR engine.
pub struct PrintedTextEngine {
    runner: Arc<dyn SegmentationRunner>,
    max_dimension: u32,
    language_codes: LanguageCodeMap,
}

impl PrintedTextEngine {
    /// Engine backed by the `tesseract` executable named in `config`.
    pub fn new(config: &ExtractionConfig) -> Self {
        let runner = TesseractCli::new(config.tesseract_path.clone(), config.tessdata_dir.clone());
        Self::with_runner(config, Arc::new(runner))
    }

    /// Engine backed by a custom runner.
    pub fn with_runner(config: &ExtractionConfig, runner: Arc<dyn SegmentationRunner>) -> Self {
        Self {
            runner,
            max_dimension: config.max_image_dimension,
            language_codes: config.language_codes.clone(),
        }
    }

    /// Run every sub-attempt and return them in run order.
    pub async fn run_sub_attempts(
        &self,
        request: &ExtractionRequest,
    ) -> Result<Vec<SubAttempt>, EngineError> {
        let workdir = tempfile::Builder::new()
            .prefix("hwocr-")
            .tempdir()
            .map_err(|e| EngineError::inference(NAME, format!("temp dir: {e}")))?;
        let preprocessed_path = workdir.path().join("preprocessed.png");
        let grayscale_path = workdir.path().join("grayscale.png");

        // Decode, condition and write both renditions off the async runtime.
        let source = request.image_path.clone();
        let max_dimension = self.max_dimension;
        let (pre_out, gray_out) = (preprocessed_path.clone(), grayscale_path.clone());
        let start = Instant::now();
        tokio::task::spawn_blocking(move || -> Result<(), String> {
            let prepared = prepare_for_ocr(&source, max_dimension).map_err(|e| e.to_string())?;
            prepared
                .binarized
                .save_with_format(&pre_out, ImageFormat::Png)
                .map_err(|e| e.to_string())?;
            prepared
                .grayscale
                .save_with_format(&gray_out, ImageFormat::Png)
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| EngineError::inference(NAME, format!("preprocess task: {e}")))?
        .map_err(|e| EngineError::inference(NAME, format!("preprocess: {e}")))?;
        debug!("{}: preprocessing took {}ms", NAME, start.elapsed().as_millis());

        let language_code = self
            .language_codes
            .code_for(EngineKind::PrintedText, request.language);

        let mut attempts = Vec::with_capacity(SUB_ATTEMPTS.len());
        for (mode, variant) in SUB_ATTEMPTS {
            let image = match variant {
                ImageVariant::Preprocessed => &preprocessed_path,
                ImageVariant::Grayscale => &grayscale_path,
            };
            let outcome = self
                .runner
                .recognize(image, language_code, mode)
                .await
                .map(|raw| clean_text(&raw));
            match &outcome {
                Ok(text) => debug!("{}: {} → {} chars", NAME, mode.name(), text.chars().count()),
                Err(e) => debug!("{}: {} failed: {}", NAME, mode.name(), e),
            }
            attempts.push(SubAttempt { mode, outcome });
        }

        Ok(attempts)
    }
}

#[async_trait]
impl ExtractionEngine for PrintedTextEngine {
    fn name(&self) -> &str {
        NAME
    }

    /// Longest candidate; empty when every sub-attempt came back empty. When
    /// every sub-attempt *failed*, the first failure is returned so the cause
    /// (typically a missing binary or traineddata) reaches the logs.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, EngineError> {
        let attempts = self.run_sub_attempts(request).await?;

        if let Some(best) = select_longest(&attempts) {
            debug!("{}: best sub-attempt is {}", NAME, best.mode.name());
            return best.outcome.clone();
        }

        if attempts.iter().all(|a| a.outcome.is_err()) {
            if let Some(Err(first)) = attempts.first().map(|a| &a.outcome) {
                return Err(first.clone());
            }
        }

        Ok(String::new())
    }
}
