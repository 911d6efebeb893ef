//! Single-image extraction entry points.
//!
//! [`Extractor`] owns a configuration and its engine chain. The free
//! functions ([`extract`], [`extract_sync`], [`extract_from_bytes`],
//! [`extract_to_file`]) build one from the process-wide
//! [`EngineCache`](crate::engines::EngineCache), so repeated calls with the
//! same configuration share lazily initialised engine state.
//!
//! Use [`crate::stream::extract_stream`] for many images at once.

use crate::config::{ExtractionConfig, Language};
use crate::engines::{EngineCache, ExtractionEngine};
use crate::error::ExtractError;
use crate::output::{ExtractionOutcome, ExtractionStats};
use crate::pipeline::classify::classify_subject;
use crate::pipeline::coordinator::Coordinator;
use crate::pipeline::input::{validate_image_file, ExtractionRequest};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A configured extraction pipeline: validation → engine chain → classifier.
pub struct Extractor {
    config: ExtractionConfig,
    coordinator: Coordinator,
}

impl Extractor {
    /// Pipeline whose engines come from the process-wide cache, in
    /// `config.engine_priority` order.
    pub fn new(config: ExtractionConfig) -> Self {
        let engines = EngineCache::global().engines_for(&config);
        Self::with_engines(config, engines)
    }

    /// Pipeline over an explicit engine list (highest priority first).
    ///
    /// `config.engine_priority` is ignored; everything else applies.
    pub fn with_engines(config: ExtractionConfig, engines: Vec<Arc<dyn ExtractionEngine>>) -> Self {
        let coordinator = Coordinator::new(
            engines,
            config.min_accept_length,
            config.engine_timeout,
            config.progress_callback.clone(),
        );
        Self {
            config,
            coordinator,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract text and subject from one image.
    ///
    /// # Errors
    /// Only for an invalid input file. Engine failures, timeouts and an
    /// all-empty chain all produce `Ok` (the latter with empty text,
    /// `winning_engine == "none"` and the default subject).
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionOutcome, ExtractError> {
        let total_start = Instant::now();
        info!(
            "Starting extraction: {} ({})",
            request.image_path.display(),
            request.language
        );

        // ── Step 1: Validate input ───────────────────────────────────────────
        let path = request.image_path.clone();
        let max_bytes = self.config.max_file_bytes;
        let image = tokio::task::spawn_blocking(move || validate_image_file(&path, max_bytes))
            .await
            .map_err(|e| ExtractError::Internal(format!("validation task: {e}")))??;
        debug!(
            "Input {:?} {}x{}, engines: {:?}",
            image.format,
            image.width,
            image.height,
            self.coordinator.engine_names()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(&request.image_path);
        }

        // ── Step 2: Fallback chain ───────────────────────────────────────────
        let outcome = self.coordinator.run(request).await;

        // ── Step 3: Classify ─────────────────────────────────────────────────
        let text = outcome.text().to_string();
        let subject = classify_subject(&text);

        let winning_engine = outcome
            .winner
            .as_ref()
            .map(|w| w.engine_name.clone())
            .unwrap_or_else(|| ExtractionOutcome::NO_WINNER.to_string());

        let stats = ExtractionStats {
            engines_invoked: outcome
                .attempts
                .iter()
                .map(|a| a.engine_name.clone())
                .collect(),
            failed_engines: outcome.attempts.iter().filter(|a| !a.succeeded).count(),
            winner_duration_ms: outcome.winner.as_ref().map(|w| w.duration_ms).unwrap_or(0),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        let chars = text.chars().count();
        info!(
            "Extraction complete: {} chars from {}, subject {}, {}ms total",
            chars, winning_engine, subject, stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_complete(&winning_engine, chars);
        }

        Ok(ExtractionOutcome {
            text,
            winning_engine,
            subject,
            language: request.language,
            stats,
        })
    }

    /// Extract from in-memory image bytes.
    ///
    /// `extension` (e.g. `"jpg"` or `".png"`) is required because validation
    /// checks it. The bytes are written to a managed [`tempfile`] that is
    /// removed on return.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        extension: &str,
        language: Language,
    ) -> Result<ExtractionOutcome, ExtractError> {
        let suffix = format!(".{}", extension.trim_start_matches('.'));
        let mut tmp = tempfile::Builder::new()
            .prefix("hwocr-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
        tmp.flush()
            .map_err(|e| ExtractError::Internal(format!("tempfile flush: {e}")))?;

        let request = ExtractionRequest::new(tmp.path(), language);
        // `tmp` is dropped (and the file deleted) when this returns
        self.extract(&request).await
    }

    /// Extract and write the text to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) so readers never see a partial
    /// file.
    pub async fn extract_to_file(
        &self,
        request: &ExtractionRequest,
        output_path: &Path,
    ) -> Result<ExtractionOutcome, ExtractError> {
        let outcome = self.extract(request).await?;
        write_atomic(output_path, &outcome.text).await?;
        Ok(outcome)
    }
}

/// Extract text and subject from the image at `image_path`.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use homework_ocr::{extract, ExtractionConfig, Language};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let outcome = extract("worksheet.jpg", Language::Tamil, &config).await?;
/// println!("[{}] {}", outcome.subject, outcome.text);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    image_path: impl AsRef<Path>,
    language: Language,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractError> {
    let request = ExtractionRequest::new(image_path.as_ref(), language);
    Extractor::new(config.clone()).extract(&request).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally; do not call from inside an
/// async context.
pub fn extract_sync(
    image_path: impl AsRef<Path>,
    language: Language,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(image_path, language, config))
}

/// Extract from image bytes in memory. See [`Extractor::extract_bytes`].
pub async fn extract_from_bytes(
    bytes: &[u8],
    extension: &str,
    language: Language,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractError> {
    Extractor::new(config.clone())
        .extract_bytes(bytes, extension, language)
        .await
}

/// Extract and write the text to `output_path`. See [`Extractor::extract_to_file`].
pub async fn extract_to_file(
    image_path: impl AsRef<Path>,
    language: Language,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, ExtractError> {
    let request = ExtractionRequest::new(image_path.as_ref(), language);
    Extractor::new(config.clone())
        .extract_to_file(&request, output_path.as_ref())
        .await
}

async fn write_atomic(path: &Path, contents: &str) -> Result<(), ExtractError> {
    let write_err = |e| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
