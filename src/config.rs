//! Configuration types for homework-page extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across tasks, log them, and diff two runs to
//! understand why their transcriptions differ.
//!
//! The subset of knobs that operators tune without recompiling (acceptance
//! threshold, engine order, per-engine language codes) is also available as
//! the serialisable [`TuningConfig`], which can be loaded from JSON and applied
//! to a builder.

use crate::error::ExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a homework-page extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use homework_ocr::{EngineKind, ExtractionConfig};
///
/// let config = ExtractionConfig::builder()
///     .min_accept_length(12)
///     .engine_priority(vec![EngineKind::Handwriting, EngineKind::PrintedText])
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Minimum number of characters (Unicode scalar values, after cleanup)
    /// an engine must return for the chain to stop. Default: 10.
    ///
    /// Below this the output is usually a stray mark or a page number, so the
    /// next engine gets its turn.
    pub min_accept_length: usize,

    /// Engines to try, highest priority first. Default: math, handwriting,
    /// printed-text.
    pub engine_priority: Vec<EngineKind>,

    /// Per-engine language codes for each supported input language.
    pub language_codes: LanguageCodeMap,

    /// Upper bound on a single engine run. Default: 120 s.
    ///
    /// Expiry is treated exactly like the engine returning empty text.
    pub engine_timeout: Duration,

    /// Longest edge, in pixels, of the image fed to the classical engine.
    /// Default: 2000.
    ///
    /// Phone photos routinely arrive at 4000 × 3000 px; non-local-means
    /// denoising is quadratic in the search window per pixel, so the image is
    /// scaled down first.
    pub max_image_dimension: u32,

    /// Largest accepted input file in bytes. Default: 10 MiB.
    pub max_file_bytes: u64,

    /// Number of images processed at once by [`crate::stream::extract_stream`].
    /// Default: 4. Engines within one image always run sequentially.
    pub concurrency: usize,

    // ── Math / mixed-content engine (vision LLM) ──────────────────────────
    /// Pre-constructed LLM provider. Takes precedence over `math_provider_name`.
    pub math_provider: Option<Arc<dyn LLMProvider>>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None, the provider is auto-detected from the environment.
    pub math_provider_name: Option<String>,

    /// Vision model identifier. If None, uses `gpt-4.1-nano`.
    pub math_model: Option<String>,

    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,

    /// Maximum tokens the model may generate for one page. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed vision call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt for the math engine. If None, uses the built-in one.
    pub math_system_prompt: Option<String>,

    // ── Handwriting engine (local Ollama vision model) ────────────────────
    /// Base URL of the Ollama server. Default: `http://localhost:11434`.
    pub ollama_url: String,

    /// Ollama vision model. Default: `llama3.2-vision`.
    pub handwriting_model: String,

    // ── Printed-text engine (tesseract) ───────────────────────────────────
    /// Tesseract executable. Default: `tesseract` (resolved through `PATH`).
    pub tesseract_path: PathBuf,

    /// Directory holding `*.traineddata`. If None, tesseract's own default.
    pub tessdata_dir: Option<PathBuf>,

    /// Optional observer for per-engine progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_accept_length: 10,
            engine_priority: EngineKind::DEFAULT_PRIORITY.to_vec(),
            language_codes: LanguageCodeMap::default(),
            engine_timeout: Duration::from_secs(120),
            max_image_dimension: 2000,
            max_file_bytes: 10 * 1024 * 1024,
            concurrency: 4,
            math_provider: None,
            math_provider_name: None,
            math_model: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            math_system_prompt: None,
            ollama_url: "http://localhost:11434".to_string(),
            handwriting_model: "llama3.2-vision".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            tessdata_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("min_accept_length", &self.min_accept_length)
            .field("engine_priority", &self.engine_priority)
            .field("engine_timeout", &self.engine_timeout)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("concurrency", &self.concurrency)
            .field(
                "math_provider",
                &self.math_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("math_provider_name", &self.math_provider_name)
            .field("math_model", &self.math_model)
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("ollama_url", &self.ollama_url)
            .field("handwriting_model", &self.handwriting_model)
            .field("tesseract_path", &self.tesseract_path)
            .field("tessdata_dir", &self.tessdata_dir)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Snapshot of the tunable subset of this configuration.
    pub fn tuning(&self) -> TuningConfig {
        TuningConfig {
            min_accept_length: self.min_accept_length,
            engine_priority_order: self.engine_priority.clone(),
            language_code_map: self.language_codes.clone(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn min_accept_length(mut self, n: usize) -> Self {
        self.config.min_accept_length = n;
        self
    }

    pub fn engine_priority(mut self, order: Vec<EngineKind>) -> Self {
        self.config.engine_priority = order;
        self
    }

    pub fn language_codes(mut self, codes: LanguageCodeMap) -> Self {
        self.config.language_codes = codes;
        self
    }

    /// Apply an externally supplied [`TuningConfig`] on top of the current values.
    pub fn tuning(mut self, tuning: TuningConfig) -> Self {
        self.config.min_accept_length = tuning.min_accept_length;
        self.config.engine_priority = tuning.engine_priority_order;
        self.config.language_codes = tuning.language_code_map;
        self
    }

    pub fn engine_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine_timeout = timeout;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(100);
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn math_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.math_provider = Some(provider);
        self
    }

    pub fn math_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.math_provider_name = Some(name.into());
        self
    }

    pub fn math_model(mut self, model: impl Into<String>) -> Self {
        self.config.math_model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn math_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.math_system_prompt = Some(prompt.into());
        self
    }

    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.config.ollama_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn handwriting_model(mut self, model: impl Into<String>) -> Self {
        self.config.handwriting_model = model.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tessdata_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.engine_priority.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "engine priority order must name at least one engine".into(),
            ));
        }
        for (i, kind) in c.engine_priority.iter().enumerate() {
            if c.engine_priority[..i].contains(kind) {
                return Err(ExtractError::InvalidConfig(format!(
                    "engine '{}' appears more than once in the priority order",
                    kind.name()
                )));
            }
        }
        if c.engine_timeout.is_zero() {
            return Err(ExtractError::InvalidConfig(
                "engine timeout must be greater than zero".into(),
            ));
        }
        if c.max_file_bytes == 0 {
            return Err(ExtractError::InvalidConfig(
                "max file size must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Tuning surface ───────────────────────────────────────────────────────

/// Operator-tunable extraction constants.
///
/// ```json
/// {
///   "min_accept_length": 10,
///   "engine_priority_order": ["math", "handwriting", "printed-text"],
///   "language_code_map": { "printed-text": { "ta": "tam+eng" } }
/// }
/// ```
///
/// Missing fields fall back to the defaults; a partial `language_code_map`
/// only overrides the entries it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub min_accept_length: usize,
    pub engine_priority_order: Vec<EngineKind>,
    pub language_code_map: LanguageCodeMap,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let config = ExtractionConfig::default();
        Self {
            min_accept_length: config.min_accept_length,
            engine_priority_order: config.engine_priority,
            language_code_map: config.language_codes,
        }
    }
}

impl TuningConfig {
    /// Parse a tuning document from JSON.
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        serde_json::from_str(json)
            .map_err(|e| ExtractError::InvalidConfig(format!("tuning JSON: {e}")))
    }

    /// Read and parse a tuning document from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ExtractError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Source language of the homework page.
///
/// The closed set mirrors the scripts the engines are provisioned for:
/// Latin (English), Tamil and Devanagari (Hindi).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "hi")]
    Hindi,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Tamil, Language::Hindi];

    /// Two-letter code used on the external interface.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Tamil => "ta",
            Language::Hindi => "hi",
        }
    }

    /// Human-readable language name.
    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Tamil => "Tamil",
            Language::Hindi => "Hindi",
        }
    }

    /// Tesseract traineddata code.
    pub fn tesseract_code(self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Tamil => "tam",
            Language::Hindi => "hin",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "eng" | "english" => Ok(Language::English),
            "ta" | "tam" | "tamil" => Ok(Language::Tamil),
            "hi" | "hin" | "hindi" => Ok(Language::Hindi),
            other => Err(ExtractError::InvalidConfig(format!(
                "unsupported language '{other}' (expected en, ta or hi)"
            ))),
        }
    }
}

/// Identity of an extraction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Vision LLM tuned for prose mixed with equations; emits LaTeX for formulas.
    #[serde(rename = "math")]
    Math,
    /// General-purpose vision model for free-form handwritten strokes.
    #[serde(rename = "handwriting")]
    Handwriting,
    /// Classical OCR run under several page-segmentation modes.
    #[serde(rename = "printed-text")]
    PrintedText,
}

impl EngineKind {
    pub const DEFAULT_PRIORITY: [EngineKind; 3] = [
        EngineKind::Math,
        EngineKind::Handwriting,
        EngineKind::PrintedText,
    ];

    /// Stable identifier reported as `winning_engine`.
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Math => "math",
            EngineKind::Handwriting => "handwriting",
            EngineKind::PrintedText => "printed-text",
        }
    }

    fn default_code(self, language: Language) -> &'static str {
        match self {
            EngineKind::Math | EngineKind::Handwriting => language.name(),
            EngineKind::PrintedText => language.tesseract_code(),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "math" => Ok(EngineKind::Math),
            "handwriting" => Ok(EngineKind::Handwriting),
            "printed-text" | "printed" | "tesseract" => Ok(EngineKind::PrintedText),
            other => Err(ExtractError::InvalidConfig(format!(
                "unknown engine '{other}' (expected math, handwriting or printed-text)"
            ))),
        }
    }
}

/// Maps each supported language to the code each engine expects.
///
/// Vision engines take a language *name* that is spliced into the prompt;
/// tesseract takes a traineddata code such as `tam` or `hin+eng`. Lookups for
/// entries that are not overridden fall back to these built-in codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCodeMap {
    overrides: BTreeMap<EngineKind, BTreeMap<Language, String>>,
}

impl LanguageCodeMap {
    /// Override the code `engine` uses for `language`.
    pub fn with_code(mut self, engine: EngineKind, language: Language, code: impl Into<String>) -> Self {
        self.overrides
            .entry(engine)
            .or_default()
            .insert(language, code.into());
        self
    }

    /// Resolve the code `engine` should use for `language`.
    pub fn code_for(&self, engine: EngineKind, language: Language) -> &str {
        self.overrides
            .get(&engine)
            .and_then(|codes| codes.get(&language))
            .map(String::as_str)
            .unwrap_or_else(|| engine.default_code(language))
    }
}
