//! # homework-ocr
//!
//! Turn a photographed or scanned homework page into a best-effort plain-text
//! transcription and a coarse subject label (math / science / language).
//!
//! ## Why several engines?
//!
//! No single recogniser handles every page a student photographs: vision
//! LLMs read equations and mixed content well but fail on some scripts, local
//! handwriting models read scrawl but mangle formulae, and classical OCR is
//! robust on printed worksheets but nearly blind to handwriting. This crate
//! chains them behind a length gate and keeps the first good answer, or the
//! longest one if none is good enough.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image + language
//!  │
//!  ├─ 1. Validate   extension, size, decodable header (caller errors stop here)
//!  ├─ 2. Engines    in priority order, each behind a timeout:
//!  │                  math         vision LLM, LaTeX for formulae
//!  │                  handwriting  local Ollama vision model
//!  │                  printed-text tesseract × 4 segmentation modes
//!  │                                (preprocessed + grayscale renditions)
//!  ├─ 3. Gate       first result ≥ 10 chars wins, else the longest
//!  └─ 4. Classify   keyword scoring (English, Tamil, Hindi)
//! ```
//!
//! Engine failures never reach the caller: a page no engine can read yields
//! empty text with the default `language` subject.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use homework_ocr::{extract, ExtractionConfig, Language};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::default();
//!     let outcome = extract("worksheet.jpg", Language::English, &config).await?;
//!     println!("{} ({}, via {})", outcome.text, outcome.subject, outcome.winning_engine);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `hwocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! homework-ocr = { version = "0.3", default-features = false }
//! ```
//!
//! ## External Engines
//!
//! | Engine | Needs |
//! |--------|-------|
//! | `math` | an `edgequake-llm` provider key, e.g. `OPENAI_API_KEY` |
//! | `handwriting` | a running Ollama with a vision model (`ollama pull llama3.2-vision`) |
//! | `printed-text` | `tesseract` with `eng`, `tam` and `hin` traineddata |
//!
//! Any of them may be missing; the chain simply skips to the next engine.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod engines;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    EngineKind, ExtractionConfig, ExtractionConfigBuilder, Language, LanguageCodeMap, TuningConfig,
};
pub use engines::{EngineCache, ExtractionEngine};
pub use error::{EngineError, ExtractError};
pub use extract::{extract, extract_from_bytes, extract_sync, extract_to_file, Extractor};
pub use output::{EngineResult, ExtractionOutcome, ExtractionStats, Subject};
pub use pipeline::classify::classify_subject;
pub use pipeline::input::ExtractionRequest;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{extract_stream, ExtractionStream};
