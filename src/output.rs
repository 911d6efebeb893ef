//! Result types produced by an extraction run.

use crate::config::Language;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse topical label assigned to the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Science,
    /// Catch-all when no keyword matches.
    #[default]
    Language,
}

impl Subject {
    /// Fixed iteration order; also the tie-break order of the classifier.
    pub const ALL: [Subject; 3] = [Subject::Math, Subject::Science, Subject::Language];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Science => "science",
            Subject::Language => "language",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one engine invocation.
///
/// Produced fresh per run and discarded once the coordinator has picked a
/// winner; only the winner's text reaches the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    pub engine_name: String,
    /// Cleaned text, possibly empty.
    pub text: String,
    /// False when the engine errored or timed out.
    pub succeeded: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
}

impl EngineResult {
    pub fn success(engine_name: impl Into<String>, text: String, duration_ms: u64) -> Self {
        Self {
            engine_name: engine_name.into(),
            text,
            succeeded: true,
            duration_ms,
            error: None,
        }
    }

    pub fn failure(engine_name: impl Into<String>, error: EngineError, duration_ms: u64) -> Self {
        Self {
            engine_name: engine_name.into(),
            text: String::new(),
            succeeded: false,
            duration_ms,
            error: Some(error),
        }
    }

    /// Length used for the acceptance gate and the longest-wins fallback.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Timing and bookkeeping for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Engines actually run, in order.
    pub engines_invoked: Vec<String>,
    /// Engines that errored or timed out.
    pub failed_engines: usize,
    pub winner_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The externally visible result of [`crate::extract::extract`].
///
/// `text` is always present (possibly empty) and `subject` is always one of
/// the three labels, even when every engine failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub text: String,
    /// Engine whose text was kept, or [`ExtractionOutcome::NO_WINNER`].
    pub winning_engine: String,
    pub subject: Subject,
    pub language: Language,
    pub stats: ExtractionStats,
}

impl ExtractionOutcome {
    /// `winning_engine` value when no engine produced any text.
    pub const NO_WINNER: &'static str = "none";

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
