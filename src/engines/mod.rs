//! Extraction engines and the process-wide engine cache.
//!
//! Every engine exposes the same single capability,
//! `extract(image, language) -> raw text`, through [`ExtractionEngine`]. The
//! coordinator only ever sees `Arc<dyn ExtractionEngine>`, so engines can be
//! reordered, swapped, or replaced by stubs in tests.
//!
//! | engine | backend | good at |
//! |---|---|---|
//! | [`MathEngine`] | vision LLM via `edgequake-llm` | prose mixed with equations (LaTeX output) |
//! | [`HandwritingEngine`] | local Ollama vision model | free-form handwriting |
//! | [`PrintedTextEngine`] | `tesseract`, four segmentation modes | printed multilingual text |
//!
//! ## Lifecycle
//!
//! Engines are cheap to construct; their expensive state (provider, HTTP
//! client, loaded model) is built on the first `extract` call and kept. The
//! [`EngineCache`] makes sure each distinct engine configuration is
//! constructed once per process, so that lazily built state is shared by all
//! requests.

pub mod handwriting;
pub mod math;
pub mod printed;

pub use handwriting::HandwritingEngine;
pub use math::MathEngine;
pub use printed::{PrintedTextEngine, SegmentationMode, SegmentationRunner, TesseractCli};

use crate::config::{EngineKind, ExtractionConfig};
use crate::error::EngineError;
use crate::pipeline::input::ExtractionRequest;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One text-recognition strategy.
///
/// Implementations return the engine's raw output; cleanup and length gating
/// happen in the coordinator. An `Err` is never fatal: the coordinator logs
/// it and treats the engine as having produced no text.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Stable identifier, reported as `winning_engine`.
    fn name(&self) -> &str;

    async fn extract(&self, request: &ExtractionRequest) -> Result<String, EngineError>;
}

/// Construct a fresh engine of `kind` from `config`.
pub fn build_engine(kind: EngineKind, config: &ExtractionConfig) -> Arc<dyn ExtractionEngine> {
    match kind {
        EngineKind::Math => Arc::new(MathEngine::new(config)),
        EngineKind::Handwriting => Arc::new(HandwritingEngine::new(config)),
        EngineKind::PrintedText => Arc::new(PrintedTextEngine::new(config)),
    }
}

type EngineKey = (EngineKind, String);

static GLOBAL_CACHE: Lazy<EngineCache> = Lazy::new(EngineCache::new);

/// Default number of engine configurations kept by an [`EngineCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Default)]
struct CacheEntries {
    engines: HashMap<EngineKey, Arc<dyn ExtractionEngine>>,
    /// Keys in insertion order; the front is evicted first.
    order: VecDeque<EngineKey>,
}

/// Engines keyed by kind and by the configuration values they depend on.
///
/// Two requests with equal engine settings share one engine instance (and
/// with it one provider, one HTTP client, one loaded model). Changing any
/// setting an engine reads yields a separate entry. At most `capacity`
/// entries are kept; the oldest is dropped to make room.
///
/// A math engine over a caller-supplied provider is never cached: the caller
/// already owns the expensive state, and keying on the provider's allocation
/// would add an entry per `Arc`.
pub struct EngineCache {
    entries: Mutex<CacheEntries>,
    capacity: usize,
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl EngineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(CacheEntries::default()),
            capacity: capacity.max(1),
        }
    }

    /// The process-wide cache used by [`crate::extract::extract`].
    pub fn global() -> &'static EngineCache {
        &GLOBAL_CACHE
    }

    /// Return the cached engine for `kind` under `config`, building it on
    /// first use.
    pub fn get_or_build(&self, kind: EngineKind, config: &ExtractionConfig) -> Arc<dyn ExtractionEngine> {
        if kind == EngineKind::Math && config.math_provider.is_some() {
            return build_engine(kind, config);
        }

        let key = (kind, fingerprint(kind, config));
        // Only this method and `clear` touch the entries, and neither can
        // panic while holding the lock, so a poisoned lock is still consistent.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(engine) = entries.engines.get(&key) {
            return Arc::clone(engine);
        }

        while entries.engines.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            debug!("Evicting {} engine", oldest.0);
            entries.engines.remove(&oldest);
        }

        debug!("Constructing {} engine", kind);
        let engine = build_engine(kind, config);
        entries.order.push_back(key.clone());
        entries.engines.insert(key, Arc::clone(&engine));
        engine
    }

    /// Engines for `config.engine_priority`, in priority order.
    pub fn engines_for(&self, config: &ExtractionConfig) -> Vec<Arc<dyn ExtractionEngine>> {
        config
            .engine_priority
            .iter()
            .map(|&kind| self.get_or_build(kind, config))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .engines
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached engine (and its lazily built state).
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.engines.clear();
        entries.order.clear();
    }
}

/// The configuration values an engine of `kind` depends on.
fn fingerprint(kind: EngineKind, config: &ExtractionConfig) -> String {
    let codes: Vec<&str> = crate::config::Language::ALL
        .iter()
        .map(|&lang| config.language_codes.code_for(kind, lang))
        .collect();
    let codes = codes.join(",");

    match kind {
        EngineKind::Math => {
            let provider = format!(
                "{}/{}",
                config.math_provider_name.as_deref().unwrap_or("auto"),
                config.math_model.as_deref().unwrap_or(crate::pipeline::llm::DEFAULT_VISION_MODEL)
            );
            format!(
                "{provider}|t={}|max={}|r={}|b={}|p={:?}|d={}|{codes}",
                config.temperature,
                config.max_tokens,
                config.max_retries,
                config.retry_backoff_ms,
                config.math_system_prompt,
                config.max_image_dimension,
            )
        }
        EngineKind::Handwriting => format!(
            "{}|{}|{:?}|d={}|{codes}",
            config.ollama_url, config.handwriting_model, config.engine_timeout, config.max_image_dimension
        ),
        EngineKind::PrintedText => format!(
            "{}|{:?}|d={}|{codes}",
            config.tesseract_path.display(),
            config.tessdata_dir,
            config.max_image_dimension
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;

    #[test]
    fn build_engine_names() {
        let config = ExtractionConfig::default();
        assert_eq!(build_engine(EngineKind::Math, &config).name(), "math");
        assert_eq!(build_engine(EngineKind::Handwriting, &config).name(), "handwriting");
        assert_eq!(build_engine(EngineKind::PrintedText, &config).name(), "printed-text");
    }

    #[test]
    fn cache_reuses_engine_for_equal_config() {
        let cache = EngineCache::new();
        let config = ExtractionConfig::default();
        let a = cache.get_or_build(EngineKind::Handwriting, &config);
        let b = cache.get_or_build(EngineKind::Handwriting, &config.clone());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_separates_different_settings() {
        let cache = EngineCache::new();
        let a = cache.get_or_build(EngineKind::Handwriting, &ExtractionConfig::default());
        let other = ExtractionConfig::builder()
            .ollama_url("http://gpu-box:11434")
            .build()
            .unwrap();
        let b = cache.get_or_build(EngineKind::Handwriting, &other);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn language_code_override_changes_fingerprint() {
        let base = ExtractionConfig::default();
        let tuned = ExtractionConfig::builder()
            .language_codes(
                crate::config::LanguageCodeMap::default().with_code(
                    EngineKind::PrintedText,
                    Language::Tamil,
                    "tam+eng",
                ),
            )
            .build()
            .unwrap();
        assert_ne!(
            fingerprint(EngineKind::PrintedText, &base),
            fingerprint(EngineKind::PrintedText, &tuned)
        );
        // Other engines are unaffected by a tesseract-only override.
        assert_eq!(
            fingerprint(EngineKind::Math, &base),
            fingerprint(EngineKind::Math, &tuned)
        );
    }

    #[test]
    fn engines_for_follows_priority_order() {
        let cache = EngineCache::new();
        let config = ExtractionConfig::builder()
            .engine_priority(vec![EngineKind::PrintedText, EngineKind::Math])
            .build()
            .unwrap();
        let names: Vec<String> = cache
            .engines_for(&config)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["printed-text", "math"]);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn caller_supplied_providers_do_not_grow_the_cache() {
        let cache = EngineCache::new();
        for _ in 0..5 {
            let config = ExtractionConfig::builder()
                .math_provider(Arc::new(edgequake_llm::MockProvider::new()))
                .build()
                .unwrap();
            let engine = cache.get_or_build(EngineKind::Math, &config);
            assert_eq!(engine.name(), "math");
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_evicts_oldest_configuration_at_capacity() {
        let cache = EngineCache::with_capacity(2);
        let config_for = |port: u16| {
            ExtractionConfig::builder()
                .ollama_url(format!("http://127.0.0.1:{port}"))
                .build()
                .unwrap()
        };

        let first = cache.get_or_build(EngineKind::Handwriting, &config_for(1001));
        for port in 1002..1010 {
            cache.get_or_build(EngineKind::Handwriting, &config_for(port));
            assert!(cache.len() <= 2);
        }
        assert_eq!(cache.len(), 2);

        // The first configuration was evicted, so it is rebuilt.
        let again = cache.get_or_build(EngineKind::Handwriting, &config_for(1001));
        assert!(!Arc::ptr_eq(&first, &again));
    }
}
