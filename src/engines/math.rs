//! Math / mixed-content engine: a hosted vision LLM that writes formulas as LaTeX.

use super::ExtractionEngine;
use crate::config::{EngineKind, ExtractionConfig};
use crate::error::EngineError;
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::input::ExtractionRequest;
use crate::pipeline::llm;
use crate::prompts::{language_hint, MATH_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::LLMProvider;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const NAME: &str = "math";

/// Vision-LLM engine for pages that mix prose and equations.
///
/// The provider is resolved on the first `extract` call, not at construction,
/// so a process that never reaches this engine never needs API credentials.
/// A failed resolution leaves the cell empty and is retried next time.
pub struct MathEngine {
    config: ExtractionConfig,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl MathEngine {
    pub fn new(config: &ExtractionConfig) -> Self {
        let mut config = config.clone();
        config.progress_callback = None;
        Self {
            config,
            provider: OnceCell::new(),
        }
    }

    async fn provider(&self) -> Result<&Arc<dyn LLMProvider>, EngineError> {
        self.provider
            .get_or_try_init(|| async {
                let provider = llm::resolve_provider(NAME, &self.config)?;
                debug!("{}: provider resolved", NAME);
                Ok::<_, EngineError>(provider)
            })
            .await
    }

    fn system_prompt(&self) -> &str {
        self.config
            .math_system_prompt
            .as_deref()
            .unwrap_or(MATH_SYSTEM_PROMPT)
    }
}

#[async_trait]
impl ExtractionEngine for MathEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<String, EngineError> {
        let provider = self.provider().await?;

        let path = request.image_path.clone();
        let max_dimension = self.config.max_image_dimension;
        let encoded = tokio::task::spawn_blocking(move || encode_image_file(&path, max_dimension))
            .await
            .map_err(|e| EngineError::inference(NAME, format!("encode task: {e}")))?
            .map_err(|e| EngineError::inference(NAME, format!("encode: {e}")))?;

        let language = self
            .config
            .language_codes
            .code_for(EngineKind::Math, request.language);

        let transcription = llm::transcribe(
            provider,
            NAME,
            self.system_prompt(),
            &language_hint(language),
            encoded.to_image_data(),
            &self.config,
        )
        .await?;

        debug!(
            "{}: {} bytes in {}ms ({} retries)",
            NAME,
            transcription.text.len(),
            transcription.duration_ms,
            transcription.retries
        );
        Ok(transcription.text)
    }
}
