//! Vision-LLM interaction: provider resolution, message layout, retries.
//!
//! This module is intentionally thin; the prompts live in [`crate::prompts`]
//! so they can be tuned without touching retry or error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) with the 500 ms default and 2 retries
//! waits 500 ms then 1 s. The whole loop still sits inside the coordinator's
//! per-engine timeout, so a provider that never recovers cannot stall the
//! fallback chain.

use crate::config::ExtractionConfig;
use crate::error::EngineError;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Raw model output for one image.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Send one image to the vision model and return its raw text.
///
/// ## Message Layout
///
/// 1. **System message** — transcription rules for this engine
/// 2. **User message** — a short language instruction plus the image
pub async fn transcribe(
    provider: &Arc<dyn LLMProvider>,
    engine: &str,
    system_prompt: &str,
    instruction: &str,
    image: ImageData,
    config: &ExtractionConfig,
) -> Result<Transcription, EngineError> {
    let start = Instant::now();
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(instruction, vec![image]),
    ];
    let options = build_options(config);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                engine, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    engine, response.prompt_tokens, response.completion_tokens, duration
                );
                return Ok(Transcription {
                    text: response.content,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("{}: attempt {} failed — {}", engine, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(EngineError::Inference {
        engine: engine.to_string(),
        detail: format!(
            "{} retries exhausted: {}",
            config.max_retries,
            last_err.unwrap_or_else(|| "unknown error".to_string())
        ),
    })
}

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.math_provider`), used as-is.
/// 2. **Named provider + model** (`config.math_provider_name`), created via
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, so hosts with several keys get
///    a predictable default.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Failure is an [`EngineError::Init`]: the math engine reports itself as
/// failed for this request and the chain moves on.
pub fn resolve_provider(
    engine: &str,
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, EngineError> {
    if let Some(ref provider) = config.math_provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.math_provider_name {
        let model = config.math_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(engine, name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(engine, &prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.math_model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider(engine, "openai", model);
        }
    }

    let (llm_provider, _embedding) = ProviderFactory::from_env().map_err(|e| EngineError::Init {
        engine: engine.to_string(),
        detail: format!(
            "no vision provider could be auto-detected from the environment \
             (set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider): {e}"
        ),
    })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    engine: &str,
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, EngineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| EngineError::Init {
        engine: engine.to_string(),
        detail: format!("provider '{provider_name}' / model '{model}': {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(u64::MAX, 4), u64::MAX);
    }
}
