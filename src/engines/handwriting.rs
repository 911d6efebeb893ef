//! Handwriting engine: a local vision model served by Ollama.
//!
//! Talks to `POST {ollama_url}/api/generate` with the page as a base64 image.
//! On first use the engine builds its HTTP client and asks Ollama to load the
//! model (an empty-prompt generate call) with a long `keep_alive`. The load
//! runs inside the first page's `extract`, so it counts against that page's
//! engine timeout; later pages find the model resident.

use super::ExtractionEngine;
use crate::config::{EngineKind, ExtractionConfig, LanguageCodeMap};
use crate::error::EngineError;
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::input::ExtractionRequest;
use crate::prompts::handwriting_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const NAME: &str = "handwriting";

/// How long Ollama keeps the model resident after the last request.
const KEEP_ALIVE: &str = "30m";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama-backed handwriting recogniser.
pub struct HandwritingEngine {
    base_url: String,
    model: String,
    timeout: Duration,
    max_dimension: u32,
    language_codes: LanguageCodeMap,
    client: OnceCell<reqwest::Client>,
}

impl HandwritingEngine {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.handwriting_model.clone(),
            timeout: config.engine_timeout,
            max_dimension: config.max_image_dimension,
            language_codes: config.language_codes.clone(),
            client: OnceCell::new(),
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// HTTP client with the model already loaded. A failed initialisation
    /// leaves the cell empty, so the next request tries again.
    async fn client(&self) -> Result<&reqwest::Client, EngineError> {
        self.client
            .get_or_try_init(|| async {
                let client = reqwest::Client::builder()
                    .timeout(self.timeout)
                    .build()
                    .map_err(|e| EngineError::Init {
                        engine: NAME.to_string(),
                        detail: format!("HTTP client: {e}"),
                    })?;
                self.preload(&client).await?;
                Ok::<_, EngineError>(client)
            })
            .await
    }

    async fn preload(&self, client: &reqwest::Client) -> Result<(), EngineError> {
        let start = Instant::now();
        let body = GenerateRequest {
            model: &self.model,
            prompt: "",
            images: Vec::new(),
            stream: false,
            keep_alive: KEEP_ALIVE,
            options: GenerateOptions { temperature: 0.0 },
        };
        let response = client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Init {
                engine: NAME.to_string(),
                detail: format!("loading model '{}': Ollama returned {status}: {body}", self.model),
            });
        }

        info!(
            "{}: model '{}' loaded in {}ms",
            NAME,
            self.model,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    fn request_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_connect() {
            EngineError::Unavailable {
                engine: NAME.to_string(),
                detail: format!("cannot reach Ollama at {}: {e}", self.base_url),
            }
        } else if e.is_timeout() {
            EngineError::Timeout {
                engine: NAME.to_string(),
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            EngineError::inference(NAME, e)
        }
    }
}

#[async_trait]
impl ExtractionEngine for HandwritingEngine {
    fn name(&self) -> &str {
        NAME
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<String, EngineError> {
        let client = self.client().await?;

        let path = request.image_path.clone();
        let max_dimension = self.max_dimension;
        let encoded = tokio::task::spawn_blocking(move || encode_image_file(&path, max_dimension))
            .await
            .map_err(|e| EngineError::inference(NAME, format!("encode task: {e}")))?
            .map_err(|e| EngineError::inference(NAME, format!("encode: {e}")))?;

        let language = self
            .language_codes
            .code_for(EngineKind::Handwriting, request.language);
        let prompt = handwriting_prompt(language);

        let start = Instant::now();
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            images: vec![encoded.base64],
            stream: false,
            keep_alive: KEEP_ALIVE,
            options: GenerateOptions { temperature: 0.0 },
        };
        let response = client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::inference(
                NAME,
                format!("Ollama returned {status}: {body}"),
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::inference(NAME, format!("malformed response: {e}")))?;

        debug!(
            "{}: {} bytes in {}ms",
            NAME,
            parsed.response.len(),
            start.elapsed().as_millis()
        );
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;

    #[test]
    fn request_body_shape() {
        let body = GenerateRequest {
            model: "llama3.2-vision",
            prompt: "read this",
            images: vec!["aGVsbG8=".into()],
            stream: false,
            keep_alive: KEEP_ALIVE,
            options: GenerateOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama3.2-vision");
        assert_eq!(json["images"][0], "aGVsbG8=");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[test]
    fn preload_body_omits_images() {
        let body = GenerateRequest {
            model: "llama3.2-vision",
            prompt: "",
            images: Vec::new(),
            stream: false,
            keep_alive: KEEP_ALIVE,
            options: GenerateOptions { temperature: 0.0 },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("images").is_none());
    }

    #[test]
    fn response_without_text_is_empty() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(parsed.response, "");
    }

    #[test]
    fn url_has_no_double_slash() {
        let config = ExtractionConfig {
            ollama_url: "http://localhost:11434/".into(),
            ..ExtractionConfig::default()
        };
        let engine = HandwritingEngine::new(&config);
        assert_eq!(engine.generate_url(), "http://localhost:11434/api/generate");
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable_and_retried_later() {
        let config = ExtractionConfig::builder()
            .ollama_url("http://127.0.0.1:1")
            .build()
            .unwrap();
        let engine = HandwritingEngine::new(&config);
        let request = ExtractionRequest::new("page.png", Language::English);

        let err = engine.extract(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable { .. }), "got: {err}");
        // Initialisation did not stick, so the next call starts over.
        assert!(engine.client.get().is_none());
    }
}
