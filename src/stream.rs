//! Streaming API: extract many images, emitting outcomes as they complete.
//!
//! A class set of worksheets is dozens of photos. [`extract_stream`] runs up
//! to `config.concurrency` images at once and yields each outcome as soon as
//! it is ready, so callers can persist results or update a progress display
//! incrementally. Outcomes arrive in completion order; each item carries its
//! image path.
//!
//! Concurrency is *across* images only. Within one image the engines still
//! run strictly in priority order behind the acceptance gate.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::output::ExtractionOutcome;
use crate::pipeline::input::ExtractionRequest;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// One finished image.
pub type StreamItem = (PathBuf, Result<ExtractionOutcome, ExtractError>);

/// A boxed stream of per-image outcomes.
pub type ExtractionStream = Pin<Box<dyn Stream<Item = StreamItem> + Send>>;

/// Extract every request, streaming outcomes as they complete.
///
/// An invalid image yields an `Err` item for that path; it does not end the
/// stream.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use homework_ocr::{extract_stream, ExtractionConfig, ExtractionRequest, Language};
///
/// # #[tokio::main]
/// # async fn main() {
/// let requests = vec![
///     ExtractionRequest::new("q1.jpg", Language::English),
///     ExtractionRequest::new("q2.jpg", Language::Hindi),
/// ];
/// let mut stream = extract_stream(requests, &ExtractionConfig::default());
/// while let Some((path, result)) = stream.next().await {
///     match result {
///         Ok(o) => println!("{}: [{}] {}", path.display(), o.subject, o.text),
///         Err(e) => eprintln!("{}: {e}", path.display()),
///     }
/// }
/// # }
/// ```
pub fn extract_stream(requests: Vec<ExtractionRequest>, config: &ExtractionConfig) -> ExtractionStream {
    stream_with(Arc::new(Extractor::new(config.clone())), requests)
}

/// Stream `requests` through an existing extractor.
pub fn stream_with(extractor: Arc<Extractor>, requests: Vec<ExtractionRequest>) -> ExtractionStream {
    let concurrency = extractor.config().concurrency.max(1);
    info!(
        "Starting streaming extraction: {} image(s), concurrency {}",
        requests.len(),
        concurrency
    );

    let s = stream::iter(requests.into_iter().map(move |request| {
        let extractor = Arc::clone(&extractor);
        async move {
            let result = extractor.extract(&request).await;
            (request.image_path, result)
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
