//! Progress-callback trait for per-engine extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the fallback chain works through its engines.
//!
//! Callers can forward events to a channel, a WebSocket, a job record, or a
//! terminal spinner without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because the batch API processes
//! several images concurrently.
//!
//! # Example
//!
//! ```rust
//! use homework_ocr::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct EngineCounter {
//!     runs: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for EngineCounter {
//!     fn on_engine_start(&self, engine: &str, position: usize, total: usize) {
//!         self.runs.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("engine {position}/{total}: {engine}");
//!     }
//! }
//!
//! let counter = Arc::new(EngineCounter { runs: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the extraction pipeline as it moves through the engines.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Within one image the events arrive in order. When several images are
/// processed through [`crate::stream::extract_stream`], events for different
/// images interleave and may come from different threads.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the input file has been validated.
    fn on_extraction_start(&self, image_path: &Path) {
        let _ = image_path;
    }

    /// Called just before an engine runs.
    ///
    /// # Arguments
    /// * `engine`   — engine name (`math`, `handwriting`, `printed-text`)
    /// * `position` — 1-indexed position in the priority order
    /// * `total`    — number of configured engines
    fn on_engine_start(&self, engine: &str, position: usize, total: usize) {
        let _ = (engine, position, total);
    }

    /// Called when an engine returned text (possibly empty).
    ///
    /// # Arguments
    /// * `engine`   — engine name
    /// * `chars`    — character count of the cleaned text
    /// * `accepted` — whether the text cleared the acceptance threshold
    fn on_engine_complete(&self, engine: &str, chars: usize, accepted: bool) {
        let _ = (engine, chars, accepted);
    }

    /// Called when an engine failed or timed out.
    fn on_engine_error(&self, engine: &str, error: &str) {
        let _ = (engine, error);
    }

    /// Called once the winner is known.
    ///
    /// # Arguments
    /// * `winner` — winning engine name, or `none` when every engine was empty
    /// * `chars`  — character count of the final text
    fn on_extraction_complete(&self, winner: &str, chars: usize) {
        let _ = (winner, chars);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        winner: Mutex<Option<String>>,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_engine_start(&self, _engine: &str, _position: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_engine_complete(&self, _engine: &str, _chars: usize, _accepted: bool) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_engine_error(&self, _engine: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, winner: &str, _chars: usize) {
            *self.winner.lock().unwrap() = Some(winner.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(Path::new("page.jpg"));
        cb.on_engine_start("math", 1, 3);
        cb.on_engine_complete("math", 4, false);
        cb.on_engine_error("handwriting", "connection refused");
        cb.on_extraction_complete("printed-text", 42);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_engine_start("math", 1, 3);
        tracker.on_engine_complete("math", 3, false);
        tracker.on_engine_start("handwriting", 2, 3);
        tracker.on_engine_error("handwriting", "timeout");
        tracker.on_engine_start("printed-text", 3, 3);
        tracker.on_engine_complete("printed-text", 40, true);
        tracker.on_extraction_complete("printed-text", 40);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.winner.lock().unwrap().as_deref(), Some("printed-text"));
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_engine_start("math", 1, 1);
        cb.on_engine_complete("math", 12, true);
    }
}
