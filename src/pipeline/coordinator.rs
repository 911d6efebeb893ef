//! Fallback coordinator: run engines in priority order behind a length gate.
//!
//! ```text
//!  TryEngine(0) ──len ≥ min──▶ Done (winner = engine 0)
//!       │ below / failed
//!       ▼
//!  TryEngine(1) ──len ≥ min──▶ Done (winner = engine 1)
//!       │
//!       ▼
//!     ...      ──exhausted──▶ Done (winner = longest non-empty, or none)
//! ```
//!
//! Engines run strictly one after another: once one clears the gate the
//! heavier, lower-priority engines are never started. Every engine run is
//! bounded by the per-engine timeout; an error or a timeout is recorded as a
//! failed, empty [`EngineResult`] and the chain moves on. The coordinator
//! itself holds no state between calls.

use crate::engines::ExtractionEngine;
use crate::error::EngineError;
use crate::output::EngineResult;
use crate::pipeline::input::ExtractionRequest;
use crate::pipeline::postprocess::clean_text;
use crate::progress::ProgressCallback;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one coordination pass.
#[derive(Debug, Clone)]
pub struct CoordinatorOutcome {
    /// The accepted result, the longest fallback, or `None` if every engine
    /// came back empty.
    pub winner: Option<EngineResult>,
    /// Every engine run, in the order they ran.
    pub attempts: Vec<EngineResult>,
}

impl CoordinatorOutcome {
    /// Winning text, empty when there is no winner.
    pub fn text(&self) -> &str {
        self.winner.as_ref().map(|w| w.text.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TryEngine(usize),
    Done,
}

/// Drives a priority-ordered list of engines for one request at a time.
pub struct Coordinator {
    engines: Vec<Arc<dyn ExtractionEngine>>,
    min_accept_length: usize,
    timeout: Duration,
    progress: Option<ProgressCallback>,
}

impl Coordinator {
    pub fn new(
        engines: Vec<Arc<dyn ExtractionEngine>>,
        min_accept_length: usize,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            engines,
            min_accept_length,
            timeout,
            progress,
        }
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Whether `result` clears the acceptance gate. Empty text never does,
    /// even with a threshold of zero.
    fn accepts(&self, result: &EngineResult) -> bool {
        let len = result.char_len();
        result.succeeded && len > 0 && len >= self.min_accept_length
    }

    /// Run the fallback chain for `request`. Never fails.
    pub async fn run(&self, request: &ExtractionRequest) -> CoordinatorOutcome {
        let mut attempts: Vec<EngineResult> = Vec::with_capacity(self.engines.len());
        let mut accepted: Option<usize> = None;
        let mut state = State::TryEngine(0);

        while let State::TryEngine(i) = state {
            let Some(engine) = self.engines.get(i) else {
                state = State::Done;
                continue;
            };

            let result = self.run_engine(engine.as_ref(), i, request).await;
            let is_accepted = self.accepts(&result);
            if result.succeeded {
                if let Some(ref cb) = self.progress {
                    cb.on_engine_complete(&result.engine_name, result.char_len(), is_accepted);
                }
            }
            attempts.push(result);

            state = if is_accepted {
                accepted = Some(i);
                State::Done
            } else {
                State::TryEngine(i + 1)
            };
        }

        let winner_idx = accepted.or_else(|| longest_non_empty(&attempts));
        let winner = winner_idx.map(|idx| attempts[idx].clone());

        match (&winner, accepted) {
            (Some(w), Some(_)) => info!(
                "Accepted {} ({} chars) after {} engine(s)",
                w.engine_name,
                w.char_len(),
                attempts.len()
            ),
            (Some(w), None) => info!(
                "No engine reached {} chars; keeping longest: {} ({} chars)",
                self.min_accept_length,
                w.engine_name,
                w.char_len()
            ),
            (None, _) => warn!("All {} engine(s) returned empty text", attempts.len()),
        }

        CoordinatorOutcome { winner, attempts }
    }

    async fn run_engine(
        &self,
        engine: &dyn ExtractionEngine,
        index: usize,
        request: &ExtractionRequest,
    ) -> EngineResult {
        let name = engine.name();
        if let Some(ref cb) = self.progress {
            cb.on_engine_start(name, index + 1, self.engines.len());
        }
        debug!("Engine {}/{}: {}", index + 1, self.engines.len(), name);

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, engine.extract(request)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(raw)) => {
                let text = clean_text(&raw);
                debug!("{}: {} chars in {}ms", name, text.chars().count(), duration_ms);
                return EngineResult::success(name, text, duration_ms);
            }
            Ok(Err(e)) => e,
            Err(_) => EngineError::Timeout {
                engine: name.to_string(),
                millis: self.timeout.as_millis() as u64,
            },
        };

        warn!("{} failed after {}ms: {}", name, duration_ms, error);
        if let Some(ref cb) = self.progress {
            cb.on_engine_error(name, &error.to_string());
        }
        EngineResult::failure(name, error, duration_ms)
    }
}

/// Index of the longest non-empty result; the earliest wins on equal length.
fn longest_non_empty(results: &[EngineResult]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, r) in results.iter().enumerate() {
        let len = r.char_len();
        if len > 0 && best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((i, len));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Language;
    use crate::progress::ExtractionProgressCallback;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct StubEngine {
        name: &'static str,
        reply: Reply,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(name: &'static str, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionEngine for StubEngine {
        fn name(&self) -> &str {
            self.name
        }

        async fn extract(&self, _request: &ExtractionRequest) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail => Err(EngineError::inference(self.name, "model crashed")),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("far too late to matter".to_string())
                }
            }
        }
    }

    fn request() -> ExtractionRequest {
        ExtractionRequest::new("page.jpg", Language::English)
    }

    fn coordinator(engines: &[Arc<StubEngine>]) -> Coordinator {
        let engines = engines
            .iter()
            .map(|e| Arc::clone(e) as Arc<dyn ExtractionEngine>)
            .collect();
        Coordinator::new(engines, 10, Duration::from_secs(5), None)
    }

    #[tokio::test]
    async fn first_engine_over_threshold_stops_the_chain() {
        let math = StubEngine::new("math", Reply::Text("x^2 + 2x + 1 = 0"));
        let hw = StubEngine::new("handwriting", Reply::Text("unused"));
        let printed = StubEngine::new("printed-text", Reply::Text("unused"));

        let out = coordinator(&[math.clone(), hw.clone(), printed.clone()])
            .run(&request())
            .await;

        assert_eq!(out.winner.as_ref().unwrap().engine_name, "math");
        assert_eq!(math.calls(), 1);
        assert_eq!(hw.calls(), 0);
        assert_eq!(printed.calls(), 0);
        assert_eq!(out.attempts.len(), 1);
    }

    #[tokio::test]
    async fn longest_wins_when_nobody_clears_the_gate() {
        let math = StubEngine::new("math", Reply::Text("12345"));
        let hw = StubEngine::new("handwriting", Reply::Text("abc"));
        let printed = StubEngine::new(
            "printed-text",
            Reply::Text("Question 1: add the numbers 12 and 30 ok"),
        );

        let out = coordinator(&[math.clone(), hw.clone(), printed.clone()])
            .run(&request())
            .await;

        // 40 chars clears the gate on the last engine.
        let winner = out.winner.unwrap();
        assert_eq!(winner.engine_name, "printed-text");
        assert_eq!(winner.char_len(), 40);
        assert_eq!((math.calls(), hw.calls(), printed.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn fallback_picks_longest_below_threshold() {
        let math = StubEngine::new("math", Reply::Text("12345"));
        let hw = StubEngine::new("handwriting", Reply::Text("abc"));
        let printed = StubEngine::new("printed-text", Reply::Text("1234567"));

        let out = coordinator(&[math, hw, printed]).run(&request()).await;
        assert_eq!(out.winner.unwrap().engine_name, "printed-text");
        assert_eq!(out.attempts.len(), 3);
    }

    #[tokio::test]
    async fn equal_length_keeps_earlier_engine() {
        let math = StubEngine::new("math", Reply::Text("abcde"));
        let hw = StubEngine::new("handwriting", Reply::Text("vwxyz"));

        let out = coordinator(&[math, hw]).run(&request()).await;
        assert_eq!(out.winner.unwrap().engine_name, "math");
    }

    #[tokio::test]
    async fn all_empty_has_no_winner() {
        let engines = [
            StubEngine::new("math", Reply::Text("")),
            StubEngine::new("handwriting", Reply::Text("   \n")),
            StubEngine::new("printed-text", Reply::Fail),
        ];
        let out = coordinator(&engines).run(&request()).await;
        assert!(out.winner.is_none());
        assert_eq!(out.text(), "");
        assert_eq!(out.attempts.len(), 3);
    }

    #[tokio::test]
    async fn failure_counts_as_empty_and_chain_continues() {
        let math = StubEngine::new("math", Reply::Fail);
        let hw = StubEngine::new("handwriting", Reply::Text("abcd"));

        let out = coordinator(&[math, hw]).run(&request()).await;
        assert!(!out.attempts[0].succeeded);
        assert!(out.attempts[0].error.is_some());
        assert_eq!(out.winner.unwrap().engine_name, "handwriting");
    }

    #[tokio::test]
    async fn timeout_counts_as_empty() {
        let slow = StubEngine::new("math", Reply::Hang);
        let fast = StubEngine::new("handwriting", Reply::Text("The water cycle has four stages."));

        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![slow.clone(), fast.clone()];
        let out = Coordinator::new(engines, 10, Duration::from_millis(50), None)
            .run(&request())
            .await;

        assert!(matches!(
            out.attempts[0].error,
            Some(EngineError::Timeout { millis: 50, .. })
        ));
        assert_eq!(out.winner.unwrap().engine_name, "handwriting");
    }

    #[tokio::test]
    async fn text_is_cleaned_before_gating() {
        // 9 visible chars wrapped in fences and padding: below the gate.
        let math = StubEngine::new("math", Reply::Text("```\n   x + y = 3   \n```"));
        let hw = StubEngine::new("handwriting", Reply::Text(""));

        let out = coordinator(&[math, hw.clone()]).run(&request()).await;
        assert_eq!(hw.calls(), 1);
        assert_eq!(out.text(), "x + y = 3");
    }

    #[tokio::test]
    async fn progress_events_follow_the_chain() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl ExtractionProgressCallback for Recorder {
            fn on_engine_start(&self, engine: &str, position: usize, total: usize) {
                self.0.lock().unwrap().push(format!("start {engine} {position}/{total}"));
            }
            fn on_engine_complete(&self, engine: &str, chars: usize, accepted: bool) {
                self.0.lock().unwrap().push(format!("done {engine} {chars} {accepted}"));
            }
            fn on_engine_error(&self, engine: &str, _error: &str) {
                self.0.lock().unwrap().push(format!("error {engine}"));
            }
        }

        let recorder = Arc::new(Recorder::default());
        let engines: Vec<Arc<dyn ExtractionEngine>> = vec![
            StubEngine::new("math", Reply::Fail),
            StubEngine::new("handwriting", Reply::Text("Write a short poem")),
        ];
        Coordinator::new(engines, 10, Duration::from_secs(5), Some(recorder.clone()))
            .run(&request())
            .await;

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                "start math 1/2",
                "error math",
                "start handwriting 2/2",
                "done handwriting 18 true",
            ]
        );
    }

    #[test]
    fn longest_helper() {
        let r = |name: &str, text: &str| EngineResult::success(name, text.to_string(), 1);
        assert_eq!(longest_non_empty(&[]), None);
        assert_eq!(longest_non_empty(&[r("a", ""), r("b", "")]), None);
        assert_eq!(longest_non_empty(&[r("a", "xy"), r("b", "xyz"), r("c", "abc")]), Some(1));
    }
}
