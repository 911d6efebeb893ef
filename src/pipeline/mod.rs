//! Pipeline stages for homework-page extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ coordinator ──▶ postprocess ──▶ classify
//!  (validate)   │  (per engine output)   (keywords)
//!               ├─ engines::math        ◀── encode ◀── llm
//!               ├─ engines::handwriting ◀── encode
//!               └─ engines::printed     ◀── preprocess
//! ```
//!
//! 1. [`input`]       — validate the caller's image before any engine runs
//! 2. [`preprocess`]  — grayscale, blur, adaptive threshold, NL-means; CPU
//!    bound, so callers run it in `spawn_blocking`
//! 3. [`encode`]      — base64 payload for the vision engines
//! 4. [`llm`]         — vision-LLM call with retry/backoff
//! 5. [`coordinator`] — priority-ordered fallback chain with the length gate
//! 6. [`postprocess`] — deterministic cleanup applied to every engine output
//! 7. [`classify`]    — keyword-count subject label

pub mod classify;
pub mod coordinator;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod preprocess;
