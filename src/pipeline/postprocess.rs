//! Post-processing: deterministic cleanup of raw engine output.
//!
//! Every engine's text passes through [`clean_text`] before its length is
//! measured, so the acceptance gate compares like with like. Without this a
//! vision model that answers "```\n\n```" or a tesseract run that emits a
//! page of form-feeds and spaces would count as "long enough".
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised so the fence regex
//! sees the model's raw output; invisible characters are removed before the
//! final trim so a lone BOM does not survive as "text".

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw engine output.
///
/// Rules (applied in order):
/// 1. Strip outer code fences (vision models sometimes disobey the prompt)
/// 2. Strip a leading "Here is the transcription:" style preamble
/// 3. Normalise line endings (CRLF / CR / form-feed → LF)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 1
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 7. Trim leading and trailing whitespace
///
/// The result contains no leading or trailing whitespace; an input that is
/// only noise becomes the empty string.
pub fn clean_text(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = strip_preamble(&s);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|latex|tex|text|plaintext)?[ \t]*\r?\n(.*?)\r?\n?```\s*$")
        .unwrap()
});

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Strip conversational preamble ────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:sure[,!.]?\s*)?here(?: is|'s) the (?:transcription|transcribed text|extracted text|text)[^\n:]*:[ \t]*\n")
        .unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 3: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace(['\r', '\u{000C}'], "\n")
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────
//
// ZWJ / ZWNJ (U+200D / U+200C) are deliberately kept: Tamil and Devanagari
// use them to select conjunct forms, so removing them changes the word.

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{2060}'], "")
}
