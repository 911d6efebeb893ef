//! Prompts for the vision-model engines.
//!
//! Centralising every prompt here keeps prompt changes in one place and lets
//! unit tests inspect them without a model. Callers can override the math
//! prompt via [`crate::config::ExtractionConfig::math_system_prompt`].

/// System prompt for the math / mixed-content engine.
pub const MATH_SYSTEM_PROMPT: &str = r#"You are an expert transcriber of school homework. You are given a photo of a homework page that may mix prose, handwritten working and mathematical notation.

Follow these rules precisely:

1. TEXT
   - Transcribe ALL visible text exactly as written, including spelling mistakes
   - Keep the reading order a teacher would use: top to bottom, question by question
   - Keep question numbers and sub-part labels such as 1., 2(a), (iii)

2. MATHEMATICS
   - Write every formula, equation and expression in LaTeX
   - Use $...$ for inline maths and $$...$$ for displayed equations
   - Keep the student's working line by line; do not simplify or correct it

3. WHAT TO IGNORE
   - Ruled lines, margins and page decorations
   - Crossed-out text that is completely illegible

4. OUTPUT FORMAT
   - Output ONLY the transcription
   - Do NOT solve, grade or explain anything
   - Do NOT wrap the output in code fences
   - If the page contains no legible text, output nothing"#;

/// Prompt for the handwriting engine (local vision model).
///
/// Local vision models follow a single instruction better than a long rule
/// list, so this is kept short.
pub const HANDWRITING_PROMPT: &str = "Transcribe the handwritten text in this image exactly as written. \
Preserve line breaks. Output only the transcribed text with no commentary. \
If there is no legible text, output nothing.";

/// Per-request instruction naming the page language.
///
/// `language_name` comes from the configured language-code map, so operators
/// can say e.g. "Tamil and English" for bilingual worksheets.
pub fn language_hint(language_name: &str) -> String {
    format!("The page is written in {language_name}. Keep the original script; do not translate.")
}

/// Full handwriting prompt for one request.
pub fn handwriting_prompt(language_name: &str) -> String {
    format!("{HANDWRITING_PROMPT}\n{}", language_hint(language_name))
}
