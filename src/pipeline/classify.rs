//! Subject classification by keyword matching.
//!
//! A subject's score is the number of *distinct* keywords from its list that
//! occur anywhere in the lowercased text (plain substring match, so "add"
//! also fires inside "address"). Scores are not normalised by list length.
//! The highest score wins; ties go to the earlier subject in
//! [`Subject::ALL`] order; a text with no hits at all is labelled
//! [`Subject::Language`].
//!
//! Lists cover English, Tamil and Hindi, plus bare operator symbols for math.

use crate::output::Subject;
use tracing::debug;

const MATH_KEYWORDS: &[&str] = &[
    "solve", "equation", "calculate", "add", "subtract", "multiply", "divide", "+", "-", "×", "÷",
    "=", "sum", "difference", "product", "quotient", // English
    "கூட்டல்", "கழித்தல்", "பெருக்கல்", "வகுத்தல்", // Tamil
    "जोड़", "घटाना", "गुणा", "भाग", // Hindi
];

const SCIENCE_KEYWORDS: &[&str] = &[
    "cell", "atom", "energy", "force", "experiment", "matter", "chemical", "biology", "physics",
    "chemistry", "reaction", "organism", // English
    "அணு", "ஆற்றல்", "விசை", "சோதனை", // Tamil
    "कोशिका", "परमाणु", "ऊर्जा", "बल", // Hindi
];

const LANGUAGE_KEYWORDS: &[&str] = &[
    "write", "essay", "paragraph", "grammar", "verb", "noun", "sentence", "poem", "story",
    "reading", "writing", // English
    "எழுது", "கட்டுரை", "வாக்கியம்", // Tamil
    "लिखना", "निबंध", "व्याकरण", // Hindi
];

/// Keyword list for `subject`.
pub fn keywords(subject: Subject) -> &'static [&'static str] {
    match subject {
        Subject::Math => MATH_KEYWORDS,
        Subject::Science => SCIENCE_KEYWORDS,
        Subject::Language => LANGUAGE_KEYWORDS,
    }
}

/// Per-subject keyword hit counts, in [`Subject::ALL`] order.
pub fn subject_scores(text: &str) -> [(Subject, usize); 3] {
    let lowered = text.to_lowercase();
    Subject::ALL.map(|subject| {
        let hits = keywords(subject)
            .iter()
            .filter(|kw| lowered.contains(**kw))
            .count();
        (subject, hits)
    })
}

/// Assign a subject label to `text`. Total and deterministic.
pub fn classify_subject(text: &str) -> Subject {
    let scores = subject_scores(text);

    // Strict `>` keeps the earlier subject on ties.
    let (best, best_score) = scores
        .iter()
        .copied()
        .fold((Subject::Language, 0usize), |(best, best_score), (subject, score)| {
            if score > best_score {
                (subject, score)
            } else {
                (best, best_score)
            }
        });

    debug!(
        "Subject scores math={} science={} language={} → {}",
        scores[0].1, scores[1].1, scores[2].1, best
    );

    if best_score == 0 {
        Subject::Language
    } else {
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_is_math() {
        assert_eq!(classify_subject("solve for x, 2+2=4"), Subject::Math);
    }

    #[test]
    fn no_keywords_defaults_to_language() {
        assert_eq!(classify_subject("qwerty zxcv"), Subject::Language);
        assert_eq!(classify_subject(""), Subject::Language);
    }

    #[test]
    fn science_text() {
        let text = "Every living organism is made of a cell. The atom stores energy.";
        assert_eq!(classify_subject(text), Subject::Science);
    }

    #[test]
    fn language_text() {
        assert_eq!(
            classify_subject("Write an essay. Underline every noun in each sentence."),
            Subject::Language
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify_subject("PHYSICS AND CHEMISTRY"), Subject::Science);
    }

    #[test]
    fn repeated_keyword_counts_once() {
        // "atom" three times is one science hit; "essay" and "poem" are two
        // language hits.
        let scores = subject_scores("atom atom atom essay poem");
        assert_eq!(scores[1], (Subject::Science, 1));
        assert_eq!(scores[2], (Subject::Language, 2));
        assert_eq!(classify_subject("atom atom atom essay poem"), Subject::Language);
    }

    #[test]
    fn tie_prefers_math_then_science() {
        // one math hit ("sum"), one science hit ("cell")
        assert_eq!(classify_subject("sum cell"), Subject::Math);
        // one science hit ("atom"), one language hit ("poem")
        assert_eq!(classify_subject("atom poem"), Subject::Science);
    }

    #[test]
    fn substring_matching_counts_embedded_words() {
        // "address" contains "add"
        assert_eq!(subject_scores("address")[0], (Subject::Math, 1));
    }

    #[test]
    fn tamil_and_hindi_keywords() {
        assert_eq!(classify_subject("அணு ஆற்றல்"), Subject::Science);
        assert_eq!(classify_subject("निबंध लिखना"), Subject::Language);
        assert_eq!(classify_subject("கூட்டல் மற்றும் கழித்தல்"), Subject::Math);
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "Calculate the force on the cell";
        assert_eq!(classify_subject(text), classify_subject(text));
    }
}
