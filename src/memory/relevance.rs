//! Token-signature relevance ranking for episodic recall.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

static ERROR_CODE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Matches alphanumeric error codes across toolchains: E0308, TS2345, ENOENT-ish.
fn error_code_pattern() -> &'static Regex {
    ERROR_CODE_PATTERN.get_or_init(|| Regex::new(r"[A-Z]{1,5}\d{3,5}").unwrap())
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "to", "of", "in", "on", "for", "with", "is", "it", "at", "by",
    "from", "this", "that", "be", "was", "are",
];

/// Lowercased token signature of a text, keeping error codes verbatim.
/// Used to compare a task description or failure message against past
/// reflections and capability descriptions.
pub fn signature(text: &str) -> BTreeSet<String> {
    let mut tokens: BTreeSet<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect();

    for code in error_code_pattern().find_iter(text) {
        tokens.insert(code.as_str().to_string());
    }
    tokens
}

/// Jaccard overlap of two signatures in [0, 1].
pub fn overlap_score(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    if intersection == 0 {
        return 0.0;
    }
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Compact one-line signature string for persistence alongside a record.
pub fn signature_line(text: &str) -> String {
    signature(text).into_iter().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_keeps_error_codes() {
        let sig = signature("error[E0308]: mismatched types");
        assert!(sig.contains("E0308"));
        assert!(sig.contains("mismatched"));
    }

    #[test]
    fn stopwords_are_dropped() {
        let sig = signature("the build of the crate");
        assert!(!sig.contains("the"));
        assert!(sig.contains("build"));
    }

    #[test]
    fn identical_texts_score_one() {
        let a = signature("install missing dependency libfoo");
        let b = signature("install missing dependency libfoo");
        assert!((overlap_score(&a, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_texts_score_zero() {
        let a = signature("network unreachable");
        let b = signature("syntax problem");
        assert_eq!(overlap_score(&a, &b), 0.0);
    }
}
