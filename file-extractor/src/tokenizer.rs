//! Mixed-script tokenization for the lexical index.
//!
//! Latin word runs and digit runs are always extracted. Korean text goes
//! through a morphological analyzer when one is available; without it the
//! fallback splits Hangul segments on non-alphanumeric boundaries, which is
//! documented degraded Korean recall (no particle stripping).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Optional morphological analyzer for Korean text. Returns
/// `(surface form, POS tag)` pairs in document order.
pub trait KoreanAnalyzer: Send + Sync {
    fn morphs(&self, text: &str) -> Vec<(String, String)>;
}

#[derive(Clone, Default)]
pub struct Tokenizer {
    analyzer: Option<Arc<dyn KoreanAnalyzer>>,
}

impl Tokenizer {
    pub fn new(analyzer: Option<Arc<dyn KoreanAnalyzer>>) -> Self {
        Self { analyzer }
    }

    pub fn has_korean_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Tokenize free text: Korean morphemes (nouns/verbs/adjectives/roots),
    /// Latin word runs of length >= 2 and digit runs, deduplicated in
    /// first-seen order.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();

        if contains_hangul(text) {
            match &self.analyzer {
                Some(analyzer) => {
                    for (surface, tag) in analyzer.morphs(text) {
                        if is_content_tag(&tag) && surface.chars().count() >= 2 {
                            tokens.push(surface.to_lowercase());
                        }
                    }
                }
                None => {
                    for segment in text.split(|c: char| !c.is_alphanumeric()) {
                        if contains_hangul(segment) && segment.chars().count() >= 2 {
                            tokens.push(segment.to_lowercase());
                        }
                    }
                }
            }
        }

        tokens.extend(latin_and_digit_runs(text));
        dedup_in_order(tokens)
    }

    /// Tokens for a metadata-only file: filename stem plus the last three
    /// path components, split on `_`, `-` and `/` before retokenizing.
    pub fn tokenize_path(&self, path: &Path) -> Vec<String> {
        let mut pieces: Vec<String> = Vec::new();

        if let Some(stem) = path.file_stem() {
            pieces.push(stem.to_string_lossy().into_owned());
        }

        let components: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let tail = components.len().saturating_sub(3);
        pieces.extend_from_slice(&components[tail..]);

        let joined = pieces.join(" ").replace(['_', '-', '/'], " ");
        self.tokenize(&joined)
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("korean_analyzer", &self.analyzer.is_some())
            .finish()
    }
}

/// Hangul syllables plus the Jamo blocks.
fn contains_hangul(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
    })
}

/// ko-dic POS tags worth indexing: nouns (NN*), verbs (VV), adjectives (VA)
/// and roots (XR).
fn is_content_tag(tag: &str) -> bool {
    tag.starts_with("NN") || tag.starts_with("VV") || tag.starts_with("VA") || tag.starts_with("XR")
}

fn latin_and_digit_runs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut run = String::new();
    let mut run_is_digit = false;

    let flush = |run: &mut String, is_digit: bool, out: &mut Vec<String>| {
        if !run.is_empty() {
            // Digit runs of any length; word runs only when length >= 2.
            if is_digit || run.len() >= 2 {
                out.push(std::mem::take(run).to_lowercase());
            } else {
                run.clear();
            }
        }
    };

    for c in text.chars() {
        let class = if c.is_ascii_alphabetic() {
            Some(false)
        } else if c.is_ascii_digit() {
            Some(true)
        } else {
            None
        };
        match class {
            Some(is_digit) if run.is_empty() || is_digit == run_is_digit => {
                run_is_digit = is_digit;
                run.push(c);
            }
            Some(is_digit) => {
                flush(&mut run, run_is_digit, &mut out);
                run_is_digit = is_digit;
                run.push(c);
            }
            None => flush(&mut run, run_is_digit, &mut out),
        }
    }
    flush(&mut run, run_is_digit, &mut out);
    out
}

fn dedup_in_order(tokens: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(tokens.len());
    tokens.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_runs_are_lowercased_and_length_filtered() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("Budget Plan Q4 x"), vec!["budget", "plan", "4"]);
    }

    #[test]
    fn digit_runs_are_kept_whole() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("report 2025 v2"), vec!["report", "2025", "2"]);
    }

    #[test]
    fn mixed_alnum_splits_into_script_runs() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("abc123def"), vec!["abc", "123", "def"]);
    }

    #[test]
    fn tokens_deduplicate_preserving_first_seen_order() {
        let t = Tokenizer::default();
        assert_eq!(t.tokenize("plan budget plan"), vec!["plan", "budget"]);
    }

    #[test]
    fn tokenize_is_idempotent_for_ascii() {
        let t = Tokenizer::default();
        let once = t.tokenize("Quarterly Budget Forecast 2025");
        let again = t.tokenize(&once.join(" "));
        assert_eq!(once, again);
    }

    #[test]
    fn hangul_fallback_extracts_segments() {
        let t = Tokenizer::default();
        let tokens = t.tokenize("예산 계획 2025");
        assert!(tokens.contains(&"예산".to_string()));
        assert!(tokens.contains(&"계획".to_string()));
        assert!(tokens.contains(&"2025".to_string()));
    }

    #[test]
    fn analyzer_filters_by_tag_and_length() {
        struct Fake;
        impl KoreanAnalyzer for Fake {
            fn morphs(&self, _text: &str) -> Vec<(String, String)> {
                vec![
                    ("예산".into(), "NNG".into()),
                    ("을".into(), "JKO".into()),
                    ("세우".into(), "VV".into()),
                    ("다".into(), "EF".into()),
                ]
            }
        }
        let t = Tokenizer::new(Some(Arc::new(Fake)));
        let tokens = t.tokenize("예산을 세우다");
        assert_eq!(tokens, vec!["예산", "세우"]);
    }

    #[test]
    fn path_tokens_come_from_stem_and_tail_components() {
        let t = Tokenizer::default();
        let tokens = t.tokenize_path(Path::new("/home/user/docs/project_budget_2025.zip"));
        assert!(tokens.contains(&"project".to_string()));
        assert!(tokens.contains(&"budget".to_string()));
        assert!(tokens.contains(&"2025".to_string()));
        assert!(tokens.contains(&"docs".to_string()));
        assert!(!tokens.contains(&"home".to_string()));
    }
}
