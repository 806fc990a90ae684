//! Lindera-backed Korean analyzer (feature `korean`, embedded ko-dic).

use lindera::dictionary::load_dictionary;
use lindera::mode::Mode;
use lindera::segmenter::Segmenter;
use lindera::tokenizer::Tokenizer as LinderaTokenizer;

use crate::tokenizer::KoreanAnalyzer;

pub struct LinderaKoreanAnalyzer {
    tokenizer: LinderaTokenizer,
}

impl LinderaKoreanAnalyzer {
    /// Build from the embedded ko-dic dictionary. Returns `None` when the
    /// dictionary cannot be loaded so callers fall back to the degraded
    /// tokenizer instead of failing the engine.
    pub fn new() -> Option<Self> {
        let dictionary = match load_dictionary("embedded://ko-dic") {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!("ko-dic dictionary unavailable, Korean recall degraded: {err}");
                return None;
            }
        };
        let segmenter = Segmenter::new(Mode::Normal, dictionary, None);
        Some(Self { tokenizer: LinderaTokenizer::new(segmenter) })
    }
}

impl KoreanAnalyzer for LinderaKoreanAnalyzer {
    fn morphs(&self, text: &str) -> Vec<(String, String)> {
        let mut tokens = match self.tokenizer.tokenize(text) {
            Ok(t) => t,
            Err(_) => return Vec::new(),
        };
        tokens
            .iter_mut()
            .map(|token| {
                let surface = token.text.to_string();
                let tag = token
                    .details()
                    .first()
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                (surface, tag)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_tags_korean_nouns() {
        let Some(analyzer) = LinderaKoreanAnalyzer::new() else {
            return;
        };
        let morphs = analyzer.morphs("예산 계획");
        assert!(morphs.iter().any(|(s, t)| s == "예산" && t.starts_with("NN")));
    }
}
