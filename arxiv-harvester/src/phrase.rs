use unicode_segmentation::UnicodeSegmentation;

/// Word-level phrase containment.
///
/// Both sides are split into Unicode words, so `"token"` does not match
/// inside `"tokenizer"` and punctuation never takes part in a match.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseMatcher;

impl PhraseMatcher {
    pub fn tokenize(text: &str, case_insensitive: bool) -> Vec<String> {
        text.unicode_words()
            .map(|w| if case_insensitive { w.to_lowercase() } else { w.to_string() })
            .collect()
    }

    /// True when the words of `phrase` occur contiguously in `text`.
    /// An empty phrase matches nothing.
    pub fn contains_phrase(text: &str, phrase: &str, case_insensitive: bool) -> bool {
        let phrase_words = Self::tokenize(phrase, case_insensitive);
        if phrase_words.is_empty() {
            return false;
        }
        let text_words = Self::tokenize(text, case_insensitive);
        text_words
            .windows(phrase_words.len())
            .any(|window| window == phrase_words.as_slice())
    }
}
