use unicode_segmentation::UnicodeSegmentation;

use crate::models::Message;

/// Average characters per token used for estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Character-based token estimates. Not exact; used for size reporting.
pub struct TokenCounter;

impl TokenCounter {
    pub fn count_text(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.graphemes(true).count();
        char_count.div_ceil(CHARS_PER_TOKEN).max(1)
    }

    pub fn count_messages(messages: &[Message]) -> usize {
        messages
            .iter()
            .flat_map(|msg| msg.parts.iter())
            .filter_map(|part| part.as_text())
            .map(Self::count_text)
            .sum()
    }

    /// Estimated prompt size for a query plus its prepared context.
    pub fn count_prompt(query: &str, context: &str) -> usize {
        Self::count_text(query) + Self::count_text(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_text() {
        assert_eq!(TokenCounter::count_text("Hello world"), 3);
        assert_eq!(TokenCounter::count_text("abc"), 1);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(TokenCounter::count_text(""), 0);
    }

    #[test]
    fn test_graphemes_not_bytes() {
        // Four graphemes, many more bytes
        assert_eq!(TokenCounter::count_text("日本語テ"), 1);
    }

    #[test]
    fn test_count_messages() {
        let messages = vec![Message::user("What is RAG?"), Message::agent("Retrieval")];
        assert_eq!(TokenCounter::count_messages(&messages), 3 + 3);
    }
}
