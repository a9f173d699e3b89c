//! Literal tokenizer for titles, bodies and query terms.
//!
//! Lowercases the text (full Unicode case folding via `to_lowercase`) and
//! splits on every non-alphanumeric character. There is no stemming, no stop
//! word list and no minimum token length: a token in a query matches exactly
//! the same token in a document, so `Hello` is found by `hello`.

/// Tokenized text: owns the lowercased buffer, provides &str slices via byte spans.
/// Only 1 heap allocation (the lowercased String) instead of N per-token Strings.
pub struct Tokens {
    buffer: String,
    spans: Vec<(u32, u32)>, // (start, end) byte offsets into buffer
}

impl Tokens {
    /// Returns an iterator over the token `&str` slices in text order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.spans
            .iter()
            .map(|&(s, e)| &self.buffer[s as usize..e as usize])
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Returns `true` if there are no tokens.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Collects the tokens into owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric.
pub fn tokenize(text: &str) -> Tokens {
    let buffer = text.to_lowercase();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in buffer.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            spans.push((s as u32, i as u32));
        }
    }
    if let Some(s) = start {
        spans.push((s as u32, buffer.len() as u32));
    }

    Tokens { buffer, spans }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let tokens = tokenize("Hello, World! it's 2024");
        let words: Vec<&str> = tokens.iter().collect();
        assert_eq!(words, vec!["hello", "world", "it", "s", "2024"]);
    }

    #[test]
    fn test_tokenize_keeps_short_and_common_words() {
        let tokens = tokenize("The a I");
        assert_eq!(tokens.to_vec(), vec!["the", "a", "i"]);
    }

    #[test]
    fn test_tokenize_unicode() {
        let tokens = tokenize("Ärger über Straße");
        assert_eq!(tokens.to_vec(), vec!["ärger", "über", "straße"]);
    }

    #[test]
    fn test_tokenize_punctuation_only() {
        assert!(tokenize("--- !!! ...").is_empty());
        assert_eq!(tokenize("").len(), 0);
    }
}
