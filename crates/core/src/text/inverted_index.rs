//! Positional inverted index over document titles and bodies.
//!
//! Maps each token to the documents containing it, with the token positions
//! inside each document, so the same structure answers term, prefix and
//! phrase queries and feeds BM25 term frequencies. Documents are identified by
//! internal u32 keys assigned by the store.

use crate::config;
use crate::text::tokenizer::tokenize;
use std::collections::{BTreeMap, HashMap};

/// Postings for one term: doc key → ascending token positions.
pub type Postings = HashMap<u32, Vec<u32>>;

/// Inverted index mapping terms to positional postings.
///
/// Terms are kept in a `BTreeMap` so prefix queries are a range scan.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    /// term → postings
    index: BTreeMap<String, Postings>,
    /// doc key → document length (number of tokens)
    doc_lengths: HashMap<u32, u32>,
    /// Sum of all document lengths (for average calculation)
    total_doc_length: u64,
}

impl InvertedIndex {
    /// Creates a new empty inverted index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document's title and body under `key`.
    ///
    /// Body positions start after the title plus [`config::FIELD_POSITION_GAP`].
    pub fn add_document(&mut self, key: u32, title: &str, body: &str) {
        let mut len = 0u32;
        for (term, position) in positioned_tokens(title, body) {
            self.index
                .entry(term)
                .or_default()
                .entry(key)
                .or_default()
                .push(position);
            len += 1;
        }
        self.doc_lengths.insert(key, len);
        self.total_doc_length += len as u64;
    }

    /// Remove a document previously added with the same title and body.
    ///
    /// Only the terms of that text are visited; removing an unknown key is a no-op.
    pub fn remove_document(&mut self, key: u32, title: &str, body: &str) {
        let Some(len) = self.doc_lengths.remove(&key) else {
            return;
        };
        self.total_doc_length -= len as u64;

        for (term, _) in positioned_tokens(title, body) {
            if let Some(postings) = self.index.get_mut(&term) {
                postings.remove(&key);
                if postings.is_empty() {
                    self.index.remove(&term);
                }
            }
        }
    }

    /// Returns the postings of an exact term.
    pub fn postings(&self, term: &str) -> Option<&Postings> {
        self.index.get(term)
    }

    /// Iterates over every term starting with `prefix`, with its postings.
    pub fn prefix_postings<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Postings)> + 'a {
        self.index
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(term, _)| term.starts_with(prefix))
            .map(|(term, postings)| (term.as_str(), postings))
    }

    /// Number of indexed documents.
    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.index.len()
    }

    /// Token count of one document, 0 if unknown.
    pub fn doc_length(&self, key: u32) -> u32 {
        self.doc_lengths.get(&key).copied().unwrap_or(0)
    }

    /// Returns the average document length across all indexed documents.
    pub fn average_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            return 0.0;
        }
        self.total_doc_length as f32 / self.doc_lengths.len() as f32
    }
}

/// Tokens of title then body, each paired with its position.
fn positioned_tokens(title: &str, body: &str) -> Vec<(String, u32)> {
    let title_tokens = tokenize(title);
    let body_tokens = tokenize(body);
    let body_start = title_tokens.len() as u32 + config::FIELD_POSITION_GAP;

    let mut out = Vec::with_capacity(title_tokens.len() + body_tokens.len());
    out.extend(
        title_tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32)),
    );
    out.extend(
        body_tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), body_start + i as u32)),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_document_updates_index() {
        let mut idx = InvertedIndex::new();
        idx.add_document(0, "Quick", "the brown fox");
        assert_eq!(idx.doc_count(), 1);
        assert!(idx.postings("quick").is_some());
        assert!(idx.postings("the").is_some());
        assert!(idx.postings("fox").is_some());
        assert!(idx.postings("Quick").is_none());
    }

    #[test]
    fn test_positions_and_field_gap() {
        let mut idx = InvertedIndex::new();
        idx.add_document(7, "hello world", "hello again");
        let hello = idx.postings("hello").unwrap();
        // title: hello=0 world=1; body starts at 2 + gap
        assert_eq!(hello[&7], vec![0, 2 + config::FIELD_POSITION_GAP]);
        assert_eq!(idx.doc_length(7), 4);
    }

    #[test]
    fn test_remove_document() {
        let mut idx = InvertedIndex::new();
        idx.add_document(0, "", "hello world");
        idx.add_document(1, "", "hello rust");
        idx.remove_document(0, "", "hello world");
        assert_eq!(idx.doc_count(), 1);
        assert!(idx.postings("world").is_none());
        let hello = idx.postings("hello").unwrap();
        assert_eq!(hello.len(), 1);
        assert!(hello.contains_key(&1));
    }

    #[test]
    fn test_remove_nonexistent_doc() {
        let mut idx = InvertedIndex::new();
        idx.add_document(0, "", "hello world");
        idx.remove_document(99, "", "hello world"); // should not panic
        assert_eq!(idx.doc_count(), 1);
        assert_eq!(idx.postings("hello").unwrap().len(), 1);
    }

    #[test]
    fn test_prefix_postings() {
        let mut idx = InvertedIndex::new();
        idx.add_document(0, "", "help helsinki hello other");
        let mut terms: Vec<&str> = idx.prefix_postings("hel").map(|(t, _)| t).collect();
        terms.sort_unstable();
        assert_eq!(terms, vec!["hello", "help", "helsinki"]);
        assert_eq!(idx.prefix_postings("zzz").count(), 0);
    }

    #[test]
    fn test_average_doc_length() {
        let mut idx = InvertedIndex::new();
        assert_eq!(idx.average_doc_length(), 0.0);
        idx.add_document(0, "", "one two three");
        idx.add_document(1, "", "four five six seven eight");
        assert_eq!(idx.average_doc_length(), 4.0);
        idx.remove_document(1, "", "four five six seven eight");
        assert_eq!(idx.average_doc_length(), 3.0);
    }
}
