//! Full-text search: tokenizer, positional inverted index, query parser and BM25 ranking.

/// Positional inverted index over title and body tokens.
pub mod inverted_index;
/// Query parser (terms, phrases, prefixes, AND/OR/NOT) and evaluator.
pub mod query;
/// BM25 Okapi relevance scoring.
pub mod scorer;
/// Literal lowercase tokenizer.
pub mod tokenizer;

pub use inverted_index::InvertedIndex;
pub use query::{QueryNode, TextQuery};
pub use scorer::bm25_scores;
pub use tokenizer::tokenize;
