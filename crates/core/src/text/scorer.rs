//! BM25 Okapi relevance scoring.
//!
//! Ranks an already-matched candidate set against the positive terms of a
//! query using the BM25 formula with `k1` and `b` from [`crate::config`].
//! Matching and scoring are separate: scoring never adds or drops documents.

use crate::config;
use crate::text::inverted_index::InvertedIndex;
use std::collections::{HashMap, HashSet};

/// BM25 score of every candidate. Candidates containing none of the terms score 0.
pub fn bm25_scores(
    index: &InvertedIndex,
    terms: &[String],
    candidates: &HashSet<u32>,
) -> HashMap<u32, f32> {
    let mut scores: HashMap<u32, f32> = candidates.iter().map(|&k| (k, 0.0)).collect();
    if terms.is_empty() || candidates.is_empty() || index.doc_count() == 0 {
        return scores;
    }

    let avgdl = index.average_doc_length().max(f32::EPSILON);
    let n = index.doc_count() as f32;
    let k1 = config::BM25_K1;
    let b = config::BM25_B;

    for term in terms {
        let Some(postings) = index.postings(term) else {
            continue;
        };
        let df = postings.len() as f32;
        // IDF: log((N - df + 0.5) / (df + 0.5) + 1)
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        for (key, score) in scores.iter_mut() {
            let Some(positions) = postings.get(key) else {
                continue;
            };
            let tf = positions.len() as f32;
            let dl = index.doc_length(*key) as f32;
            let tf_norm = (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl));
            *score += idf * tf_norm;
        }
    }
    scores
}
