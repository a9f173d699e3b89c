//! Equality index over document metadata pairs and tag membership.

use crate::document::Document;
use std::collections::{HashMap, HashSet};

/// Maps `key → value → doc keys` and `tag → doc keys`.
#[derive(Debug, Default)]
pub struct MetadataIndex {
    pairs: HashMap<String, HashMap<String, HashSet<u32>>>,
    tags: HashMap<String, HashSet<u32>>,
}

impl MetadataIndex {
    /// Creates a new empty metadata index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every metadata pair and tag of `doc` under `key`.
    pub fn add_document(&mut self, key: u32, doc: &Document) {
        for (k, v) in &doc.metadata {
            self.pairs
                .entry(k.clone())
                .or_default()
                .entry(v.clone())
                .or_default()
                .insert(key);
        }
        for tag in &doc.tags {
            self.tags.entry(tag.clone()).or_default().insert(key);
        }
    }

    /// Removes the entries `add_document` created for the same document.
    pub fn remove_document(&mut self, key: u32, doc: &Document) {
        for (k, v) in &doc.metadata {
            if let Some(values) = self.pairs.get_mut(k) {
                if let Some(keys) = values.get_mut(v) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        values.remove(v);
                    }
                }
                if values.is_empty() {
                    self.pairs.remove(k);
                }
            }
        }
        for tag in &doc.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    /// Doc keys whose `metadata[key] == value`.
    pub fn lookup(&self, key: &str, value: &str) -> Option<&HashSet<u32>> {
        self.pairs.get(key).and_then(|values| values.get(value))
    }

    /// Doc keys carrying `tag`.
    pub fn tagged(&self, tag: &str) -> Option<&HashSet<u32>> {
        self.tags.get(tag)
    }

    /// Number of distinct metadata keys.
    pub fn key_count(&self) -> usize {
        self.pairs.len()
    }

    /// Number of distinct tags.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }
}
