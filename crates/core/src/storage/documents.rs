//! In-memory document store and its secondary indexes.
//!
//! Documents are addressed internally by a dense `u32` key; keys of deleted
//! documents are recycled through a free list. The text, spatial and
//! metadata indexes all speak in those keys, and the string id is only
//! resolved when results are returned.

use crate::document::Document;
use crate::metadata::MetadataIndex;
use crate::search::{self, Ranking, SearchQuery, SpatialFilter};
use crate::spatial::SpatialIndex;
use crate::storage::wal::WalEntry;
use crate::text::{bm25_scores, InvertedIndex, TextQuery};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// All live documents plus every index over them.
#[derive(Debug, Default)]
pub struct DocumentStore {
    slots: Vec<Option<Arc<Document>>>,
    keys: HashMap<String, u32>,
    free: Vec<u32>,
    text: InvertedIndex,
    spatial: SpatialIndex,
    metadata: MetadataIndex,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot's document list.
    pub fn from_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut store = Self::new();
        for doc in documents {
            store.upsert(doc);
        }
        store
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no document is stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    /// Looks up a document by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Document>> {
        let key = *self.keys.get(id)?;
        self.slot(key)
    }

    /// Iterates every live document in key order.
    pub fn documents(&self) -> impl Iterator<Item = &Arc<Document>> {
        self.slots.iter().flatten()
    }

    /// Resolves an internal key to its document id.
    pub fn id_of(&self, key: u32) -> Option<&str> {
        self.slot(key).map(|doc| doc.id.as_str())
    }

    /// The text index, for diagnostics.
    pub fn text_index(&self) -> &InvertedIndex {
        &self.text
    }

    /// The metadata and tag index, for diagnostics.
    pub fn metadata_index(&self) -> &MetadataIndex {
        &self.metadata
    }

    /// Number of documents with a location.
    pub fn located_count(&self) -> usize {
        self.spatial.len()
    }

    fn slot(&self, key: u32) -> Option<&Arc<Document>> {
        self.slots.get(key as usize).and_then(Option::as_ref)
    }

    /// Inserts or fully replaces a document. Returns `true` if it replaced one.
    pub fn upsert(&mut self, doc: Document) -> bool {
        let replaced = self.remove(&doc.id);
        let key = match self.free.pop() {
            Some(key) => key,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };
        self.text.add_document(key, &doc.title, &doc.body);
        if let Some(location) = doc.location {
            self.spatial.insert(key, location);
        }
        self.metadata.add_document(key, &doc);
        self.keys.insert(doc.id.clone(), key);
        self.slots[key as usize] = Some(Arc::new(doc));
        replaced
    }

    /// Removes a document from the store and every index. Returns `true` if it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(key) = self.keys.remove(id) else {
            return false;
        };
        if let Some(doc) = self.slots[key as usize].take() {
            self.text.remove_document(key, &doc.title, &doc.body);
            self.spatial.remove(key);
            self.metadata.remove_document(key, &doc);
        }
        self.free.push(key);
        true
    }

    /// Applies one log entry. Returns `true` if a document was replaced or removed.
    pub fn apply(&mut self, entry: WalEntry) -> bool {
        match entry {
            WalEntry::Upsert { document } => self.upsert(document),
            WalEntry::Delete { id } => self.remove(&id),
        }
    }

    /// Every live key.
    pub fn all_keys(&self) -> HashSet<u32> {
        self.keys.values().copied().collect()
    }

    /// Keys of documents whose title or body matches `query`.
    pub fn text_search(&self, query: &TextQuery) -> HashSet<u32> {
        let universe = if query.has_negation() {
            self.all_keys()
        } else {
            HashSet::new()
        };
        query.evaluate(&self.text, &universe)
    }

    /// Keys and distances of documents within the filter's radius.
    pub fn spatial_search(&self, filter: &SpatialFilter) -> Vec<(u32, f64)> {
        self.spatial.within(filter.center, filter.radius_km)
    }

    /// Keys of documents with `metadata[key] == value`.
    pub fn metadata_search(&self, key: &str, value: &str) -> HashSet<u32> {
        self.metadata.lookup(key, value).cloned().unwrap_or_default()
    }

    /// Keys of documents carrying `tag`.
    pub fn tag_search(&self, tag: &str) -> HashSet<u32> {
        self.metadata.tagged(tag).cloned().unwrap_or_default()
    }

    /// Runs every filter of `query`, intersects the results and returns the
    /// ordered, paged document ids.
    pub fn search(&self, query: &SearchQuery) -> Vec<String> {
        let mut sets = Vec::new();
        let mut distances = None;

        if let Some(spatial) = &query.spatial {
            let hits = self.spatial_search(spatial);
            sets.push(hits.iter().map(|(key, _)| *key).collect());
            distances = Some(hits.into_iter().collect::<HashMap<u32, f64>>());
        }
        for (key, value) in &query.metadata {
            sets.push(self.metadata_search(key, value));
        }
        for tag in &query.tags {
            sets.push(self.tag_search(tag));
        }
        if let Some(text) = &query.text {
            sets.push(self.text_search(text));
        }

        let matched = search::intersect(sets).unwrap_or_else(|| self.all_keys());

        let ranking = match (&query.text, distances) {
            (Some(text), _) => {
                let terms = text.scoring_terms(&self.text);
                Ranking::Relevance(bm25_scores(&self.text, &terms, &matched))
            }
            (None, Some(distances)) => Ranking::Distance(distances),
            (None, None) => Ranking::Id,
        };

        let ordered = search::rank(matched, &ranking, |key| self.id_of(key).unwrap_or(""));
        search::paginate(ordered, query.offset, query.limit)
            .into_iter()
            .filter_map(|key| self.id_of(key).map(str::to_owned))
            .collect()
    }

    /// Checks that the id map, the slots and every index agree.
    pub fn validate(&self) -> Result<(), String> {
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        if live != self.keys.len() {
            return Err(format!(
                "{} live slots but {} ids mapped",
                live,
                self.keys.len()
            ));
        }
        if live + self.free.len() != self.slots.len() {
            return Err(format!(
                "{} live + {} free != {} slots",
                live,
                self.free.len(),
                self.slots.len()
            ));
        }
        for (id, &key) in &self.keys {
            match self.slot(key) {
                Some(doc) if doc.id == *id => {}
                _ => return Err(format!("id '{}' maps to a wrong or empty slot {}", id, key)),
            }
        }
        if self.text.doc_count() != live {
            return Err(format!(
                "text index holds {} documents, store holds {}",
                self.text.doc_count(),
                live
            ));
        }
        let located = self.documents().filter(|d| d.location.is_some()).count();
        if self.spatial.len() != located {
            return Err(format!(
                "spatial index holds {} points, store has {} located documents",
                self.spatial.len(),
                located
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::GeoPoint;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint { lat, lon }
    }

    fn sample() -> DocumentStore {
        DocumentStore::from_documents([
            Document::new("1")
                .with_title("Hello")
                .with_body("Hello world")
                .with_metadata("foo", "bar")
                .with_tag("greeting")
                .with_location(p(40.0, -74.0)),
            Document::new("2")
                .with_title("Hello again")
                .with_body("hello hello hello")
                .with_metadata("foo", "baz")
                .with_location(p(40.05, -74.0)),
            Document::new("3")
                .with_title("Goodbye")
                .with_body("see you later")
                .with_metadata("foo", "bar")
                .with_tag("greeting"),
        ])
    }

    fn run(store: &DocumentStore, query: SearchQuery) -> Vec<String> {
        store.search(&query)
    }

    #[test]
    fn test_no_filters_returns_everything_by_id() {
        let store = sample();
        assert_eq!(run(&store, SearchQuery::new()), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_text_search_ranks_by_relevance() {
        let store = sample();
        let q = SearchQuery::new().with_text(TextQuery::parse("hello").unwrap());
        assert_eq!(run(&store, q), vec!["2", "1"]);
    }

    #[test]
    fn test_filters_are_intersected() {
        let store = sample();
        let q = SearchQuery::new()
            .with_text(TextQuery::parse("hello").unwrap())
            .with_metadata("foo", "bar");
        assert_eq!(run(&store, q), vec!["1"]);

        let q = SearchQuery::new()
            .with_metadata("foo", "bar")
            .with_tag("greeting");
        assert_eq!(run(&store, q), vec!["1", "3"]);
    }

    #[test]
    fn test_text_and_spatial_are_intersected() {
        let store = DocumentStore::from_documents([
            Document::new("A").with_body("apple"),
            Document::new("B")
                .with_body("banana")
                .with_location(p(40.0, -74.0)),
        ]);
        let around_b = SpatialFilter::new(40.0, -74.0, 1.0).unwrap();

        let q = SearchQuery::new()
            .with_text(TextQuery::parse("apple").unwrap())
            .with_spatial(around_b);
        assert!(run(&store, q).is_empty());

        let q = SearchQuery::new()
            .with_text(TextQuery::parse("banana").unwrap())
            .with_spatial(around_b);
        assert_eq!(run(&store, q), vec!["B"]);
    }

    #[test]
    fn test_spatial_results_nearest_first() {
        let store = sample();
        let filter = SpatialFilter::new(40.06, -74.0, 10.0).unwrap();
        let q = SearchQuery::new().with_spatial(filter);
        assert_eq!(run(&store, q), vec!["2", "1"]);
    }

    #[test]
    fn test_unknown_metadata_matches_nothing() {
        let store = sample();
        assert!(run(&store, SearchQuery::new().with_metadata("nope", "x")).is_empty());
        assert!(run(&store, SearchQuery::new().with_tag("nope")).is_empty());
    }

    #[test]
    fn test_replace_updates_every_index() {
        let mut store = sample();
        let replaced = store.upsert(
            Document::new("1")
                .with_title("Replaced")
                .with_body("entirely new text")
                .with_metadata("foo", "qux"),
        );
        assert!(replaced);
        assert_eq!(store.len(), 3);

        let q = SearchQuery::new().with_text(TextQuery::parse("world").unwrap());
        assert!(run(&store, q).is_empty());
        assert_eq!(run(&store, SearchQuery::new().with_metadata("foo", "qux")), vec!["1"]);
        assert_eq!(run(&store, SearchQuery::new().with_metadata("foo", "bar")), vec!["3"]);
        let near = SpatialFilter::new(40.0, -74.0, 1.0).unwrap();
        assert!(run(&store, SearchQuery::new().with_spatial(near)).is_empty());
        assert_eq!(store.validate(), Ok(()));
    }

    #[test]
    fn test_remove_and_key_reuse() {
        let mut store = sample();
        assert!(store.remove("2"));
        assert!(!store.remove("2"));
        assert!(!store.contains("2"));
        store.upsert(Document::new("4").with_body("fresh"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.validate(), Ok(()));
        let q = SearchQuery::new().with_text(TextQuery::parse("hello").unwrap());
        assert_eq!(run(&store, q), vec!["1"]);
    }

    #[test]
    fn test_negated_text_query() {
        let store = sample();
        let q = SearchQuery::new().with_text(TextQuery::parse("NOT hello").unwrap());
        assert_eq!(run(&store, q), vec!["3"]);
    }

    #[test]
    fn test_paging() {
        let store = sample();
        assert_eq!(
            run(&store, SearchQuery::new().with_page(1, Some(1))),
            vec!["2"]
        );
    }

    #[test]
    fn test_apply_log_entries() {
        let mut store = DocumentStore::new();
        assert!(!store.apply(WalEntry::Upsert {
            document: Document::new("a"),
        }));
        assert!(store.apply(WalEntry::Delete { id: "a".into() }));
        assert!(store.is_empty());
    }
}
