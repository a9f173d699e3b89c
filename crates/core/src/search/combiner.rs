//! Query combiner: intersects per-filter candidate sets, orders and pages the result.

use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

/// How the matched documents are ordered.
#[derive(Debug)]
pub enum Ranking {
    /// BM25 score, highest first.
    Relevance(HashMap<u32, f32>),
    /// Distance in kilometers, nearest first.
    Distance(HashMap<u32, f64>),
    /// Document id, ascending.
    Id,
}

/// Intersection of every supplied candidate set, smallest first.
///
/// Returns `None` when no set was supplied, so the caller can apply the
/// "no filters means every document" policy instead of returning nothing.
pub fn intersect(mut sets: Vec<HashSet<u32>>) -> Option<HashSet<u32>> {
    if sets.is_empty() {
        return None;
    }
    sets.sort_unstable_by_key(|s| s.len());
    let mut iter = sets.into_iter();
    let mut acc = iter.next()?;
    for set in iter {
        if acc.is_empty() {
            break;
        }
        acc.retain(|k| set.contains(k));
    }
    Some(acc)
}

/// Orders matched keys by `ranking`, breaking ties by document id.
pub fn rank<'a, F>(matched: HashSet<u32>, ranking: &Ranking, id_of: F) -> Vec<u32>
where
    F: Fn(u32) -> &'a str,
{
    let mut keys: Vec<u32> = matched.into_iter().collect();
    let by_id = |a: &u32, b: &u32| id_of(*a).cmp(id_of(*b));
    match ranking {
        Ranking::Relevance(scores) => keys.sort_by(|a, b| {
            let sa = Reverse(OrderedFloat(scores.get(a).copied().unwrap_or(0.0)));
            let sb = Reverse(OrderedFloat(scores.get(b).copied().unwrap_or(0.0)));
            sa.cmp(&sb).then_with(|| by_id(a, b))
        }),
        Ranking::Distance(distances) => keys.sort_by(|a, b| {
            let da = OrderedFloat(distances.get(a).copied().unwrap_or(f64::INFINITY));
            let db = OrderedFloat(distances.get(b).copied().unwrap_or(f64::INFINITY));
            da.cmp(&db).then_with(|| by_id(a, b))
        }),
        Ranking::Id => keys.sort_by(|a, b| by_id(a, b)),
    }
    keys
}

/// Applies `offset` and an optional `limit` to an ordered list.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}
