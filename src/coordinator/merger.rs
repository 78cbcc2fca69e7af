//! Merging ordered partial results from several shards.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::vector::SearchHit;

/// Head of one shard's list inside the merge heap.
#[derive(Debug)]
struct Head {
    hit: SearchHit,
    source: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: best (distance, id) on top
        other
            .hit
            .rank_cmp(&self.hit)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Global top-`k` from per-shard k-NN answers.
///
/// Each list is put in (distance, id) order, then the lists are merged with
/// a heap over their heads. An id reported by more than one shard appears
/// once, at its best rank.
pub fn merge_knn(lists: Vec<Vec<SearchHit>>, k: usize) -> Vec<SearchHit> {
    let mut sources: Vec<std::vec::IntoIter<SearchHit>> = lists
        .into_iter()
        .map(|mut list| {
            list.sort_by(SearchHit::rank_cmp);
            list.into_iter()
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(sources.len());
    for (source, iter) in sources.iter_mut().enumerate() {
        if let Some(hit) = iter.next() {
            heap.push(Head { hit, source });
        }
    }

    let mut merged = Vec::with_capacity(k);
    let mut seen = HashSet::new();
    while merged.len() < k {
        let Some(Head { hit, source }) = heap.pop() else {
            break;
        };
        if let Some(next) = sources[source].next() {
            heap.push(Head { hit: next, source });
        }
        if seen.insert(hit.id.clone()) {
            merged.push(hit);
        }
    }
    merged
}

/// Union of per-shard range answers in (distance, id) order.
pub fn merge_range(lists: Vec<Vec<SearchHit>>) -> Vec<SearchHit> {
    let mut merged: Vec<SearchHit> = lists.into_iter().flatten().collect();
    merged.sort_by(SearchHit::rank_cmp);
    let mut seen = HashSet::with_capacity(merged.len());
    merged.retain(|hit| seen.insert(hit.id.clone()));
    merged
}
