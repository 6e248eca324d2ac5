//! Incremental strategy: pair counts kept live across merges.
//!
//! Counts are built once at ingestion and then corrected only for the
//! entries a merge rewrote. Selection pops a lazy max-heap: entries whose
//! count no longer matches the live count are stale and dropped.
//!
//! Each pair also remembers the slots it was seen in. The set is a
//! superset: slots are added whenever the pair appears and never removed
//! until the pair itself is merged away. Rescanning a slot that no longer
//! holds the pair finds nothing and leaves it untouched.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use crate::{
    candidate::{self, CandidateIndex, Rewrite, SelectOptions},
    config::Strategy,
    corpus::CorpusStore,
    types::{TokenPair, Weight},
    vocab::TokenTable,
};

/// Stale items tolerated per tracked pair before the heap is rebuilt.
const HEAP_SLACK: usize = 4;

/// Heap size below which stale items are never cleaned up.
const MIN_HEAP_REBUILD: usize = 64;

/// Live statistics of one pair.
#[derive(Debug, Default)]
struct PairStats {
    /// Non-overlapping occurrences across the corpus.
    count: Weight,
    /// Slots the pair was last known to occur in.
    slots: HashSet<usize>,
}

/// Item in the max heap of candidate pairs.
///
/// May be stale after a merge, so `count` must be validated against
/// `pairs` before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    count: Weight,
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Best candidate at the top: highest count, then lowest id sum.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        candidate::rank_key(self.pair, self.count)
            .cmp(&candidate::rank_key(other.pair, other.count))
    }
}

#[derive(Debug, Default)]
pub(crate) struct IncrementalIndex {
    /// Source of truth for counts and affected slots.
    pairs: HashMap<TokenPair, PairStats>,

    /// Max heap of (count, pair). Contains stale entries.
    heap: BinaryHeap<HeapItem>,
}

impl IncrementalIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live count of `pair`.
    #[cfg(test)]
    fn count(&self, pair: TokenPair) -> Weight {
        self.pairs.get(&pair).map_or(0, |s| s.count)
    }

    /// Adds `added` and removes `removed` occurrences of `pair` seen in `slot`.
    fn adjust(&mut self, pair: TokenPair, slot: usize, added: Weight, removed: Weight) {
        if added == 0 && removed == 0 {
            return;
        }
        let stats = self.pairs.entry(pair).or_default();
        if added > 0 {
            stats.slots.insert(slot);
        }
        let count = (stats.count + added).saturating_sub(removed);
        if count != stats.count {
            stats.count = count;
            if count > 0 {
                self.heap.push(HeapItem { count, pair });
                if self.heap.len() > HEAP_SLACK * self.pairs.len() + MIN_HEAP_REBUILD {
                    self.rebuild_heap();
                }
            }
        }
    }

    /// Replaces the heap with exactly one item per live pair.
    fn rebuild_heap(&mut self) {
        self.pairs.retain(|_, stats| stats.count > 0);
        self.heap = self
            .pairs
            .iter()
            .map(|(&pair, stats)| HeapItem {
                count: stats.count,
                pair,
            })
            .collect();
    }

    fn is_live(&self, item: &HeapItem) -> bool {
        item.count > 0
            && self
                .pairs
                .get(&item.pair)
                .is_some_and(|stats| stats.count == item.count)
    }
}

impl CandidateIndex for IncrementalIndex {
    fn strategy(&self) -> Strategy {
        Strategy::Incremental
    }

    fn entry_added(&mut self, slot: usize, content: &str) {
        for (pair, count) in candidate::tally(content) {
            self.adjust(pair, slot, count, 0);
        }
    }

    fn best(
        &mut self,
        _corpus: &dyn CorpusStore,
        vocab: &TokenTable,
        opts: &SelectOptions,
    ) -> Option<(TokenPair, Weight)> {
        // Live items too long for this call stay in the heap for later calls.
        let mut too_long = Vec::new();

        let found = loop {
            let Some(item) = self.heap.pop() else {
                break None;
            };
            if !self.is_live(&item) {
                continue;
            }
            if !candidate::fits_length(item.pair, vocab, opts.max_length) {
                too_long.push(item);
                continue;
            }
            break Some(item);
        };
        self.heap.extend(too_long);

        let item = found?;
        let best = (item.pair, item.count);
        self.heap.push(item);

        (best.1 >= opts.min_weight).then_some(best)
    }

    fn affected_slots(&self, pair: TokenPair) -> Option<Vec<usize>> {
        let mut slots: Vec<usize> = self
            .pairs
            .get(&pair)
            .map(|stats| stats.slots.iter().copied().collect())
            .unwrap_or_default();
        slots.sort_unstable();
        Some(slots)
    }

    fn merge_applied(&mut self, pair: TokenPair, rewrites: &[Rewrite]) {
        for rewrite in rewrites {
            let before = candidate::tally(&rewrite.before);
            let after = candidate::tally(&rewrite.after);

            // Only neighbours of a merged occurrence change, but a
            // self-pair run shifts its whole parity, so diff the full tallies.
            for (&p, &removed) in &before {
                let added = after.get(&p).copied().unwrap_or(0);
                self.adjust(p, rewrite.slot, added, removed);
            }
            for (&p, &added) in &after {
                if !before.contains_key(&p) {
                    self.adjust(p, rewrite.slot, added, 0);
                }
            }
        }

        self.pairs.remove(&pair);
    }

    fn reset(&mut self) {
        self.pairs.clear();
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, corpus::MemoryCorpus, rescan, types::TokenId};

    fn codes(ids: &[TokenId]) -> String {
        ids.iter()
            .map(|&id| codec::encode(id).expect("small ids have codes"))
            .collect()
    }

    fn vocab(chars: &[&str]) -> TokenTable {
        let mut table = TokenTable::new(None);
        for c in chars {
            table
                .create_token((*c).to_string(), 1)
                .expect("code space available");
        }
        table
    }

    #[test]
    fn test_heap_orders_by_count_then_id_sum() {
        let mut heap = BinaryHeap::new();
        heap.push(HeapItem { count: 2, pair: TokenPair(1, 2) });
        heap.push(HeapItem { count: 2, pair: TokenPair(1, 1) });
        heap.push(HeapItem { count: 1, pair: TokenPair(0, 0) });
        assert_eq!(heap.pop().map(|i| i.pair), Some(TokenPair(1, 1)));
        assert_eq!(heap.pop().map(|i| i.pair), Some(TokenPair(1, 2)));
        assert_eq!(heap.pop().map(|i| i.pair), Some(TokenPair(0, 0)));
    }

    #[test]
    fn test_merge_updates_match_full_recount() {
        // a a a b d a a a b a c
        let table = vocab(&["a", "b", "d", "c", "aa"]);
        let mut corpus = MemoryCorpus::new();
        let mut index = IncrementalIndex::new();

        let content = codes(&[0, 0, 0, 1, 2, 0, 0, 0, 1, 0, 3]);
        let slot = corpus.insert(0, content.clone()).expect("id 0 is new");
        index.entry_added(slot, &content);

        let best = index.best(&corpus, &table, &SelectOptions::default());
        assert_eq!(best, Some((TokenPair(0, 0), 2)));
        assert_eq!(index.affected_slots(TokenPair(0, 0)), Some(vec![0]));

        // merge (a, a) into token 4
        let after = content.replace(&codes(&[0, 0]), &codes(&[4]));
        corpus.rewrite(slot, after.clone());
        index.merge_applied(
            TokenPair(0, 0),
            &[Rewrite {
                slot,
                before: content,
                after,
            }],
        );

        let recount = rescan::tally_corpus(&corpus);
        for (pair, count) in &recount {
            assert_eq!(index.count(*pair), *count, "pair {pair:?}");
        }
        assert_eq!(index.count(TokenPair(0, 0)), 0);
        assert_eq!(index.affected_slots(TokenPair(0, 0)), Some(Vec::new()));
    }

    #[test]
    fn test_self_pair_run_parity_after_merge() {
        // x x x x x  ->  xx xx x
        let table = vocab(&["x", "xx"]);
        let mut index = IncrementalIndex::new();
        let before = codes(&[0, 0, 0, 0, 0]);
        index.entry_added(0, &before);
        assert_eq!(index.count(TokenPair(0, 0)), 2);

        let after = codes(&[1, 1, 0]);
        index.merge_applied(
            TokenPair(0, 0),
            &[Rewrite {
                slot: 0,
                before,
                after,
            }],
        );
        assert_eq!(index.count(TokenPair(1, 1)), 1);
        assert_eq!(index.count(TokenPair(1, 0)), 1);

        let corpus = MemoryCorpus::new();
        let opts = SelectOptions {
            min_weight: 1,
            max_length: None,
        };
        // equal counts: lower id sum wins
        assert_eq!(index.best(&corpus, &table, &opts), Some((TokenPair(1, 0), 1)));
    }

    #[test]
    fn test_too_long_candidates_are_kept_for_later() {
        let table = vocab(&["x", "xx"]);
        let corpus = MemoryCorpus::new();
        let mut index = IncrementalIndex::new();
        index.entry_added(0, &codes(&[1, 1, 1, 1, 0, 0]));

        let capped = SelectOptions {
            min_weight: 1,
            max_length: Some(2),
        };
        assert_eq!(index.best(&corpus, &table, &capped), Some((TokenPair(0, 0), 1)));

        let open = SelectOptions {
            min_weight: 1,
            max_length: None,
        };
        assert_eq!(index.best(&corpus, &table, &open), Some((TokenPair(1, 1), 2)));
    }

    #[test]
    fn test_reset_forgets_everything() {
        let table = vocab(&["x"]);
        let corpus = MemoryCorpus::new();
        let mut index = IncrementalIndex::new();
        index.entry_added(0, &codes(&[0, 0, 0, 0]));
        index.reset();
        assert_eq!(index.best(&corpus, &table, &SelectOptions::default()), None);
    }

    #[test]
    fn test_heap_stays_bounded_under_churn() {
        let table = vocab(&["x", "y"]);
        let corpus = MemoryCorpus::new();
        let mut index = IncrementalIndex::new();
        index.entry_added(0, &codes(&[0, 1]));
        index.entry_added(1, &codes(&[1, 0]));

        for _ in 0..1_000 {
            index.adjust(TokenPair(0, 1), 2, 1, 0);
            index.adjust(TokenPair(0, 1), 2, 0, 1);
        }
        assert!(index.heap.len() <= HEAP_SLACK * index.pairs.len() + MIN_HEAP_REBUILD + 1);

        let opts = SelectOptions {
            min_weight: 1,
            max_length: None,
        };
        assert_eq!(index.best(&corpus, &table, &opts), Some((TokenPair(0, 1), 1)));
        assert_eq!(index.affected_slots(TokenPair(0, 1)), Some(vec![0, 2]));
    }

    #[test]
    fn test_rebuild_drops_exhausted_pairs() {
        let mut index = IncrementalIndex::new();
        index.entry_added(0, &codes(&[0, 1, 2]));
        index.adjust(TokenPair(0, 1), 0, 0, 1);
        index.rebuild_heap();

        assert_eq!(index.heap.len(), 1);
        assert_eq!(index.count(TokenPair(0, 1)), 0);
        assert_eq!(index.count(TokenPair(1, 2)), 1);
    }
}
