//! Rescan strategy: recount the whole corpus on every selection.
//!
//! Holds no state between merges, so it is always correct and serves as
//! the reference the incremental index is checked against. Counting is
//! sharded over corpus entries with rayon; merging per-thread tallies is
//! order independent because ranking is a total order.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    candidate::{self, CandidateIndex, Rewrite, SelectOptions},
    config::Strategy,
    corpus::CorpusStore,
    types::{TokenPair, Weight},
    vocab::TokenTable,
};

#[derive(Debug, Default)]
pub(crate) struct RescanIndex;

impl RescanIndex {
    pub(crate) fn new() -> Self {
        Self
    }
}

/// Tallies every entry of `corpus` in parallel.
pub(crate) fn tally_corpus(corpus: &dyn CorpusStore) -> HashMap<TokenPair, Weight> {
    (0..corpus.len())
        .into_par_iter()
        .fold(HashMap::new, |mut counts, slot| {
            if let Some(content) = corpus.content(slot) {
                candidate::tally_into(content, &mut counts);
            }
            counts
        })
        .reduce(HashMap::new, |mut left, right| {
            for (pair, count) in right {
                *left.entry(pair).or_insert(0) += count;
            }
            left
        })
}

impl CandidateIndex for RescanIndex {
    fn strategy(&self) -> Strategy {
        Strategy::Rescan
    }

    fn entry_added(&mut self, _slot: usize, _content: &str) {}

    fn best(
        &mut self,
        corpus: &dyn CorpusStore,
        vocab: &TokenTable,
        opts: &SelectOptions,
    ) -> Option<(TokenPair, Weight)> {
        let counts = tally_corpus(corpus);
        candidate::select_best(&counts, vocab, opts)
    }

    fn affected_slots(&self, _pair: TokenPair) -> Option<Vec<usize>> {
        None
    }

    fn merge_applied(&mut self, _pair: TokenPair, _rewrites: &[Rewrite]) {}

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, corpus::MemoryCorpus, types::TokenId};

    fn codes(ids: &[TokenId]) -> String {
        ids.iter()
            .map(|&id| codec::encode(id).expect("small ids have codes"))
            .collect()
    }

    #[test]
    fn test_tally_sums_across_entries() {
        let mut corpus = MemoryCorpus::new();
        corpus.insert(0, codes(&[0, 1, 0])).expect("id 0 is new");
        corpus.insert(1, codes(&[0, 1])).expect("id 1 is new");
        corpus.insert(2, String::new()).expect("id 2 is new");

        let counts = tally_corpus(&corpus);
        assert_eq!(counts.get(&TokenPair(0, 1)), Some(&2));
        assert_eq!(counts.get(&TokenPair(1, 0)), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_best_on_empty_corpus() {
        let corpus = MemoryCorpus::new();
        let vocab = TokenTable::new(None);
        let mut index = RescanIndex::new();
        assert_eq!(index.best(&corpus, &vocab, &SelectOptions::default()), None);
        assert_eq!(index.affected_slots(TokenPair(0, 0)), None);
    }
}
