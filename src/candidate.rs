//! Merge candidates and the contract shared by both candidate indices.
//!
//! A candidate is an ordered pair of adjacent tokens together with its
//! number of non-overlapping occurrences. Selection ranks candidates by a
//! total order so every strategy, and every parallel reduction, picks the
//! same pair:
//!
//! 1. highest count,
//! 2. lowest `a.id + b.id`,
//! 3. lowest `a.id`, then lowest `b.id`.

use std::{cmp::Reverse, collections::HashMap, fmt};

use crate::{
    codec,
    config::Strategy,
    corpus::CorpusStore,
    types::{TokenId, TokenPair, Weight},
    vocab::TokenTable,
};

/// A pair selected for merging, with the identity its composite will take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCandidate {
    /// The `(a, b)` pair; `a` is immediately followed by `b`.
    pub pair: TokenPair,
    /// Non-overlapping occurrences of the pair across the corpus.
    pub count: Weight,
    /// Id reserved for the composite token `a + b`.
    pub composite_id: TokenId,
}

impl MergeCandidate {
    pub fn left(&self) -> TokenId {
        self.pair.0
    }

    pub fn right(&self) -> TokenId {
        self.pair.1
    }
}

/// Thresholds applied when selecting the next merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOptions {
    /// Candidates seen fewer times are rejected.
    pub min_weight: Weight,
    /// Candidates whose composite would be longer (in characters) are skipped.
    pub max_length: Option<usize>,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            min_weight: 2,
            max_length: None,
        }
    }
}

/// Sort key of a candidate: greater is better.
pub(crate) type RankKey = (Weight, Reverse<usize>, Reverse<TokenId>, Reverse<TokenId>);

pub(crate) fn rank_key(pair: TokenPair, count: Weight) -> RankKey {
    (count, Reverse(pair.id_sum()), Reverse(pair.0), Reverse(pair.1))
}

/// Whether the composite of `pair` fits within `max_length`.
pub(crate) fn fits_length(pair: TokenPair, vocab: &TokenTable, max_length: Option<usize>) -> bool {
    let Some(max) = max_length else {
        return true;
    };
    let len = |id| vocab.get(id).map_or(0, |t| t.char_len());
    len(pair.0) + len(pair.1) <= max
}

/// Adds the pair occurrences of one code string to `counts`.
///
/// Counting is greedy left to right: once `(x, x)` is counted, the second
/// `x` cannot start another `(x, x)`, so `x x x` yields one occurrence.
/// This is exactly what a left-to-right substring rewrite consumes.
pub(crate) fn tally_into(content: &str, counts: &mut HashMap<TokenPair, Weight>) {
    let mut prev: Option<TokenId> = None;
    // whether `prev` was consumed as the right side of a counted self-pair
    let mut prev_paired = false;

    for id in content.chars().filter_map(|c| codec::decode(c).ok()) {
        if let Some(p) = prev {
            let pair = TokenPair(p, id);
            if pair.is_self_pair() && prev_paired {
                prev_paired = false;
            } else {
                *counts.entry(pair).or_insert(0) += 1;
                prev_paired = pair.is_self_pair();
            }
        }
        prev = Some(id);
    }
}

/// Pair occurrences of one code string.
pub(crate) fn tally(content: &str) -> HashMap<TokenPair, Weight> {
    let mut counts = HashMap::new();
    tally_into(content, &mut counts);
    counts
}

/// One corpus entry rewritten by a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rewrite {
    pub slot: usize,
    pub before: String,
    pub after: String,
}

/// Tracks adjacent-pair frequencies and selects the next merge.
///
/// Both strategies see the same calls in the same order, so they can be
/// swapped by configuration without changing results.
pub(crate) trait CandidateIndex: Send + Sync + fmt::Debug {
    fn strategy(&self) -> Strategy;

    /// A new entry was stored at `slot`.
    fn entry_added(&mut self, slot: usize, content: &str);

    /// Best eligible pair and its count, or `None` if nothing qualifies.
    fn best(
        &mut self,
        corpus: &dyn CorpusStore,
        vocab: &TokenTable,
        opts: &SelectOptions,
    ) -> Option<(TokenPair, Weight)>;

    /// Slots that may contain `pair`, or `None` when the index keeps no
    /// such record and the whole store must be searched.
    fn affected_slots(&self, pair: TokenPair) -> Option<Vec<usize>>;

    /// `pair` was merged and `rewrites` lists every entry that changed.
    fn merge_applied(&mut self, pair: TokenPair, rewrites: &[Rewrite]);

    /// Forget everything, e.g. after the corpus was cleared.
    fn reset(&mut self);
}

/// Picks the best eligible pair out of a complete tally.
pub(crate) fn select_best<'a>(
    counts: impl IntoIterator<Item = (&'a TokenPair, &'a Weight)>,
    vocab: &TokenTable,
    opts: &SelectOptions,
) -> Option<(TokenPair, Weight)> {
    let (pair, count) = counts
        .into_iter()
        .filter(|&(&pair, &count)| count > 0 && fits_length(pair, vocab, opts.max_length))
        .max_by_key(|&(&pair, &count)| rank_key(pair, count))
        .map(|(&pair, &count)| (pair, count))?;

    if count < opts.min_weight {
        return None;
    }
    Some((pair, count))
}
