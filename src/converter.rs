//! Applies learned merge rules to token sequences.
//!
//! Rules are applied in the order they were learned. A merge of `(a, b)`
//! during training rewrites the corpus left to right, each match consuming
//! both positions; encoding must reproduce exactly that, otherwise text
//! seen during training would tokenize differently afterwards.
//!
//! Instead of one pass over the sequence per rule, candidate positions sit
//! in a priority queue keyed by merge order, then position. Popping it
//! applies all occurrences of the earliest rule from left to right before
//! any later rule, which is the same result at O(N log N).

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use crate::{
    error::DecodeError,
    types::{MergeOrder, TokenId, TokenPair},
    vocab::TokenTable,
};

/// A pair position waiting in the queue.
#[derive(Debug, PartialEq, Eq)]
struct PendingMerge {
    /// Lower values have higher priority.
    merge_order: MergeOrder,

    pair: TokenPair,

    /// Position in the sequence where the pair starts.
    position: usize,
}

impl PartialOrd for PendingMerge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingMerge {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour: earliest rule, then leftmost position.
        other
            .merge_order
            .cmp(&self.merge_order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Ordered merge rules of a vocabulary.
#[derive(Debug, Clone, Default)]
pub(crate) struct BPEConverter {
    /// pair -> (composite, merge order).
    merges: HashMap<TokenPair, (TokenId, MergeOrder)>,

    /// Rules in learning order.
    history: Vec<(TokenPair, TokenId)>,
}

impl BPEConverter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends the rule learned most recently.
    pub(crate) fn push(&mut self, pair: TokenPair, composite: TokenId) {
        let merge_order = self.history.len();
        self.merges.entry(pair).or_insert((composite, merge_order));
        self.history.push((pair, composite));
    }

    pub(crate) fn history(&self) -> &[(TokenPair, TokenId)] {
        &self.history
    }

    pub(crate) fn num_merges(&self) -> usize {
        self.history.len()
    }

    /// Applies every rule to `tokens`, earliest rule first.
    pub(crate) fn encode(&self, tokens: Vec<TokenId>) -> Vec<TokenId> {
        if tokens.len() <= 1 || self.merges.is_empty() {
            return tokens;
        }

        let mut heap = BinaryHeap::new();
        for (position, window) in tokens.windows(2).enumerate() {
            let pair = TokenPair(window[0], window[1]);
            if let Some(&(_, merge_order)) = self.merges.get(&pair) {
                heap.push(PendingMerge {
                    merge_order,
                    pair,
                    position,
                });
            }
        }

        // None marks a position absorbed into its left neighbour.
        let mut slots: Vec<Option<TokenId>> = tokens.into_iter().map(Some).collect();

        while let Some(pending) = heap.pop() {
            let pos = pending.position;
            let Some(left) = slots.get(pos).copied().flatten() else {
                continue;
            };
            let Some(right_idx) = next_live(&slots, pos) else {
                continue;
            };
            let Some(right) = slots.get(right_idx).copied().flatten() else {
                continue;
            };
            if pending.pair != TokenPair(left, right) {
                continue;
            }
            let Some(&(composite, _)) = self.merges.get(&pending.pair) else {
                continue;
            };

            slots[pos] = Some(composite);
            slots[right_idx] = None;

            if let Some(prev) = prev_live(&slots, pos) {
                self.queue_pair(&mut heap, &slots, prev, pos);
            }
            if let Some(next) = next_live(&slots, pos) {
                self.queue_pair(&mut heap, &slots, pos, next);
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Queues the pair starting at `left_idx` if a rule exists for it.
    fn queue_pair(
        &self,
        heap: &mut BinaryHeap<PendingMerge>,
        slots: &[Option<TokenId>],
        left_idx: usize,
        right_idx: usize,
    ) {
        let (Some(&Some(left)), Some(&Some(right))) = (slots.get(left_idx), slots.get(right_idx))
        else {
            return;
        };
        let pair = TokenPair(left, right);
        if let Some(&(_, merge_order)) = self.merges.get(&pair) {
            heap.push(PendingMerge {
                merge_order,
                pair,
                position: left_idx,
            });
        }
    }

    /// Concatenates the text of `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an id outside `vocab`.
    pub(crate) fn decode(&self, vocab: &TokenTable, tokens: &[TokenId]) -> Result<String, DecodeError> {
        let mut text = String::new();
        for &id in tokens {
            let token = vocab.get(id).ok_or(DecodeError::UnknownToken(id))?;
            text.push_str(&token.chars);
        }
        Ok(text)
    }
}

fn next_live(slots: &[Option<TokenId>], pos: usize) -> Option<usize> {
    (pos + 1..slots.len()).find(|&i| slots[i].is_some())
}

fn prev_live(slots: &[Option<TokenId>], pos: usize) -> Option<usize> {
    (0..pos).rev().find(|&i| slots[i].is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(history: &[((TokenId, TokenId), TokenId)]) -> BPEConverter {
        let mut converter = BPEConverter::new();
        for &((a, b), c) in history {
            converter.push(TokenPair(a, b), c);
        }
        converter
    }

    /// Reference: one global left-to-right substring rewrite per rule.
    fn encode_by_rewrite(history: &[((TokenId, TokenId), TokenId)], tokens: &[TokenId]) -> Vec<TokenId> {
        let mut seq = tokens.to_vec();
        for &((a, b), c) in history {
            let mut out = Vec::with_capacity(seq.len());
            let mut i = 0;
            while i < seq.len() {
                if i + 1 < seq.len() && seq[i] == a && seq[i + 1] == b {
                    out.push(c);
                    i += 2;
                } else {
                    out.push(seq[i]);
                    i += 1;
                }
            }
            seq = out;
        }
        seq
    }

    #[test]
    fn test_basic_encoding() {
        let converter = converter(&[((0, 1), 2), ((2, 0), 3)]);
        assert_eq!(converter.encode(vec![0, 1, 0]), vec![3]);
    }

    #[test]
    fn test_single_token_no_change() {
        let converter = converter(&[((0, 1), 2)]);
        assert_eq!(converter.encode(vec![7]), vec![7]);
    }

    #[test]
    fn test_no_merge_rules_apply() {
        let converter = converter(&[((5, 6), 7)]);
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_merge_skips_consumed_left() {
        let converter = converter(&[((0, 1), 4), ((2, 3), 5), ((4, 5), 6)]);
        assert_eq!(converter.encode(vec![0, 1, 2, 3]), vec![6]);
    }

    #[test]
    fn test_self_pair_run_left_to_right() {
        let history = [((0, 0), 1), ((1, 1), 2)];
        let converter = converter(&history);
        // 9 x: xx xx xx xx x -> xxxx xxxx x
        assert_eq!(converter.encode(vec![0; 9]), vec![2, 2, 0]);
        // 3 x: xx x, never x xx
        assert_eq!(converter.encode(vec![0; 3]), vec![1, 0]);
    }

    #[test]
    fn test_matches_ordered_rewrite() {
        // a=0 b=1 d=2 c=3: aa=4 ab=5 aaab=6
        let history = [((0, 0), 4), ((0, 1), 5), ((4, 5), 6)];
        let converter = converter(&history);
        let inputs: [&[TokenId]; 4] = [
            &[0, 0, 0, 1, 2, 0, 0, 0, 1, 0, 3],
            &[0, 0, 0, 0, 0, 1, 1],
            &[1, 0, 1, 0, 0, 1],
            &[0, 1, 0, 0, 0, 0, 1],
        ];
        for tokens in inputs {
            assert_eq!(
                converter.encode(tokens.to_vec()),
                encode_by_rewrite(&history, tokens),
                "input {tokens:?}"
            );
        }
        assert_eq!(
            converter.encode(vec![0, 0, 0, 1, 2, 0, 0, 0, 1, 0, 3]),
            vec![6, 2, 6, 0, 3]
        );
    }

    #[test]
    fn test_history_keeps_order() {
        let converter = converter(&[((0, 1), 2), ((2, 0), 3)]);
        assert_eq!(converter.num_merges(), 2);
        assert_eq!(
            converter.history(),
            &[(TokenPair(0, 1), 2), (TokenPair(2, 0), 3)]
        );
    }

    #[test]
    fn test_decode_tokens() {
        let mut vocab = TokenTable::new(None);
        vocab.create_token("a".to_string(), 1).expect("code space available");
        vocab.create_token("b".to_string(), 1).expect("code space available");
        vocab.create_token("ab".to_string(), 1).expect("code space available");
        let converter = converter(&[((0, 1), 2)]);

        let text = converter.decode(&vocab, &[2, 0]).expect("ids are known");
        assert_eq!(text, "aba");
        assert!(matches!(
            converter.decode(&vocab, &[0, 9]),
            Err(DecodeError::UnknownToken(9))
        ));
    }
}
