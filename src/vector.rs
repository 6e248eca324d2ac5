//! Dense renumbering of the tokens that still carry weight.
//!
//! Tokens fully absorbed into larger merges keep their id but get no
//! vector index, so vectors index a compact `[0, active_count)` range.

use crate::{
    types::{TokenId, VectorIndex},
    vocab::TokenTable,
};

/// Forward and inverse maps between token ids and vector indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMap {
    /// Table epoch the maps were built against.
    epoch: u64,
    /// token id -> vector index; `None` for zero-weight tokens.
    forward: Vec<Option<VectorIndex>>,
    /// vector index -> token id.
    inverse: Vec<TokenId>,
}

impl VectorMap {
    /// Numbers every non-zero weight token of `vocab` in id order.
    ///
    /// Returns `None` if the table holds no token besides the sentinel.
    pub(crate) fn build(vocab: &TokenTable) -> Option<Self> {
        if !vocab.has_content() {
            return None;
        }

        let mut forward = Vec::with_capacity(vocab.len());
        let mut inverse = Vec::new();
        for token in vocab.iter() {
            if token.weight > 0 {
                forward.push(Some(inverse.len()));
                inverse.push(token.id);
            } else {
                forward.push(None);
            }
        }

        Some(Self {
            epoch: vocab.active_epoch(),
            forward,
            inverse,
        })
    }

    /// Whether no token became active or inactive since the build.
    pub(crate) fn is_current(&self, vocab: &TokenTable) -> bool {
        self.epoch == vocab.active_epoch()
    }

    /// Vector index of token `id`, if it is active.
    pub fn index_of(&self, id: TokenId) -> Option<VectorIndex> {
        self.forward.get(id).copied().flatten()
    }

    /// Token id at vector index `index`.
    pub fn token_at(&self, index: VectorIndex) -> Option<TokenId> {
        self.inverse.get(index).copied()
    }

    /// Number of active tokens.
    pub fn len(&self) -> usize {
        self.inverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }
}
