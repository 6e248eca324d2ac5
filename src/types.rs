//! Type aliases and shared types for vocabulary training and encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

/// Stable identity of a token in the vocabulary.
///
/// Ids are assigned sequentially from 0 in creation order and are never
/// reassigned, even after the token's weight drops to zero.
pub type TokenId = usize;

/// Occurrence count of a token or a pair across the corpus.
pub type Weight = u64;

/// Caller-supplied identity of a corpus entry.
pub type EntryId = u64;

/// Dense position of an active (non-zero weight) token in the compacted
/// vector space.
pub type VectorIndex = usize;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub(crate) type MergeOrder = usize;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenPair(pub TokenId, pub TokenId);

impl TokenPair {
    /// Whether both sides are the same token, e.g. `(x, x)`.
    pub fn is_self_pair(&self) -> bool {
        self.0 == self.1
    }

    /// Combined id used to break ties between equally frequent pairs.
    pub(crate) fn id_sum(&self) -> usize {
        self.0 + self.1
    }
}
