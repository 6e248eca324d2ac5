//! Trainer configuration.

use crate::{candidate::SelectOptions, types::Weight};

/// End-of-text marker wrapped around every ingested entry by default.
pub const DEFAULT_SENTINEL: char = '\u{4}';

/// How merge candidates are tracked between merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Recount every adjacent pair of the whole corpus on each selection.
    Rescan,
    /// Keep pair counts live and touch only entries affected by a merge.
    #[default]
    Incremental,
}

/// Construction-time settings of a tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerConfig {
    pub strategy: Strategy,
    /// Boundary token created as id 0; `None` disables entry wrapping.
    pub sentinel: Option<char>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            sentinel: Some(DEFAULT_SENTINEL),
        }
    }
}

impl TrainerConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_sentinel(mut self, sentinel: Option<char>) -> Self {
        self.sentinel = sentinel;
        self
    }
}

/// Stop conditions of [`crate::BPETokenizer::merge_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Stop once the best candidate occurs fewer times than this.
    pub min_weight: Weight,
    /// Skip candidates whose composite would exceed this many characters.
    pub max_length: Option<usize>,
    /// Stop after this many merges.
    pub max_iterations: Option<usize>,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            min_weight: 2,
            max_length: None,
            max_iterations: None,
            show_progress: false,
        }
    }
}

impl MergeOptions {
    /// The selection thresholds alone.
    pub fn select(&self) -> SelectOptions {
        SelectOptions {
            min_weight: self.min_weight,
            max_length: self.max_length,
        }
    }
}
