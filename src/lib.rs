//! Byte-pair-encoding vocabulary trainer.
//!
//! Text is ingested into a corpus of single-character tokens. Training then
//! repeatedly merges the most frequent adjacent pair into a new token,
//! either by recounting every pair ([`Strategy::Rescan`]) or by keeping
//! live pair counts and touching only affected entries
//! ([`Strategy::Incremental`]). Both select the same merges.
//!
//! Trained vocabularies encode text losslessly, renumber their still-used
//! tokens into a compact vector index, and persist as versioned JSON
//! snapshots. An append-only merge log lets an interrupted run resume
//! where it stopped.
//!
//! Python bindings are available behind the `python` feature.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod candidate;
pub mod codec;
mod config;
mod converter;
mod corpus;
mod error;
mod incremental;
mod merge_log;
mod rescan;
mod snapshot;
mod tokenizer;
mod types;
mod vector;
mod vocab;

#[cfg(feature = "python")]
mod python;

pub use candidate::{MergeCandidate, SelectOptions};
pub use config::{DEFAULT_SENTINEL, MergeOptions, Strategy, TrainerConfig};
pub use corpus::{CorpusStore, MemoryCorpus};
pub use error::{
    CorpusError, DecodeError, EncodeError, MergeError, MergeLogError, SnapshotError, VocabError,
};
pub use merge_log::{MergeLog, MergeRecord, parse_merge_log, read_merge_log};
pub use snapshot::{SNAPSHOT_VERSION, Snapshot, TrainingSnapshot};
pub use tokenizer::BPETokenizer;
pub use types::{EntryId, TokenId, TokenPair, VectorIndex, Weight};
pub use vector::VectorMap;
pub use vocab::{Token, TokenTable};
