//! Error types for vocabulary training, encoding and persistence.
//!
//! Every error here is a deterministic function of the caller's input or of
//! the engine state; retrying without changing the input reproduces it.

use std::{error::Error, fmt, io};

use indicatif::style::TemplateError;

use crate::types::{EntryId, TokenId, VectorIndex};

/// Errors raised by the token table and the symbol codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    /// Every code point usable as a token code is taken.
    CodeSpaceExhausted,
    /// A code symbol does not belong to any token of the table.
    UnknownTokenCode(char),
    /// Token id outside the table bounds.
    UnknownToken(TokenId),
    /// Character that has no single-character token.
    UnknownSymbol(char),
}

impl fmt::Display for VocabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeSpaceExhausted => write!(f, "no code symbol left for a new token"),
            Self::UnknownTokenCode(c) => write!(f, "unknown token code: U+{:04X}", *c as u32),
            Self::UnknownToken(id) => write!(f, "unknown token id: {id}"),
            Self::UnknownSymbol(c) => write!(f, "unknown symbol: {c:?}"),
        }
    }
}

impl Error for VocabError {}

/// Errors that can occur when adding or restoring corpus entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusError {
    /// Entry id was already ingested.
    DuplicateEntry(EntryId),
    /// Restored content contains a character the vocabulary never saw.
    UnknownSymbol(char),
    /// Token table rejected a new token.
    Vocab(VocabError),
    /// Storage backend failed to persist an entry.
    Store(String),
}

impl fmt::Display for CorpusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateEntry(id) => write!(f, "corpus entry {id} already added"),
            Self::UnknownSymbol(c) => write!(f, "unknown symbol: {c:?}"),
            Self::Vocab(e) => write!(f, "{e}"),
            Self::Store(msg) => write!(f, "corpus store failed: {msg}"),
        }
    }
}

impl Error for CorpusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Vocab(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VocabError> for CorpusError {
    fn from(e: VocabError) -> Self {
        match e {
            VocabError::UnknownSymbol(c) => Self::UnknownSymbol(c),
            other => Self::Vocab(other),
        }
    }
}

/// Errors that can occur during text encoding.
#[derive(Debug)]
pub enum EncodeError {
    /// Character absent from the trained vocabulary.
    UnknownSymbol(char),
    /// Vector compaction attempted before any token exists.
    EmptyVocabulary,
    /// Encoding produced a token whose weight is zero, so it has no
    /// vector index.
    InactiveToken(TokenId),
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSymbol(c) => write!(f, "unknown symbol: {c:?}"),
            Self::EmptyVocabulary => {
                write!(f, "token table is empty, add content to the corpus first")
            }
            Self::InactiveToken(id) => write!(f, "token {id} has zero weight and no vector index"),
            Self::ProgressBarSetup(msg) => write!(f, "template parsing failed: {msg}"),
        }
    }
}

impl Error for EncodeError {}

/// Errors that can occur during token or vector decoding.
#[derive(Debug)]
pub enum DecodeError {
    /// Vector index outside the compacted range.
    UnknownVectorIndex(VectorIndex),
    /// Token id not found in vocabulary.
    UnknownToken(TokenId),
    /// Vector compaction attempted before any token exists.
    EmptyVocabulary,
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownVectorIndex(i) => write!(f, "unknown vector index: {i}"),
            Self::UnknownToken(t) => write!(f, "unknown token id: {t}"),
            Self::EmptyVocabulary => {
                write!(f, "token table is empty, add content to the corpus first")
            }
            Self::ProgressBarSetup(msg) => write!(f, "template parsing failed: {msg}"),
        }
    }
}

impl Error for DecodeError {}

/// Errors that can occur when selecting, applying or restoring a merge.
#[derive(Debug)]
pub enum MergeError {
    /// The composite token of a candidate does not hold the next free id.
    ///
    /// Raised when a candidate outlives the state it was selected from.
    MissingTokenIdentity {
        /// Id the table would assign next.
        expected: TokenId,
        /// Id reserved by the candidate.
        found: TokenId,
    },
    /// Merge record references a code outside the vocabulary.
    UnknownTokenCode(char),
    /// Candidate references a token id outside the vocabulary.
    UnknownToken(TokenId),
    /// Token table rejected the composite token.
    Vocab(VocabError),
    /// Appending to the merge log failed; the merge itself is applied.
    Log(io::Error),
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTokenIdentity { expected, found } => write!(
                f,
                "composite token has no valid identity: reserved id {found}, next id is {expected}"
            ),
            Self::UnknownTokenCode(c) => write!(f, "unknown token code: U+{:04X}", *c as u32),
            Self::UnknownToken(id) => write!(f, "unknown token id: {id}"),
            Self::Vocab(e) => write!(f, "{e}"),
            Self::Log(e) => write!(f, "failed to append merge log: {e}"),
            Self::ProgressBarSetup(msg) => write!(f, "template parsing failed: {msg}"),
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Vocab(e) => Some(e),
            Self::Log(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VocabError> for MergeError {
    fn from(e: VocabError) -> Self {
        match e {
            VocabError::UnknownTokenCode(c) => Self::UnknownTokenCode(c),
            VocabError::UnknownToken(id) => Self::UnknownToken(id),
            other => Self::Vocab(other),
        }
    }
}

/// Errors that can occur when importing or exporting a snapshot.
#[derive(Debug)]
pub enum SnapshotError {
    /// Unsupported version, malformed arrays or inconsistent content.
    InvalidFormat(String),
    /// Snapshot text is not valid JSON for the expected layout.
    Json(serde_json::Error),
    /// Reading or writing the snapshot file failed.
    Io(io::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(msg) => write!(f, "invalid snapshot format: {msg}"),
            Self::Json(e) => write!(f, "invalid snapshot json: {e}"),
            Self::Io(e) => write!(f, "snapshot io failed: {e}"),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::InvalidFormat(_) => None,
        }
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors that can occur when reading or replaying a merge log.
#[derive(Debug)]
pub enum MergeLogError {
    /// Opening, reading or appending the log file failed.
    Io(io::Error),
    /// A complete line could not be parsed as a merge record.
    Parse {
        /// 1-based line number.
        line: usize,
        source: serde_json::Error,
    },
    /// A parsed record could not be re-applied.
    Merge(MergeError),
}

impl fmt::Display for MergeLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "merge log io failed: {e}"),
            Self::Parse { line, source } => write!(f, "invalid merge log line {line}: {source}"),
            Self::Merge(e) => write!(f, "merge log replay failed: {e}"),
        }
    }
}

impl Error for MergeLogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
            Self::Merge(e) => Some(e),
        }
    }
}

impl From<io::Error> for MergeLogError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MergeError> for MergeLogError {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}
