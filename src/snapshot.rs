//! Versioned vocabulary snapshots.
//!
//! Version 2 is the only layout written:
//!
//! ```text
//! { "version": 2,
//!   "sentinel": "\u0004" | null,
//!   "token_table": [[chars, weight, original_weight], ...],
//!   "merge_codes": [[a_code, b_code, c_code], ...] }
//! ```
//!
//! Version 1 stored only single-character tokens as `[chars, original_weight]`
//! and merges as `[a_code, b_code, c_weight]`, with the code of a token being
//! the code point equal to its index. It is migrated to version 2 when read.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    codec,
    config::DEFAULT_SENTINEL,
    error::SnapshotError,
    types::{EntryId, TokenId, Weight},
};

/// Layout version written by [`Snapshot`].
pub const SNAPSHOT_VERSION: u64 = 2;

/// Serialized vocabulary: token table plus merges in application order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub sentinel: Option<char>,
    /// `(chars, weight, original_weight)` in creation order.
    pub token_table: Vec<(String, Weight, Weight)>,
    /// `(a_code, b_code, c_code)` in application order.
    pub merge_codes: Vec<(char, char, char)>,
}

/// Version 1 layout.
#[derive(Debug, Deserialize)]
struct LegacySnapshot {
    token_table: Vec<(String, Weight)>,
    merge_codes: Vec<(char, char, Weight)>,
}

/// A snapshot together with the corpus it was trained on, in code form.
///
/// Resuming from it needs neither the raw corpus nor a re-ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSnapshot {
    pub vocabulary: Snapshot,
    /// `(entry id, content in code)` in slot order.
    pub corpus: Vec<(EntryId, String)>,
}

fn invalid(e: impl std::fmt::Display) -> SnapshotError {
    SnapshotError::InvalidFormat(e.to_string())
}

/// Reads the `version` field and dispatches to the matching layout.
fn from_value(value: Value) -> Result<Snapshot, SnapshotError> {
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("missing or non-integer version"))?;

    match version {
        SNAPSHOT_VERSION => serde_json::from_value(value).map_err(invalid),
        1 => {
            let legacy: LegacySnapshot = serde_json::from_value(value).map_err(invalid)?;
            migrate_legacy(legacy)
        }
        other => Err(invalid(format!("unsupported version {other}"))),
    }
}

/// Rewrites a version 1 snapshot into the current layout.
///
/// Composite weights are recomputed by replaying the merges, so the result
/// carries the same numbers a live run would have produced.
fn migrate_legacy(legacy: LegacySnapshot) -> Result<Snapshot, SnapshotError> {
    // token index -> (chars, weight, original_weight)
    let mut tokens: Vec<(String, Weight, Weight)> = legacy
        .token_table
        .into_iter()
        .map(|(chars, weight)| (chars, weight, weight))
        .collect();

    let legacy_index = |code: char| code as TokenId;
    let mut merge_codes = Vec::with_capacity(legacy.merge_codes.len());

    for (a_code, b_code, c_weight) in legacy.merge_codes {
        let (a, b) = (legacy_index(a_code), legacy_index(b_code));
        let (Some(a_chars), Some(b_chars)) = (
            tokens.get(a).map(|t| t.0.clone()),
            tokens.get(b).map(|t| t.0.clone()),
        ) else {
            return Err(invalid(format!(
                "merge references unknown code U+{:04X} or U+{:04X}",
                a_code as u32, b_code as u32
            )));
        };

        let c = tokens.len();
        for side in [a, b] {
            if let Some(token) = tokens.get_mut(side) {
                token.1 = token.1.saturating_sub(c_weight);
            }
        }
        tokens.push((a_chars + &b_chars, c_weight, c_weight));

        merge_codes.push((
            codec::encode(a).map_err(invalid)?,
            codec::encode(b).map_err(invalid)?,
            codec::encode(c).map_err(invalid)?,
        ));
    }

    let sentinel = tokens
        .first()
        .filter(|(chars, _, _)| chars.chars().eq([DEFAULT_SENTINEL]))
        .map(|_| DEFAULT_SENTINEL);

    Ok(Snapshot {
        version: SNAPSHOT_VERSION,
        sentinel,
        token_table: tokens,
        merge_codes,
    })
}

impl Snapshot {
    /// Parses a snapshot of any supported version.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] for text that is not JSON and
    /// [`SnapshotError::InvalidFormat`] for an unknown version or a layout
    /// that does not match the version.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(json)?;
        from_value(value)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Save snapshot to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

impl TrainingSnapshot {
    /// Parses a training snapshot; its vocabulary may be of any version.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut value: Value = serde_json::from_str(json)?;
        let vocabulary = value
            .get_mut("vocabulary")
            .map(Value::take)
            .ok_or_else(|| invalid("missing vocabulary"))?;
        let corpus = value
            .get_mut("corpus")
            .map(Value::take)
            .ok_or_else(|| invalid("missing corpus"))?;

        Ok(Self {
            vocabulary: from_value(vocabulary)?,
            corpus: serde_json::from_value(corpus).map_err(invalid)?,
        })
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
