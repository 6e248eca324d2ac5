//! Append-only merge log.
//!
//! Each applied merge is written as one JSON array line,
//! `["a_code","b_code",c_weight]`. A crash can leave the last line half
//! written; readers drop everything after the final newline, and opening
//! the log for appending truncates that tail first so new records start on
//! a fresh line.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::warn;

use crate::{error::MergeLogError, types::Weight};

/// Compact merge record: codes of both sides and the composite's weight.
pub type MergeRecord = (char, char, Weight);

/// Open merge log positioned for appending.
#[derive(Debug)]
pub struct MergeLog {
    path: PathBuf,
    file: File,
}

impl MergeLog {
    /// Opens or creates the log at `path`, dropping a partial trailing line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MergeLogError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let complete = complete_len(&bytes);
        if complete < bytes.len() {
            warn!(
                "dropping {} bytes of partial merge record at end of {}",
                bytes.len() - complete,
                path.display()
            );
            file.set_len(complete as u64)?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and flushes it.
    pub fn append(&mut self, record: &MergeRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.flush()
    }
}

/// Length of the prefix made of complete lines.
fn complete_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1)
}

/// Parses every complete line of `bytes`.
///
/// Returns the records and the number of trailing bytes ignored.
pub fn parse_merge_log(bytes: &[u8]) -> Result<(Vec<MergeRecord>, usize), MergeLogError> {
    let complete = complete_len(bytes);
    let mut records = Vec::new();

    for (i, line) in bytes[..complete].split(|&b| b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record = serde_json::from_slice(line)
            .map_err(|source| MergeLogError::Parse { line: i + 1, source })?;
        records.push(record);
    }

    let discarded = bytes.len() - complete;
    if discarded > 0 {
        warn!("ignoring {discarded} bytes of partial merge record");
    }
    Ok((records, discarded))
}

/// Reads all complete records of the log at `path`.
pub fn read_merge_log(path: impl AsRef<Path>) -> Result<Vec<MergeRecord>, MergeLogError> {
    let bytes = fs::read(path)?;
    parse_merge_log(&bytes).map(|(records, _)| records)
}
