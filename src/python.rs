//! Python bindings, built with the `python` feature.

use std::fmt::Display;

use pyo3::{
    exceptions::{PyIOError, PyValueError},
    prelude::*,
};

use crate::{
    candidate::SelectOptions,
    config::{DEFAULT_SENTINEL, MergeOptions, Strategy, TrainerConfig},
    error::{MergeLogError, SnapshotError},
    tokenizer::BPETokenizer,
    types::{EntryId, TokenId, VectorIndex, Weight},
};

fn value_error(e: impl Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn snapshot_error(e: SnapshotError) -> PyErr {
    match e {
        SnapshotError::Io(e) => PyIOError::new_err(e.to_string()),
        other => value_error(other),
    }
}

fn merge_log_error(e: MergeLogError) -> PyErr {
    match e {
        MergeLogError::Io(e) => PyIOError::new_err(e.to_string()),
        other => value_error(other),
    }
}

/// Python wrapper for the vocabulary trainer.
#[pyclass(name = "BPETokenizer")]
pub struct PyBPETokenizer {
    inner: BPETokenizer,
}

#[pymethods]
impl PyBPETokenizer {
    #[new]
    #[pyo3(signature = (strategy = "incremental", sentinel = Some(DEFAULT_SENTINEL)))]
    fn new(strategy: &str, sentinel: Option<char>) -> PyResult<Self> {
        let strategy = match strategy {
            "incremental" => Strategy::Incremental,
            "rescan" => Strategy::Rescan,
            other => return Err(value_error(format!("unknown strategy: {other:?}"))),
        };
        let config = TrainerConfig { strategy, sentinel };
        Ok(Self {
            inner: BPETokenizer::with_config(config),
        })
    }

    #[pyo3(signature = (text, id = None))]
    fn add_to_corpus(&mut self, text: &str, id: Option<EntryId>) -> PyResult<EntryId> {
        self.inner.add_to_corpus(id, text).map_err(value_error)
    }

    #[pyo3(signature = (text, id = None))]
    fn restore_to_corpus(&mut self, text: &str, id: Option<EntryId>) -> PyResult<EntryId> {
        self.inner.restore_to_corpus(id, text).map_err(value_error)
    }

    fn has_entry(&self, id: EntryId) -> bool {
        self.inner.has_entry(id)
    }

    fn last_entry_id(&self) -> Option<EntryId> {
        self.inner.last_entry_id()
    }

    fn clear_corpus(&mut self) {
        self.inner.clear_corpus();
    }

    /// Applies the best candidate; returns `False` once nothing qualifies.
    #[pyo3(signature = (min_weight = 2, max_length = None))]
    fn merge_step(&mut self, min_weight: Weight, max_length: Option<usize>) -> PyResult<bool> {
        let opts = SelectOptions { min_weight, max_length };
        let Some(candidate) = self.inner.find_next_merge(&opts) else {
            return Ok(false);
        };
        self.inner.apply_merge(&candidate).map_err(value_error)?;
        Ok(true)
    }

    #[pyo3(signature = (min_weight = 2, max_length = None, max_iterations = None, show_progress = false))]
    fn merge_until(
        &mut self,
        py: Python<'_>,
        min_weight: Weight,
        max_length: Option<usize>,
        max_iterations: Option<usize>,
        show_progress: bool,
    ) -> PyResult<usize> {
        let opts = MergeOptions {
            min_weight,
            max_length,
            max_iterations,
            show_progress,
        };
        py.allow_threads(|| self.inner.merge_until(&opts))
            .map_err(value_error)
    }

    fn restore_merge(&mut self, a_code: char, b_code: char, c_weight: Weight) -> PyResult<TokenId> {
        self.inner
            .restore_merge(&(a_code, b_code, c_weight))
            .map_err(value_error)
    }

    fn attach_merge_log(&mut self, path: &str) -> PyResult<()> {
        self.inner.attach_merge_log(path).map_err(merge_log_error)
    }

    fn resume_from_merge_log(&mut self, path: &str) -> PyResult<usize> {
        self.inner.resume_from_merge_log(path).map_err(merge_log_error)
    }

    /// Returns the number of active tokens.
    fn compact_vector_index(&mut self) -> PyResult<usize> {
        self.inner
            .compact_vector_index()
            .map(|map| map.len())
            .map_err(value_error)
    }

    fn encode_to_ids(&self, text: &str) -> PyResult<Vec<TokenId>> {
        self.inner.encode_to_ids(text).map_err(value_error)
    }

    fn encode_to_tokens(&self, text: &str) -> PyResult<Vec<String>> {
        let tokens = self.inner.encode_to_tokens(text).map_err(value_error)?;
        Ok(tokens.into_iter().map(|t| t.chars.clone()).collect())
    }

    fn encode_to_vector(&mut self, text: &str) -> PyResult<Vec<VectorIndex>> {
        self.inner.encode_to_vector(text).map_err(value_error)
    }

    #[pyo3(signature = (texts, show_progress = false))]
    fn encode_batch(&self, py: Python<'_>, texts: Vec<String>, show_progress: bool) -> PyResult<Vec<Vec<TokenId>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        py.allow_threads(|| self.inner.encode_batch(&refs, show_progress))
            .map_err(value_error)
    }

    fn decode_tokens(&self, tokens: Vec<TokenId>) -> PyResult<String> {
        self.inner.decode_tokens(&tokens).map_err(value_error)
    }

    fn decode_vector(&mut self, vector: Vec<VectorIndex>) -> PyResult<String> {
        self.inner.decode_vector(&vector).map_err(value_error)
    }

    #[pyo3(signature = (token_seqs, show_progress = false))]
    fn decode_batch(
        &self,
        py: Python<'_>,
        token_seqs: Vec<Vec<TokenId>>,
        show_progress: bool,
    ) -> PyResult<Vec<String>> {
        let refs: Vec<&[TokenId]> = token_seqs.iter().map(Vec::as_slice).collect();
        py.allow_threads(|| self.inner.decode_batch(&refs, show_progress))
            .map_err(value_error)
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(snapshot_error)
    }

    fn from_json(&mut self, json: &str) -> PyResult<()> {
        self.inner.from_json(json).map_err(snapshot_error)
    }

    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn active_token_count(&self) -> usize {
        self.inner.active_token_count()
    }

    /// `(chars, weight, original_weight)` of every token.
    fn get_tokens(&self) -> Vec<(String, Weight, Weight)> {
        self.inner
            .tokens()
            .map(|t| (t.chars.clone(), t.weight, t.original_weight))
            .collect()
    }

    fn get_merge_history(&self) -> Vec<((TokenId, TokenId), TokenId)> {
        self.inner
            .merges()
            .iter()
            .map(|&(pair, c)| ((pair.0, pair.1), c))
            .collect()
    }
}

#[pymodule]
fn _bpe_vocab(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBPETokenizer>()?;
    Ok(())
}
