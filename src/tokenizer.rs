//! The vocabulary engine: corpus ingestion, merge training, encoding and
//! persistence.
//!
//! A [`BPETokenizer`] owns the token table, the corpus store, the
//! candidate index of the configured strategy, the ordered merge rules and
//! a lazily built vector map. Every operation that mutates more than one
//! of them checks everything that can fail first, so callers never see a
//! half-applied merge or import.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    time::Duration,
};

use indicatif::{
    ParallelProgressIterator, ProgressBar, ProgressDrawTarget, ProgressStyle, style::TemplateError,
};
use log::{debug, info};
use rayon::prelude::*;

use crate::{
    candidate::{CandidateIndex, MergeCandidate, Rewrite, SelectOptions},
    codec,
    config::{MergeOptions, Strategy, TrainerConfig},
    converter::BPEConverter,
    corpus::{CorpusStore, MemoryCorpus},
    error::{
        CorpusError, DecodeError, EncodeError, MergeError, MergeLogError, SnapshotError, VocabError,
    },
    incremental::IncrementalIndex,
    merge_log::{self, MergeLog, MergeRecord},
    rescan::RescanIndex,
    snapshot::{SNAPSHOT_VERSION, Snapshot, TrainingSnapshot},
    types::{EntryId, TokenId, TokenPair, VectorIndex},
    vector::VectorMap,
    vocab::{Token, TokenTable},
};

fn candidate_index(strategy: Strategy) -> Box<dyn CandidateIndex> {
    match strategy {
        Strategy::Rescan => Box::new(RescanIndex::new()),
        Strategy::Incremental => Box::new(IncrementalIndex::new()),
    }
}

/// BPE vocabulary trainer and codec.
///
/// Generic over the corpus backend; [`MemoryCorpus`] is the default.
///
/// # Example
///
/// ```
/// use bpe_vocab::{BPETokenizer, MergeOptions};
///
/// let mut tokenizer = BPETokenizer::new();
/// tokenizer.add_to_corpus(None, "aaabdaaabac")?;
/// tokenizer.merge_until(&MergeOptions::default())?;
///
/// let ids = tokenizer.encode_to_ids("aaabdaaabac")?;
/// assert_eq!(tokenizer.decode_tokens(&ids)?, "aaabdaaabac");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BPETokenizer<S: CorpusStore = MemoryCorpus> {
    config: TrainerConfig,
    vocab: TokenTable,
    corpus: S,
    index: Box<dyn CandidateIndex>,
    converter: BPEConverter,

    /// Built on first vector use, rebuilt when the set of active tokens
    /// changed since.
    vector: Option<VectorMap>,

    merge_log: Option<MergeLog>,
}

impl BPETokenizer<MemoryCorpus> {
    /// Tokenizer with the default configuration and an in-memory corpus.
    pub fn new() -> Self {
        Self::with_config(TrainerConfig::default())
    }

    pub fn with_config(config: TrainerConfig) -> Self {
        Self::with_store(config, MemoryCorpus::new())
    }

    /// Rebuilds token table and merge rules from `snapshot` on a scratch
    /// tokenizer, through the ordinary merge path.
    ///
    /// Tokens are replayed in id order: a token is the composite of the
    /// next merge record if that record's composite code is its code, and
    /// a single-character base token otherwise.
    fn replay(snapshot: &Snapshot, strategy: Strategy) -> Result<Self, SnapshotError> {
        let invalid = |msg: String| SnapshotError::InvalidFormat(msg);

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(invalid(format!("unsupported version {}", snapshot.version)));
        }
        if !TokenTable::default().has_room_for(snapshot.token_table.len()) {
            return Err(invalid("token table exceeds the code space".to_string()));
        }

        let mut scratch = Self::with_config(TrainerConfig {
            strategy,
            sentinel: snapshot.sentinel,
        });
        let mut merges = snapshot.merge_codes.iter().peekable();

        for (id, (chars, _, original_weight)) in snapshot.token_table.iter().enumerate() {
            let code = codec::encode(id).map_err(|e| invalid(e.to_string()))?;

            if let Some(&&(a_code, b_code, c_code)) = merges.peek()
                && c_code == code
            {
                merges.next();
                let (a, b) = (scratch.vocab.by_code(a_code), scratch.vocab.by_code(b_code));
                let (Ok(a), Ok(b)) = (a, b) else {
                    return Err(invalid(format!("merge into token {id} references a later token")));
                };
                if a.chars.clone() + &b.chars != *chars {
                    return Err(invalid(format!("token {id} is not the concatenation of its merge")));
                }
                let candidate = MergeCandidate {
                    pair: TokenPair(a.id, b.id),
                    count: *original_weight,
                    composite_id: id,
                };
                scratch
                    .apply(&candidate, false)
                    .map_err(|e| invalid(e.to_string()))?;
                continue;
            }

            if id == 0 && snapshot.sentinel.is_some() {
                if scratch.vocab.sentinel_char().map(String::from).as_deref() != Some(chars.as_str()) {
                    return Err(invalid("first token does not match the sentinel".to_string()));
                }
                scratch.vocab.add_occurrences(id, *original_weight);
                continue;
            }

            let mut it = chars.chars();
            let (Some(c), None) = (it.next(), it.next()) else {
                return Err(invalid(format!("base token {id} is not a single character")));
            };
            if scratch.vocab.by_char(c).is_some() {
                return Err(invalid(format!("character {c:?} appears twice")));
            }
            scratch
                .vocab
                .create_token(chars.clone(), *original_weight)
                .map_err(|e| invalid(e.to_string()))?;
        }

        if merges.next().is_some() {
            return Err(invalid("merge record without matching composite token".to_string()));
        }
        for (id, (_, weight, _)) in snapshot.token_table.iter().enumerate() {
            let replayed = scratch.vocab.get(id).map_or(0, |t| t.weight);
            if replayed != *weight {
                return Err(invalid(format!(
                    "token {id} weight {weight} differs from replayed weight {replayed}"
                )));
            }
        }

        Ok(scratch)
    }
}

impl Default for BPETokenizer<MemoryCorpus> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CorpusStore> BPETokenizer<S> {
    /// Tokenizer training over `store`, which is expected to be empty.
    pub fn with_store(config: TrainerConfig, store: S) -> Self {
        Self {
            config,
            vocab: TokenTable::new(config.sentinel),
            corpus: store,
            index: candidate_index(config.strategy),
            converter: BPEConverter::new(),
            vector: None,
            merge_log: None,
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.index.strategy()
    }

    pub fn vocabulary(&self) -> &TokenTable {
        &self.vocab
    }

    pub fn corpus(&self) -> &S {
        &self.corpus
    }

    pub fn token(&self, id: TokenId) -> Option<&Token> {
        self.vocab.get(id)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.vocab.iter()
    }

    /// Learned rules `((a, b), c)` in application order.
    pub fn merges(&self) -> &[(TokenPair, TokenId)] {
        self.converter.history()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Number of tokens with non-zero weight.
    pub fn active_token_count(&self) -> usize {
        self.vocab.active_count()
    }

    // ---- corpus ----------------------------------------------------------

    pub fn has_entry(&self, id: EntryId) -> bool {
        self.corpus.contains(id)
    }

    pub fn last_entry_id(&self) -> Option<EntryId> {
        self.corpus.last_entry_id()
    }

    fn entry_id_or_next(&self, id: Option<EntryId>) -> Result<EntryId, CorpusError> {
        let id = id.unwrap_or_else(|| self.corpus.last_entry_id().map_or(0, |last| last + 1));
        if self.corpus.contains(id) {
            return Err(CorpusError::DuplicateEntry(id));
        }
        Ok(id)
    }

    /// Ingests raw `text` as a new corpus entry.
    ///
    /// Every character gets a single-character token (created on first
    /// sight) and one more occurrence. With a sentinel configured the entry
    /// is wrapped in it on both sides.
    ///
    /// # Arguments
    ///
    /// * `id` - Caller id of the entry; `None` takes the last id + 1.
    /// * `text` - Raw entry text.
    ///
    /// # Returns
    ///
    /// The id the entry was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::DuplicateEntry`] if `id` was already
    /// ingested, [`CorpusError::Vocab`] if new characters no longer fit in
    /// the code space, or whatever the store reports when it rejects the
    /// entry. Weights and tokens are only touched once the store accepted
    /// the entry, so nothing is changed on error.
    pub fn add_to_corpus(&mut self, id: Option<EntryId>, text: &str) -> Result<EntryId, CorpusError> {
        let id = self.entry_id_or_next(id)?;

        // ids new characters will get, in order of first appearance
        let mut unseen: HashMap<char, TokenId> = HashMap::new();
        let sentinel = self.vocab.sentinel();
        let mut ids = Vec::with_capacity(text.chars().count() + 2);
        ids.extend(sentinel);
        for c in text.chars() {
            let next = self.vocab.next_id() + unseen.len();
            let token = match self.vocab.by_char(c) {
                Some(token) => token,
                None => *unseen.entry(c).or_insert(next),
            };
            ids.push(token);
        }
        ids.extend(sentinel);

        if !self.vocab.has_room_for(unseen.len()) {
            return Err(CorpusError::Vocab(VocabError::CodeSpaceExhausted));
        }
        let content = ids
            .iter()
            .map(|&token| codec::encode(token))
            .collect::<Result<String, _>>()?;

        let slot = self.corpus.insert(id, content)?;

        for c in text.chars() {
            self.vocab.ingest_char(c)?;
        }
        if let Some(s) = sentinel {
            self.vocab.add_occurrences(s, 2);
        }
        if let Some(content) = self.corpus.content(slot) {
            self.index.entry_added(slot, content);
        }
        Ok(id)
    }

    /// Re-attaches raw `text` to a vocabulary imported from a snapshot.
    ///
    /// The entry is encoded with the current merge rules, exactly as it
    /// would look had it been trained with them. Weights are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::DuplicateEntry`] if `id` was already
    /// ingested, or [`CorpusError::UnknownSymbol`] for a character the
    /// vocabulary does not know.
    pub fn restore_to_corpus(&mut self, id: Option<EntryId>, text: &str) -> Result<EntryId, CorpusError> {
        let id = self.entry_id_or_next(id)?;

        let sentinel = self.vocab.sentinel();
        let mut ids = Vec::with_capacity(text.chars().count() + 2);
        ids.extend(sentinel);
        ids.extend(self.vocab.char_ids(text)?);
        ids.extend(sentinel);

        let content = self.vocab.codes_for(&self.converter.encode(ids));
        let slot = self.corpus.insert(id, content)?;
        if let Some(content) = self.corpus.content(slot) {
            self.index.entry_added(slot, content);
        }
        Ok(id)
    }

    /// Drops every corpus entry; vocabulary and merge rules are kept.
    ///
    /// Useful to replay a merge log quickly when only the vocabulary is
    /// needed.
    pub fn clear_corpus(&mut self) {
        self.corpus.clear();
        self.index.reset();
    }

    // ---- training --------------------------------------------------------

    /// Best merge candidate under `opts`.
    ///
    /// Candidates rank by count, then by the lower id sum of the pair, so
    /// the choice is deterministic for identical input.
    ///
    /// # Arguments
    ///
    /// * `opts` - Minimum count and maximum composite length.
    ///
    /// # Returns
    ///
    /// The candidate with the id its composite will receive, or `None` if
    /// no pair reaches `opts.min_weight` within `opts.max_length`.
    pub fn find_next_merge(&mut self, opts: &SelectOptions) -> Option<MergeCandidate> {
        let (pair, count) = self.index.best(&self.corpus, &self.vocab, opts)?;
        Some(MergeCandidate {
            pair,
            count,
            composite_id: self.vocab.next_id(),
        })
    }

    /// Applies `candidate` and appends it to the attached merge log.
    ///
    /// Creates the composite token with weight `count`, consumes `count`
    /// occurrences of each side, rewrites every corpus entry holding the
    /// pair and updates the candidate index. Returns the composite id.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::MissingTokenIdentity`] if the candidate was
    /// selected from an older state, [`MergeError::UnknownToken`] for a side
    /// outside the table, or [`MergeError::Vocab`] if no code is left;
    /// nothing is changed in these cases. [`MergeError::Log`] means the
    /// merge was applied but could not be logged.
    pub fn apply_merge(&mut self, candidate: &MergeCandidate) -> Result<TokenId, MergeError> {
        self.apply(candidate, true)
    }

    fn apply(&mut self, candidate: &MergeCandidate, log_merge: bool) -> Result<TokenId, MergeError> {
        let expected = self.vocab.next_id();
        if candidate.composite_id != expected {
            return Err(MergeError::MissingTokenIdentity {
                expected,
                found: candidate.composite_id,
            });
        }

        let pair = candidate.pair;
        let a = self.vocab.token(pair.0)?;
        let b = self.vocab.token(pair.1)?;
        let to_code = codec::encode(expected)?;
        let chars = a.chars.clone() + &b.chars;
        let from: String = [a.code, b.code].into_iter().collect();
        let record: MergeRecord = (a.code, b.code, candidate.count);

        let slots = self
            .index
            .affected_slots(pair)
            .unwrap_or_else(|| self.corpus.slots_containing(&from));
        let to = to_code.to_string();
        let rewrites: Vec<Rewrite> = slots
            .into_iter()
            .filter_map(|slot| {
                let before = self.corpus.content(slot)?;
                before.contains(&from).then(|| Rewrite {
                    slot,
                    before: before.to_string(),
                    after: before.replace(&from, &to),
                })
            })
            .collect();

        // mutation starts here
        let c = self.vocab.create_token(chars, candidate.count)?;
        self.vocab.consume(pair.0, candidate.count);
        self.vocab.consume(pair.1, candidate.count);
        for rewrite in &rewrites {
            self.corpus.rewrite(rewrite.slot, rewrite.after.clone());
        }
        self.index.merge_applied(pair, &rewrites);
        self.converter.push(pair, c);

        debug!(
            "merged ({}, {}) -> {} with weight {} in {} entries",
            pair.0,
            pair.1,
            c,
            candidate.count,
            rewrites.len()
        );

        if log_merge && let Some(log) = self.merge_log.as_mut() {
            log.append(&record).map_err(MergeError::Log)?;
        }
        Ok(c)
    }

    /// Selects and applies merges until a stop condition holds.
    ///
    /// # Arguments
    ///
    /// * `opts` - Stops when no candidate reaches `min_weight` (within
    ///   `max_length`) or after `max_iterations` merges; `show_progress`
    ///   draws a progress bar.
    ///
    /// # Returns
    ///
    /// Number of merges applied.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ProgressBarSetup`] if the progress bar template
    /// fails to compile, or the first error of [`Self::apply_merge`].
    pub fn merge_until(&mut self, opts: &MergeOptions) -> Result<usize, MergeError> {
        let pb = progress_bar(
            opts.max_iterations.map(|n| n as u64),
            "Merging pairs",
            opts.show_progress,
        )
        .map_err(MergeError::ProgressBarSetup)?;

        let select = opts.select();
        let mut merged = 0;
        let reason = loop {
            if opts.max_iterations.is_some_and(|max| merged >= max) {
                break "iteration budget exhausted";
            }
            let Some(candidate) = self.find_next_merge(&select) else {
                break "no eligible candidate";
            };
            self.apply_merge(&candidate)?;
            merged += 1;
            pb.inc(1);
        };
        pb.finish_and_clear();

        info!(
            "merge loop stopped after {merged} merges ({reason}), vocabulary size {}",
            self.vocab.len()
        );
        Ok(merged)
    }

    /// Re-applies a merge read back from a log.
    ///
    /// `a` and `b` are looked up by code and the composite receives
    /// weight `c_weight`, exactly as [`Self::apply_merge`] would have done.
    /// The record is not appended to the attached log.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::UnknownTokenCode`] if either code is unknown.
    pub fn restore_merge(&mut self, record: &MergeRecord) -> Result<TokenId, MergeError> {
        let &(a_code, b_code, c_weight) = record;
        let a = self.vocab.by_code(a_code)?.id;
        let b = self.vocab.by_code(b_code)?.id;
        let candidate = MergeCandidate {
            pair: TokenPair(a, b),
            count: c_weight,
            composite_id: self.vocab.next_id(),
        };
        self.apply(&candidate, false)
    }

    /// Appends every merge applied from now on to the log at `path`.
    pub fn attach_merge_log(&mut self, path: impl AsRef<Path>) -> Result<(), MergeLogError> {
        self.merge_log = Some(MergeLog::open(path)?);
        Ok(())
    }

    pub fn detach_merge_log(&mut self) -> Option<MergeLog> {
        self.merge_log.take()
    }

    /// Replays every complete record of the log at `path`.
    ///
    /// The raw corpus should be ingested first so that single-character
    /// weights match the interrupted run. Returns the number of replayed
    /// merges.
    pub fn resume_from_merge_log(&mut self, path: impl AsRef<Path>) -> Result<usize, MergeLogError> {
        let path = path.as_ref();
        let (records, discarded) = merge_log::parse_merge_log(&std::fs::read(path)?)?;
        for record in &records {
            self.restore_merge(record)?;
        }
        info!(
            "replayed {} merges from {} ({discarded} trailing bytes discarded)",
            records.len(),
            path.display()
        );
        Ok(records.len())
    }

    // ---- vector index ----------------------------------------------------

    /// Numbers the non-zero weight tokens densely in id order.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::EmptyVocabulary`] if no token exists besides
    /// the sentinel.
    pub fn compact_vector_index(&mut self) -> Result<&VectorMap, EncodeError> {
        let map = VectorMap::build(&self.vocab).ok_or(EncodeError::EmptyVocabulary)?;
        Ok(self.vector.insert(map))
    }

    /// Rebuilds the vector map if it is missing or stale.
    fn refresh_vector_map(&mut self) {
        let stale = self
            .vector
            .as_ref()
            .is_none_or(|map| !map.is_current(&self.vocab));
        if stale {
            self.vector = VectorMap::build(&self.vocab);
        }
    }

    // ---- encode / decode -------------------------------------------------

    /// Token ids of `text` after applying every merge rule in order.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownSymbol`] for a character never seen
    /// during training.
    pub fn encode_to_ids(&self, text: &str) -> Result<Vec<TokenId>, EncodeError> {
        let ids = text
            .chars()
            .map(|c| self.vocab.by_char(c).ok_or(EncodeError::UnknownSymbol(c)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.converter.encode(ids))
    }

    /// Encoded `text` as a string of token codes.
    pub fn encode_to_code(&self, text: &str) -> Result<String, EncodeError> {
        Ok(self.vocab.codes_for(&self.encode_to_ids(text)?))
    }

    /// Encoded `text` as references into the token table.
    ///
    /// # Arguments
    ///
    /// * `text` - Text made of characters seen during ingestion.
    ///
    /// # Returns
    ///
    /// Tokens in text order; their `chars` concatenate back to `text`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownSymbol`] for a character never seen
    /// during training.
    pub fn encode_to_tokens(&self, text: &str) -> Result<Vec<&Token>, EncodeError> {
        Ok(self
            .encode_to_ids(text)?
            .into_iter()
            .filter_map(|id| self.vocab.get(id))
            .collect())
    }

    /// Encoded `text` as vector indices.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::EmptyVocabulary`] before any ingestion,
    /// [`EncodeError::UnknownSymbol`] for an unseen character, and
    /// [`EncodeError::InactiveToken`] if encoding yields a token whose
    /// weight dropped to zero.
    pub fn encode_to_vector(&mut self, text: &str) -> Result<Vec<VectorIndex>, EncodeError> {
        self.refresh_vector_map();
        let map = self.vector.as_ref().ok_or(EncodeError::EmptyVocabulary)?;
        self.ids_to_vector(map, self.encode_to_ids(text)?)
    }

    fn ids_to_vector(&self, map: &VectorMap, ids: Vec<TokenId>) -> Result<Vec<VectorIndex>, EncodeError> {
        ids.into_iter()
            .map(|id| map.index_of(id).ok_or(EncodeError::InactiveToken(id)))
            .collect()
    }

    /// Encodes many texts in parallel using Rayon.
    ///
    /// # Arguments
    ///
    /// * `texts` - Slice of texts to encode.
    /// * `show_progress` - Whether to display a progress bar.
    ///
    /// # Returns
    ///
    /// Token id sequences in the same order as `texts`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::UnknownSymbol`] if any text holds an unseen
    /// character, or [`EncodeError::ProgressBarSetup`] if the progress bar
    /// template fails to compile.
    pub fn encode_batch(&self, texts: &[&str], show_progress: bool) -> Result<Vec<Vec<TokenId>>, EncodeError> {
        let pb = progress_bar(Some(texts.len() as u64), "Encoding texts", show_progress)
            .map_err(EncodeError::ProgressBarSetup)?;

        texts
            .par_iter()
            .progress_with(pb)
            .map(|text| self.encode_to_ids(text))
            .collect()
    }

    /// Encodes many texts to vector indices in parallel, preserving order.
    pub fn encode_to_vector_batch(
        &mut self,
        texts: &[&str],
        show_progress: bool,
    ) -> Result<Vec<Vec<VectorIndex>>, EncodeError> {
        self.refresh_vector_map();
        let map = self.vector.as_ref().ok_or(EncodeError::EmptyVocabulary)?;
        let pb = progress_bar(Some(texts.len() as u64), "Encoding vectors", show_progress)
            .map_err(EncodeError::ProgressBarSetup)?;

        texts
            .par_iter()
            .progress_with(pb)
            .map(|text| self.ids_to_vector(map, self.encode_to_ids(text)?))
            .collect()
    }

    /// Concatenates the text of `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an id outside the table.
    pub fn decode_tokens(&self, tokens: &[TokenId]) -> Result<String, DecodeError> {
        self.converter.decode(&self.vocab, tokens)
    }

    /// Text of a vector produced by [`Self::encode_to_vector`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownVectorIndex`] for an index outside
    /// `[0, active_token_count)`, or [`DecodeError::EmptyVocabulary`]
    /// before any ingestion.
    pub fn decode_vector(&mut self, vector: &[VectorIndex]) -> Result<String, DecodeError> {
        self.refresh_vector_map();
        let map = self.vector.as_ref().ok_or(DecodeError::EmptyVocabulary)?;
        self.vector_to_text(map, vector)
    }

    fn vector_to_text(&self, map: &VectorMap, vector: &[VectorIndex]) -> Result<String, DecodeError> {
        let ids = vector
            .iter()
            .map(|&i| map.token_at(i).ok_or(DecodeError::UnknownVectorIndex(i)))
            .collect::<Result<Vec<_>, _>>()?;
        self.decode_tokens(&ids)
    }

    /// Decodes many token sequences in parallel using Rayon.
    ///
    /// # Arguments
    ///
    /// * `token_seqs` - Token id sequences to decode.
    /// * `show_progress` - Whether to display a progress bar.
    ///
    /// # Returns
    ///
    /// Decoded texts in the same order as `token_seqs`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] for an id outside the table, or
    /// [`DecodeError::ProgressBarSetup`] if the progress bar template fails
    /// to compile.
    pub fn decode_batch(&self, token_seqs: &[&[TokenId]], show_progress: bool) -> Result<Vec<String>, DecodeError> {
        let pb = progress_bar(Some(token_seqs.len() as u64), "Decoding tokens", show_progress)
            .map_err(DecodeError::ProgressBarSetup)?;

        token_seqs
            .par_iter()
            .progress_with(pb)
            .map(|tokens| self.decode_tokens(tokens))
            .collect()
    }

    /// Decodes many vectors in parallel, preserving order.
    pub fn decode_vector_batch(
        &mut self,
        vectors: &[&[VectorIndex]],
        show_progress: bool,
    ) -> Result<Vec<String>, DecodeError> {
        self.refresh_vector_map();
        let map = self.vector.as_ref().ok_or(DecodeError::EmptyVocabulary)?;
        let pb = progress_bar(Some(vectors.len() as u64), "Decoding vectors", show_progress)
            .map_err(DecodeError::ProgressBarSetup)?;

        vectors
            .par_iter()
            .progress_with(pb)
            .map(|vector| self.vector_to_text(map, vector))
            .collect()
    }

    // ---- persistence -----------------------------------------------------

    /// Current vocabulary and merges in the canonical layout.
    ///
    /// # Returns
    ///
    /// A version 2 [`Snapshot`]: every token as `(chars, weight,
    /// original_weight)` in id order and every merge as the codes of its
    /// two sides and its composite, in application order. Importing it
    /// with [`Self::from_snapshot`] reproduces the same snapshot.
    pub fn to_snapshot(&self) -> Snapshot {
        let token_table = self
            .vocab
            .iter()
            .map(|t| (t.chars.clone(), t.weight, t.original_weight))
            .collect();
        let code = |id: TokenId| self.vocab.get(id).map(|t| t.code);
        let merge_codes = self
            .converter
            .history()
            .iter()
            .filter_map(|&(pair, c)| Some((code(pair.0)?, code(pair.1)?, code(c)?)))
            .collect();

        Snapshot {
            version: SNAPSHOT_VERSION,
            sentinel: self.vocab.sentinel_char(),
            token_table,
            merge_codes,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        self.to_snapshot().to_json()
    }

    /// Replaces vocabulary and merges with those of `snapshot`.
    ///
    /// The corpus is cleared; re-attach entries with
    /// [`Self::restore_to_corpus`] to continue training.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidFormat`] if the snapshot is
    /// inconsistent. Nothing is changed on error.
    pub fn from_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let scratch = BPETokenizer::<MemoryCorpus>::replay(snapshot, self.config.strategy)?;
        self.install(scratch);
        info!(
            "imported snapshot with {} tokens and {} merges",
            self.vocab.len(),
            self.converter.num_merges()
        );
        Ok(())
    }

    /// Parses `json` (any supported version) and imports it.
    pub fn from_json(&mut self, json: &str) -> Result<(), SnapshotError> {
        let snapshot = Snapshot::from_json(json)?;
        self.from_snapshot(&snapshot)
    }

    /// Vocabulary plus the corpus in code form.
    pub fn to_training_snapshot(&self) -> TrainingSnapshot {
        let corpus = (0..self.corpus.len())
            .filter_map(|slot| {
                Some((
                    self.corpus.entry_id(slot)?,
                    self.corpus.content(slot)?.to_string(),
                ))
            })
            .collect();
        TrainingSnapshot {
            vocabulary: self.to_snapshot(),
            corpus,
        }
    }

    /// Restores vocabulary, merges and corpus so training can continue.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidFormat`] for an inconsistent
    /// vocabulary, a duplicate entry id or content referencing unknown
    /// codes. Nothing is changed on error.
    pub fn from_training_snapshot(&mut self, snapshot: &TrainingSnapshot) -> Result<(), SnapshotError> {
        let scratch = BPETokenizer::<MemoryCorpus>::replay(&snapshot.vocabulary, self.config.strategy)?;

        let mut seen = HashSet::new();
        for (id, content) in &snapshot.corpus {
            if !seen.insert(*id) {
                return Err(SnapshotError::InvalidFormat(format!("duplicate entry id {id}")));
            }
            if let Some(code) = content.chars().find(|&c| scratch.vocab.by_code(c).is_err()) {
                return Err(SnapshotError::InvalidFormat(format!(
                    "entry {id} holds unknown code U+{:04X}",
                    code as u32
                )));
            }
        }

        self.install(scratch);
        for (id, content) in &snapshot.corpus {
            let slot = self
                .corpus
                .insert(*id, content.clone())
                .map_err(|e| SnapshotError::InvalidFormat(e.to_string()))?;
            self.index.entry_added(slot, content);
        }
        info!(
            "imported training snapshot with {} tokens, {} merges and {} entries",
            self.vocab.len(),
            self.converter.num_merges(),
            self.corpus.len()
        );
        Ok(())
    }

    /// Takes over the vocabulary of a replayed scratch tokenizer.
    fn install(&mut self, scratch: BPETokenizer<MemoryCorpus>) {
        self.config.sentinel = scratch.vocab.sentinel_char();
        self.vocab = scratch.vocab;
        self.converter = scratch.converter;
        self.vector = None;
        self.corpus.clear();
        self.index.reset();
    }
}

/// Creates a styled progress bar, or a hidden one when `show` is false.
///
/// # Errors
///
/// Returns a [`TemplateError`] if the progress bar style template is invalid.
fn progress_bar(len: Option<u64>, msg: &'static str, show: bool) -> Result<ProgressBar, TemplateError> {
    let pb = match len {
        Some(n) => ProgressBar::new(n),
        None => ProgressBar::no_length(),
    };
    if !show {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return Ok(pb);
    }

    let style = ProgressStyle::default_bar().template("[{elapsed_precise}] {msg:<30!} {wide_bar} {pos}/{len}")?;
    pb.set_style(style);
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_secs(1));
    Ok(pb)
}
