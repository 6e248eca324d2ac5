//! Token table: the dense, append-only vocabulary arena.
//!
//! Every other structure refers to tokens by [`TokenId`], never by
//! reference, so weights can be mutated in one place while the corpus and
//! the candidate index keep plain integers.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    codec,
    error::VocabError,
    types::{TokenId, Weight},
};

/// A vocabulary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Stable identity, equal to the token's position in the table.
    pub id: TokenId,
    /// The text this token represents.
    pub chars: String,
    /// Occurrences not yet consumed by a larger merge.
    pub weight: Weight,
    /// Occurrences recorded when the token was created (grows only while
    /// raw content is ingested).
    pub original_weight: Weight,
    /// Single-symbol stand-in used inside corpus strings.
    pub code: char,
    /// Length of `chars` in characters.
    #[serde(skip)]
    pub(crate) char_len: usize,
}

impl Token {
    /// Length of `chars` in characters.
    pub fn char_len(&self) -> usize {
        self.char_len
    }
}

/// Append-only token arena with O(1) lookup by id, by code and by literal
/// character.
#[derive(Debug, Clone)]
pub struct TokenTable {
    tokens: Vec<Token>,

    /// Single-character tokens, for raw ingestion and encoding.
    char_to_token: HashMap<char, TokenId>,

    /// Boundary token created at initialisation, if configured.
    sentinel: Option<TokenId>,

    /// Bumped whenever the set of non-zero weight tokens changes.
    ///
    /// Cached vector indices compare against it to detect staleness.
    active_epoch: u64,
}

impl TokenTable {
    /// Creates a table, reserving token 0 for `sentinel` when given.
    pub fn new(sentinel: Option<char>) -> Self {
        let mut table = Self {
            tokens: Vec::new(),
            char_to_token: HashMap::new(),
            sentinel: None,
            active_epoch: 0,
        };
        if let Some(c) = sentinel {
            // id 0 always has a code
            if let Ok(id) = table.create_token(c.to_string(), 0) {
                table.sentinel = Some(id);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether the table holds any token besides the sentinel.
    pub fn has_content(&self) -> bool {
        self.tokens.len() > usize::from(self.sentinel.is_some())
    }

    /// Id the next created token will receive.
    pub fn next_id(&self) -> TokenId {
        self.tokens.len()
    }

    pub fn sentinel(&self) -> Option<TokenId> {
        self.sentinel
    }

    pub fn sentinel_char(&self) -> Option<char> {
        self.sentinel
            .and_then(|id| self.tokens.get(id))
            .and_then(|t| t.chars.chars().next())
    }

    pub(crate) fn active_epoch(&self) -> u64 {
        self.active_epoch
    }

    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.tokens.get(id)
    }

    /// Looks up a token by id.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownToken`] if `id` is out of bounds.
    pub fn token(&self, id: TokenId) -> Result<&Token, VocabError> {
        self.tokens.get(id).ok_or(VocabError::UnknownToken(id))
    }

    /// Looks up the token owning `code`.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownTokenCode`] if no token owns `code`.
    pub fn by_code(&self, code: char) -> Result<&Token, VocabError> {
        codec::decode(code)
            .ok()
            .and_then(|id| self.tokens.get(id))
            .ok_or(VocabError::UnknownTokenCode(code))
    }

    /// Id of the single-character token for `c`, if one was ingested.
    pub fn by_char(&self, c: char) -> Option<TokenId> {
        self.char_to_token.get(&c).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    /// Number of tokens with non-zero weight.
    pub fn active_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.weight > 0).count()
    }

    /// Whether `n` more tokens can still receive a code.
    pub(crate) fn has_room_for(&self, n: usize) -> bool {
        n == 0 || self.tokens.len() + n - 1 <= codec::MAX_TOKEN_ID
    }

    /// Appends a token with the next id and a never-used code.
    ///
    /// Single-character tokens become reachable through [`Self::by_char`].
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::CodeSpaceExhausted`] if no code is left.
    pub fn create_token(&mut self, chars: String, weight: Weight) -> Result<TokenId, VocabError> {
        let id = self.tokens.len();
        let code = codec::encode(id)?;
        let char_len = chars.chars().count();

        if char_len == 1
            && let Some(c) = chars.chars().next()
        {
            self.char_to_token.entry(c).or_insert(id);
        }
        if weight > 0 {
            self.active_epoch += 1;
        }

        self.tokens.push(Token {
            id,
            chars,
            weight,
            original_weight: weight,
            code,
            char_len,
        });
        Ok(id)
    }

    /// Finds or creates the token for `c` and records one more occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::CodeSpaceExhausted`] if a new token is needed
    /// but no code is left.
    pub(crate) fn ingest_char(&mut self, c: char) -> Result<TokenId, VocabError> {
        match self.by_char(c) {
            Some(id) => {
                self.add_occurrences(id, 1);
                Ok(id)
            }
            None => self.create_token(c.to_string(), 1),
        }
    }

    /// Adds `n` raw occurrences to both `weight` and `original_weight`.
    pub(crate) fn add_occurrences(&mut self, id: TokenId, n: Weight) {
        if let Some(token) = self.tokens.get_mut(id) {
            if token.weight == 0 && n > 0 {
                self.active_epoch += 1;
            }
            token.weight += n;
            token.original_weight += n;
        }
    }

    /// Removes `n` occurrences consumed by a merge.
    ///
    /// Returns `true` if the token's weight dropped to zero.
    pub(crate) fn consume(&mut self, id: TokenId, n: Weight) -> bool {
        let Some(token) = self.tokens.get_mut(id) else {
            return false;
        };
        let was_active = token.weight > 0;
        token.weight = token.weight.saturating_sub(n);
        let zeroed = was_active && token.weight == 0;
        if zeroed {
            self.active_epoch += 1;
        }
        zeroed
    }

    /// Maps every character of `text` to its single-character token.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownSymbol`] for the first character that
    /// was never ingested.
    pub fn char_ids(&self, text: &str) -> Result<Vec<TokenId>, VocabError> {
        text.chars()
            .map(|c| self.by_char(c).ok_or(VocabError::UnknownSymbol(c)))
            .collect()
    }

    /// Code string for a sequence of token ids.
    pub(crate) fn codes_for(&self, ids: &[TokenId]) -> String {
        ids.iter()
            .filter_map(|&id| self.tokens.get(id))
            .map(|t| t.code)
            .collect()
    }
}

impl Default for TokenTable {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_reserved_at_zero() {
        let table = TokenTable::new(Some('\u{4}'));
        assert_eq!(table.len(), 1);
        assert_eq!(table.sentinel(), Some(0));
        assert_eq!(table.sentinel_char(), Some('\u{4}'));
        assert_eq!(table.by_char('\u{4}'), Some(0));
        assert!(!table.has_content());
        assert_eq!(table.token(0).expect("sentinel exists").weight, 0);
    }

    #[test]
    fn test_ingest_char_creates_then_increments() {
        let mut table = TokenTable::new(None);
        let a = table.ingest_char('a').expect("code space available");
        let b = table.ingest_char('b').expect("code space available");
        let a_again = table.ingest_char('a').expect("code space available");

        assert_eq!((a, b, a_again), (0, 1, 0));
        let token = table.token(a).expect("token a exists");
        assert_eq!(token.weight, 2);
        assert_eq!(token.original_weight, 2);
        assert!(table.has_content());
    }

    #[test]
    fn test_lookup_by_code() {
        let mut table = TokenTable::new(None);
        let id = table.ingest_char('z').expect("code space available");
        let code = table.token(id).expect("token exists").code;
        assert_eq!(table.by_code(code).expect("code is known").chars, "z");
        assert!(matches!(
            table.by_code('\u{50}'),
            Err(VocabError::UnknownTokenCode('\u{50}'))
        ));
    }

    #[test]
    fn test_composite_token_not_reachable_by_char() {
        let mut table = TokenTable::new(None);
        table.ingest_char('a').expect("code space available");
        let ab = table
            .create_token("ab".to_string(), 3)
            .expect("code space available");
        assert_eq!(table.token(ab).expect("token exists").char_len(), 2);
        assert_eq!(table.by_char('a'), Some(0));
        assert_eq!(table.char_ids("ab").ok(), None);
    }

    #[test]
    fn test_consume_reports_zero_transition() {
        let mut table = TokenTable::new(None);
        let id = table.create_token("x".to_string(), 4).expect("code space available");
        let epoch = table.active_epoch();

        assert!(!table.consume(id, 3));
        assert_eq!(table.active_epoch(), epoch);
        assert!(table.consume(id, 1));
        assert!(table.active_epoch() > epoch);
        assert_eq!(table.token(id).expect("token exists").original_weight, 4);
        assert_eq!(table.active_count(), 0);
    }

    #[test]
    fn test_char_ids_unknown_symbol() {
        let mut table = TokenTable::new(None);
        table.ingest_char('a').expect("code space available");
        assert_eq!(table.char_ids("aa"), Ok(vec![0, 0]));
        assert_eq!(table.char_ids("ab"), Err(VocabError::UnknownSymbol('b')));
    }
}
