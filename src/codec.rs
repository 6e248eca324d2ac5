//! Symbol codec: bijection between token ids and single-char codes.
//!
//! A corpus entry is stored as a string of codes, one code per token, so a
//! merge of `(a, b)` into `c` is the substring rewrite `a.code b.code -> c.code`.
//!
//! Code points start at 1 so that U+0000 never appears inside corpus
//! strings, and the UTF-16 surrogate block (which `char` cannot hold) is
//! skipped.

use crate::{error::VocabError, types::TokenId};

/// First code point of the surrogate block.
const SURROGATE_START: u32 = 0xD800;

/// Number of code points in the surrogate block.
const SURROGATE_LEN: u32 = 0x800;

/// Largest token id that still has a code.
pub const MAX_TOKEN_ID: TokenId = (char::MAX as u32 - SURROGATE_LEN - 1) as TokenId;

/// Returns the code assigned to token `id`.
///
/// # Errors
///
/// Returns [`VocabError::CodeSpaceExhausted`] if `id` exceeds [`MAX_TOKEN_ID`].
pub fn encode(id: TokenId) -> Result<char, VocabError> {
    if id > MAX_TOKEN_ID {
        return Err(VocabError::CodeSpaceExhausted);
    }
    let mut point = id as u32 + 1;
    if point >= SURROGATE_START {
        point += SURROGATE_LEN;
    }
    char::from_u32(point).ok_or(VocabError::CodeSpaceExhausted)
}

/// Returns the token id a code stands for.
///
/// The result is only meaningful together with the token table that
/// assigned the code; bounds are checked by the table.
///
/// # Errors
///
/// Returns [`VocabError::UnknownTokenCode`] for U+0000, which no token owns.
pub fn decode(code: char) -> Result<TokenId, VocabError> {
    let point = code as u32;
    if point == 0 {
        return Err(VocabError::UnknownTokenCode(code));
    }
    let shifted = if point > SURROGATE_START {
        point - SURROGATE_LEN
    } else {
        point
    };
    Ok((shifted - 1) as TokenId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_code_is_one() {
        assert_eq!(encode(0).expect("id 0 has a code"), '\u{1}');
        assert_eq!(decode('\u{1}').expect("code 1 decodes"), 0);
    }

    #[test]
    fn test_skips_surrogate_block() {
        let below = encode(0xD7FE).expect("id below surrogates has a code");
        assert_eq!(below as u32, 0xD7FF);
        let above = encode(0xD7FF).expect("id at surrogate boundary has a code");
        assert_eq!(above as u32, 0xE000);
        assert_eq!(decode(above).expect("code decodes"), 0xD7FF);
    }

    #[test]
    fn test_bijection_near_boundaries() {
        for id in [0, 1, 0xD7FD, 0xD7FE, 0xD7FF, 0xD800, MAX_TOKEN_ID] {
            let code = encode(id).expect("id within range has a code");
            assert_eq!(decode(code).expect("code decodes"), id);
        }
    }

    #[test]
    fn test_code_space_exhausted() {
        assert_eq!(encode(MAX_TOKEN_ID).map(|c| c as u32), Ok(char::MAX as u32));
        assert!(matches!(
            encode(MAX_TOKEN_ID + 1),
            Err(VocabError::CodeSpaceExhausted)
        ));
    }

    #[test]
    fn test_nul_is_reserved() {
        assert!(matches!(
            decode('\u{0}'),
            Err(VocabError::UnknownTokenCode('\u{0}'))
        ));
    }
}
