//! Legacy text codec
//!
//! JRDB files are written in Shift_JIS. Field offsets in the layout documents
//! are byte offsets into the encoded line, so callers always slice raw bytes
//! first and decode afterwards. Because Shift_JIS is stateless, decoding each
//! cell separately yields exactly the same text as decoding the whole line and
//! cutting it at the matching character boundaries.

use std::borrow::Cow;

use encoding_rs::SHIFT_JIS;

use crate::error::{CommonError, Result};

/// Padding character used by full-width (zenkaku) text columns
pub const FULL_WIDTH_SPACE: char = '\u{3000}';

/// Decode one fixed-width cell.
///
/// Fails on byte sequences that are not valid Shift_JIS (for example a
/// double-byte character cut in half by a wrong offset) instead of silently
/// inserting replacement characters.
pub fn decode_cell(bytes: &[u8]) -> Result<String> {
    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| CommonError::decode(bytes))
}

/// Decode a whole line, replacing malformed sequences.
///
/// Only meant for diagnostics (log output of rejected lines).
pub fn decode_lossy(bytes: &[u8]) -> String {
    let (text, _) = SHIFT_JIS.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Encode text back into Shift_JIS bytes
pub fn encode(text: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    if had_errors {
        return Err(CommonError::Encode(text.to_string()));
    }
    Ok(bytes.into_owned())
}

/// Strip the padding of a fixed-width text cell.
///
/// Half-width blanks and full-width `U+3000` blanks are both padding.
pub fn trim_padding(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_ascii_whitespace() || c == FULL_WIDTH_SPACE)
}
