//! Source positions and the decoded input buffer.
//!
//! The engine parses over a buffer of Unicode scalar values rather than raw
//! bytes, so columns count characters the way an editor does. `Pos` carries
//! the char offset (the only field used for ordering) plus the line/column
//! pair maintained by the matching machinery.

use serde::{Deserialize, Serialize};

/// A position inside a decoded source buffer.
///
/// `offset` is an index in chars, not bytes. `line` and `col` are 1-based
/// and purely diagnostic; comparisons look at `offset` alone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn start() -> Self {
        Pos { offset: 0, line: 1, col: 1 }
    }
}

impl PartialEq for Pos {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for Pos {}

impl PartialOrd for Pos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.offset.cmp(&other.offset)
    }
}

/// Decode a UTF-8 source string into the char buffer the engine runs over.
pub fn decode(source: &str) -> Vec<char> {
    source.chars().collect()
}

/// Re-encode a slice of the decoded buffer back into a `String`.
pub fn encode(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Convert a char offset into a byte offset within the original source.
///
/// Diagnostics render against the original UTF-8 text, so labeled spans need
/// byte offsets even though the engine tracks char offsets.
pub fn byte_offset(source: &str, char_offset: usize) -> usize {
    source
        .char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(source.len())
}
