//! SIMD-accelerated line-ending scanner. Finds line boundaries in raw bytes for indexing.
//!
//! Uses `memchr` for single-byte separators and `memchr::memmem` for `\r\n`. Stored
//! content always uses [`STORAGE_SEPARATOR`]; the configurable [`LineEnding`] only
//! decides how incoming raw chunks are cut into lines.

use std::fmt;
use std::str::FromStr;

use memchr::{memchr_iter, memmem};

use crate::error::LogStoreError;

/// Terminator written after every stored line.
pub const STORAGE_SEPARATOR: u8 = b'\n';

/// How incoming raw chunks are split into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// No explicit setting; behaves like `Nl`.
    None,
    /// `\n`, with a trailing `\r` stripped from each line.
    #[default]
    Nl,
    /// `\r`, with a leading `\n` stripped from each line.
    Cr,
    /// `\r\n`.
    CrLf,
}

impl LineEnding {
    /// The byte sequence that terminates a line in this mode.
    pub fn sequence(self) -> &'static [u8] {
        match self {
            LineEnding::None | LineEnding::Nl => b"\n",
            LineEnding::Cr => b"\r",
            LineEnding::CrLf => b"\r\n",
        }
    }

    /// Removes the stray half of a `\r\n` pair left behind by single-byte modes.
    pub fn clean_line(self, line: &[u8]) -> &[u8] {
        match self {
            LineEnding::None | LineEnding::Nl => line.strip_suffix(b"\r").unwrap_or(line),
            LineEnding::Cr => line.strip_prefix(b"\n").unwrap_or(line),
            LineEnding::CrLf => line,
        }
    }
}

impl FromStr for LineEnding {
    type Err = LogStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(LineEnding::None),
            "NL" | "\n" => Ok(LineEnding::Nl),
            "CR" | "\r" => Ok(LineEnding::Cr),
            "NLCR" | "CRLF" | "\r\n" => Ok(LineEnding::CrLf),
            other => Err(LogStoreError::InvalidLineEnding(other.to_string())),
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEnding::None => "None",
            LineEnding::Nl => "NL",
            LineEnding::Cr => "CR",
            LineEnding::CrLf => "NLCR",
        };
        f.write_str(name)
    }
}

/// Scans stored bytes for [`STORAGE_SEPARATOR`] and pushes the file offset just past
/// each one onto `line_ends`.
///
/// # Arguments
/// * `chunk` - Raw bytes of the current block (no UTF-8 assumption).
/// * `base_offset` - File offset of the first byte of `chunk`.
/// * `line_ends` - Output vector; each pushed value is the end offset of a line.
///
/// # Returns
/// `true` if `chunk` ends with the separator (so the next block starts a new line).
#[inline(always)]
pub fn scan_chunk(chunk: &[u8], base_offset: u64, line_ends: &mut Vec<u64>) -> bool {
    if chunk.is_empty() {
        return true;
    }

    for pos in memchr_iter(STORAGE_SEPARATOR, chunk) {
        line_ends.push(base_offset + pos as u64 + 1);
    }

    chunk.last() == Some(&STORAGE_SEPARATOR)
}

/// Splits `buf` into complete lines terminated by `ending`.
///
/// Returns the line contents (separators removed, stray `\r`/`\n` cleaned) and the
/// index where the unterminated tail begins. A `\r` at the very end of `buf` in
/// `CrLf` mode stays in the tail until the next chunk shows whether `\n` follows.
pub fn split_lines(buf: &[u8], ending: LineEnding) -> (Vec<&[u8]>, usize) {
    let mut lines = Vec::new();
    let mut start = 0usize;
    let sequence = ending.sequence();

    let mut push = |end: usize, start: &mut usize| {
        lines.push(ending.clean_line(&buf[*start..end]));
        *start = end + sequence.len();
    };

    if sequence.len() == 1 {
        for pos in memchr_iter(sequence[0], buf) {
            push(pos, &mut start);
        }
    } else {
        for pos in memmem::find_iter(buf, sequence) {
            push(pos, &mut start);
        }
    }

    (lines, start)
}
