//! Windowed reads: resolve a line range through the index, read its bytes in one
//! call, and cut them back into lines.

use crate::core::engine::LogEngine;
use crate::error::{LogStoreError, Result};
use crate::indexer::scanner::STORAGE_SEPARATOR;
use crate::store::ByteStore;

/// Lines served for a window request, with the start line actually used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogWindow {
    pub start_line: usize,
    pub lines: Vec<String>,
}

impl LogEngine {
    /// Reads up to `count` lines starting at `start_line`.
    ///
    /// With a filter active, positions refer to the filtered view rather than to
    /// stored lines. Out-of-range requests are clamped and come back empty rather
    /// than failing.
    pub fn read_window(&self, start_line: usize, count: usize) -> Result<LogWindow> {
        let total = self.visible_line_count();
        let start = start_line.min(total);
        let end = start.saturating_add(count).min(total);
        if end <= start {
            return Ok(LogWindow {
                start_line: start,
                lines: Vec::new(),
            });
        }

        let lines = match &self.filter {
            Some(view) => self.read_selected(&view.lines()[start..end])?,
            None => self.read_lines(start, end)?,
        };
        Ok(LogWindow {
            start_line: start,
            lines,
        })
    }

    /// Stored lines `start..end`, read in one call.
    fn read_lines(&self, start: usize, end: usize) -> Result<Vec<String>> {
        let (byte_start, byte_end) = self.index.byte_range(start, end - start);
        let store = self.store()?;
        let blob = read_range(store.as_ref(), byte_start, byte_end)?;
        Ok(decode_lines(&blob, &self.index.line_ends(start, end)))
    }

    /// Stored lines by ascending number; each run of consecutive lines is one read.
    fn read_selected(&self, selected: &[usize]) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(selected.len());
        let mut rest = selected;
        while let Some(&first) = rest.first() {
            let run = rest
                .iter()
                .enumerate()
                .take_while(|&(i, &line)| line == first + i)
                .count();
            lines.extend(self.read_lines(first, first + run)?);
            rest = &rest[run..];
        }
        Ok(lines)
    }
}

/// Reads exactly `start..end` from `store`.
pub(crate) fn read_range(store: &dyn ByteStore, start: u64, end: u64) -> Result<Vec<u8>> {
    let expected = end - start;
    let mut buf = vec![0u8; expected as usize];
    let actual = store
        .read_at(&mut buf, start)
        .map_err(|source| LogStoreError::StorageReadFailed {
            offset: start,
            source,
        })? as u64;

    if actual < expected {
        return Err(LogStoreError::TruncatedRead {
            offset: start,
            expected,
            actual,
        });
    }
    Ok(buf)
}

/// Decodes lines from a contiguous blob and relative line end offsets.
/// `line_ends[i]` is exclusive, so line `i` = `blob[prev_end..line_ends[i]]`, minus
/// its terminator. Invalid UTF-8 is replaced rather than rejected.
fn decode_lines(blob: &[u8], line_ends: &[u64]) -> Vec<String> {
    let mut lines = Vec::with_capacity(line_ends.len());
    let mut start = 0usize;
    for &end in line_ends {
        let end = (end as usize).min(blob.len());
        let slice = &blob[start..end];
        let slice = slice.strip_suffix(&[STORAGE_SEPARATOR]).unwrap_or(slice);
        lines.push(String::from_utf8_lossy(slice).into_owned());
        start = end;
    }
    lines
}
