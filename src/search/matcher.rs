//! Substring search. Returns line numbers (not byte offsets) of matching lines.
//!
//! The log is read in batches of lines through the index. Byte-level queries search
//! each batch with `memchr::memmem::find_iter` and map hit positions to lines by
//! binary search over the batch's line end offsets; queries that need Unicode case
//! folding test line by line.

use memchr::memmem;

use crate::core::engine::LogEngine;
use crate::core::window::read_range;
use crate::error::Result;
use crate::search::filter::{ActiveFilter, FilterView};

/// Lines read per batch.
pub const SEARCH_BATCH_LINES: usize = 5000;

impl LogEngine {
    /// Ascending line numbers whose text contains `query`.
    ///
    /// Without `match_case` both sides are lowercased: ASCII-only for ASCII queries,
    /// full Unicode otherwise. `invert` returns the lines that do not match. A blank
    /// query matches every line.
    pub fn search(&self, query: &str, match_case: bool, invert: bool) -> Result<Vec<usize>> {
        if query.trim().is_empty() {
            return Ok((0..self.line_count()).collect());
        }
        self.matching_lines(&ActiveFilter::new(query, match_case, invert))
    }

    /// Installs a filter over the log and returns how many lines it selects.
    ///
    /// Windows, counts and later appends all go through the filtered view until it
    /// is cleared. A blank query clears the filter and returns the full line count.
    pub fn apply_filter(&mut self, query: &str, match_case: bool, invert: bool) -> Result<usize> {
        if query.trim().is_empty() {
            self.clear_filter();
            return Ok(self.line_count());
        }
        let filter = ActiveFilter::new(query, match_case, invert);
        let lines = self.matching_lines(&filter)?;
        tracing::debug!(query, matches = lines.len(), "filter applied");
        self.filter = Some(FilterView::new(filter, lines));
        Ok(self.visible_line_count())
    }

    /// Drops the active filter; windows and counts cover every stored line again.
    pub fn clear_filter(&mut self) {
        if self.filter.take().is_some() {
            tracing::debug!("filter cleared");
        }
    }

    fn matching_lines(&self, filter: &ActiveFilter) -> Result<Vec<usize>> {
        let total = self.line_count();
        let store = self.store()?;
        let mut found = Vec::new();

        let mut start = 0usize;
        while start < total {
            let end = start.saturating_add(SEARCH_BATCH_LINES).min(total);
            let (byte_start, byte_end) = self.index.byte_range(start, end - start);
            let mut blob = read_range(store.as_ref(), byte_start, byte_end)?;
            let line_ends = self.index.line_ends(start, end);

            let hits = if filter.is_byte_level() {
                if !filter.match_case() {
                    blob.make_ascii_lowercase();
                }
                match_lines(&blob, &line_ends, filter.needle())
            } else {
                contained_lines(&blob, &line_ends, filter)
            };

            if filter.invert() {
                let mut hits = hits.into_iter().peekable();
                for line in 0..end - start {
                    if hits.next_if_eq(&line).is_none() {
                        found.push(start + line);
                    }
                }
            } else {
                found.extend(hits.into_iter().map(|line| start + line));
            }
            start = end;
        }

        tracing::debug!(matches = found.len(), lines = total, "search finished");
        Ok(found)
    }
}

/// Line-by-line fallback for queries the byte search cannot fold.
fn contained_lines(buffer: &[u8], line_ends: &[u64], filter: &ActiveFilter) -> Vec<usize> {
    let mut lines = Vec::new();
    let mut line_start = 0usize;
    for (line, &end) in line_ends.iter().enumerate() {
        let end = (end as usize).min(buffer.len());
        let content = &buffer[line_start..end.saturating_sub(1).max(line_start)];
        if filter.contains(content) {
            lines.push(line);
        }
        line_start = end;
    }
    lines
}

/// Finds the lines of `buffer` that contain `needle`, as 0-based positions in
/// `line_ends` (exclusive end offsets, terminator included). Matches that run into a
/// terminator do not count.
pub fn match_lines(buffer: &[u8], line_ends: &[u64], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() {
        return (0..line_ends.len()).collect();
    }
    if line_ends.is_empty() || buffer.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<usize> = memmem::find_iter(buffer, needle)
        .filter_map(|pos| {
            let line = byte_pos_to_line(pos, line_ends);
            let content_end = line_ends.get(line)?.saturating_sub(1);
            ((pos + needle.len()) as u64 <= content_end).then_some(line)
        })
        .collect();
    lines.dedup();
    lines
}

/// Line containing byte `pos`: the first whose end lies past it.
#[inline(always)]
fn byte_pos_to_line(pos: usize, line_ends: &[u64]) -> usize {
    let pos = pos as u64;
    line_ends.partition_point(|&end| end <= pos)
}
