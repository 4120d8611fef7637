//! Line-number → byte-offset table.
//!
//! `offsets[i]` is the byte offset just past line `i`'s terminator, with a leading
//! `0`, so line `i` occupies `offsets[i]..offsets[i + 1]`. All range queries clamp
//! instead of failing, so callers never tell "out of range" apart from "empty".

/// Offset table for the lines of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    offsets: Vec<u64>,
}

impl LineIndex {
    pub fn new() -> Self {
        Self { offsets: vec![0] }
    }

    /// Records one more line ending at `new_total_bytes`.
    ///
    /// Offsets must not go backwards; callers check the store size before pushing.
    #[inline(always)]
    pub fn append_offset(&mut self, new_total_bytes: u64) {
        debug_assert!(new_total_bytes >= self.end_offset());
        self.offsets.push(new_total_bytes);
    }

    /// Appends a batch of line end offsets produced by the scanner.
    pub fn extend_offsets(&mut self, line_ends: &[u64]) {
        debug_assert!(line_ends.first().map_or(true, |&o| o >= self.end_offset()));
        self.offsets.extend_from_slice(line_ends);
    }

    #[inline(always)]
    pub fn line_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total bytes covered by indexed lines.
    #[inline(always)]
    pub fn end_offset(&self) -> u64 {
        self.offsets[self.offsets.len() - 1]
    }

    /// Immutable view of the offsets, including the leading zero.
    #[inline(always)]
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// `(start, end)` byte range covering `count` lines from `start_line`, both
    /// clamped to `[0, line_count]`.
    pub fn byte_range(&self, start_line: usize, count: usize) -> (u64, u64) {
        let n = self.line_count();
        let start = start_line.min(n);
        let end = start_line.saturating_add(count).min(n);
        (self.offsets[start], self.offsets[end.max(start)])
    }

    /// End offset of every line in `[start, end)` relative to `offsets[start]`, so
    /// line `k` of a blob read at `byte_range(start, ..)` is `blob[prev_end..ends[k]]`.
    pub fn line_ends(&self, start: usize, end: usize) -> Vec<u64> {
        let n = self.line_count();
        let end = end.min(n);
        let start = start.min(end);
        let base = self.offsets[start];
        self.offsets[start + 1..=end]
            .iter()
            .map(|&o| o - base)
            .collect()
    }

    /// Drops every line, back to `[0]`.
    pub fn reset(&mut self) {
        self.offsets.clear();
        self.offsets.push(0);
    }
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new()
    }
}
