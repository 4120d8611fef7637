//! Persistent filter view: the set of stored lines matching the active query.

use memchr::memmem;

/// Substring query with case and invert options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFilter {
    query: String,
    needle: Vec<u8>,
    match_case: bool,
    invert: bool,
    fold_unicode: bool,
}

impl ActiveFilter {
    pub fn new(query: &str, match_case: bool, invert: bool) -> Self {
        let fold_unicode = !match_case && !query.is_ascii();
        let needle = if match_case {
            query.as_bytes().to_vec()
        } else if fold_unicode {
            query.to_lowercase().into_bytes()
        } else {
            query.as_bytes().to_ascii_lowercase()
        };
        Self {
            query: query.to_string(),
            needle,
            match_case,
            invert,
            fold_unicode,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn match_case(&self) -> bool {
        self.match_case
    }

    pub fn invert(&self) -> bool {
        self.invert
    }

    /// Needle as searched for in raw (or ASCII-lowercased) bytes.
    pub(crate) fn needle(&self) -> &[u8] {
        &self.needle
    }

    /// True when matching can run over whole byte buffers: case-sensitive, or an
    /// ASCII query folded with ASCII lowercasing.
    pub(crate) fn is_byte_level(&self) -> bool {
        !self.fold_unicode
    }

    /// Whether `line` (without terminator) contains the query, ignoring `invert`.
    pub fn contains(&self, line: &[u8]) -> bool {
        if self.match_case {
            memmem::find(line, &self.needle).is_some()
        } else if self.fold_unicode {
            let folded = String::from_utf8_lossy(line).to_lowercase();
            memmem::find(folded.as_bytes(), &self.needle).is_some()
        } else {
            memmem::find(&line.to_ascii_lowercase(), &self.needle).is_some()
        }
    }

    /// Whether `line` belongs in the filtered view.
    pub fn matches(&self, line: &[u8]) -> bool {
        self.contains(line) != self.invert
    }
}

/// An active filter and the ascending line numbers it selects.
#[derive(Debug, Clone)]
pub struct FilterView {
    filter: ActiveFilter,
    lines: Vec<usize>,
}

impl FilterView {
    pub fn new(filter: ActiveFilter, lines: Vec<usize>) -> Self {
        debug_assert!(lines.windows(2).all(|w| w[0] < w[1]));
        Self { filter, lines }
    }

    pub fn filter(&self) -> &ActiveFilter {
        &self.filter
    }

    /// Stored line numbers in the view, ascending.
    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Offers newly stored line `line_no`; it joins the view if it matches.
    pub fn offer(&mut self, line_no: usize, line: &[u8]) -> bool {
        debug_assert!(self.lines.last().map_or(true, |&last| last < line_no));
        let matched = self.filter.matches(line);
        if matched {
            self.lines.push(line_no);
        }
        matched
    }

    /// Empties the view while keeping the filter, for a fresh session.
    pub fn reset(&mut self) {
        self.lines.clear();
    }
}
