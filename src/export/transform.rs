//! Chunk-boundary-safe timestamp stripping for exports.

use memchr::memchr_iter;

use crate::core::format::strip_timestamp;
use crate::indexer::scanner::STORAGE_SEPARATOR;

/// Removes a leading `[HH:MM:SS.mmm] ` from every line of a chunked byte stream.
///
/// Only complete lines are emitted; the unterminated fragment of each chunk is held
/// until the next one, so the output does not depend on where chunks were cut.
#[derive(Debug, Default)]
pub struct LineTransform {
    pending: Vec<u8>,
}

impl LineTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the transformed complete lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pending.len() + chunk.len());
        let mut start = 0usize;

        for pos in memchr_iter(STORAGE_SEPARATOR, chunk) {
            if self.pending.is_empty() {
                out.extend_from_slice(strip_timestamp(&chunk[start..pos]));
            } else {
                self.pending.extend_from_slice(&chunk[start..pos]);
                out.extend_from_slice(strip_timestamp(&self.pending));
                self.pending.clear();
            }
            out.push(STORAGE_SEPARATOR);
            start = pos + 1;
        }

        self.pending.extend_from_slice(&chunk[start..]);
        out
    }

    /// Flushes the held fragment, transformed but without a separator.
    pub fn finish(self) -> Vec<u8> {
        strip_timestamp(&self.pending).to_vec()
    }
}
