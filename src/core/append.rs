//! Appending lines and raw chunks. Every append is one store write; the index only
//! advances once that write has succeeded.

use chrono::Utc;

use crate::core::engine::LogEngine;
use crate::core::format::{hex_line, timestamp_prefix};
use crate::error::{LogStoreError, Result};
use crate::indexer::scanner::{scan_chunk, split_lines, STORAGE_SEPARATOR};

impl LogEngine {
    /// Appends `text` as one line and returns the new line count.
    ///
    /// Text that itself contains `\n` is stored and indexed as several lines, the
    /// same way a rebuild after restart would see it.
    pub fn append_line(&mut self, text: &str) -> Result<usize> {
        let batch = self.encode_lines([text.as_bytes()]);
        self.write_batch(&batch)?;
        Ok(self.line_count())
    }

    /// Appends a raw chunk from the source and returns the new line count.
    ///
    /// Text chunks are split on the configured line ending; the unterminated tail is
    /// held until a later chunk completes it. Hex chunks become one line of hex pairs.
    pub fn append_chunk(&mut self, chunk: &[u8], is_hex: bool) -> Result<usize> {
        if is_hex {
            let line = hex_line(chunk);
            let batch = self.encode_lines([line.as_bytes()]);
            self.write_batch(&batch)?;
            return Ok(self.line_count());
        }

        let mut buf = Vec::with_capacity(self.pending.len() + chunk.len());
        buf.extend_from_slice(&self.pending);
        buf.extend_from_slice(chunk);

        let (lines, tail) = split_lines(&buf, self.line_ending);
        if !lines.is_empty() {
            let batch = self.encode_lines(lines);
            self.write_batch(&batch)?;
        }

        // Only reached when the write (if any) succeeded.
        buf.drain(..tail);
        self.pending = buf;
        Ok(self.line_count())
    }

    /// Terminates each line with the storage separator, stamping it if configured.
    fn encode_lines<'a>(&self, lines: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
        let prefix = self
            .config
            .stamp_lines
            .then(|| timestamp_prefix(Utc::now()));

        let mut batch = Vec::new();
        for line in lines {
            if let Some(prefix) = &prefix {
                batch.extend_from_slice(prefix.as_bytes());
            }
            batch.extend_from_slice(line);
            batch.push(STORAGE_SEPARATOR);
        }
        batch
    }

    /// Writes `batch` at the store's current end and indexes every separator in it.
    fn write_batch(&mut self, batch: &[u8]) -> Result<()> {
        let store = self.store()?;
        let start = store.size()?;
        let indexed = self.index.end_offset();
        if start < indexed {
            return Err(LogStoreError::IndexOutOfSync {
                indexed,
                actual: start,
            });
        }

        store
            .write_at(batch, start)
            .map_err(|source| LogStoreError::StorageWriteFailed {
                offset: start,
                source,
            })?;

        let mut line_ends = Vec::new();
        scan_chunk(batch, start, &mut line_ends);
        let first_line = self.index.line_count();
        self.index.extend_offsets(&line_ends);

        if let Some(view) = &mut self.filter {
            let mut line_start = 0usize;
            for (i, &end) in line_ends.iter().enumerate() {
                let line_end = (end - start) as usize;
                view.offer(first_line + i, &batch[line_start..line_end - 1]);
                line_start = line_end;
            }
        }
        tracing::trace!(
            offset = start,
            bytes = batch.len(),
            lines = line_ends.len(),
            "batch appended"
        );
        Ok(())
    }
}
