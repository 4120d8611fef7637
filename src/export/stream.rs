//! Pull-based export of a session's bytes.

use std::io;
use std::iter::FusedIterator;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{LogStoreError, Result};
use crate::export::transform::LineTransform;
use crate::store::ByteStore;

/// Chunks of everything the store held when the export started.
///
/// One chunk is read per pull. Dropping the stream abandons the export.
pub struct ExportStream {
    store: Arc<dyn ByteStore>,
    cursor: u64,
    size: u64,
    chunk_size: usize,
    transform: Option<LineTransform>,
    done: bool,
}

impl ExportStream {
    /// Streams `store[0..size]` in `chunk_size` reads, stripping line timestamps when
    /// `strip_timestamps` is set.
    pub fn new(
        store: Arc<dyn ByteStore>,
        size: u64,
        chunk_size: usize,
        strip_timestamps: bool,
    ) -> Self {
        Self {
            store,
            cursor: 0,
            size,
            chunk_size: chunk_size.max(1),
            transform: strip_timestamps.then(LineTransform::new),
            done: false,
        }
    }

    /// Bytes of stored log covered by this export.
    pub fn snapshot_size(&self) -> u64 {
        self.size
    }

    /// Runs each pull on the blocking pool and yields the chunks as a `Stream`.
    pub fn into_async(self) -> BoxStream<'static, Result<Bytes>> {
        stream::unfold(Some(self), |state| async move {
            let mut export = state?;
            let pulled = tokio::task::spawn_blocking(move || {
                let item = export.next();
                (item, export)
            })
            .await;
            match pulled {
                Ok((item, export)) => item.map(|item| (item, Some(export))),
                Err(e) => Some((Err(LogStoreError::Storage(io::Error::other(e))), None)),
            }
        })
        .boxed()
    }

    fn finish_transform(&mut self) -> Option<Result<Bytes>> {
        let tail = self.transform.take()?.finish();
        (!tail.is_empty()).then(|| Ok(Bytes::from(tail)))
    }
}

impl Iterator for ExportStream {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.cursor >= self.size {
                self.done = true;
                return self.finish_transform();
            }

            let want = (self.size - self.cursor).min(self.chunk_size as u64) as usize;
            let mut buf = vec![0u8; want];
            let offset = self.cursor;
            let read = match self.store.read_at(&mut buf, offset) {
                Ok(n) => n,
                Err(source) => {
                    tracing::warn!(offset, error = %source, "export read failed");
                    self.done = true;
                    self.transform = None;
                    return Some(Err(LogStoreError::StorageReadFailed { offset, source }));
                }
            };
            if read == 0 {
                self.done = true;
                return self.finish_transform();
            }

            buf.truncate(read);
            self.cursor += read as u64;
            match self.transform.as_mut() {
                None => return Some(Ok(Bytes::from(buf))),
                Some(transform) => {
                    let out = transform.push(&buf);
                    if !out.is_empty() {
                        return Some(Ok(Bytes::from(out)));
                    }
                }
            }
        }
    }
}

impl FusedIterator for ExportStream {}

impl std::fmt::Debug for ExportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStream")
            .field("cursor", &self.cursor)
            .field("size", &self.size)
            .field("chunk_size", &self.chunk_size)
            .field("strip_timestamps", &self.transform.is_some())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::{MemoryStorage, SessionStorage};

    fn store_with(contents: &str) -> Arc<dyn ByteStore> {
        let storage = MemoryStorage::new();
        storage.insert("logs_1.txt", contents);
        storage.try_lock("logs_1.txt", false).unwrap()
    }

    fn collect(export: ExportStream) -> Vec<u8> {
        export.flat_map(|chunk| chunk.unwrap().to_vec()).collect()
    }

    #[test]
    fn raw_export_is_byte_identical() {
        let text = "[00:00:00.001] a\nbb\n\nccc\n";
        for chunk_size in 1..=text.len() + 1 {
            let store = store_with(text);
            let export = ExportStream::new(store, text.len() as u64, chunk_size, false);
            assert_eq!(collect(export), text.as_bytes(), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn chunks_respect_size_limit() {
        let store = store_with("0123456789");
        let sizes: Vec<usize> = ExportStream::new(store, 10, 4, false)
            .map(|c| c.unwrap().len())
            .collect();
        assert_eq!(sizes, [4, 4, 2]);
    }

    #[test]
    fn stripped_export_drops_prefixes_at_any_chunk_size() {
        let text = "[10:11:12.131] first\n[10:11:12.132] second\nraw\n";
        for chunk_size in 1..=text.len() {
            let store = store_with(text);
            let export = ExportStream::new(store, text.len() as u64, chunk_size, true);
            assert_eq!(collect(export), b"first\nsecond\nraw\n");
        }
    }

    #[test]
    fn later_appends_are_excluded() {
        let store = store_with("a\n");
        let export = ExportStream::new(Arc::clone(&store), 2, 64, false);
        store.write_at(b"b\n", 2).unwrap();
        assert_eq!(export.snapshot_size(), 2);
        assert_eq!(collect(export), b"a\n");
    }

    #[test]
    fn empty_log_yields_nothing() {
        let mut export = ExportStream::new(store_with(""), 0, 64, true);
        assert!(export.next().is_none());
        assert!(export.next().is_none());
    }

    #[derive(Debug)]
    struct FailAfter {
        inner: Arc<dyn ByteStore>,
        reads: AtomicUsize,
    }

    impl ByteStore for FailAfter {
        fn size(&self) -> io::Result<u64> {
            self.inner.size()
        }
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Err(io::Error::other("unplugged"));
            }
            self.inner.read_at(buf, offset)
        }
        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
            self.inner.write_at(buf, offset)
        }
        fn flush(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn read_error_is_yielded_once_then_ends() {
        let store = Arc::new(FailAfter {
            inner: store_with("abcdefgh"),
            reads: AtomicUsize::new(0),
        });
        let mut export = ExportStream::new(store, 8, 4, false);
        assert_eq!(export.next().unwrap().unwrap(), &b"abcd"[..]);
        assert!(matches!(
            export.next(),
            Some(Err(LogStoreError::StorageReadFailed { offset: 4, .. }))
        ));
        assert!(export.next().is_none());
    }

    /// Serves one read, then reports end of data although the snapshot is larger.
    #[derive(Debug)]
    struct RunsDry {
        inner: Arc<dyn ByteStore>,
        reads: AtomicUsize,
    }

    impl ByteStore for RunsDry {
        fn size(&self) -> io::Result<u64> {
            self.inner.size()
        }
        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            if self.reads.fetch_add(1, Ordering::SeqCst) >= 1 {
                return Ok(0);
            }
            self.inner.read_at(buf, offset)
        }
        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
            self.inner.write_at(buf, offset)
        }
        fn flush(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn runs_dry(contents: &str) -> Arc<RunsDry> {
        Arc::new(RunsDry {
            inner: store_with(contents),
            reads: AtomicUsize::new(0),
        })
    }

    #[test]
    fn early_end_of_data_stops_the_stream() {
        let mut export = ExportStream::new(runs_dry("a\nfrag\nmore\n"), 12, 6, false);
        assert_eq!(export.next().unwrap().unwrap(), &b"a\nfrag"[..]);
        assert!(export.next().is_none());
        assert!(export.next().is_none());
    }

    #[test]
    fn early_end_of_data_flushes_held_fragment_once() {
        let mut export = ExportStream::new(runs_dry("a\nfrag\nmore\n"), 12, 6, true);
        assert_eq!(export.next().unwrap().unwrap(), &b"a\n"[..]);
        assert_eq!(export.next().unwrap().unwrap(), &b"frag"[..]);
        assert!(export.next().is_none());
        assert!(export.next().is_none());
    }

    #[tokio::test]
    async fn async_stream_matches_iterator() {
        let text = "[00:00:00.000] one\n[00:00:00.000] two\n";
        let export = ExportStream::new(store_with(text), text.len() as u64, 5, true);
        let chunks: Vec<Bytes> = export
            .into_async()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"one\ntwo\n");
    }
}
