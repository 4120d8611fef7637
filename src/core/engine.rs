//! Log engine: one owned instance per worker.
//!
//! Holds the active session (locked store + metadata), the line-offset index, and
//! the streaming state for raw chunks whose last line has not been terminated yet.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::export::ExportStream;
use crate::indexer::{LineEnding, LineIndex};
use crate::search::filter::{ActiveFilter, FilterView};
use crate::session::{Session, SessionManager, SessionState};
use crate::store::{ByteStore, SessionStorage};

/// Append-only log over the current session's byte store.
pub struct LogEngine {
    pub(crate) config: EngineConfig,
    pub(crate) sessions: SessionManager,
    /// End offset of every stored line; rebuilt on resume, reset on rollover.
    pub(crate) index: LineIndex,
    /// Bytes of a raw chunk after its last line ending, waiting for the next chunk.
    pub(crate) pending: Vec<u8>,
    pub(crate) line_ending: LineEnding,
    /// Lines selected by the active filter; kept current as lines are appended.
    pub(crate) filter: Option<FilterView>,
}

impl LogEngine {
    /// Resumes the most recent session in `storage`, or starts a new one.
    ///
    /// Blocks for up to the lock retry budget when the latest session is busy.
    pub fn open(storage: Arc<dyn SessionStorage>, config: EngineConfig) -> Result<Self> {
        let mut sessions = SessionManager::new(storage, &config);
        let index = sessions.start()?;
        tracing::info!(
            session = sessions.current().map(Session::name).unwrap_or_default(),
            lines = index.line_count(),
            "log engine ready"
        );
        Ok(Self {
            line_ending: config.line_ending,
            config,
            sessions,
            index,
            pending: Vec::new(),
            filter: None,
        })
    }

    /// Number of indexed lines.
    #[inline(always)]
    pub fn line_count(&self) -> usize {
        self.index.line_count()
    }

    /// Lines visible to the host: the filtered count while a filter is active,
    /// otherwise every stored line.
    pub fn visible_line_count(&self) -> usize {
        self.filter
            .as_ref()
            .map_or_else(|| self.line_count(), FilterView::len)
    }

    /// The active filter, if any.
    pub fn filter(&self) -> Option<&ActiveFilter> {
        self.filter.as_ref().map(FilterView::filter)
    }

    /// Immutable view of the line index.
    #[inline(always)]
    pub fn index(&self) -> &LineIndex {
        &self.index
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Changes how subsequent raw chunks are split. Stored lines are unaffected.
    pub fn set_line_ending(&mut self, ending: LineEnding) {
        tracing::debug!(ending = %ending, "line ending changed");
        self.line_ending = ending;
    }

    /// Rolls over to a fresh, empty session, deleting the current one when `cleanup`
    /// is set. An active filter stays installed over the empty session.
    pub fn new_session(&mut self, cleanup: bool) -> Result<()> {
        self.index.reset();
        self.pending.clear();
        if let Some(view) = &mut self.filter {
            view.reset();
        }
        self.sessions.new_session(cleanup)
    }

    /// Discards all content by replacing the current session with an empty one.
    pub fn clear(&mut self) -> Result<()> {
        self.new_session(true)
    }

    /// Starts an export of everything written so far.
    ///
    /// The store is flushed and its size snapshotted now; later appends are not part
    /// of the stream. Timestamp prefixes are stripped unless `include_timestamp`.
    pub fn export(&self, include_timestamp: bool) -> Result<ExportStream> {
        let store = self.store()?;
        store.flush()?;
        let size = store.size()?;
        tracing::debug!(bytes = size, include_timestamp, "export started");
        Ok(ExportStream::new(
            store,
            size,
            self.config.export_chunk_size,
            !include_timestamp,
        ))
    }

    /// Releases the session lock. The engine is unusable for storage afterwards.
    pub fn close(&mut self) {
        self.pending.clear();
        self.sessions.close();
    }

    pub(crate) fn store(&self) -> Result<Arc<dyn ByteStore>> {
        self.sessions.store()
    }
}

impl std::fmt::Debug for LogEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEngine")
            .field("session", &self.sessions.current().map(Session::name))
            .field("lines", &self.index.line_count())
            .field("pending", &self.pending.len())
            .field("line_ending", &self.line_ending)
            .field("filter", &self.filter().map(ActiveFilter::query))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogStoreError;
    use crate::store::MemoryStorage;

    fn engine() -> (MemoryStorage, LogEngine) {
        let storage = MemoryStorage::new();
        let engine = LogEngine::open(Arc::new(storage.clone()), EngineConfig::default()).unwrap();
        (storage, engine)
    }

    #[test]
    fn open_creates_an_empty_session() {
        let (storage, engine) = engine();
        assert_eq!(engine.line_count(), 0);
        assert_eq!(engine.session_state(), SessionState::Active);
        let name = engine.session().unwrap().name().to_string();
        assert_eq!(storage.contents(&name).unwrap(), b"");
    }

    #[test]
    fn new_session_resets_index_and_removes_old_resource() {
        let (storage, mut engine) = engine();
        engine.append_line("one").unwrap();
        let old = engine.session().unwrap().name().to_string();

        engine.new_session(true).unwrap();
        assert_eq!(engine.line_count(), 0);
        assert_ne!(engine.session().unwrap().name(), old);
        assert!(storage.contents(&old).is_none());
    }

    #[test]
    fn new_session_without_cleanup_keeps_old_resource() {
        let (storage, mut engine) = engine();
        engine.append_line("one").unwrap();
        let old = engine.session().unwrap().name().to_string();

        engine.new_session(false).unwrap();
        assert_eq!(storage.contents(&old).unwrap(), b"one\n");
    }

    #[test]
    fn clear_drops_pending_partial_line() {
        let (_storage, mut engine) = engine();
        engine.append_chunk(b"half", false).unwrap();
        engine.clear().unwrap();
        engine.append_chunk(b"\n", false).unwrap();
        assert_eq!(engine.read_window(0, 10).unwrap().lines, [""]);
    }

    #[test]
    fn rollover_keeps_filter_but_empties_view() {
        let (_storage, mut engine) = engine();
        engine.append_line("warn: hot").unwrap();
        assert_eq!(engine.apply_filter("warn", true, false).unwrap(), 1);

        engine.new_session(true).unwrap();
        assert_eq!(engine.visible_line_count(), 0);
        assert_eq!(engine.filter().map(ActiveFilter::query), Some("warn"));

        engine.append_line("ok").unwrap();
        engine.append_line("warn: cold").unwrap();
        assert_eq!(engine.visible_line_count(), 1);
        assert_eq!(engine.read_window(0, 5).unwrap().lines, ["warn: cold"]);
    }

    #[test]
    fn closed_engine_reports_no_session() {
        let (_storage, mut engine) = engine();
        engine.close();
        assert!(matches!(
            engine.append_line("late"),
            Err(LogStoreError::NoSession)
        ));
        assert!(matches!(engine.export(true), Err(LogStoreError::NoSession)));
    }
}
