//! Session lifecycle: resume-or-create at startup, bounded lock retry, stale-session
//! cleanup, and explicit rollover.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::error::{LogStoreError, Result};
use crate::indexer::scanner::{scan_chunk, STORAGE_SEPARATOR};
use crate::indexer::LineIndex;
use crate::store::{is_busy, ByteStore, SessionStorage};

pub const SESSION_PREFIX: &str = "logs_";
pub const SESSION_SUFFIX: &str = ".txt";

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    ResumingExisting,
    LockFailed,
    CreatingNew,
    Active,
}

/// One locked session resource.
#[derive(Clone)]
pub struct Session {
    name: String,
    created_ms: u64,
    store: Arc<dyn ByteStore>,
}

impl Session {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time in Unix milliseconds, taken from the resource name.
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    pub fn store(&self) -> &Arc<dyn ByteStore> {
        &self.store
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("created_ms", &self.created_ms)
            .finish()
    }
}

/// Resource name for a session created at `created_ms`.
pub fn session_name(created_ms: u64) -> String {
    format!("{SESSION_PREFIX}{created_ms}{SESSION_SUFFIX}")
}

/// Largest creation identifier accepted from storage: the last millisecond a
/// `chrono` timestamp can represent.
const MAX_SESSION_MS: u64 = i64::MAX as u64;

/// Creation identifier of a session resource, or `None` for unrelated names and
/// identifiers no clock could have produced.
pub fn parse_session_name(name: &str) -> Option<u64> {
    let ms: u64 = name
        .strip_prefix(SESSION_PREFIX)?
        .strip_suffix(SESSION_SUFFIX)?
        .parse()
        .ok()?;
    (ms <= MAX_SESSION_MS).then_some(ms)
}

/// Owns the active session and the storage it came from.
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    lock_attempts: u32,
    lock_backoff: Duration,
    scan_block: usize,
    state: SessionState,
    current: Option<Session>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>, config: &EngineConfig) -> Self {
        Self {
            storage,
            lock_attempts: config.lock_retry_attempts.max(1),
            lock_backoff: config.lock_retry_backoff,
            scan_block: config.export_chunk_size.max(1),
            state: SessionState::NoSession,
            current: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Store of the active session.
    pub fn store(&self) -> Result<Arc<dyn ByteStore>> {
        self.current
            .as_ref()
            .map(|s| Arc::clone(&s.store))
            .ok_or(LogStoreError::NoSession)
    }

    /// Resumes the newest session (rebuilding its index) or creates a fresh one, then
    /// removes every other session resource nobody holds.
    ///
    /// A newest session that stays locked belongs to another engine; it is left in
    /// place and a fresh session is started beside it.
    pub fn start(&mut self) -> Result<LineIndex> {
        self.current = None;
        self.state = SessionState::NoSession;

        let mut candidates = self.candidates()?;
        if candidates.is_empty() {
            self.create_new(None)?;
            return Ok(LineIndex::new());
        }

        let (created_ms, name) = candidates.remove(0);
        self.state = SessionState::ResumingExisting;
        tracing::debug!(session = %name, "resuming session");

        match self.acquire_lock(&name, false) {
            Ok(store) => {
                let index = rebuild_index(store.as_ref(), self.scan_block)?;
                tracing::info!(session = %name, lines = index.line_count(), "session resumed");
                self.current = Some(Session {
                    name,
                    created_ms,
                    store,
                });
                self.state = SessionState::Active;
                self.remove_stale(candidates.iter().map(|(_, n)| n.as_str()));
                Ok(index)
            }
            Err(e) => {
                tracing::warn!(session = %name, error = %e, "could not resume session, starting fresh");
                self.state = SessionState::LockFailed;
                self.create_new(Some(created_ms))?;
                self.remove_stale(candidates.iter().map(|(_, n)| n.as_str()));
                Ok(LineIndex::new())
            }
        }
    }

    /// Switches to a brand-new empty session, removing the current resource first
    /// when `cleanup` is set.
    pub fn new_session(&mut self, cleanup: bool) -> Result<()> {
        let mut previous = None;
        if let Some(old) = self.current.take() {
            previous = Some(old.created_ms);
            if cleanup {
                // Deleted under our own lock so no other engine can pick it up first.
                if let Err(e) = self.storage.remove(&old.name) {
                    tracing::warn!(session = %old.name, error = %e, "failed to remove old session");
                }
            }
            drop(old);
        }
        self.state = SessionState::NoSession;
        self.create_new(previous)
    }

    /// Releases the active session's lock.
    pub fn close(&mut self) {
        if let Some(session) = self.current.take() {
            tracing::debug!(session = %session.name, "session closed");
        }
        self.state = SessionState::NoSession;
    }

    /// Takes the exclusive lock on `name`, retrying while it is busy.
    pub fn acquire_lock(&self, name: &str, create: bool) -> Result<Arc<dyn ByteStore>> {
        for attempt in 1..=self.lock_attempts {
            match self.storage.try_lock(name, create) {
                Ok(store) => return Ok(store),
                Err(e) if is_busy(&e) => {
                    tracing::debug!(session = %name, attempt, "session busy");
                    if attempt < self.lock_attempts {
                        thread::sleep(self.lock_backoff);
                    }
                }
                Err(e) => return Err(LogStoreError::Storage(e)),
            }
        }
        Err(LogStoreError::LockAcquisitionFailed {
            name: name.to_string(),
            attempts: self.lock_attempts,
        })
    }

    /// Session resources in storage, newest first.
    fn candidates(&self) -> Result<Vec<(u64, String)>> {
        let mut found: Vec<(u64, String)> = self
            .storage
            .list()?
            .into_iter()
            .filter_map(|name| parse_session_name(&name).map(|ms| (ms, name)))
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found)
    }

    /// Creates and locks a session named after the current time, bumped past `after`
    /// and every existing session so names stay unique and ordered.
    fn create_new(&mut self, after: Option<u64>) -> Result<()> {
        self.state = SessionState::CreatingNew;

        let newest = self.candidates()?.first().map(|(ms, _)| *ms);
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let created_ms = match newest.max(after) {
            Some(ms) if ms >= now => ms.saturating_add(1),
            _ => now,
        };
        let name = session_name(created_ms);

        let store = self.acquire_lock(&name, true)?;
        tracing::info!(session = %name, "session created");
        self.current = Some(Session {
            name,
            created_ms,
            store,
        });
        self.state = SessionState::Active;
        Ok(())
    }

    /// Deletes each named session that can be locked right now. Sessions held by
    /// another engine are kept; the delete happens while the lock is held.
    fn remove_stale<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            let lock = match self.storage.try_lock(name, false) {
                Ok(lock) => lock,
                Err(e) if is_busy(&e) => {
                    tracing::debug!(session = %name, "stale session in use, kept");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(session = %name, error = %e, "failed to lock stale session");
                    continue;
                }
            };
            match self.storage.remove(name) {
                Ok(()) => tracing::debug!(session = %name, "stale session removed"),
                Err(e) => tracing::warn!(session = %name, error = %e, "failed to remove stale session"),
            }
            drop(lock);
        }
    }
}

/// Rebuilds the line index by scanning `store` for separators, `block` bytes at a time.
///
/// An unterminated tail (an append interrupted mid-write) is closed with a separator
/// so the index and the store agree on where the last line ends.
pub fn rebuild_index(store: &dyn ByteStore, block: usize) -> Result<LineIndex> {
    let size = store.size()?;
    let mut index = LineIndex::new();
    let mut buf = vec![0u8; block.max(1)];
    let mut offset = 0u64;
    let mut ends_with_separator = true;
    let mut line_ends = Vec::new();

    while offset < size {
        let want = (size - offset).min(buf.len() as u64) as usize;
        let got = store
            .read_at(&mut buf[..want], offset)
            .map_err(|source| LogStoreError::StorageReadFailed { offset, source })?;
        if got < want {
            return Err(LogStoreError::TruncatedRead {
                offset,
                expected: want as u64,
                actual: got as u64,
            });
        }

        line_ends.clear();
        ends_with_separator = scan_chunk(&buf[..got], offset, &mut line_ends);
        index.extend_offsets(&line_ends);
        offset += got as u64;
    }

    if !ends_with_separator {
        tracing::warn!(bytes = size - index.end_offset(), "terminating partial last line");
        store
            .write_at(&[STORAGE_SEPARATOR], size)
            .map_err(|source| LogStoreError::StorageWriteFailed {
                offset: size,
                source,
            })?;
        index.append_offset(size + 1);
    }

    Ok(index)
}
