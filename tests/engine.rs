use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serial_log_store::store::busy_error;
use serial_log_store::{
    ByteStore, DirStorage, EngineConfig, EngineHandle, LogEngine, LogStoreError, Notification,
    SessionManager, SessionStorage,
};
use tempfile::TempDir;

fn fast_config() -> EngineConfig {
    EngineConfig::default().with_lock_retry(20, Duration::from_millis(1))
}

fn open(dir: &TempDir) -> LogEngine {
    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    LogEngine::open(storage, fast_config()).unwrap()
}

fn export_bytes(engine: &LogEngine, include_timestamp: bool) -> Vec<u8> {
    engine
        .export(include_timestamp)
        .unwrap()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect()
}

#[test]
fn windows_return_what_was_appended() {
    let dir = TempDir::new().unwrap();
    let mut engine = open(&dir);
    let lines: Vec<String> = (0..500).map(|i| format!("line {i} ✓")).collect();
    for line in &lines {
        engine.append_line(line).unwrap();
    }

    for (start, count) in [(0, 1), (0, 500), (123, 77), (499, 10), (600, 5)] {
        let window = engine.read_window(start, count).unwrap();
        let begin = start.min(lines.len());
        let end = (start + count).min(lines.len());
        assert_eq!(window.start_line, begin);
        assert_eq!(window.lines, &lines[begin..end]);
    }
}

#[test]
fn export_round_trips_and_strips_timestamps() {
    let dir = TempDir::new().unwrap();
    let config = fast_config().with_stamp_lines(true).with_export_chunk_size(7);
    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    let mut engine = LogEngine::open(storage, config).unwrap();

    engine.append_line("first").unwrap();
    engine.append_chunk(b"second\r\nthi", false).unwrap();
    engine.append_chunk(b"rd\n", false).unwrap();

    let raw = export_bytes(&engine, true);
    let stamped = String::from_utf8(raw).unwrap();
    let stamped_lines: Vec<&str> = stamped.lines().collect();
    assert_eq!(stamped_lines.len(), 3);
    assert!(stamped_lines.iter().all(|l| l.starts_with('[') && l.len() > 15));

    assert_eq!(export_bytes(&engine, false), b"first\nsecond\nthird\n");
}

#[test]
fn restart_resumes_latest_session() {
    let dir = TempDir::new().unwrap();
    {
        let mut engine = open(&dir);
        engine.append_line("before").unwrap();
        engine.append_line("restart").unwrap();
    }

    let mut engine = open(&dir);
    assert_eq!(engine.line_count(), 2);
    engine.append_line("after").unwrap();
    assert_eq!(
        engine.read_window(0, 3).unwrap().lines,
        ["before", "restart", "after"]
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn torn_tail_is_terminated_on_resume() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("logs_5.txt"), b"whole\npart").unwrap();

    let mut engine = open(&dir);
    assert_eq!(engine.line_count(), 2);
    engine.append_line("next").unwrap();
    assert_eq!(
        engine.read_window(0, 3).unwrap().lines,
        ["whole", "part", "next"]
    );
}

/// Reports the resource as busy for the first `busy_for` lock attempts.
struct ContendedStorage {
    inner: DirStorage,
    busy_for: u32,
    attempts: AtomicU32,
}

impl SessionStorage for ContendedStorage {
    fn list(&self) -> io::Result<Vec<String>> {
        self.inner.list()
    }

    fn try_lock(&self, name: &str, create: bool) -> io::Result<Arc<dyn ByteStore>> {
        if !create && self.attempts.fetch_add(1, Ordering::SeqCst) < self.busy_for {
            return Err(busy_error(name));
        }
        self.inner.try_lock(name, create)
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        self.inner.remove(name)
    }
}

fn contended(dir: &TempDir, busy_for: u32) -> Arc<ContendedStorage> {
    Arc::new(ContendedStorage {
        inner: DirStorage::open(dir.path()).unwrap(),
        busy_for,
        attempts: AtomicU32::new(0),
    })
}

#[test]
fn lock_succeeds_on_last_attempt() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("logs_10.txt"), b"kept\n").unwrap();

    let storage = contended(&dir, 19);
    let engine = LogEngine::open(storage.clone(), fast_config()).unwrap();
    assert_eq!(storage.attempts.load(Ordering::SeqCst), 20);
    assert_eq!(engine.session().unwrap().name(), "logs_10.txt");
    assert_eq!(engine.read_window(0, 1).unwrap().lines, ["kept"]);
}

#[test]
fn lock_gives_up_after_twenty_attempts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("logs_10.txt"), b"held\n").unwrap();

    let manager = SessionManager::new(contended(&dir, 20), &fast_config());
    assert!(matches!(
        manager.acquire_lock("logs_10.txt", false),
        Err(LogStoreError::LockAcquisitionFailed { attempts: 20, .. })
    ));
}

#[test]
fn contended_startup_falls_back_to_fresh_session() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("logs_10.txt"), b"held\n").unwrap();

    let engine = LogEngine::open(contended(&dir, 20), fast_config()).unwrap();
    assert_eq!(engine.line_count(), 0);
    assert_ne!(engine.session().unwrap().name(), "logs_10.txt");
    assert_eq!(std::fs::read(dir.path().join("logs_10.txt")).unwrap(), b"held\n");
}

#[test]
fn second_engine_leaves_the_live_session_alone() {
    let dir = TempDir::new().unwrap();
    let mut first = open(&dir);
    first.append_line("one").unwrap();
    let live = first.session().unwrap().name().to_string();

    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    let config = EngineConfig::default().with_lock_retry(2, Duration::from_millis(1));
    let second = LogEngine::open(storage, config).unwrap();
    assert_ne!(second.session().unwrap().name(), live);
    assert_eq!(second.line_count(), 0);

    first.append_line("two").unwrap();
    assert_eq!(first.read_window(0, 2).unwrap().lines, ["one", "two"]);
    assert_eq!(std::fs::read(dir.path().join(&live)).unwrap(), b"one\ntwo\n");
}

#[tokio::test]
async fn rapid_appends_are_coalesced() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    let (handle, mut notes) = EngineHandle::open(storage, fast_config()).await.unwrap();

    for i in 0..100 {
        handle.append_log(format!("msg {i}")).await.unwrap();
    }
    assert_eq!(handle.line_count().await.unwrap(), 100);
    drop(handle);

    let mut counts = Vec::new();
    while let Some(Notification::LineCount(n)) = notes.recv().await {
        counts.push(n);
    }
    assert_eq!(counts.first(), Some(&0));
    assert_eq!(counts.last(), Some(&100));
    assert!(counts.len() < 100);
}

#[tokio::test]
async fn export_stream_outlives_later_appends() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    let (handle, _notes) = EngineHandle::open(storage, fast_config()).await.unwrap();

    handle.append_log("a").await.unwrap();
    let export = handle.export_logs(true).await.unwrap();
    handle.append_log("b").await.unwrap();

    let chunks: Vec<_> = export.into_async().map(|c| c.unwrap()).collect().await;
    assert_eq!(chunks.concat(), b"a\n");
}

#[tokio::test]
async fn worker_stops_after_last_handle_drops() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(DirStorage::open(dir.path()).unwrap());
    let (handle, mut notes) = EngineHandle::open(storage.clone(), fast_config())
        .await
        .unwrap();
    let other = handle.clone();
    drop(handle);
    other.append_log("still open").await.unwrap();
    drop(other);
    while notes.recv().await.is_some() {}

    let names = storage.list().unwrap();
    assert_eq!(names.len(), 1);
    let reopened = LogEngine::open(storage, fast_config()).unwrap();
    assert_eq!(reopened.read_window(0, 1).unwrap().lines, ["still open"]);
}
