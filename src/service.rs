//! Command channel between a host and the worker thread that owns the engine.
//!
//! The worker runs one command at a time to completion and answers on the command's
//! oneshot. Line-count changes go through the notification coalescer on their way
//! to the host.

use std::io;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::core::{LogEngine, LogWindow};
use crate::error::{LogStoreError, Result};
use crate::export::ExportStream;
use crate::indexer::LineEnding;
use crate::notify::{run_coalescer, CountUpdate, Notification};
use crate::store::SessionStorage;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests a host can send to the worker.
#[derive(Debug)]
pub enum Command {
    AppendLog {
        text: String,
        reply: Reply<()>,
    },
    AppendChunk {
        chunk: Bytes,
        is_hex: bool,
        reply: Reply<()>,
    },
    RequestWindow {
        start_line: usize,
        count: usize,
        reply: Reply<LogWindow>,
    },
    ExportLogs {
        include_timestamp: bool,
        reply: Reply<ExportStream>,
    },
    SearchLogs {
        query: String,
        match_case: bool,
        invert: bool,
        reply: Reply<usize>,
    },
    NewSession {
        reply: Reply<()>,
    },
    Clear {
        reply: Reply<()>,
    },
    SetLineEnding {
        ending: LineEnding,
    },
    LineCount {
        reply: Reply<usize>,
    },
}

/// Cloneable sender side of the worker. The worker stops once every handle is gone.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Opens the engine on the blocking pool, then starts its worker.
    pub async fn open(
        storage: Arc<dyn SessionStorage>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
        let engine = tokio::task::spawn_blocking(move || LogEngine::open(storage, config))
            .await
            .map_err(|e| LogStoreError::Storage(io::Error::other(e)))??;
        spawn(engine)
    }

    pub async fn append_log(&self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.request(|reply| Command::AppendLog { text, reply }).await
    }

    pub async fn append_chunk(&self, chunk: impl Into<Bytes>, is_hex: bool) -> Result<()> {
        let chunk = chunk.into();
        self.request(|reply| Command::AppendChunk {
            chunk,
            is_hex,
            reply,
        })
        .await
    }

    pub async fn request_window(&self, start_line: usize, count: usize) -> Result<LogWindow> {
        self.request(|reply| Command::RequestWindow {
            start_line,
            count,
            reply,
        })
        .await
    }

    pub async fn export_logs(&self, include_timestamp: bool) -> Result<ExportStream> {
        self.request(|reply| Command::ExportLogs {
            include_timestamp,
            reply,
        })
        .await
    }

    /// Filters the log view by `query` and returns the number of matching lines.
    /// Windows and counts then refer to the filtered view; a blank query clears it.
    pub async fn search_logs(
        &self,
        query: impl Into<String>,
        match_case: bool,
        invert: bool,
    ) -> Result<usize> {
        let query = query.into();
        self.request(|reply| Command::SearchLogs {
            query,
            match_case,
            invert,
            reply,
        })
        .await
    }

    pub async fn new_session(&self) -> Result<()> {
        self.request(|reply| Command::NewSession { reply }).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Parses `separator` (`None`, `NL`, `CR`, `NLCR` or the literal sequence) and
    /// applies it to later chunks.
    pub async fn set_line_ending(&self, separator: &str) -> Result<()> {
        let ending: LineEnding = separator.parse()?;
        self.send(Command::SetLineEnding { ending }).await
    }

    pub async fn line_count(&self) -> Result<usize> {
        self.request(|reply| Command::LineCount { reply }).await
    }

    /// Sends a prepared command without waiting for its reply.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LogStoreError::EngineClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| LogStoreError::EngineClosed)?
    }
}

/// Moves `engine` onto its own worker thread and starts the notification task.
///
/// Must be called from within a tokio runtime. The returned receiver gets the
/// current visible line count first, then coalesced updates.
pub fn spawn(engine: LogEngine) -> Result<(EngineHandle, mpsc::UnboundedReceiver<Notification>)> {
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| LogStoreError::Storage(io::Error::other(e)))?;

    let config = engine.config();
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
    let (count_tx, count_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let interval = config.notify_interval;

    let _ = count_tx.send(CountUpdate::Reset(engine.visible_line_count()));
    runtime.spawn(run_coalescer(interval, count_rx, notify_tx));
    thread::Builder::new()
        .name("log-engine".to_string())
        .spawn(move || run_worker(engine, command_rx, count_tx))?;

    Ok((
        EngineHandle {
            commands: command_tx,
        },
        notify_rx,
    ))
}

fn run_worker(
    mut engine: LogEngine,
    mut commands: mpsc::Receiver<Command>,
    counts: mpsc::UnboundedSender<CountUpdate>,
) {
    tracing::debug!(lines = engine.line_count(), "log engine worker started");
    while let Some(command) = commands.blocking_recv() {
        handle_command(&mut engine, command, &counts);
    }
    engine.close();
    tracing::info!("log engine worker stopped");
}

fn handle_command(
    engine: &mut LogEngine,
    command: Command,
    counts: &mpsc::UnboundedSender<CountUpdate>,
) {
    match command {
        Command::AppendLog { text, reply } => {
            let result = engine.append_line(&text);
            if result.is_ok() {
                let _ = counts.send(CountUpdate::Changed(engine.visible_line_count()));
            }
            respond("append_log", reply, result.map(|_| ()));
        }
        Command::AppendChunk {
            chunk,
            is_hex,
            reply,
        } => {
            let result = engine.append_chunk(&chunk, is_hex);
            if result.is_ok() {
                let _ = counts.send(CountUpdate::Changed(engine.visible_line_count()));
            }
            respond("append_chunk", reply, result.map(|_| ()));
        }
        Command::RequestWindow {
            start_line,
            count,
            reply,
        } => {
            tracing::debug!(start_line, count, "window requested");
            respond("request_window", reply, engine.read_window(start_line, count));
        }
        Command::ExportLogs {
            include_timestamp,
            reply,
        } => {
            respond("export_logs", reply, engine.export(include_timestamp));
        }
        Command::SearchLogs {
            query,
            match_case,
            invert,
            reply,
        } => {
            let result = engine.apply_filter(&query, match_case, invert);
            if let Ok(n) = result {
                let _ = counts.send(CountUpdate::Reset(n));
            }
            respond("search_logs", reply, result);
        }
        Command::NewSession { reply } => {
            let result = engine.new_session(true);
            let _ = counts.send(CountUpdate::Reset(engine.visible_line_count()));
            respond("new_session", reply, result);
        }
        Command::Clear { reply } => {
            let result = engine.clear();
            let _ = counts.send(CountUpdate::Reset(engine.visible_line_count()));
            respond("clear", reply, result);
        }
        Command::SetLineEnding { ending } => engine.set_line_ending(ending),
        Command::LineCount { reply } => {
            let _ = reply.send(Ok(engine.visible_line_count()));
        }
    }
}

fn respond<T>(command: &'static str, reply: Reply<T>, result: Result<T>) {
    if let Err(e) = &result {
        tracing::warn!(command, error = %e, "command failed");
    }
    if reply.send(result).is_err() {
        tracing::debug!(command, "requester went away before the reply");
    }
}
