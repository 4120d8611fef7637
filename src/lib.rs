//! Append-only line log for a streaming serial source: a line-offset index over a
//! locked byte store, random-access windows, streaming export, and a command worker
//! that hosts talk to over channels.
//!
//! ```no_run
//! use std::sync::Arc;
//! use serial_log_store::{DirStorage, EngineConfig, EngineHandle};
//!
//! # async fn demo() -> serial_log_store::Result<()> {
//! let storage = Arc::new(DirStorage::open("logs")?);
//! let (engine, mut counts) = EngineHandle::open(storage, EngineConfig::default()).await?;
//! engine.append_log("boot").await?;
//! let window = engine.request_window(0, 50).await?;
//! # let _ = (window, counts.recv().await);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod indexer;
pub mod notify;
pub mod search;
pub mod service;
pub mod session;
pub mod store;

pub use crate::config::EngineConfig;
pub use crate::core::{LogEngine, LogWindow};
pub use crate::error::{LogStoreError, Result};
pub use crate::export::{ExportStream, LineTransform};
pub use crate::indexer::{LineEnding, LineIndex};
pub use crate::notify::{CountUpdate, Notification, NotificationCoalescer};
pub use crate::search::{ActiveFilter, FilterView};
pub use crate::service::{spawn, Command, EngineHandle};
pub use crate::session::{Session, SessionManager, SessionState};
pub use crate::store::{ByteStore, DirStorage, FileStore, MemoryStorage, MemoryStore, SessionStorage};
