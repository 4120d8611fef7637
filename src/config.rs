//! Engine configuration.

use std::time::Duration;

use crate::indexer::scanner::LineEnding;

/// Bytes read per export pull and per rebuild block.
pub const DEFAULT_EXPORT_CHUNK_SIZE: usize = 64 * 1024;

/// Lock attempts before a session is reported as unavailable (~2s with the default backoff).
pub const DEFAULT_LOCK_RETRY_ATTEMPTS: u32 = 20;

/// Wait between lock attempts when the resource is busy.
pub const DEFAULT_LOCK_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Minimum spacing between line-count notifications.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of the host → worker command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Configuration for a [`LogEngine`](crate::LogEngine) and its worker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum bytes emitted per export chunk.
    pub export_chunk_size: usize,

    /// Number of lock attempts on a busy session resource.
    pub lock_retry_attempts: u32,

    /// Delay between busy lock attempts.
    pub lock_retry_backoff: Duration,

    /// Coalescing window for line-count notifications.
    pub notify_interval: Duration,

    /// Separator used to split incoming raw chunks into lines.
    pub line_ending: LineEnding,

    /// Prefix every stored line with a `[HH:MM:SS.mmm] ` UTC timestamp.
    pub stamp_lines: bool,

    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            export_chunk_size: DEFAULT_EXPORT_CHUNK_SIZE,
            lock_retry_attempts: DEFAULT_LOCK_RETRY_ATTEMPTS,
            lock_retry_backoff: DEFAULT_LOCK_RETRY_BACKOFF,
            notify_interval: DEFAULT_NOTIFY_INTERVAL,
            line_ending: LineEnding::default(),
            stamp_lines: false,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the export chunk size. Zero is bumped to one byte.
    pub fn with_export_chunk_size(mut self, size: usize) -> Self {
        self.export_chunk_size = size.max(1);
        self
    }

    /// Set the lock retry policy.
    pub fn with_lock_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.lock_retry_attempts = attempts.max(1);
        self.lock_retry_backoff = backoff;
        self
    }

    /// Set the notification coalescing window.
    pub fn with_notify_interval(mut self, interval: Duration) -> Self {
        self.notify_interval = interval;
        self
    }

    /// Set the line ending used to split raw chunks.
    pub fn with_line_ending(mut self, ending: LineEnding) -> Self {
        self.line_ending = ending;
        self
    }

    /// Enable or disable timestamp prefixes on stored lines.
    pub fn with_stamp_lines(mut self, enabled: bool) -> Self {
        self.stamp_lines = enabled;
        self
    }

    /// Set the command channel capacity.
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }
}
