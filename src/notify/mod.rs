//! Host-facing notifications.

pub mod coalescer;

pub use coalescer::{run_coalescer, CountUpdate, NotificationCoalescer};

/// Pushed to the host without a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Current number of stored lines.
    LineCount(usize),
}
