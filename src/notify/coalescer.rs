//! Rate limiting of line-count notifications.
//!
//! The first update after a quiet period goes out immediately; updates inside the
//! interval collapse into one trailing delivery of the latest value. Resets bypass
//! the limit and discard whatever was waiting.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use super::Notification;

/// A line-count change reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountUpdate {
    /// Lines were appended.
    Changed(usize),
    /// The session was replaced; delivered without delay.
    Reset(usize),
}

#[derive(Debug)]
pub struct NotificationCoalescer {
    interval: Duration,
    last_sent: Option<Instant>,
    last_value: Option<usize>,
    pending: Option<usize>,
}

impl NotificationCoalescer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            last_value: None,
            pending: None,
        }
    }

    /// Offers a new count. Returns it when it may be delivered right away, otherwise
    /// keeps it as the trailing value.
    pub fn offer(&mut self, value: usize, now: Instant) -> Option<usize> {
        if self.last_value == Some(value) {
            self.pending = None;
            return None;
        }
        match self.last_sent {
            Some(sent) if now < sent + self.interval => {
                self.pending = Some(value);
                None
            }
            _ => Some(self.mark_sent(value, now)),
        }
    }

    /// Delivers `value` immediately, dropping any trailing value.
    pub fn force(&mut self, value: usize, now: Instant) -> usize {
        self.mark_sent(value, now)
    }

    /// When the trailing value becomes due, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending?;
        Some(match self.last_sent {
            Some(sent) => sent + self.interval,
            None => Instant::now(),
        })
    }

    /// The trailing value, if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<usize> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take_pending(now),
            _ => None,
        }
    }

    /// The trailing value regardless of the deadline.
    pub fn take_pending(&mut self, now: Instant) -> Option<usize> {
        let value = self.pending?;
        Some(self.mark_sent(value, now))
    }

    fn mark_sent(&mut self, value: usize, now: Instant) -> usize {
        self.pending = None;
        self.last_sent = Some(now);
        self.last_value = Some(value);
        value
    }
}

/// Drives a coalescer from `updates` until the channel closes, forwarding deliveries
/// to `out`. A trailing value still waiting at close is flushed.
pub async fn run_coalescer(
    interval: Duration,
    mut updates: mpsc::UnboundedReceiver<CountUpdate>,
    out: mpsc::UnboundedSender<Notification>,
) {
    let mut coalescer = NotificationCoalescer::new(interval);
    loop {
        let deadline = coalescer.deadline();
        let delivery = tokio::select! {
            update = updates.recv() => match update {
                Some(CountUpdate::Changed(n)) => coalescer.offer(n, Instant::now()),
                Some(CountUpdate::Reset(n)) => Some(coalescer.force(n, Instant::now())),
                None => {
                    if let Some(n) = coalescer.take_pending(Instant::now()) {
                        let _ = out.send(Notification::LineCount(n));
                    }
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                coalescer.take_due(Instant::now())
            }
        };

        if let Some(n) = delivery {
            if out.send(Notification::LineCount(n)).is_err() {
                tracing::debug!("notification receiver dropped");
                break;
            }
        }
    }
}
