//! Scrape-wide cancellation and deadline
//!
//! One [`ScrapeContext`] is created per scrape and shared by every target,
//! collector and query taking part in it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::CollectErrorKind;

#[derive(Debug)]
struct ContextState {
    deadline: Option<Instant>,
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared deadline and cancellation flag for one scrape
#[derive(Debug, Clone)]
pub struct ScrapeContext {
    state: Arc<ContextState>,
}

impl ScrapeContext {
    /// A context without deadline that is only done once cancelled
    pub fn background() -> Self {
        Self::new(None)
    }

    /// A context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::new(Some(deadline))
    }

    fn new(deadline: Option<Instant>) -> Self {
        Self {
            state: Arc::new(ContextState {
                deadline,
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Deadline of this context, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Cancel the context and wake everything waiting in [`done`](Self::done)
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<CollectErrorKind> {
        if self.state.cancelled.load(Ordering::SeqCst) {
            return Some(CollectErrorKind::Cancelled);
        }
        match self.state.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(CollectErrorKind::DeadlineExceeded)
            }
            _ => None,
        }
    }

    /// Wait until the context is cancelled or its deadline passes
    pub async fn done(&self) -> CollectErrorKind {
        loop {
            // Registered before the flag check so a concurrent cancel() is not missed.
            let notified = self.state.notify.notified();
            if let Some(kind) = self.err() {
                return kind;
            }
            match self.state.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}
