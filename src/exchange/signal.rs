//! Per-half completion signal.
//!
//! Shared between a stream and its correlation table entry. The first
//! transition out of `Open` wins; later attempts are no-ops, which is what
//! lets close-driven and completion-driven teardown race safely.

// ============================================================================
// Imports
// ============================================================================

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

// ============================================================================
// Constants
// ============================================================================

const OPEN: u8 = 0;
const COMPLETED: u8 = 1;
const ABORTED: u8 = 2;

// ============================================================================
// Outcome
// ============================================================================

/// How an exchange half ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finished cleanly (terminal frame or `end()`).
    Completed,
    /// Torn down by connection failure or explicit abort.
    Aborted,
}

// ============================================================================
// ExchangeSignal
// ============================================================================

/// Completion state of one exchange half.
#[derive(Debug, Default)]
pub struct ExchangeSignal {
    state: AtomicU8,
    notify: Notify,
}

impl ExchangeSignal {
    /// Creates an open signal.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks the half complete. Returns `false` if it had already finished.
    pub fn complete(&self) -> bool {
        self.finish(COMPLETED)
    }

    /// Marks the half aborted. Returns `false` if it had already finished.
    pub fn abort(&self) -> bool {
        self.finish(ABORTED)
    }

    /// Applies an outcome. Returns `false` if the half had already finished.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Completed => self.complete(),
            Outcome::Aborted => self.abort(),
        }
    }

    fn finish(&self, state: u8) -> bool {
        let won = self
            .state
            .compare_exchange(OPEN, state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            self.notify.notify_waiters();
        }
        won
    }

    /// Returns the outcome, or `None` while the half is open.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state.load(Ordering::Acquire) {
            COMPLETED => Some(Outcome::Completed),
            ABORTED => Some(Outcome::Aborted),
            _ => None,
        }
    }

    /// Returns `true` while the half is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.outcome().is_none()
    }

    /// Returns `true` if the half completed cleanly.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome() == Some(Outcome::Completed)
    }

    /// Returns `true` if the half was aborted.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.outcome() == Some(Outcome::Aborted)
    }

    /// Waits until the half finishes and returns how it ended.
    pub async fn finished(&self) -> Outcome {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return outcome;
            }

            notified.await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
