use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::error::{Error, Result};

/// Ceiling on retries shared by every agent call of one translate run.
///
/// Each retry attempt counts, whichever call made it. Once the count passes
/// the ceiling every later retry is refused until a new budget is created.
#[derive(Debug)]
pub struct RetryBudget {
    used: AtomicUsize,
    ceiling: usize,
}

impl RetryBudget {
    pub const fn new(ceiling: usize) -> Self {
        Self {
            used: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Record one retry attempt; `false` means the attempt must not be made
    pub fn try_consume(&self) -> bool {
        let used = self.used.fetch_add(1, Ordering::SeqCst) + 1;
        if used > self.ceiling {
            if used == self.ceiling + 1 {
                warn!("Retry budget of {} exhausted; further retries are refused", self.ceiling);
            }
            return false;
        }
        true
    }

    /// Like [`try_consume`](Self::try_consume), with a refusal reported as
    /// [`Error::BudgetExhausted`]
    pub fn consume(&self) -> Result<()> {
        if self.try_consume() {
            Ok(())
        } else {
            Err(Error::BudgetExhausted(self.ceiling))
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.used.load(Ordering::Relaxed) > self.ceiling
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }
}
