//! Shared time budget for multi-stage waits.

use std::time::{Duration, Instant};

/// One budget spent across consecutive blocking waits.
///
/// Each stage waits at most [`remaining`](Self::remaining), so the stages
/// together never outlast the budget given to [`after`](Self::after).
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires: Instant::now() + budget,
        }
    }

    /// Time left, or `None` once the budget is spent.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }
}
