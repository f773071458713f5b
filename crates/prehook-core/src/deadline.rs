//! Deadline budgets for external process invocations.
//!
//! A [`Deadline`] is the absolute instant by which a caller has given up. Every
//! nested timeout is derived with [`Deadline::child`], which never outlives the
//! parent.

use std::time::{Duration, Instant};

/// An optional absolute deadline. `Deadline::none()` means "no parent limit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at: None }
    }

    /// A deadline `timeout` from now. A timeout past the clock's range is
    /// unbounded.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// The absolute instant, if bounded.
    pub fn instant(&self) -> Option<Instant> {
        self.at
    }

    /// Time left before expiry. `None` when unbounded; zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// `min(timeout, remaining parent budget)` as a duration.
    pub fn budget(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(timeout),
            None => timeout,
        }
    }

    /// A child deadline bounded by both `timeout` and this deadline.
    pub fn child(&self, timeout: Duration) -> Deadline {
        let Some(candidate) = Instant::now().checked_add(timeout) else {
            return *self;
        };
        match self.at {
            Some(parent) if parent < candidate => Deadline { at: Some(parent) },
            _ => Deadline {
                at: Some(candidate),
            },
        }
    }
}
