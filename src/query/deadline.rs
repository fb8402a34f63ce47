//! Cooperative query deadlines.
//!
//! Retrievers check the deadline before and after store calls and
//! return partial results once it passes; nothing is forcibly
//! terminated. A zero-millisecond deadline is expired on arrival.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct QueryDeadline {
    at: Option<Instant>,
}

impl QueryDeadline {
    /// Deadline `ms` milliseconds from now. Zero is already expired.
    pub fn from_millis(ms: u64) -> Self {
        Self {
            at: Some(Instant::now() + Duration::from_millis(ms)),
        }
    }

    /// No deadline.
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_deadline_expires_immediately() {
        let deadline = QueryDeadline::from_millis(0);
        assert!(deadline.expired());
    }

    #[test]
    fn unbounded_never_expires() {
        let deadline = QueryDeadline::none();
        assert!(!deadline.expired());
        assert!(deadline.remaining().is_none());
    }

    #[test]
    fn future_deadline_not_yet_expired() {
        let deadline = QueryDeadline::from_millis(60_000);
        assert!(!deadline.expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(50));
    }
}
