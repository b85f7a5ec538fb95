//! Caller-supplied time budget for a whole digest run

use std::time::{Duration, Instant};

use crate::error::{DigestError, Result};

/// Optional point in time by which a call must finish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No time limit
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now().checked_add(budget))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left for the next request, `None` when unbounded.
    ///
    /// # Errors
    /// `Timeout` once the deadline has passed.
    pub fn remaining(&self) -> Result<Option<Duration>> {
        match self.0 {
            None => Ok(None),
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Ok(Some(left)),
                _ => Err(DigestError::Timeout),
            },
        }
    }

    /// Whether waiting `wait` still leaves time for another attempt
    pub fn allows_wait(&self, wait: Duration) -> bool {
        match self.0 {
            None => true,
            Some(at) => Instant::now()
                .checked_add(wait)
                .is_some_and(|resume| resume < at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining().unwrap(), None);
        assert!(deadline.allows_wait(Duration::from_secs(3600)));
    }

    #[test]
    fn test_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(deadline.remaining(), Err(DigestError::Timeout)));
        assert!(!deadline.allows_wait(Duration::from_millis(1)));
    }

    #[test]
    fn test_remaining_budget() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let left = deadline.remaining().unwrap().unwrap();
        assert!(left <= Duration::from_secs(60));
        assert!(left > Duration::from_secs(50));
        assert!(deadline.allows_wait(Duration::from_secs(1)));
        assert!(!deadline.allows_wait(Duration::from_secs(120)));
    }
}
