//! Cooperative request deadlines
//!
//! A deadline is checked between store calls, never during one: an in-flight
//! statement always runs to completion and the transaction then commits or
//! rolls back as usual.

use crate::identity::{IdentityError, IdentityResult};
use std::time::Duration;
use tokio::time::Instant;

/// Default per-request deadline applied by transports (10 seconds)
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Point in time after which a request should stop issuing store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Deadline `duration` from now
    pub fn after(duration: Duration) -> Self {
        Self::at(Instant::now() + duration)
    }

    /// Deadline at a fixed instant
    pub fn at(instant: Instant) -> Self {
        Self {
            expires_at: Some(instant),
        }
    }

    /// Time left, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with `DeadlineExceeded` once the deadline has passed
    pub fn check(&self) -> IdentityResult<()> {
        if self.is_expired() {
            Err(IdentityError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constant() {
        assert_eq!(DEFAULT_REQUEST_DEADLINE.as_secs(), 10);
    }

    #[test]
    fn test_none_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn test_zero_deadline_is_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(
            deadline.check(),
            Err(IdentityError::DeadlineExceeded)
        ));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_passes() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(deadline.check().is_ok());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(deadline.is_expired());
    }
}
