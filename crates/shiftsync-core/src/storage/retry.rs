//! Bounded retry for store writes under cross-process contention.

use std::time::Duration;

use tracing::warn;

use crate::error::DatabaseError;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Policy with no pause between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    ///
    /// # Errors
    /// Returns the first non-transient error unchanged, or
    /// `DatabaseError::Unavailable` once every attempt came back busy.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, DatabaseError>
    where
        F: FnMut() -> Result<T, DatabaseError>,
    {
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt < attempts {
                        warn!(
                            operation,
                            attempt,
                            max_attempts = attempts,
                            "database busy, retrying in {:?}",
                            self.delay
                        );
                        std::thread::sleep(self.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(DatabaseError::Unavailable {
            operation: operation.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(5).run("upsert", || {
            calls += 1;
            if calls < 3 {
                Err(DatabaseError::Busy("locked".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_reports_unavailable() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(5).run("delete", || {
            calls += 1;
            Err(DatabaseError::Busy("locked".into()))
        });

        assert_eq!(calls, 5);
        match result {
            Err(DatabaseError::Unavailable {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "delete");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_non_transient_error_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(5).run("upsert", || {
            calls += 1;
            Err(DatabaseError::Integrity("UNIQUE constraint failed".into()))
        });

        assert_eq!(calls, 1);
        assert!(matches!(result, Err(DatabaseError::Integrity(_))));
    }
}
