//! Retry helper for optimistic-concurrency transactions.
//!
//! Ledger and tracker operations are written as a single attempt: begin a transaction,
//! read every record they touch, validate, and write with a version check. An attempt that
//! loses a race fails with [`Error::Conflict`] and has committed nothing, so the whole
//! attempt can simply be run again.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::future::Future;
use tracing::warn;

/// How many times a conflicting transaction is attempted before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or the policy's
/// attempts are used up, in which case [`Error::ConflictRetryExhausted`] is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    for n in 1..=attempts {
        match attempt().await {
            Err(e) if e.is_retryable() => {
                warn!("Attempt {n} of {attempts} hit a conflict: {e}");
            }
            other => return other,
        }
    }
    Err(Error::ConflictRetryExhausted { attempts })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_succeeds_after_conflicts() {
        let calls = Cell::new(0);
        let result = with_retry(RetryPolicy { max_attempts: 3 }, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(Error::Conflict {
                        entity: "payment",
                        id: 1,
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(RetryPolicy { max_attempts: 4 }, || {
            calls.set(calls.get() + 1);
            async {
                Err(Error::Conflict {
                    entity: "student",
                    id: 9,
                })
            }
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::ConflictRetryExhausted { attempts: 4 })
        ));
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_does_not_retry_business_errors() {
        let calls = Cell::new(0);
        let result: Result<()> = with_retry(RetryPolicy::default(), || {
            calls.set(calls.get() + 1);
            async {
                Err(Error::NotFound {
                    entity: "payment",
                    id: 42,
                })
            }
        })
        .await;
        assert!(matches!(result, Err(Error::NotFound { id: 42, .. })));
        assert_eq!(calls.get(), 1);
    }
}
