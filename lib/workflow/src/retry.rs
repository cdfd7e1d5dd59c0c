//! Exponential-backoff retry for `TransientOrchestrator`-class errors
//! (spec.md §7: "Transient errors inside the workflow retry with
//! exponential backoff up to a configured ceiling; on ceiling, the
//! deployment moves to FAILED").

use std::time::Duration;

pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay: Duration::from_millis(500),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  fn delay_for(&self, attempt: u32) -> Duration {
    let millis = self.base_delay.as_millis() as u64 * 2u64.saturating_pow(attempt);
    Duration::from_millis(millis).min(self.max_delay)
  }
}

/// Runs `f` up to `policy.max_attempts` times, retrying only while
/// `is_transient` returns true for the error. Returns the last error once
/// attempts are exhausted, or once a non-transient error is hit.
pub async fn with_retry<T, E, F, Fut>(
  policy: &RetryPolicy,
  mut is_transient: impl FnMut(&E) -> bool,
  mut f: F,
) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: std::future::Future<Output = Result<T, E>>,
{
  let mut attempt = 0;
  loop {
    match f().await {
      Ok(value) => return Ok(value),
      Err(err) => {
        attempt += 1;
        if attempt >= policy.max_attempts || !is_transient(&err) {
          return Err(err);
        }
        tokio::time::sleep(policy.delay_for(attempt)).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test]
  async fn retries_until_success() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy {
      max_attempts: 5,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
    };
    let result: Result<u32, &str> = with_retry(
      &policy,
      |_| true,
      || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
          if n < 2 {
            Err("transient")
          } else {
            Ok(n)
          }
        }
      },
    )
    .await;
    assert_eq!(result, Ok(2));
  }

  #[tokio::test]
  async fn stops_on_non_transient_error() {
    let policy = RetryPolicy::default();
    let result: Result<u32, &str> =
      with_retry(&policy, |_| false, || async { Err("fatal") }).await;
    assert_eq!(result, Err("fatal"));
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy {
      max_attempts: 3,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(2),
    };
    let result: Result<u32, &str> = with_retry(&policy, |_| true, || {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err("transient") }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }
}
