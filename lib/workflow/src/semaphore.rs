//! Global deploy concurrency bound (spec.md §4.5 "Queueing & concurrency"),
//! plus the "lock-all" maintenance primitive that blocks until every
//! in-flight deploy has released.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{WorkflowError, WorkflowResult};

pub struct DeploySemaphore {
  inner: Arc<Semaphore>,
  total_permits: u32,
  acquire_timeout: Duration,
}

impl DeploySemaphore {
  pub fn new(max_concurrent_deploys: u32, acquire_timeout: Duration) -> Self {
    Self {
      inner: Arc::new(Semaphore::new(max_concurrent_deploys as usize)),
      total_permits: max_concurrent_deploys,
      acquire_timeout,
    }
  }

  /// Acquired on entry to DEPLOYING (step 1 of spec.md §4.5's execution
  /// sequence), released on any terminal transition.
  pub async fn acquire(&self) -> WorkflowResult<SemaphorePermit<'_>> {
    tokio::time::timeout(self.acquire_timeout, self.inner.acquire())
      .await
      .map_err(|_| {
        WorkflowError::Engine(
          "timed out waiting for a deploy slot".to_string(),
        )
      })?
      .map_err(|e| WorkflowError::Engine(e.to_string()))
  }

  /// Blocks until every in-flight deploy has released, for maintenance
  /// (cleanup) operations. The returned guard holds all permits until
  /// dropped, shutting out new deploys for its lifetime.
  pub async fn lock_all(&self) -> WorkflowResult<SemaphorePermit<'_>> {
    self
      .inner
      .acquire_many(self.total_permits)
      .await
      .map_err(|e| WorkflowError::Engine(e.to_string()))
  }
}
