//! Durable-workflow-engine collaborator seam (spec.md §6 "Workflow
//! engine": `startWorkflow`, `signalWorkflow`, `createSchedule`,
//! `deleteSchedule`, `pauseSchedule`, `unpauseSchedule`) plus the two
//! concerns spec.md §4.5/§4.6/§7 layer on top of it: the deploy
//! concurrency semaphore and the exponential-backoff retry policy for
//! `TransientOrchestrator`-class errors. Durable workflow engines are
//! explicitly an external capability (spec.md §1 "specified as
//! capabilities, not products"), so `InProcessEngine` — backed by `tokio`
//! tasks and a `dashmap::DashMap` for schedule/signal bookkeeping — is the
//! one concrete adapter here; swapping in a real engine (Temporal, per the
//! `TEMPORALIO_*` env vars spec.md §6 lists) means a second `WorkflowEngine`
//! impl, not a change to call sites.

pub mod engine;
pub mod error;
pub mod retry;
pub mod schedule;
pub mod semaphore;

pub use engine::InProcessEngine;
pub use error::{WorkflowError, WorkflowResult};
pub use semaphore::DeploySemaphore;

use serde_json::Value;

#[async_trait::async_trait]
pub trait WorkflowEngine: Send + Sync {
  async fn start_workflow(&self, id: &str, input: Value) -> WorkflowResult<()>;
  async fn signal_workflow(&self, id: &str, signal: &str) -> WorkflowResult<()>;

  async fn create_schedule(
    &self,
    id: &str,
    cron_expr: &str,
    workflow: &str,
    input: Value,
  ) -> WorkflowResult<()>;
  async fn delete_schedule(&self, id: &str) -> WorkflowResult<()>;
  async fn pause_schedule(&self, id: &str) -> WorkflowResult<()>;
  async fn unpause_schedule(&self, id: &str) -> WorkflowResult<()>;
}
