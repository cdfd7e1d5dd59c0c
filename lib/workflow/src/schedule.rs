//! Cron-driven schedule bookkeeping backing `WorkflowEngine::create_schedule`
//! et al. Each schedule owns a background task that sleeps until its next
//! cron occurrence (via `croner`) and re-invokes `start_workflow` on the
//! owning engine; pausing just flips an `AtomicBool` the task checks before
//! firing, so a paused schedule keeps its timer running but skips the call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use croner::Cron;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::{WorkflowError, WorkflowResult};

pub struct Schedule {
  pub cron_expr: String,
  pub workflow: String,
  pub input: Value,
  paused: Arc<AtomicBool>,
  handle: JoinHandle<()>,
}

impl Schedule {
  pub fn spawn<F, Fut>(
    id: String,
    cron_expr: String,
    workflow: String,
    input: Value,
    on_fire: F,
  ) -> WorkflowResult<Self>
  where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
  {
    let cron = Cron::new(&cron_expr)
      .parse()
      .map_err(|e| WorkflowError::Engine(format!("invalid cron expression '{cron_expr}': {e}")))?;

    let paused = Arc::new(AtomicBool::new(false));
    let task_paused = paused.clone();
    let task_workflow = workflow.clone();
    let task_input = input.clone();

    let handle = tokio::spawn(async move {
      loop {
        let now = Utc::now();
        let Ok(next) = cron.find_next_occurrence(&now, false) else {
          tracing::warn!(schedule = %id, "cron has no further occurrences, stopping");
          break;
        };
        let wait = (next - now)
          .to_std()
          .unwrap_or(std::time::Duration::from_secs(1));
        tokio::time::sleep(wait).await;

        if !task_paused.load(Ordering::SeqCst) {
          on_fire(task_workflow.clone(), task_input.clone()).await;
        }
      }
    });

    Ok(Self {
      cron_expr,
      workflow,
      input,
      paused,
      handle,
    })
  }

  pub fn pause(&self) {
    self.paused.store(true, Ordering::SeqCst);
  }

  pub fn unpause(&self) {
    self.paused.store(false, Ordering::SeqCst);
  }
}

impl Drop for Schedule {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
