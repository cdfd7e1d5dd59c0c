//! The default `WorkflowEngine`: dispatches workflow runs and cron-driven
//! schedules onto `tokio::spawn`ed tasks, bookkept in `DashMap`s rather than
//! a durable store. This is deliberately the minimal adapter the trait
//! needs, not an attempt at Temporal-grade durability (spec.md §1 scopes a
//! "durable workflow engine" out as a capability, not a product owned
//! here).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::schedule::Schedule;

type Signal = String;
type DispatchFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked for every workflow run, scheduled or ad hoc. Receives the
/// workflow name, its input, and a receiver for signals sent via
/// `signal_workflow` while the run is in flight; a scheduled fire that
/// nobody signals just never reads from it.
pub type WorkflowDispatch =
  Arc<dyn Fn(String, Value, mpsc::UnboundedReceiver<Signal>) -> DispatchFuture + Send + Sync>;

pub struct InProcessEngine {
  dispatch: WorkflowDispatch,
  schedules: DashMap<String, Schedule>,
  signals: DashMap<String, mpsc::UnboundedSender<Signal>>,
}

impl InProcessEngine {
  pub fn new(dispatch: WorkflowDispatch) -> Self {
    Self {
      dispatch,
      schedules: DashMap::new(),
      signals: DashMap::new(),
    }
  }

  /// Fires a workflow run with no signal channel registered: used for
  /// scheduled runs, which nothing signals by the schedule's own id.
  fn fire(dispatch: WorkflowDispatch, _id: String, workflow: String, input: Value) {
    let (_tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
      (dispatch)(workflow, input, rx).await;
    });
  }
}

#[async_trait::async_trait]
impl crate::WorkflowEngine for InProcessEngine {
  async fn start_workflow(&self, id: &str, input: Value) -> WorkflowResult<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.signals.insert(id.to_string(), tx);
    let dispatch = self.dispatch.clone();
    let workflow = id.to_string();
    tokio::spawn(async move {
      (dispatch)(workflow, input, rx).await;
    });
    Ok(())
  }

  async fn signal_workflow(&self, id: &str, signal: &str) -> WorkflowResult<()> {
    let sender = self
      .signals
      .get(id)
      .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
    sender
      .send(signal.to_string())
      .map_err(|_| WorkflowError::Engine(format!("workflow '{id}' is no longer listening")))
  }

  async fn create_schedule(
    &self,
    id: &str,
    cron_expr: &str,
    workflow: &str,
    input: Value,
  ) -> WorkflowResult<()> {
    let dispatch = self.dispatch.clone();
    let schedule_id = id.to_string();
    let schedule = Schedule::spawn(
      id.to_string(),
      cron_expr.to_string(),
      workflow.to_string(),
      input,
      move |workflow, input| {
        let dispatch = dispatch.clone();
        let schedule_id = schedule_id.clone();
        async move {
          InProcessEngine::fire(dispatch, schedule_id, workflow, input);
        }
      },
    )?;
    self.schedules.insert(id.to_string(), schedule);
    Ok(())
  }

  async fn delete_schedule(&self, id: &str) -> WorkflowResult<()> {
    self
      .schedules
      .remove(id)
      .map(|_| ())
      .ok_or_else(|| WorkflowError::NotFound(id.to_string()))
  }

  async fn pause_schedule(&self, id: &str) -> WorkflowResult<()> {
    let schedule = self
      .schedules
      .get(id)
      .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
    schedule.pause();
    Ok(())
  }

  async fn unpause_schedule(&self, id: &str) -> WorkflowResult<()> {
    let schedule = self
      .schedules
      .get(id)
      .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
    schedule.unpause();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc as StdArc;

  fn counting_dispatch(counter: StdArc<AtomicU32>) -> WorkflowDispatch {
    Arc::new(move |_workflow, _input, _signals| {
      let counter = counter.clone();
      Box::pin(async move {
        counter.fetch_add(1, Ordering::SeqCst);
      })
    })
  }

  #[tokio::test]
  async fn start_workflow_invokes_dispatch() {
    let counter = StdArc::new(AtomicU32::new(0));
    let engine = InProcessEngine::new(counting_dispatch(counter.clone()));
    engine
      .start_workflow("deploy-1", Value::Null)
      .await
      .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn signal_unknown_workflow_is_not_found() {
    let counter = StdArc::new(AtomicU32::new(0));
    let engine = InProcessEngine::new(counting_dispatch(counter));
    let result = engine.signal_workflow("missing", "cancel").await;
    assert!(matches!(result, Err(WorkflowError::NotFound(_))));
  }

  #[tokio::test]
  async fn delete_unknown_schedule_is_not_found() {
    let counter = StdArc::new(AtomicU32::new(0));
    let engine = InProcessEngine::new(counting_dispatch(counter));
    let result = engine.delete_schedule("missing").await;
    assert!(matches!(result, Err(WorkflowError::NotFound(_))));
  }
}
