//! Everything that drives a `ComposeStack` through its lifecycle: deploy,
//! monitor/metrics, start/stop toggling, environment cloning, and the
//! periodic cleanup sweep. Grounded on the teacher's `resource/stack.rs` +
//! `api/execute/*` split between "what a resource is" and "what you can do
//! to it", narrowed here to the one resource this core owns.

pub mod cleanup;
pub mod clone;
pub mod content;
pub mod deploy;
pub mod monitor;
pub mod toggle;

use indexmap::IndexMap;
use uuid::Uuid;

use orchestrator::{Orchestrator, ServiceFilter, TaskInfo};
use zane_client::entities::stack::{ServiceStatus, StackServiceStatus, TaskSummary};

pub fn new_id(prefix: &str) -> String {
  format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Opaque bearer token for `/stacks/webhook/<deploy_token>` (spec.md §6).
pub fn new_deploy_token() -> String {
  Uuid::new_v4().simple().to_string()
}

pub fn now_ms() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// One pass of the task->service state matrix (spec.md §4.5 step 5): lists
/// every service namespaced under `hash_prefix`, folds its tasks' states
/// into a single `StackServiceStatus`. Shared by the deploy workflow's
/// converge-until-stable loop and the standalone Monitor workflow's
/// single-shot recompute.
pub async fn compute_service_statuses(
  orch: &dyn Orchestrator,
  hash_prefix: &str,
) -> anyhow::Result<IndexMap<String, StackServiceStatus>> {
  let services = orch
    .list_services(&ServiceFilter {
      name_prefix: Some(format!("{hash_prefix}_")),
      labels: Vec::new(),
    })
    .await?;

  let mut statuses = IndexMap::new();
  for service in &services {
    let tasks = orch.list_tasks(&service.name).await?;
    let (status, running, summaries) = fold_task_states(&tasks);
    statuses.insert(
      service.name.clone(),
      StackServiceStatus {
        status,
        desired_replicas: service.replicas.unwrap_or(1),
        running_replicas: running,
        tasks: summaries,
        updated_at_ms: now_ms(),
      },
    );
  }
  Ok(statuses)
}

fn fold_task_states(tasks: &[TaskInfo]) -> (ServiceStatus, u64, Vec<TaskSummary>) {
  let mut status = ServiceStatus::Healthy;
  let mut running = 0u64;
  let mut summaries = Vec::new();
  for task in tasks {
    let contribution = match task.state.as_deref() {
      Some("Running") | Some("running") => {
        running += 1;
        ServiceStatus::Healthy
      }
      Some("Complete") | Some("complete") => ServiceStatus::Complete,
      Some("Failed") | Some("failed") | Some("Rejected") | Some("rejected")
      | Some("Orphaned") | Some("orphaned") => ServiceStatus::Unhealthy,
      Some("Shutdown") | Some("shutdown") | Some("Remove") | Some("remove") => continue,
      _ => ServiceStatus::Starting,
    };
    status = ServiceStatus::worst(status, contribution);
    summaries.push(TaskSummary {
      state: task.state.clone().unwrap_or_default(),
      message: task.message.clone().unwrap_or_default(),
      exit_code: task.exit_code,
    });
  }
  (status, running, summaries)
}

/// True iff every service's status has settled past STARTING — the
/// convergence-loop exit condition (spec.md §4.5 step 5).
pub fn all_settled(statuses: &IndexMap<String, StackServiceStatus>) -> bool {
  statuses.values().all(|s| s.status != ServiceStatus::Starting)
}
