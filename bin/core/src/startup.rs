//! Startup reconciliation (SPEC_FULL.md §7 supplement). `InProcessEngine`
//! keeps every schedule and signal channel in memory, so a restart loses
//! both: a deployment still `DEPLOYING` when the process died has no
//! worker left to finish it, and every per-stack `monitor`/`metrics`
//! schedule has to be re-registered. Grounded on the teacher's
//! `startup::in_progress_update_cleanup` (same shape: mark whatever was
//! running as failed, log why, move on).

use mungos::find::find_collect;
use mungos::mongodb::bson::doc;
use serde_json::json;

use workflow::WorkflowEngine;

use crate::stack::deploy::{ensure_monitor_schedules, fail_deployment};
use crate::state;

const SYSTEM_CLEANUP_SCHEDULE_ID: &str = "system-cleanup";
const SYSTEM_CLEANUP_CRON: &str = "0 3 * * *";

pub async fn on_startup() {
  tokio::join!(
    resume_interrupted_deployments(),
    ensure_system_cleanup_schedule(),
    reschedule_existing_stacks(),
  );
}

/// *Open Question resolution* (spec.md §9 "crash mid-deploy"): durable
/// workflow engines are an external capability (spec.md §1); `InProcessEngine`
/// is the one concrete adapter here, and it keeps no durable checkpoint. A
/// deployment left `DEPLOYING` across a restart has lost both its worker
/// task and its cancellation-signal channel, so rather than pretend to
/// resume at a checkpoint it never had, it's marked `FAILED` with a
/// distinct reason — a caller can re-enqueue deliberately.
async fn resume_interrupted_deployments() {
  let db = state::db_client().await;
  let stale = match find_collect(&db.stack_deployments, doc! { "status": "DEPLOYING" }, None).await {
    Ok(rows) => rows,
    Err(e) => {
      error!("failed to list interrupted deployments on startup | {e:#}");
      return;
    }
  };
  for deployment in stale {
    warn!(hash = deployment.hash, "deployment was DEPLOYING across a restart, marking FAILED");
    fail_deployment(&deployment.hash, "core restarted mid-deploy".to_string()).await;
  }
}

async fn ensure_system_cleanup_schedule() {
  if let Err(e) = state::workflow_engine()
    .create_schedule(SYSTEM_CLEANUP_SCHEDULE_ID, SYSTEM_CLEANUP_CRON, "cleanup", json!({}))
    .await
  {
    error!("failed to create system cleanup schedule on startup | {e:#}");
  }
}

/// Re-registers every stack's `monitor`/`metrics` schedules, since neither
/// survives a restart of the in-process engine.
async fn reschedule_existing_stacks() {
  let db = state::db_client().await;
  let stacks = match find_collect(&db.stacks, doc! {}, None).await {
    Ok(rows) => rows,
    Err(e) => {
      error!("failed to list stacks for schedule re-registration on startup | {e:#}");
      return;
    }
  };
  for stack in stacks {
    if let Err(e) = ensure_monitor_schedules(&stack.id).await {
      error!(stack_id = stack.id, "failed to re-register monitor schedules on startup | {e:#}");
    }
  }
}
