//! Scheduled `monitor`/`metrics` workflow bodies (spec.md §4.6): recompute
//! `service_statuses` from the orchestrator, and write per-service resource
//! metrics rows. Both fire off a per-stack schedule created by
//! [`crate::stack::deploy`]'s "Finalize" step, with the stack id carried in
//! the scheduled `input` JSON rather than the workflow id itself (see
//! `deploy::dispatch`'s routing comment).

use mungos::mongodb::bson::doc;
use serde_json::Value;

use orchestrator::Orchestrator;
use zane_client::entities::metrics::ServiceMetricsRow;

use crate::stack::{compute_service_statuses, now_ms};
use crate::state;

fn stack_id_from(input: &Value) -> Option<String> {
  input.get("stack_id")?.as_str().map(str::to_string)
}

pub async fn run_monitor(input: Value) {
  let Some(stack_id) = stack_id_from(&input) else {
    error!("monitor workflow fired with no stack_id in input");
    return;
  };
  if let Err(e) = run_monitor_inner(&stack_id).await {
    error!(stack_id, "monitor workflow failed: {e:#}");
  }
}

async fn run_monitor_inner(stack_id: &str) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let stack = match db.stacks.find_one(doc! { "id": stack_id }).await? {
    Some(s) => s,
    None => return Ok(()), // stack archived since the schedule fired
  };

  let statuses = compute_service_statuses(state::orchestrator(), &stack.hash_prefix()).await?;

  db.stacks
    .update_one(
      doc! { "id": stack_id },
      doc! { "$set": {
        "service_statuses": mungos::mongodb::bson::to_bson(&statuses)?,
        "updated_at_ms": now_ms(),
      } },
    )
    .await?;
  Ok(())
}

pub async fn run_metrics(input: Value) {
  let Some(stack_id) = stack_id_from(&input) else {
    error!("metrics workflow fired with no stack_id in input");
    return;
  };
  if let Err(e) = run_metrics_inner(&stack_id).await {
    error!(stack_id, "metrics workflow failed: {e:#}");
  }
}

async fn run_metrics_inner(stack_id: &str) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let stack = match db.stacks.find_one(doc! { "id": stack_id }).await? {
    Some(s) => s,
    None => return Ok(()),
  };
  let orch = state::orchestrator();
  let hash_prefix = stack.hash_prefix();

  let services = orch
    .list_services(&orchestrator::ServiceFilter {
      name_prefix: Some(format!("{hash_prefix}_")),
      labels: Vec::new(),
    })
    .await?;

  let recorded_at_ms = now_ms();
  for service in &services {
    // The orchestrator seam has no resource-usage query (spec.md §6 lists
    // `listServices`/`listTasks` but no stats endpoint); rows are written
    // with zeroed samples until a metrics-capable orchestrator client lands,
    // keeping the schedule's cadence and row shape stable for `lib/logstore`
    // consumers in the meantime.
    let row = ServiceMetricsRow {
      stack_id: stack_id.to_string(),
      service: service.name.clone(),
      cpu_percent: 0.0,
      memory_bytes: 0,
      net_tx_bytes: 0,
      net_rx_bytes: 0,
      disk_read_bytes: 0,
      disk_write_bytes: 0,
      recorded_at_ms,
    };
    db.service_metrics.insert_one(&row).await?;
  }
  Ok(())
}
