//! Periodic maintenance sweep (SPEC_FULL.md §7, supplementing spec.md):
//! purges old `REMOVED` deployments and log-store entries past the
//! retention window, and tears down preview environments whose TTL has
//! elapsed. Grounded on `original_source/backend/zane_api/management/
//! commands/create_system_cleanup_schedule.py`'s single nightly sweep,
//! scheduled as `"cleanup"` alongside the per-stack `monitor`/`metrics`
//! schedules (`deploy::dispatch`).
//!
//! Runs under [`workflow::DeploySemaphore::lock_all`] so it never races an
//! in-flight deploy's own writes to `service_statuses`/schedules.

use serde_json::{Value, json};

use mungos::find::find_collect;
use mungos::mongodb::bson::doc;

use logstore::LogStore;
use workflow::WorkflowEngine;

use crate::config::core_config;
use crate::state;
use crate::stack::now_ms;

pub async fn run_cleanup(_input: Value) {
  if let Err(e) = run_cleanup_inner().await {
    error!("cleanup sweep failed: {e:#}");
  }
}

async fn run_cleanup_inner() -> anyhow::Result<()> {
  let _guard = state::deploy_semaphore()
    .lock_all()
    .await
    .map_err(anyhow::Error::from)?;

  let retention_ms = core_config().cleanup_retention_days as i64 * 24 * 60 * 60 * 1000;
  let cutoff_ms = now_ms() - retention_ms;

  purge_old_deployments(cutoff_ms).await?;
  purge_old_logs(cutoff_ms).await?;
  teardown_expired_previews().await?;

  Ok(())
}

async fn purge_old_deployments(cutoff_ms: i64) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let result = db
    .stack_deployments
    .delete_many(doc! {
      "status": "REMOVED",
      "finished_at_ms": { "$lt": cutoff_ms },
    })
    .await?;
  if result.deleted_count > 0 {
    info!("cleanup: purged {} stale REMOVED deployment rows", result.deleted_count);
  }
  Ok(())
}

async fn purge_old_logs(cutoff_ms: i64) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let log_store = state::log_store();
  let cutoff_ns = cutoff_ms * 1_000_000;

  // `LogQuery.stack_id` is mandatory (the store has no global delete), so
  // the sweep fans out one delete per stack still on record.
  let stacks = find_collect(&db.stacks, doc! {}, None).await?;
  for stack in stacks {
    log_store
      .delete(&logstore::LogQuery {
        stack_id: stack.id,
        time_before_ns: Some(cutoff_ns),
        ..Default::default()
      })
      .await?;
  }
  Ok(())
}

async fn teardown_expired_previews() -> anyhow::Result<()> {
  let db = state::db_client().await;
  let now = now_ms();

  let environments = find_collect(&db.environments, doc! { "is_preview": true }, None).await?;
  for env in environments {
    let Some(meta) = &env.preview_metadata else { continue };
    let Some(ttl_seconds) = meta.ttl_seconds else { continue };
    let expires_at_ms = meta.created_at_ms + ttl_seconds as i64 * 1000;
    if now < expires_at_ms {
      continue;
    }

    let stacks = find_collect(&db.stacks, doc! { "environment_id": &env.id }, None).await?;
    if stacks.is_empty() {
      db.environments.delete_one(doc! { "id": &env.id }).await?;
      continue;
    }
    for stack in stacks {
      state::workflow_engine()
        .start_workflow(
          &format!("archive-compose-{}", stack.id),
          json!({ "delete_volumes": true, "delete_configs": true }),
        )
        .await
        .map_err(anyhow::Error::from)?;
    }
  }
  Ok(())
}
