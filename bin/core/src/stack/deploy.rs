//! `deploy-compose-<stack.id>` / `archive-compose-<stack.id>` workflow
//! bodies plus the HTTP-facing `enqueue_deploy`/`cancel_deploy` helpers.
//! Grounded on spec.md §4.5's numbered execution sequence and
//! `original_source/backend/zane_api/temporal/activities/main_activities.py`
//! for the scratch-directory / retry-wrapped-activity shape.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;
use mungos::find::find_collect;
use mungos::mongodb::bson::doc;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use compose::{CompileContext, parse_compose};
use interpolate::GenerateContext;
use orchestrator::{ConfigSpecInput, NetworkSpec, Orchestrator, ServiceFilter};
use proxy::Proxy;
use response::{ApiError, ApiResult};
use workflow::WorkflowEngine;
use workflow::engine::WorkflowDispatch;
use workflow::retry::with_retry;
use zane_client::entities::deployment::{
  ComposeStackDeployment, DeploymentStatus, StackSnapshot,
};
use zane_client::entities::route::RouteKey;
use zane_client::entities::stack::{ComposeStack, StackServiceStatus};

use crate::config::core_config;
use crate::state;
use crate::stack::{new_id, now_ms};

const CANCEL_SIGNAL_PREFIX: &str = "cancel:";

/// Per-stack serialization so runs sharing a workflow id actually execute
/// one at a time, in enqueue order (spec.md §5 "Within one stack,
/// deployments run in `queued_at` order") — `InProcessEngine` itself just
/// spawns a task per `start_workflow` call and never serializes same-id
/// runs on its own.
fn stack_locks() -> &'static DashMap<String, Arc<Mutex<()>>> {
  static LOCKS: OnceLock<DashMap<String, Arc<Mutex<()>>>> = OnceLock::new();
  LOCKS.get_or_init(DashMap::new)
}

fn stack_lock(stack_id: &str) -> Arc<Mutex<()>> {
  stack_locks()
    .entry(stack_id.to_string())
    .or_insert_with(|| Arc::new(Mutex::new(())))
    .clone()
}

/// Builds the closure `InProcessEngine::new` dispatches every workflow run
/// and scheduled fire through. `start_workflow` callers pass the literal
/// stack-qualified id (`deploy-compose-<id>`, `archive-compose-<id>`) as the
/// `workflow` argument; `create_schedule`'s fires instead pass a fixed
/// workflow-type literal (`monitor`, `metrics`, `cleanup`) with the stack id
/// carried inside `input`. Both forms are routed here.
pub fn dispatch() -> WorkflowDispatch {
  Arc::new(move |workflow: String, input: Value, signals: mpsc::UnboundedReceiver<String>| {
    Box::pin(async move {
      if let Some(stack_id) = workflow.strip_prefix("deploy-compose-") {
        run_deploy(stack_id.to_string(), signals).await;
      } else if let Some(stack_id) = workflow.strip_prefix("archive-compose-") {
        run_archive(stack_id.to_string(), input).await;
      } else {
        match workflow.as_str() {
          "monitor" => crate::stack::monitor::run_monitor(input).await,
          "metrics" => crate::stack::monitor::run_metrics(input).await,
          "cleanup" => crate::stack::cleanup::run_cleanup(input).await,
          other => error!("dispatch: unrecognized workflow kind '{other}'"),
        }
      }
    })
  })
}

fn scratch_dir(deployment_hash: &str) -> PathBuf {
  PathBuf::from(&core_config().deploy_scratch_root).join(deployment_hash)
}

pub(crate) fn env_network_name(environment_id: &str) -> String {
  format!("env-{environment_id}-network")
}

fn is_orchestrator_transient(err: &anyhow::Error) -> bool {
  err
    .downcast_ref::<orchestrator::OrchestratorError>()
    .map(|e| matches!(e, orchestrator::OrchestratorError::Transient(_)))
    .unwrap_or(true)
}

/// Re-validates + applies every pending change on `stack_id` inside a
/// transaction, captures the frozen `StackSnapshot`, inserts the QUEUED
/// deployment row, and kicks off its workflow run (spec.md §4.4
/// `applyPending`, §4.5 step 0).
pub async fn enqueue_deploy(
  stack_id: &str,
  commit_message: String,
) -> ApiResult<ComposeStackDeployment> {
  let db = state::db_client().await;
  let hash = new_id(zane_client::entities::deployment::DEPLOYMENT_HASH_PREFIX);

  let stack_id_owned = stack_id.to_string();
  let deployment = db
    .with_transaction(|| {
      let stack_id = stack_id_owned.clone();
      let hash = hash.clone();
      let commit_message = commit_message.clone();
      async move {
        let mut stack = db
          .stacks
          .find_one(doc! { "id": &stack_id })
          .await?
          .ok_or_else(|| anyhow::anyhow!("stack '{stack_id}' not found"))?;

        let pending = find_collect(
          &db.stack_changes,
          doc! { "stack_id": &stack_id, "applied": false },
          None,
        )
        .await?;

        let (mutations, applied_ids) =
          ledger::apply_pending(&mut stack, &pending, || new_id(zane_client::entities::env_override::ENV_OVERRIDE_ID_PREFIX));

        for mutation in mutations {
          match mutation {
            ledger::OverrideMutation::Upsert(row) => {
              db.stack_env_overrides
                .update_one(
                  doc! { "id": &row.id },
                  doc! { "$set": mungos::mongodb::bson::to_bson(&row)?.as_document().unwrap().clone() },
                )
                .await
                .ok();
              // upsert: row may not exist yet, insert if the update matched nothing.
              if db
                .stack_env_overrides
                .find_one(doc! { "id": &row.id })
                .await?
                .is_none()
              {
                db.stack_env_overrides.insert_one(&row).await?;
              }
            }
            ledger::OverrideMutation::Remove { id } => {
              db.stack_env_overrides.delete_one(doc! { "id": &id }).await?;
            }
          }
        }

        for change_id in &applied_ids {
          db.stack_changes
            .update_one(
              doc! { "id": change_id },
              doc! { "$set": { "applied": true, "deployment_hash": &hash } },
            )
            .await?;
        }

        stack.updated_at_ms = now_ms();
        db.stacks
          .update_one(
            doc! { "id": &stack_id },
            doc! { "$set": {
              "user_content": &stack.user_content,
              "computed_content": &stack.computed_content,
              "urls": mungos::mongodb::bson::to_bson(&stack.urls)?,
              "configs": mungos::mongodb::bson::to_bson(&stack.configs)?,
              "updated_at_ms": stack.updated_at_ms,
            } },
          )
          .await?;

        let overrides = find_collect(
          &db.stack_env_overrides,
          doc! { "stack_id": &stack_id },
          None,
        )
        .await?;
        // Only stack-global overrides feed `x-env` resolution; service-scoped
        // ones already live on their service's own `environment` map inside
        // `computed_content` by the time a content change is applied.
        let env_overrides: IndexMap<String, String> = overrides
          .into_iter()
          .filter(|o| o.service.is_none())
          .map(|o| (o.key, o.value))
          .collect();

        let snapshot = StackSnapshot {
          stack_id: stack.id.clone(),
          slug: stack.slug.clone(),
          project_id: stack.project_id.clone(),
          environment_id: stack.environment_id.clone(),
          network_alias_prefix: stack.network_alias_prefix.clone(),
          user_content: stack.user_content.clone().unwrap_or_default(),
          computed_content: stack.computed_content.clone().unwrap_or_default(),
          urls: stack.urls.clone().unwrap_or_default(),
          configs: stack.configs.clone().unwrap_or_default(),
          env_overrides,
        };

        let deployment = ComposeStackDeployment {
          hash: hash.clone(),
          stack_id: stack.id.clone(),
          status: DeploymentStatus::Queued,
          status_reason: None,
          stack_snapshot: Some(snapshot),
          commit_message,
          queued_at_ms: now_ms(),
          started_at_ms: None,
          finished_at_ms: None,
        };
        db.stack_deployments.insert_one(&deployment).await?;
        anyhow::Ok(deployment)
      }
    })
    .await?;

  state::workflow_engine()
    .start_workflow(&deployment.workflow_id(), json!({ "hash": deployment.hash }))
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  Ok(deployment)
}

/// Cancel endpoint logic (spec.md §4.5 "Cancel endpoint", §7 `Conflict`).
pub async fn cancel_deploy(stack_id: &str, hash: &str) -> ApiResult<ComposeStackDeployment> {
  let db = state::db_client().await;
  let deployment = db
    .stack_deployments
    .find_one(doc! { "hash": hash, "stack_id": stack_id })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("deployment '{hash}'")))?;

  if deployment.status.is_terminal() {
    return Err(ApiError::Conflict(format!(
      "deployment '{hash}' is already {:?}",
      deployment.status
    )));
  }

  if deployment.started_at_ms.is_none() {
    let reason = "Deployment cancelled.".to_string();
    db.stack_deployments
      .update_one(
        doc! { "hash": hash },
        doc! { "$set": {
          "status": "CANCELLED",
          "status_reason": &reason,
          "finished_at_ms": now_ms(),
        } },
      )
      .await
      .map_err(anyhow::Error::from)?;
    return Ok(ComposeStackDeployment {
      status: DeploymentStatus::Cancelled,
      status_reason: Some(reason),
      finished_at_ms: Some(now_ms()),
      ..deployment
    });
  }

  state::workflow_engine()
    .signal_workflow(&deployment.workflow_id(), &format!("{CANCEL_SIGNAL_PREFIX}{hash}"))
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  Ok(deployment)
}

/// Resolves the `QUEUED` deployment a freshly started workflow run should
/// drive. Since `InProcessEngine` always reuses the same workflow id for a
/// stack, several runs can be spawned before the stack's mutex lets the
/// first one proceed; each picks up whichever deployment is oldest and
/// still QUEUED once it actually gets to run, which — combined with the
/// mutex serializing actual execution — preserves `queued_at` order even
/// though the spawns themselves race.
async fn next_queued_deployment(stack_id: &str) -> anyhow::Result<Option<ComposeStackDeployment>> {
  let db = state::db_client().await;
  let mut candidates = find_collect(
    &db.stack_deployments,
    doc! { "stack_id": stack_id, "status": "QUEUED" },
    None,
  )
  .await?;
  candidates.sort_by_key(|d| d.queued_at_ms);
  Ok(candidates.into_iter().next())
}

async fn run_deploy(stack_id: String, mut signals: mpsc::UnboundedReceiver<String>) {
  let lock = stack_lock(&stack_id);
  let _guard = lock.lock().await;

  let Ok(Some(deployment)) = next_queued_deployment(&stack_id).await else {
    warn!(stack_id, "deploy workflow fired with no QUEUED deployment waiting");
    return;
  };

  let permit = match state::deploy_semaphore().acquire().await {
    Ok(p) => p,
    Err(e) => {
      fail_deployment(&deployment.hash, format!("could not acquire deploy slot: {e}")).await;
      return;
    }
  };

  if let Err(e) = run_deploy_inner(&deployment, &mut signals).await {
    fail_deployment(&deployment.hash, format!("{e:#}")).await;
  }
  drop(permit);
}

async fn run_deploy_inner(
  deployment: &ComposeStackDeployment,
  signals: &mut mpsc::UnboundedReceiver<String>,
) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let snapshot = deployment
    .stack_snapshot
    .as_ref()
    .ok_or_else(|| anyhow::anyhow!("deployment has no snapshot"))?
    .clone();

  let stack = db
    .stacks
    .find_one(doc! { "id": &snapshot.stack_id })
    .await?
    .ok_or_else(|| anyhow::anyhow!("stack '{}' not found", snapshot.stack_id))?;

  // --- 1. Prepare ---
  db.stack_deployments
    .update_one(
      doc! { "hash": &deployment.hash },
      doc! { "$set": { "status": "DEPLOYING", "started_at_ms": now_ms() } },
    )
    .await?;

  let dir = scratch_dir(&deployment.hash);
  std::fs::create_dir_all(&dir)?;
  let cleanup_scratch = || { let _ = std::fs::remove_dir_all(&dir); };

  let parsed = match parse_compose(&snapshot.user_content) {
    Ok(p) => p,
    Err(e) => {
      cleanup_scratch();
      anyhow::bail!("recompiling snapshot failed: {e}");
    }
  };

  let generate_ctx = GenerateContext {
    project_slug: &snapshot.project_id,
    stack_slug: &snapshot.slug,
    root_domain: &core_config().root_domain,
  };
  let ctx = CompileContext {
    stack_id: &stack.id,
    project_id: &stack.project_id,
    environment_id: &stack.environment_id,
    hash_prefix: &stack.hash_prefix(),
    network_alias_prefix: &stack.network_alias_prefix,
    env_network_name: &env_network_name(&stack.environment_id),
    zane_internal_domain: &core_config().zane_internal_domain,
    fluentd_host: core_config().zane_fluentd_host.as_deref().unwrap_or("fluentd:24224"),
    existing_overrides: &snapshot.env_overrides,
    generate_ctx,
  };
  let artifact = match compose::compile(&parsed, &ctx) {
    Ok(a) => a,
    Err(e) => {
      cleanup_scratch();
      anyhow::bail!("recompiling snapshot failed: {e}");
    }
  };

  for (name, content) in &artifact.configs {
    std::fs::write(dir.join(format!("{}_{name}.conf", ctx.hash_prefix)), content)?;
  }

  // --- 2. Cancellation check ---
  if let Ok(signal) = signals.try_recv() {
    if signal == format!("{CANCEL_SIGNAL_PREFIX}{}", deployment.hash) {
      cleanup_scratch();
      db.stack_deployments
        .update_one(
          doc! { "hash": &deployment.hash },
          doc! { "$set": {
            "status": "CANCELLED",
            "status_reason": "Deployment cancelled.",
            "finished_at_ms": now_ms(),
          } },
        )
        .await?;
      return Ok(());
    }
  }

  // --- 3. Create resources ---
  let retry = state::retry_policy();
  let orch = state::orchestrator();
  let network_name = env_network_name(&stack.environment_id);
  with_retry(retry, is_orchestrator_transient, || async {
    orch
      .create_network(&NetworkSpec {
        name: network_name.clone(),
        driver: Some("overlay".to_string()),
        labels: IndexMap::new(),
      })
      .await
      .map_err(anyhow::Error::from)
  })
  .await?;

  for (name, volume) in &artifact.computed_spec.volumes {
    if volume.external {
      with_retry(retry, is_orchestrator_transient, || async {
        orch
          .create_volume(&orchestrator::VolumeSpec {
            name: name.clone(),
            driver: volume.driver.clone(),
            labels: volume.labels.clone(),
          })
          .await
          .map_err(anyhow::Error::from)
      })
      .await?;
    }
  }
  for (name, config) in &artifact.computed_spec.configs {
    if config.external {
      with_retry(retry, is_orchestrator_transient, || async {
        orch
          .create_config(&ConfigSpecInput {
            name: name.clone(),
            content: config.content.clone().unwrap_or_default(),
            labels: config.labels.clone(),
          })
          .await
          .map_err(anyhow::Error::from)
      })
      .await?;
    }
  }

  // --- 4. Deploy ---
  let namespace = stack.namespace();
  let compose_yaml = artifact.computed_content.clone();
  with_retry(retry, is_orchestrator_transient, || async {
    orch
      .deploy_stack(&namespace, &compose_yaml, &dir)
      .await
      .map_err(anyhow::Error::from)
  })
  .await?;

  // --- 5. Monitor until converged ---
  let service_statuses = converge(orch, &ctx.hash_prefix).await?;

  // --- 6. Proxy update ---
  reconcile_routes(&stack, &artifact.urls, &ctx.hash_prefix).await?;

  // --- 7. Finalize ---
  db.stacks
    .update_one(
      doc! { "id": &stack.id },
      doc! { "$set": {
        "service_statuses": mungos::mongodb::bson::to_bson(&service_statuses)?,
        "updated_at_ms": now_ms(),
      } },
    )
    .await?;
  db.stack_deployments
    .update_one(
      doc! { "hash": &deployment.hash },
      doc! { "$set": { "status": "SUCCEEDED", "finished_at_ms": now_ms() } },
    )
    .await?;

  ensure_monitor_schedules(&stack.id).await.ok();
  drain_superseded_deployments(&stack.id, &deployment.hash).await?;
  cleanup_scratch();
  Ok(())
}

pub(crate) async fn fail_deployment(hash: &str, reason: String) {
  error!(hash, %reason, "deployment failed");
  let db = state::db_client().await;
  let _ = db
    .stack_deployments
    .update_one(
      doc! { "hash": hash },
      doc! { "$set": { "status": "FAILED", "status_reason": &reason, "finished_at_ms": now_ms() } },
    )
    .await;
  let _ = std::fs::remove_dir_all(scratch_dir(hash));
}

/// Polls per-service task lists until every service reaches a stable status
/// or the convergence timeout elapses (spec.md §4.5 step 5 + task->status
/// matrix).
async fn converge(
  orch: &orchestrator::SwarmOrchestrator,
  hash_prefix: &str,
) -> anyhow::Result<IndexMap<String, StackServiceStatus>> {
  let timeout = std::time::Duration::from_secs(60);
  let poll_interval = std::time::Duration::from_secs(2);
  let deadline = tokio::time::Instant::now() + timeout;

  loop {
    let statuses = crate::stack::compute_service_statuses(orch, hash_prefix).await?;
    if crate::stack::all_settled(&statuses) || tokio::time::Instant::now() >= deadline {
      return Ok(statuses);
    }
    tokio::time::sleep(poll_interval).await;
  }
}

/// Upserts every route in the fresh artifact, removes any route of this
/// stack no longer present (spec.md §4.5 step 6, §8 property 4).
async fn reconcile_routes(
  stack: &ComposeStack,
  fresh_urls: &IndexMap<String, Vec<zane_client::entities::route::UrlRoute>>,
  hash_prefix: &str,
) -> anyhow::Result<()> {
  let proxy = state::proxy();
  let retry = state::retry_policy();

  let previous_urls = stack.urls.clone().unwrap_or_default();
  for (service, routes) in &previous_urls {
    let fresh_count = fresh_urls.get(service).map(|r| r.len()).unwrap_or(0);
    for index in fresh_count..routes.len() {
      let key = RouteKey {
        stack_id: stack.id.clone(),
        service: service.clone(),
        index,
      };
      with_retry(retry, |_: &anyhow::Error| true, || async {
        proxy.remove_route(&key).await.map_err(anyhow::Error::from)
      })
      .await?;
    }
  }

  for (service, routes) in fresh_urls {
    let target_service = format!("{hash_prefix}_{service}");
    for (index, route) in routes.iter().enumerate() {
      let key = RouteKey {
        stack_id: stack.id.clone(),
        service: service.clone(),
        index,
      };
      with_retry(retry, |_: &anyhow::Error| true, || async {
        proxy
          .upsert_route(&key, route, &target_service)
          .await
          .map_err(anyhow::Error::from)
      })
      .await?;
    }
  }
  Ok(())
}

pub(crate) async fn ensure_monitor_schedules(stack_id: &str) -> anyhow::Result<()> {
  let engine = state::workflow_engine();
  let monitor_id = format!("monitor-compose-{stack_id}");
  let metrics_id = format!("metrics-compose-{stack_id}");
  let input = json!({ "stack_id": stack_id });

  if engine
    .create_schedule(&monitor_id, "*/30 * * * * *", "monitor", input.clone())
    .await
    .is_err()
  {
    // already exists: leave it running.
  }
  if engine
    .create_schedule(&metrics_id, "0 * * * * *", "metrics", input)
    .await
    .is_err()
  {
  }
  Ok(())
}

/// Marks every other non-terminal deployment on this stack superseded:
/// REMOVED, its swarm services scaled to zero, its schedules dropped
/// (spec.md §4.5 step 7).
async fn drain_superseded_deployments(stack_id: &str, keep_hash: &str) -> anyhow::Result<()> {
  let db = state::db_client().await;
  let others = find_collect(
    &db.stack_deployments,
    doc! { "stack_id": stack_id, "hash": { "$ne": keep_hash }, "status": { "$nin": ["REMOVED", "CANCELLED", "FAILED"] } },
    None,
  )
  .await?;

  for old in others {
    db.stack_deployments
      .update_one(
        doc! { "hash": &old.hash },
        doc! { "$set": { "status": "REMOVED", "finished_at_ms": now_ms() } },
      )
      .await?;
    // Defensive cleanup: per-deployment schedules should never exist
    // (Monitor/Metrics are keyed per-stack, not per-deployment), but a
    // stray one from an older scheme shouldn't linger.
    let _ = state::workflow_engine()
      .delete_schedule(&format!("monitor-compose-{}-{}", stack_id, old.hash))
      .await;
  }
  Ok(())
}

/// `archive-compose-<stack.id>` workflow body (spec.md §4.5 "Archive
/// flow").
async fn run_archive(stack_id: String, input: Value) {
  if let Err(e) = run_archive_inner(&stack_id, input).await {
    error!(stack_id, "archive workflow failed: {e:#}");
  }
}

async fn run_archive_inner(stack_id: &str, input: Value) -> anyhow::Result<()> {
  let delete_configs = input.get("delete_configs").and_then(|v| v.as_bool()).unwrap_or(true);
  let delete_volumes = input.get("delete_volumes").and_then(|v| v.as_bool()).unwrap_or(true);

  let db = state::db_client().await;
  let stack = db
    .stacks
    .find_one(doc! { "id": stack_id })
    .await?
    .ok_or_else(|| anyhow::anyhow!("stack '{stack_id}' not found"))?;
  let hash_prefix = stack.hash_prefix();

  let orch = state::orchestrator();
  let retry = state::retry_policy();
  let services = orch
    .list_services(&ServiceFilter {
      name_prefix: Some(format!("{hash_prefix}_")),
      labels: Vec::new(),
    })
    .await?;
  for service in &services {
    with_retry(retry, is_orchestrator_transient, || async {
      orch.remove_service(&service.name).await.map_err(anyhow::Error::from)
    })
    .await?;
  }

  if let Some(spec) = stack.computed_content.as_deref().and_then(|c| parse_compose(c).ok()) {
    if delete_volumes {
      for (name, volume) in &spec.spec.volumes {
        if !volume.external {
          with_retry(retry, is_orchestrator_transient, || async {
            orch.remove_volume(name).await.map_err(anyhow::Error::from)
          })
          .await
          .ok();
        }
      }
    }
    if delete_configs {
      for (name, config) in &spec.spec.configs {
        if !config.external {
          with_retry(retry, is_orchestrator_transient, || async {
            orch.remove_config(name).await.map_err(anyhow::Error::from)
          })
          .await
          .ok();
        }
      }
    }
  }

  let proxy = state::proxy();
  if let Some(urls) = &stack.urls {
    for (service, routes) in urls {
      for index in 0..routes.len() {
        let key = RouteKey {
          stack_id: stack.id.clone(),
          service: service.clone(),
          index,
        };
        proxy.remove_route(&key).await.ok();
      }
    }
  }

  let engine = state::workflow_engine();
  let _ = engine.delete_schedule(&format!("monitor-compose-{stack_id}")).await;
  let _ = engine.delete_schedule(&format!("metrics-compose-{stack_id}")).await;

  state::log_store()
    .delete(&logstore::LogQuery {
      stack_id: stack_id.to_string(),
      ..Default::default()
    })
    .await
    .ok();

  db.stacks.delete_one(doc! { "id": stack_id }).await?;
  db.stack_changes
    .delete_many(doc! { "stack_id": stack_id })
    .await
    .ok();
  db.stack_env_overrides
    .delete_many(doc! { "stack_id": stack_id })
    .await
    .ok();
  db.stack_deployments
    .delete_many(doc! { "stack_id": stack_id })
    .await
    .ok();
  Ok(())
}
