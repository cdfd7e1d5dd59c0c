//! Start/stop toggle (spec.md §4.6 "Toggle"): `stop` scales every service to
//! zero and tears down its exposed proxy routes, remembering which ports
//! were live so `start` can restore them. Requires at least one non-FAILED
//! deployment to exist — a stack that never deployed successfully has
//! nothing running to toggle.

use mungos::mongodb::bson::doc;
use mungos::find::find_collect;

use orchestrator::{Orchestrator, ServiceFilter};
use proxy::Proxy;
use response::{ApiError, ApiResult};
use zane_client::entities::route::RouteKey;
use zane_client::entities::stack::ComposeStack;

use crate::state;
use crate::stack::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
  Start,
  Stop,
}

pub async fn toggle(stack_id: &str, desired_state: DesiredState) -> ApiResult<ComposeStack> {
  let db = state::db_client().await;
  let stack = db
    .stacks
    .find_one(doc! { "id": stack_id })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("stack '{stack_id}'")))?;

  let has_succeeded = find_collect(
    &db.stack_deployments,
    doc! { "stack_id": stack_id, "status": { "$ne": "FAILED" } },
    None,
  )
  .await
  .map_err(anyhow::Error::from)?
  .into_iter()
  .next()
  .is_some();
  if !has_succeeded {
    return Err(ApiError::Conflict(format!(
      "stack '{stack_id}' has no deployment yet; nothing to toggle"
    )));
  }

  match desired_state {
    DesiredState::Stop => stop(&stack).await,
    DesiredState::Start => start(&stack).await,
  }
}

async fn stop(stack: &ComposeStack) -> ApiResult<ComposeStack> {
  let db = state::db_client().await;
  let orch = state::orchestrator();
  let proxy = state::proxy();
  let hash_prefix = stack.hash_prefix();

  let services = orch
    .list_services(&ServiceFilter {
      name_prefix: Some(format!("{hash_prefix}_")),
      labels: Vec::new(),
    })
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  for service in &services {
    orch
      .scale_service(&service.name, 0)
      .await
      .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;
  }

  let urls = stack.urls.clone().unwrap_or_default();
  let mut remembered_ports = indexmap::IndexMap::new();
  for (service, routes) in &urls {
    remembered_ports.insert(service.clone(), routes.iter().map(|r| r.port).collect());
    for index in 0..routes.len() {
      let key = RouteKey {
        stack_id: stack.id.clone(),
        service: service.clone(),
        index,
      };
      proxy.remove_route(&key).await.ok();
    }
  }

  db.stacks
    .update_one(
      doc! { "id": &stack.id },
      doc! { "$set": {
        "remembered_ports": mungos::mongodb::bson::to_bson(&remembered_ports)
          .map_err(anyhow::Error::from)?,
        "updated_at_ms": now_ms(),
      } },
    )
    .await
    .map_err(anyhow::Error::from)?;

  Ok(ComposeStack {
    remembered_ports,
    ..stack.clone()
  })
}

async fn start(stack: &ComposeStack) -> ApiResult<ComposeStack> {
  let db = state::db_client().await;
  let orch = state::orchestrator();
  let proxy = state::proxy();
  let hash_prefix = stack.hash_prefix();

  let services = orch
    .list_services(&ServiceFilter {
      name_prefix: Some(format!("{hash_prefix}_")),
      labels: Vec::new(),
    })
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  for service in &services {
    let desired = stack
      .service_statuses
      .get(
        service
          .name
          .strip_prefix(&format!("{hash_prefix}_"))
          .unwrap_or(&service.name),
      )
      .map(|s| s.desired_replicas)
      .unwrap_or(1);
    orch
      .scale_service(&service.name, desired.max(1))
      .await
      .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;
  }

  let urls = stack.urls.clone().unwrap_or_default();
  for (service, routes) in &urls {
    let target_service = format!("{hash_prefix}_{service}");
    for (index, route) in routes.iter().enumerate() {
      let key = RouteKey {
        stack_id: stack.id.clone(),
        service: service.clone(),
        index,
      };
      proxy
        .upsert_route(&key, route, &target_service)
        .await
        .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;
    }
  }

  db.stacks
    .update_one(
      doc! { "id": &stack.id },
      doc! { "$set": {
        "remembered_ports": mungos::mongodb::bson::to_bson(&indexmap::IndexMap::<String, Vec<u32>>::new())
          .map_err(anyhow::Error::from)?,
        "updated_at_ms": now_ms(),
      } },
    )
    .await
    .map_err(anyhow::Error::from)?;

  Ok(ComposeStack {
    remembered_ports: Default::default(),
    ..stack.clone()
  })
}
