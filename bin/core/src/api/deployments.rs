//! Deployment-scoped rows of spec.md §6's table: detail and cancel.

use axum::Json;
use axum::extract::Path;
use mungos::mongodb::bson::doc;

use response::{ApiError, ApiResult};
use zane_client::entities::deployment::ComposeStackDeployment;

use crate::api::scope::{find_stack, resolve_environment};

pub async fn deployment_detail(
  Path((project_slug, env_name, slug, hash)): Path<(String, String, String, String)>,
) -> ApiResult<Json<ComposeStackDeployment>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let db = crate::state::db_client().await;
  let deployment = db
    .stack_deployments
    .find_one(doc! { "hash": &hash, "stack_id": &stack.id })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("deployment '{hash}'")))?;
  Ok(Json(deployment))
}

pub async fn cancel_deployment(
  Path((project_slug, env_name, slug, hash)): Path<(String, String, String, String)>,
) -> ApiResult<Json<ComposeStackDeployment>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let deployment = crate::stack::deploy::cancel_deploy(&stack.id, &hash).await?;
  Ok(Json(deployment))
}
