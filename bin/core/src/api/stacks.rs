//! Stack-scoped handlers: every `/projects/<slug>/<env>/stacks...` row of
//! spec.md §6's table except the two deployment-scoped ones (`deployments.
//! rs`). Grounded on `original_source/backend/compose/views/stacks.py` and
//! `views/serializers.py` for request/response shape, `write/server.rs` for
//! the teacher's handler-function-per-route style (no RPC envelope here —
//! this spec's surface is a plain method+path table, not a typed-request
//! dispatch).

use axum::Json;
use axum::extract::Path;
use axum::http::StatusCode;
use indexmap::IndexMap;
use mungos::find::find_collect;
use mungos::mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use ledger::{ChangePlan, LedgerError, NewChange};
use response::{ApiError, ApiResult};
use zane_client::entities::change::{
  CHANGE_ID_PREFIX, ChangeField, ChangeType, ComposeStackChange, EnvOverrideChangePayload,
};
use zane_client::entities::env_override::ComposeStackEnvOverride;
use zane_client::entities::stack::{ComposeStack, STACK_ID_PREFIX};

use crate::api::scope::{find_stack, resolve_environment};
use crate::stack::{new_deploy_token, new_id, now_ms};

#[derive(Deserialize)]
pub struct CreateStackBody {
  pub slug: Option<String>,
  pub user_content: String,
}

#[derive(Deserialize)]
pub struct CreateFromDokployBody {
  pub slug: Option<String>,
  /// Base64 `{compose, config}` envelope, decoded by `compose::dokploy`.
  pub user_content: String,
}

#[derive(Serialize)]
pub struct StackDetail {
  #[serde(flatten)]
  pub stack: ComposeStack,
  pub pending_changes: Vec<ComposeStackChange>,
}

pub async fn list_stacks(
  Path((project_slug, env_name)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ComposeStack>>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let db = crate::state::db_client().await;
  let stacks = find_collect(&db.stacks, doc! { "environment_id": &environment.id }, None)
    .await
    .map_err(anyhow::Error::from)?;
  Ok(Json(stacks))
}

pub async fn create_stack(
  Path((project_slug, env_name)): Path<(String, String)>,
  Json(body): Json<CreateStackBody>,
) -> ApiResult<(StatusCode, Json<ComposeStack>)> {
  let (project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = create_stack_with_content(&project, &environment, body.slug, &body.user_content).await?;
  Ok((StatusCode::CREATED, Json(stack)))
}

pub async fn create_stack_from_dokploy(
  Path((project_slug, env_name)): Path<(String, String)>,
  Json(body): Json<CreateFromDokployBody>,
) -> ApiResult<(StatusCode, Json<ComposeStack>)> {
  let (project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let translated = compose::dokploy::translate(&body.user_content).map_err(|e| ApiError::invalid_compose(e.to_string()))?;
  let stack = create_stack_with_content(&project, &environment, body.slug, &translated).await?;
  Ok((StatusCode::CREATED, Json(stack)))
}

/// Shared by `create_stack`/`create_stack_from_dokploy`: both reduce to
/// "build a bare stack shell, then a pending `compose_content` UPDATE plus
/// whatever env overrides the first resolution pass just generated"
/// (`views/serializers.py`'s `ComposeStackSerializer.create`).
async fn create_stack_with_content(
  project: &zane_client::entities::project::Project,
  environment: &zane_client::entities::environment::Environment,
  slug: Option<String>,
  user_content: &str,
) -> ApiResult<ComposeStack> {
  let db = crate::state::db_client().await;
  let slug = slug.unwrap_or_else(random_slug);

  if db
    .stacks
    .find_one(doc! { "environment_id": &environment.id, "slug": &slug })
    .await
    .map_err(anyhow::Error::from)?
    .is_some()
  {
    return Err(ApiError::Conflict(format!(
      "a compose stack with the slug '{slug}' already exists in this environment"
    )));
  }

  let now = now_ms();
  let stack = ComposeStack {
    id: new_id(STACK_ID_PREFIX),
    slug,
    project_id: project.id.clone(),
    environment_id: environment.id.clone(),
    network_alias_prefix: format!("zn-{}", Uuid::new_v4().simple()),
    deploy_token: new_deploy_token(),
    user_content: None,
    computed_content: None,
    urls: None,
    configs: None,
    service_statuses: IndexMap::new(),
    remembered_ports: IndexMap::new(),
    created_at_ms: now,
    updated_at_ms: now,
  };
  db.stacks.insert_one(&stack).await.map_err(anyhow::Error::from)?;

  let compiled = crate::stack::content::compile_content_change(&stack, user_content, &IndexMap::new()).await?;

  let content_change = ComposeStackChange {
    id: new_id(CHANGE_ID_PREFIX),
    stack_id: stack.id.clone(),
    field: ChangeField::ComposeContent,
    change_type: ChangeType::Update,
    item_id: None,
    old_value: None,
    new_value: Some(serde_json::to_value(&compiled.payload).map_err(anyhow::Error::from)?),
    applied: false,
    deployment_hash: None,
    created_at_ms: now,
  };
  db.stack_changes.insert_one(&content_change).await.map_err(anyhow::Error::from)?;

  for generated in compiled.generated_overrides {
    let change = ComposeStackChange {
      id: new_id(CHANGE_ID_PREFIX),
      stack_id: stack.id.clone(),
      field: ChangeField::EnvOverrides,
      change_type: ChangeType::Add,
      item_id: None,
      old_value: None,
      new_value: Some(
        serde_json::to_value(EnvOverrideChangePayload {
          key: generated.key,
          value: generated.value,
          service: None,
        })
        .map_err(anyhow::Error::from)?,
      ),
      applied: false,
      deployment_hash: None,
      created_at_ms: now,
    };
    db.stack_changes.insert_one(&change).await.map_err(anyhow::Error::from)?;
  }

  Ok(stack)
}

fn random_slug() -> String {
  format!("stack-{}", &Uuid::new_v4().simple().to_string()[..8])
}

pub async fn stack_detail(
  Path((project_slug, env_name, slug)): Path<(String, String, String)>,
) -> ApiResult<Json<StackDetail>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let db = crate::state::db_client().await;
  let pending_changes = find_collect(
    &db.stack_changes,
    doc! { "stack_id": &stack.id, "applied": false },
    None,
  )
  .await
  .map_err(anyhow::Error::from)?;
  Ok(Json(StackDetail { stack, pending_changes }))
}

#[derive(Deserialize)]
pub struct ArchiveBody {
  #[serde(default = "default_true")]
  pub delete_configs: bool,
  #[serde(default = "default_true")]
  pub delete_volumes: bool,
}

impl Default for ArchiveBody {
  /// Matches the `#[serde(default = "default_true")]` fields above so a
  /// wholly absent body behaves the same as an empty JSON object
  /// (`ComposeStackArchiveRequestSerializer{delete_configs=True,
  /// delete_volumes=True}`).
  fn default() -> Self {
    Self { delete_configs: true, delete_volumes: true }
  }
}

fn default_true() -> bool {
  true
}

pub async fn archive_stack(
  Path((project_slug, env_name, slug)): Path<(String, String, String)>,
  body: Option<Json<ArchiveBody>>,
) -> ApiResult<StatusCode> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let body = body.map(|Json(b)| b).unwrap_or_default();

  crate::state::workflow_engine()
    .start_workflow(
      &format!("archive-compose-{}", stack.id),
      json!({ "delete_configs": body.delete_configs, "delete_volumes": body.delete_volumes }),
    )
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum RequestChangeBody {
  ComposeContent {
    #[serde(rename = "type")]
    change_type: ChangeType,
    new_value: String,
  },
  EnvOverrides {
    #[serde(rename = "type")]
    change_type: ChangeType,
    item_id: Option<String>,
    new_value: Option<EnvOverrideChangePayload>,
  },
}

pub async fn request_change(
  Path((project_slug, env_name, slug)): Path<(String, String, String)>,
  Json(body): Json<RequestChangeBody>,
) -> ApiResult<Json<ComposeStackChange>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let db = crate::state::db_client().await;

  let pending = find_collect(
    &db.stack_changes,
    doc! { "stack_id": &stack.id, "applied": false },
    None,
  )
  .await
  .map_err(anyhow::Error::from)?;
  let existing_overrides: Vec<ComposeStackEnvOverride> =
    find_collect(&db.stack_env_overrides, doc! { "stack_id": &stack.id }, None)
      .await
      .map_err(anyhow::Error::from)?;

  let new_change = match body {
    RequestChangeBody::ComposeContent { new_value, .. } => {
      let global_overrides: IndexMap<String, String> = existing_overrides
        .iter()
        .filter(|o| o.service.is_none())
        .map(|o| (o.key.clone(), o.value.clone()))
        .collect();
      let compiled = crate::stack::content::compile_content_change(&stack, &new_value, &global_overrides).await?;
      NewChange::ComposeContentUpdate(compiled.payload)
    }
    RequestChangeBody::EnvOverrides { change_type, item_id, new_value } => match change_type {
      ChangeType::Add => {
        let payload = new_value.ok_or_else(|| ApiError::invalid_compose("new_value is required for an ADD change"))?;
        NewChange::EnvOverrideAdd(payload)
      }
      ChangeType::Update => {
        let item_id = item_id.ok_or_else(|| ApiError::invalid_compose("item_id is required for an UPDATE change"))?;
        let payload = new_value.ok_or_else(|| ApiError::invalid_compose("new_value is required for an UPDATE change"))?;
        NewChange::EnvOverrideUpdate { item_id, payload }
      }
      ChangeType::Delete => {
        let item_id = item_id.ok_or_else(|| ApiError::invalid_compose("item_id is required for a DELETE change"))?;
        NewChange::EnvOverrideDelete { item_id }
      }
    },
  };

  let plan = ledger::plan_add_change(
    &stack.id,
    &pending,
    &existing_overrides,
    new_change,
    || new_id(CHANGE_ID_PREFIX),
    now_ms(),
  )
  .map_err(map_ledger_error)?;

  let change = match plan {
    ChangePlan::Insert(change) => {
      db.stack_changes.insert_one(&change).await.map_err(anyhow::Error::from)?;
      change
    }
    ChangePlan::ReplaceInPlace { change_id, new_value } => {
      db.stack_changes
        .update_one(
          doc! { "id": &change_id },
          doc! { "$set": { "new_value": mungos::mongodb::bson::to_bson(&new_value).map_err(anyhow::Error::from)? } },
        )
        .await
        .map_err(anyhow::Error::from)?;
      pending
        .into_iter()
        .find(|c| c.id == change_id)
        .map(|c| ComposeStackChange { new_value: Some(new_value), ..c })
        .ok_or_else(|| ApiError::Unrecoverable(anyhow::anyhow!("replaced change '{change_id}' vanished mid-request")))?
    }
  };

  Ok(Json(change))
}

fn map_ledger_error(err: LedgerError) -> ApiError {
  match err {
    LedgerError::DuplicateEnvKey(key) => ApiError::Conflict(format!("env override key '{key}' already present on this stack")),
    LedgerError::OverrideNotFound(id) => ApiError::NotFound(format!("env override '{id}'")),
    LedgerError::DuplicatePendingItem(id) => ApiError::Conflict(format!("a pending change already exists for item '{id}'")),
  }
}

#[derive(Deserialize)]
pub struct DeployBody {
  #[serde(default = "default_commit_message")]
  pub commit_message: String,
}

impl Default for DeployBody {
  fn default() -> Self {
    Self { commit_message: default_commit_message() }
  }
}

fn default_commit_message() -> String {
  "Update stack".to_string()
}

pub async fn deploy_stack(
  Path((project_slug, env_name, slug)): Path<(String, String, String)>,
  body: Option<Json<DeployBody>>,
) -> ApiResult<Json<zane_client::entities::deployment::ComposeStackDeployment>> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let commit_message = body.map(|Json(b)| b).unwrap_or_default().commit_message;
  let deployment = crate::stack::deploy::enqueue_deploy(&stack.id, commit_message).await?;
  Ok(Json(deployment))
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStateWire {
  Start,
  Stop,
}

#[derive(Deserialize)]
pub struct ToggleBody {
  pub desired_state: DesiredStateWire,
}

pub async fn toggle_stack(
  Path((project_slug, env_name, slug)): Path<(String, String, String)>,
  Json(body): Json<ToggleBody>,
) -> ApiResult<(StatusCode, Json<ComposeStack>)> {
  let (_project, environment) = resolve_environment(&project_slug, &env_name).await?;
  let stack = find_stack(&environment.id, &slug).await?;
  let desired_state = match body.desired_state {
    DesiredStateWire::Start => crate::stack::toggle::DesiredState::Start,
    DesiredStateWire::Stop => crate::stack::toggle::DesiredState::Stop,
  };
  let stack = crate::stack::toggle::toggle(&stack.id, desired_state).await?;
  Ok((StatusCode::ACCEPTED, Json(stack)))
}

#[derive(Deserialize, Default)]
pub struct WebhookDeployBody {
  pub branch: Option<String>,
  pub commit_sha: Option<String>,
  pub pr_link: Option<String>,
  /// Name of a project's `PreviewEnvTemplate` to clone from (spec.md §4.7
  /// item 3); a plain redeploy when absent
  /// (`original_source/backend/zane_api/tests/preview_env_templates.py`'s
  /// `trigger_preview_env` keyed the same way, by the stack's own
  /// `deploy_token`).
  pub template: Option<String>,
}

pub async fn webhook_deploy(
  Path(deploy_token): Path<String>,
  body: Option<Json<WebhookDeployBody>>,
) -> ApiResult<Json<serde_json::Value>> {
  let db = crate::state::db_client().await;
  let stack = db
    .stacks
    .find_one(doc! { "deploy_token": &deploy_token })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound("stack with this deploy token".to_string()))?;

  let body = body.map(|Json(b)| b).unwrap_or_default();

  match body.template {
    None => {
      let deployment = crate::stack::deploy::enqueue_deploy(&stack.id, "Webhook deploy".to_string()).await?;
      Ok(Json(serde_json::to_value(deployment).map_err(anyhow::Error::from)?))
    }
    Some(template_slug) => {
      let template = db
        .preview_env_templates
        .find_one(doc! { "project_id": &stack.project_id, "name": &template_slug })
        .await
        .map_err(anyhow::Error::from)?
        .ok_or_else(|| ApiError::NotFound(format!("preview env template '{template_slug}'")))?;

      let preview = crate::stack::clone::PreviewRequest {
        pr_link: body.pr_link.unwrap_or_default(),
        head_repo_url: String::new(),
        branch: body.branch.unwrap_or_default(),
        commit_sha: body.commit_sha.unwrap_or_default(),
        auth_enabled: true,
      };
      let target_name = format!("preview-{}-{}", stack.slug, &new_id("")[..8]);
      let req = crate::stack::clone::CloneRequest::from_template(&template, target_name, preview, &stack.slug);
      let result = crate::stack::clone::clone_environment(&stack.environment_id, req).await?;
      Ok(Json(serde_json::to_value(serde_json::json!({
        "environment": result.environment,
        "stacks": result.stacks,
        "deployments": result.deployments,
      })).map_err(anyhow::Error::from)?))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn archive_body_default_matches_serde_defaults() {
    // A wholly absent request body (`Option<Json<ArchiveBody>>` extracting
    // `None`) must behave the same as an empty JSON object, which serde
    // fills in via `default_true` on both fields.
    let default = ArchiveBody::default();
    assert!(default.delete_configs);
    assert!(default.delete_volumes);
  }

  #[test]
  fn deploy_body_default_matches_serde_default() {
    let default = DeployBody::default();
    assert_eq!(default.commit_message, "Update stack");
  }

  #[test]
  fn random_slug_is_stack_prefixed_and_short() {
    let slug = random_slug();
    assert!(slug.starts_with("stack-"));
    assert_eq!(slug.len(), "stack-".len() + 8);
  }

  #[test]
  fn map_ledger_error_duplicate_env_key_is_conflict() {
    let err = map_ledger_error(LedgerError::DuplicateEnvKey("DATABASE_URL".to_string()));
    assert!(matches!(err, ApiError::Conflict(msg) if msg.contains("DATABASE_URL")));
  }

  #[test]
  fn map_ledger_error_override_not_found_is_not_found() {
    let err = map_ledger_error(LedgerError::OverrideNotFound("stk_env_1".to_string()));
    assert!(matches!(err, ApiError::NotFound(msg) if msg.contains("stk_env_1")));
  }

  #[test]
  fn map_ledger_error_duplicate_pending_item_is_conflict() {
    let err = map_ledger_error(LedgerError::DuplicatePendingItem("stk_env_2".to_string()));
    assert!(matches!(err, ApiError::Conflict(msg) if msg.contains("stk_env_2")));
  }
}
