//! Shared compose-content compile step (spec.md §4.1 items 2/3 validation +
//! §4.3 Spec Compiler), used identically by stack creation, `request-change`,
//! and environment cloning so the three call sites can't drift. Grounded on
//! `ComposeSpecProcessor.validate_compose_file`/`process_compose_spec` in
//! `original_source/backend/compose/processor.py` running as one pipeline.

use indexmap::IndexMap;
use mungos::find::find_collect;
use mungos::mongodb::bson::doc;

use compose::yaml::to_yaml_string;
use compose::{CompileContext, enforce_policy, parse_compose, revalidate_with_config_stub};
use interpolate::GenerateContext;
use response::{ApiError, ApiResult};
use zane_client::entities::change::ComposeContentChangePayload;
use zane_client::entities::compose::ComposeEnvVar;
use zane_client::entities::route::UrlRoute;
use zane_client::entities::stack::ComposeStack;

use crate::config::core_config;
use crate::state;
use crate::stack::deploy::env_network_name;

/// Result of [`compile_content_change`]: the `compose_content` change
/// payload plus whichever `x-env` entries were freshly materialized by a
/// generator this pass (spec.md §4.2: "only newly generated values become
/// ENV_OVERRIDE ADD changes"). Stack creation turns `generated_overrides`
/// into pending `env_overrides` ADD changes alongside the content change;
/// a plain content edit (`request-change`) only ever needs `payload`.
pub struct CompiledContentChange {
  pub payload: ComposeContentChangePayload,
  pub generated_overrides: Vec<ComposeEnvVar>,
}

/// Parses, policy-validates, re-normalizes (stable key order), and compiles
/// `user_content` against `stack`'s identity fields and `env_overrides`,
/// returning the payload a `compose_content UPDATE` change carries.
pub async fn compile_content_change(
  stack: &ComposeStack,
  user_content: &str,
  env_overrides: &IndexMap<String, String>,
) -> ApiResult<CompiledContentChange> {
  let parsed = parse_compose(user_content).map_err(|e| ApiError::invalid_compose(e.to_string()))?;
  enforce_policy(&parsed.spec).map_err(|e| ApiError::invalid_compose(e.to_string()))?;
  revalidate_with_config_stub(&state::spec_validator(), user_content)
    .map_err(|e| ApiError::invalid_compose(e.to_string()))?;

  let renormalized = to_yaml_string(&parsed.raw);
  let reparsed = parse_compose(&renormalized).map_err(|e| ApiError::invalid_compose(e.to_string()))?;

  let generate_ctx = GenerateContext {
    project_slug: &stack.project_id,
    stack_slug: &stack.slug,
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
    existing_overrides: env_overrides,
    generate_ctx,
  };
  let artifact = compose::compile(&reparsed, &ctx).map_err(|e| ApiError::invalid_compose(e.to_string()))?;

  check_cross_stack_route_collisions(stack, &artifact.urls).await?;

  Ok(CompiledContentChange {
    payload: ComposeContentChangePayload {
      user_content: renormalized,
      computed_content: artifact.computed_content,
      urls: serde_json::to_value(&artifact.urls).map_err(anyhow::Error::from)?,
      configs: serde_json::to_value(&artifact.configs).map_err(anyhow::Error::from)?,
    },
    generated_overrides: artifact.env_overrides,
  })
}

/// spec.md line 70: "No route may collide with an already-deployed route
/// from a different stack in the same environment; wildcards shadow equal-
/// path subdomains." Queries every other stack's persisted `urls` in
/// `stack.environment_id` and rejects if any of `new_routes` collides with
/// one (`UrlRoute::collides_with` covers both the exact-match and the
/// wildcard-shadow case).
async fn check_cross_stack_route_collisions(
  stack: &ComposeStack,
  new_routes: &IndexMap<String, Vec<UrlRoute>>,
) -> ApiResult<()> {
  let db = state::db_client().await;
  let other_stacks: Vec<ComposeStack> = find_collect(
    &db.stacks,
    doc! { "environment_id": &stack.environment_id, "id": { "$ne": &stack.id } },
    None,
  )
  .await
  .map_err(anyhow::Error::from)?;

  for other in &other_stacks {
    let Some(other_urls) = &other.urls else {
      continue;
    };
    for (service, routes) in new_routes {
      for route in routes {
        for (other_service, other_routes) in other_urls {
          for other_route in other_routes {
            if route.collides_with(other_route) {
              return Err(ApiError::UrlConflict(format!(
                "route '{}{}' on service '{service}' collides with route \
                 '{}{}' on service '{other_service}' of stack '{}'",
                route.domain, route.base_path, other_route.domain, other_route.base_path, other.slug,
              )));
            }
          }
        }
      }
    }
  }

  Ok(())
}
