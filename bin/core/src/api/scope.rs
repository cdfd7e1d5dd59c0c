//! Resolves the `/projects/<slug>/<env>/stacks/...` path prefix spec.md §6
//! uses into concrete rows. HTTP routing, pagination, and JSON shaping are
//! out of scope per spec.md §1 ("treated as external collaborators"); this
//! is the one small seam this core still owns — turning a path into the
//! `Project`/`Environment`/`ComposeStack` rows a handler needs.

use mungos::mongodb::bson::doc;

use response::{ApiError, ApiResult};
use zane_client::entities::environment::Environment;
use zane_client::entities::project::Project;
use zane_client::entities::stack::ComposeStack;

use crate::state;

pub async fn resolve_environment(project_slug: &str, env_name: &str) -> ApiResult<(Project, Environment)> {
  let db = state::db_client().await;

  let project = db
    .projects
    .find_one(doc! { "slug": project_slug })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("project '{project_slug}'")))?;

  let environment = db
    .environments
    .find_one(doc! { "project_id": &project.id, "name": env_name })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("environment '{env_name}' in project '{project_slug}'")))?;

  Ok((project, environment))
}

pub async fn find_stack(environment_id: &str, slug: &str) -> ApiResult<ComposeStack> {
  let db = state::db_client().await;
  db.stacks
    .find_one(doc! { "environment_id": environment_id, "slug": slug })
    .await
    .map_err(anyhow::Error::from)?
    .ok_or_else(|| ApiError::NotFound(format!("stack '{slug}'")))
}
