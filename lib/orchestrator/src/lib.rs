//! External collaborator seam for the swarm orchestrator (spec.md §6
//! "Orchestrator" capability list). `bin/core`'s deployment state machine
//! and `lib/compose`'s `ExternalSpecValidator` both depend on this trait;
//! `SwarmOrchestrator` (src/swarm.rs) is the only implementation, backed by
//! `bollard` for queries/mutations and the `docker stack` CLI for the two
//! operations Docker Swarm has no REST endpoint for, grounded on
//! `original_source/backend/compose/processor.py::_run_docker_validation`
//! (always shells to `docker stack config`/`docker stack deploy`) and on
//! `examples/rrik-komodo/bin/periphery/src/docker/{service,task,swarm,secret}.rs`
//! for the bollard query conventions.

pub mod error;
pub mod shell;
pub mod swarm;

pub use error::{OrchestratorError, OrchestratorResult};
pub use swarm::SwarmOrchestrator;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
  /// Matches services whose name starts with this prefix (namespace scoping).
  pub name_prefix: Option<String>,
  pub labels: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSummary {
  pub id: String,
  pub name: String,
  pub image: Option<String>,
  pub replicas: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
  pub id: String,
  pub service_id: Option<String>,
  pub node_id: Option<String>,
  pub state: Option<String>,
  pub desired_state: Option<String>,
  pub message: Option<String>,
  pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkSpec {
  pub name: String,
  pub driver: Option<String>,
  pub labels: indexmap::IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VolumeSpec {
  pub name: String,
  pub driver: Option<String>,
  pub labels: indexmap::IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSpecInput {
  pub name: String,
  pub content: String,
  pub labels: indexmap::IndexMap<String, String>,
}

/// Spec.md §6's "External collaborator capabilities" list, one method per
/// bullet. Every mutating call must be idempotent at the call site (the
/// deployment state machine retries on `TransientOrchestrator` errors), so
/// "already exists" / "already gone" are treated as success, not error.
#[async_trait::async_trait]
pub trait Orchestrator: Send + Sync {
  /// Offline structural validation via `docker stack config` (spec.md §4.1
  /// item 2). Returns `Err(message)` rather than `OrchestratorError` since
  /// `compose::ExternalSpecValidator` is the seam this satisfies and it
  /// only wants a `Result<(), String>`.
  async fn validate_spec(&self, yaml_text: &str) -> Result<(), String>;

  /// `scratch_dir` must already contain any inline-config files the
  /// compiled `compose_yaml` references by relative `file:` path (spec.md
  /// §4.5 step 1/3).
  async fn deploy_stack(
    &self,
    namespace: &str,
    compose_yaml: &str,
    scratch_dir: &std::path::Path,
  ) -> OrchestratorResult<()>;

  async fn list_services(
    &self,
    filter: &ServiceFilter,
  ) -> OrchestratorResult<Vec<ServiceSummary>>;

  async fn scale_service(
    &self,
    service_name: &str,
    replicas: u64,
  ) -> OrchestratorResult<()>;

  async fn remove_service(&self, service_name: &str) -> OrchestratorResult<()>;

  async fn list_tasks(&self, service_name: &str) -> OrchestratorResult<Vec<TaskInfo>>;

  async fn get_config(&self, name: &str) -> OrchestratorResult<Option<ConfigSpecInput>>;
  async fn create_config(&self, spec: &ConfigSpecInput) -> OrchestratorResult<()>;
  async fn remove_config(&self, name: &str) -> OrchestratorResult<()>;

  async fn get_volume(&self, name: &str) -> OrchestratorResult<Option<VolumeSpec>>;
  async fn create_volume(&self, spec: &VolumeSpec) -> OrchestratorResult<()>;
  async fn remove_volume(&self, name: &str) -> OrchestratorResult<()>;

  async fn get_network(&self, name: &str) -> OrchestratorResult<Option<NetworkSpec>>;
  async fn create_network(&self, spec: &NetworkSpec) -> OrchestratorResult<()>;
  async fn remove_network(&self, name: &str) -> OrchestratorResult<()>;
}

/// Implements `compose::ExternalSpecValidator` for any `Orchestrator`,
/// wiring the validator seam `lib/compose` anticipates without `lib/compose`
/// needing to depend on this crate.
pub struct ValidatorAdapter<'a, O: Orchestrator>(pub &'a O);

impl<'a, O: Orchestrator + Sync> compose::ExternalSpecValidator for ValidatorAdapter<'a, O> {
  fn validate(&self, yaml_text: &str) -> Result<(), String> {
    tokio::task::block_in_place(|| {
      tokio::runtime::Handle::current().block_on(self.0.validate_spec(yaml_text))
    })
  }
}
