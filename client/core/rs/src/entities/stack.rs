use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::route::UrlRoute;

pub const STACK_ID_PREFIX: &str = "compose_stk_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeStack {
  pub id: String,
  pub slug: String,
  pub project_id: String,
  pub environment_id: String,
  /// Stable DNS token used to refer to cloned services with the same
  /// logical name across environments (spec.md GLOSSARY
  /// "Network alias prefix").
  pub network_alias_prefix: String,
  pub deploy_token: String,
  /// Last APPLIED source text; None until the first deploy applies the
  /// stack's creation change (spec.md §3 "ComposeStack" invariant).
  pub user_content: Option<String>,
  pub computed_content: Option<String>,
  pub urls: Option<IndexMap<String, Vec<UrlRoute>>>,
  pub configs: Option<IndexMap<String, String>>,
  #[serde(default)]
  pub service_statuses: IndexMap<String, StackServiceStatus>,
  /// Ports that were exposed before a "stop" toggle, restored on "start"
  /// (spec.md §4.6 Toggle).
  #[serde(default)]
  pub remembered_ports: IndexMap<String, Vec<u32>>,
  pub created_at_ms: i64,
  pub updated_at_ms: i64,
}

impl ComposeStack {
  /// Eight-character stack-identifier suffix appended to service names to
  /// de-collide them in shared networks (spec.md GLOSSARY "Hash prefix").
  pub fn hash_prefix(&self) -> String {
    self
      .id
      .strip_prefix(STACK_ID_PREFIX)
      .unwrap_or(&self.id)
      .to_lowercase()
  }

  /// The name the stack is addressed by in the orchestrator's namespace.
  pub fn namespace(&self) -> String {
    format!("zn-{}", self.id)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
  Starting,
  Healthy,
  Unhealthy,
  Complete,
}

impl ServiceStatus {
  /// Tie-break order from spec.md §4.5's task-state matrix:
  /// `UNHEALTHY > STARTING > COMPLETE > HEALTHY`.
  fn rank(self) -> u8 {
    match self {
      ServiceStatus::Unhealthy => 3,
      ServiceStatus::Starting => 2,
      ServiceStatus::Complete => 1,
      ServiceStatus::Healthy => 0,
    }
  }

  /// Combine per-task contributions into the single worst status.
  pub fn worst(a: ServiceStatus, b: ServiceStatus) -> ServiceStatus {
    if a.rank() >= b.rank() { a } else { b }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
  pub state: String,
  pub message: String,
  pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackServiceStatus {
  pub status: ServiceStatus,
  pub desired_replicas: u64,
  pub running_replicas: u64,
  pub tasks: Vec<TaskSummary>,
  pub updated_at_ms: i64,
}
