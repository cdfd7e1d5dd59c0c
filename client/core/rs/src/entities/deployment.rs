use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::route::UrlRoute;

pub const DEPLOYMENT_HASH_PREFIX: &str = "stk_dpl_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentStatus {
  Queued,
  Cancelled,
  Deploying,
  Succeeded,
  Failed,
  Removed,
}

impl DeploymentStatus {
  /// A deployment in one of these states cannot be cancelled
  /// (spec.md §3 invariant, §8 property 7).
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      DeploymentStatus::Succeeded
        | DeploymentStatus::Failed
        | DeploymentStatus::Cancelled
        | DeploymentStatus::Removed
    )
  }
}

/// The immutable freeze of a stack taken inside the transaction that starts
/// a deployment (spec.md GLOSSARY "Snapshot"): the single source of truth
/// for that deploy, fully capturing deploy intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSnapshot {
  pub stack_id: String,
  pub slug: String,
  pub project_id: String,
  pub environment_id: String,
  pub network_alias_prefix: String,
  pub user_content: String,
  pub computed_content: String,
  pub urls: IndexMap<String, Vec<UrlRoute>>,
  pub configs: IndexMap<String, String>,
  pub env_overrides: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeStackDeployment {
  pub hash: String,
  pub stack_id: String,
  pub status: DeploymentStatus,
  pub status_reason: Option<String>,
  /// `None` only transiently for a deployment not yet applied (should never
  /// be observed outside the apply transaction, since `applyPending` runs
  /// before the deployment becomes visible to callers).
  pub stack_snapshot: Option<StackSnapshot>,
  pub commit_message: String,
  pub queued_at_ms: i64,
  pub started_at_ms: Option<i64>,
  pub finished_at_ms: Option<i64>,
}

impl ComposeStackDeployment {
  /// Durable workflow id for this deploy (spec.md §4.5, §9).
  pub fn workflow_id(&self) -> String {
    format!("deploy-compose-{}", self.stack_id)
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitMessage(pub String);

impl Default for ComposeStackDeployment {
  fn default() -> Self {
    Self {
      hash: String::new(),
      stack_id: String::new(),
      status: DeploymentStatus::Queued,
      status_reason: None,
      stack_snapshot: None,
      commit_message: "update stack".to_string(),
      queued_at_ms: 0,
      started_at_ms: None,
      finished_at_ms: None,
    }
  }
}
