use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const ENVIRONMENT_ID_PREFIX: &str = "env_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
  pub id: String,
  /// e.g. `production`, `staging`, `preview-<branch>`
  /// (spec.md GLOSSARY "Environment").
  pub name: String,
  pub project_id: String,
  pub is_preview: bool,
  /// Shared env vars visible to every stack's `x-env` resolution in this
  /// environment (supplements spec.md §4.7 item 2, grounded on
  /// `original_source` preview-environment fixtures).
  #[serde(default)]
  pub shared_env: IndexMap<String, String>,
  pub preview_metadata: Option<PreviewEnvMetadata>,
}

/// Per-PR metadata attached to a preview environment
/// (spec.md §4.7 item 1, GLOSSARY "Preview environment").
///
/// Holds a back-reference to the environment it belongs to so the
/// environment <-> preview_metadata cycle is broken the way spec.md §9
/// describes: the environment owns this struct with a nullable foreign key,
/// cleared on cascade delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEnvMetadata {
  pub environment_id: String,
  pub pr_link: String,
  pub head_repo_url: String,
  pub branch: String,
  pub commit_sha: String,
  pub auth_enabled: bool,
  /// Seconds from creation until auto-teardown; `None` means no TTL.
  pub ttl_seconds: Option<u64>,
  pub created_at_ms: i64,
}

/// A reusable definition of which stacks to clone and how, attached once per
/// project and referenced by every PR-triggered preview
/// (spec.md §4.7 item 3 references "the template's `only` set" without
/// defining the template itself; recovered from
/// `original_source/backend/zane_api/tests/preview_env_templates.py`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEnvTemplate {
  pub id: String,
  pub project_id: String,
  /// Unique within a project; named by the webhook/tokened-deploy caller to
  /// pick which template to clone from (e.g. `"new-preview"` in
  /// `original_source/backend/zane_api/tests/preview_env_templates.py`).
  pub name: String,
  pub base_environment_id: String,
  /// Empty means "clone every stack in the base environment".
  #[serde(default)]
  pub only: Vec<String>,
  #[serde(default)]
  pub extra_shared_env: IndexMap<String, String>,
  pub ttl_seconds: Option<u64>,
  pub auto_teardown: bool,
  pub deploy_after_clone: bool,
  /// The template an automatic PR-webhook preview uses when the delivery
  /// doesn't name one explicitly; a project should have at most one
  /// (`original_source/backend/zane_api/tests/preview_env_templates.py`'s
  /// `p.default_preview_template`).
  #[serde(default)]
  pub is_default: bool,
}
