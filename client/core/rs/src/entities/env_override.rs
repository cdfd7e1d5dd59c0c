use serde::{Deserialize, Serialize};

pub const ENV_OVERRIDE_ID_PREFIX: &str = "stk_env_";

/// A persisted stack or service-scoped env override, applied by the Change
/// Ledger's `env_overrides` changes (spec.md §4.4). `(key, stack, service)`
/// is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeStackEnvOverride {
  pub id: String,
  pub stack_id: String,
  /// `None` represents a stack-global env var.
  pub service: Option<String>,
  pub key: String,
  pub value: String,
}
