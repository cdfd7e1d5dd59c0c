use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHANGE_ID_PREFIX: &str = "stk_chg_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeField {
  ComposeContent,
  EnvOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
  Add,
  Update,
  Delete,
}

/// A pending mutation on a stack, applied atomically at deploy time
/// (spec.md §3 table, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeStackChange {
  pub id: String,
  pub stack_id: String,
  pub field: ChangeField,
  #[serde(rename = "type")]
  pub change_type: ChangeType,
  /// Identifies the mutated row for `env_overrides` UPDATE/DELETE; unused
  /// for `compose_content`.
  pub item_id: Option<String>,
  pub old_value: Option<Value>,
  pub new_value: Option<Value>,
  pub applied: bool,
  pub deployment_hash: Option<String>,
  pub created_at_ms: i64,
}

/// Payload carried by a `compose_content` `UPDATE` change
/// (mirrors `ComposeStack.apply_pending_changes`'s `new_value` shape in
/// `original_source/backend/compose/models.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeContentChangePayload {
  pub user_content: String,
  pub computed_content: String,
  pub urls: serde_json::Value,
  pub configs: serde_json::Value,
}

/// Payload carried by an `env_overrides` ADD/UPDATE change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvOverrideChangePayload {
  pub key: String,
  pub value: String,
  /// `None` means a stack-global override.
  pub service: Option<String>,
}
