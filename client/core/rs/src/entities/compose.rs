//! In-memory representation of a compose document, normalized from whatever
//! shape the user wrote it in (list or mapping `environment`, short or long
//! `volumes` syntax, etc). Grounded on `backend/compose/dtos.py`'s
//! dataclasses: one canonical shape is produced at parse time and used for
//! every downstream stage (spec.md §9 "dynamic parsing of heterogeneous
//! compose shapes").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::QuotedString;

/// A resolved `x-env` / service-level environment variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeEnvVar {
  pub key: String,
  pub value: String,
  /// True iff this value's placeholder was resolved (a generator ran) during
  /// the current resolution pass. Only newly generated values become
  /// ENV_OVERRIDE ADD changes (spec.md §4.2 contract).
  #[serde(default)]
  pub is_newly_generated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMountType {
  Volume,
  Bind,
  Tmpfs,
}

impl Default for VolumeMountType {
  fn default() -> Self {
    Self::Volume
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeVolumeMount {
  pub target: String,
  pub source: Option<String>,
  #[serde(rename = "type")]
  pub mount_type: VolumeMountType,
  pub read_only: bool,
  /// SELinux relabeling mode carried from the short syntax `:z`/`:Z` flag.
  pub selinux: Option<String>,
}

/// A service entry, holding only the fields the compiler overrides or reads;
/// everything else is reconciled back from the user's original document at
/// emission time (spec.md §4.3 item 7).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
  pub name: String,
  pub image: String,
  #[serde(default)]
  pub environment: IndexMap<String, ComposeEnvVar>,
  /// network name -> alias list (None means "attached, no extra config")
  #[serde(default)]
  pub networks: IndexMap<String, Option<NetworkAttachment>>,
  #[serde(default)]
  pub deploy: DeploySpec,
  pub logging: Option<LoggingSpec>,
  #[serde(default)]
  pub volumes: Vec<ComposeVolumeMount>,
  #[serde(default)]
  pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAttachment {
  #[serde(default)]
  pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
  pub parallelism: u32,
  pub delay: String,
  pub order: String,
  pub failure_action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicy {
  pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
  pub mode: Option<String>,
  pub replicas: Option<u32>,
  pub update_config: Option<UpdateConfig>,
  pub restart_policy: Option<RestartPolicy>,
  #[serde(default)]
  pub labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSpec {
  pub driver: String,
  pub options: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeVolume {
  pub driver: Option<String>,
  pub external: bool,
  pub driver_opts: Option<IndexMap<String, String>>,
  #[serde(default)]
  pub labels: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
  pub file: Option<String>,
  pub content: Option<String>,
  pub external: bool,
  #[serde(default)]
  pub labels: IndexMap<String, String>,
  /// True once `content` has been rewritten to a `file:` reference pointing
  /// at a materialized scratch file (spec.md §4.3 item 4).
  #[serde(default)]
  pub is_derived_from_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeNetwork {
  pub external: bool,
  pub driver: Option<String>,
}

/// The full normalized stack document, independent of YAML text layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeStackSpec {
  pub version: Option<String>,
  #[serde(rename = "x-env", default)]
  pub x_env: IndexMap<String, ComposeEnvVar>,
  #[serde(default)]
  pub services: IndexMap<String, ComposeService>,
  #[serde(default)]
  pub volumes: IndexMap<String, ComposeVolume>,
  #[serde(default)]
  pub configs: IndexMap<String, ComposeConfig>,
  #[serde(default)]
  pub networks: IndexMap<String, ComposeNetwork>,
  /// Any top-level key the compiler doesn't understand, preserved verbatim
  /// in original insertion order so reconciliation can merge it back.
  #[serde(default)]
  pub extra: IndexMap<String, serde_json::Value>,
}

/// Helper used only at YAML-emission time: env values are always force
/// quoted (spec.md §4.3 item 6).
pub fn quote_env_map(
  env: &IndexMap<String, String>,
) -> IndexMap<String, QuotedString> {
  env
    .iter()
    .map(|(k, v)| (k.clone(), QuotedString::from(v.as_str())))
    .collect()
}
