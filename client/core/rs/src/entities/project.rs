use serde::{Deserialize, Serialize};

pub const PROJECT_ID_PREFIX: &str = "proj_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  /// Unique across all projects (spec.md §3 table).
  pub slug: String,
  pub owner: String,
  /// Source repository a Git provider's PR webhook deliveries are matched
  /// against (spec.md §4.7 item 4 "created via PR webhook"); `None` for
  /// projects with no PR-triggered preview flow.
  pub repo_url: Option<String>,
}
