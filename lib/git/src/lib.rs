//! Git provider collaborator seam (spec.md §6: "webhook event delivery; PR
//! comment upsert"). spec.md §1's Non-goal "Git providers (GitHub/GitLab
//! apps) beyond the events they deliver" scopes OAuth-app management,
//! installation flows, and anything beyond signature verification +
//! comment upsert out; those two operations are what this crate builds.
//! Grounded on spec.md §4.7's preview-environment requirement ("Preview
//! environments created via PR webhook emit/update a PR comment containing
//! deployment status and preview URL") and `PreviewEnvMetadata`'s fields
//! (pull-request link, head repo URL, branch, commit).

pub mod error;
pub mod github;
pub mod gitlab;
pub mod signature;

pub use error::{GitProviderError, GitProviderResult};
pub use github::GitHubProvider;
pub use gitlab::GitLabProvider;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProviderKind {
  GitHub,
  GitLab,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
  pub provider: String,
  /// GitHub: `owner/repo`. GitLab: the numeric or URL-encoded project id.
  pub repo_id: String,
  pub number: u64,
  pub html_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
  Push,
  PullRequestOpened,
  PullRequestSynchronize,
  PullRequestClosed,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
  pub kind: WebhookEventKind,
  pub head_repo_url: String,
  pub branch: String,
  pub commit_sha: String,
  pub pull_request: Option<PullRequestRef>,
}

/// Identifies the marker text this crate uses to find its own prior
/// comment on a PR/MR so `upsert_pr_comment` can edit instead of
/// re-posting (spec.md §4.7: "emit/update a PR comment").
pub const PREVIEW_COMMENT_MARKER: &str = "<!-- zane-compose-preview -->";

#[async_trait::async_trait]
pub trait GitProvider: Send + Sync {
  fn kind(&self) -> GitProviderKind;

  /// Verifies the provider-specific webhook signature header, then parses
  /// the event body. `event_name` is the provider's own event-type header
  /// (`X-GitHub-Event` / `X-Gitlab-Event`). Returns `Ok(None)` for event
  /// types this system doesn't act on (spec.md §4.7 only cares about push
  /// and PR open/sync/close).
  fn verify_and_parse(
    &self,
    event_name: &str,
    body: &[u8],
    signature_header: Option<&str>,
  ) -> GitProviderResult<Option<WebhookEvent>>;

  async fn upsert_pr_comment(&self, pr: &PullRequestRef, body: &str) -> GitProviderResult<()>;
}
