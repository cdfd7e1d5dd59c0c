use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{GitProviderError, GitProviderResult};
use crate::signature::verify_gitlab_token;
use crate::{
  GitProvider, GitProviderKind, PREVIEW_COMMENT_MARKER, PullRequestRef, WebhookEvent,
  WebhookEventKind,
};

pub struct GitLabProvider {
  token: String,
  webhook_secret: String,
  client: Client,
  api_base: String,
}

impl GitLabProvider {
  pub fn new(token: String, webhook_secret: String, api_base: String) -> Self {
    Self {
      token,
      webhook_secret,
      client: Client::new(),
      api_base: api_base.trim_end_matches('/').to_string(),
    }
  }

  fn parse_push(body: &Value) -> Option<WebhookEvent> {
    let head_repo_url = body["project"]["web_url"].as_str()?.to_string();
    let branch = body["ref"]
      .as_str()?
      .strip_prefix("refs/heads/")
      .unwrap_or_default()
      .to_string();
    let commit_sha = body["after"].as_str()?.to_string();
    Some(WebhookEvent {
      kind: WebhookEventKind::Push,
      head_repo_url,
      branch,
      commit_sha,
      pull_request: None,
    })
  }

  fn parse_merge_request(body: &Value) -> Option<WebhookEvent> {
    let attrs = &body["object_attributes"];
    let action = attrs["action"].as_str()?;
    let kind = match action {
      "open" | "reopen" => WebhookEventKind::PullRequestOpened,
      "update" => WebhookEventKind::PullRequestSynchronize,
      "close" | "merge" => WebhookEventKind::PullRequestClosed,
      _ => return None,
    };
    let head_repo_url = attrs["source"]["web_url"].as_str()?.to_string();
    let branch = attrs["source_branch"].as_str()?.to_string();
    let commit_sha = attrs["last_commit"]["id"].as_str()?.to_string();
    let number = attrs["iid"].as_u64()?;
    let html_url = attrs["url"].as_str()?.to_string();
    let repo_id = body["project"]["id"].as_u64()?.to_string();
    Some(WebhookEvent {
      kind,
      head_repo_url,
      branch,
      commit_sha,
      pull_request: Some(PullRequestRef {
        provider: "gitlab".to_string(),
        repo_id,
        number,
        html_url,
      }),
    })
  }
}

#[async_trait::async_trait]
impl GitProvider for GitLabProvider {
  fn kind(&self) -> GitProviderKind {
    GitProviderKind::GitLab
  }

  fn verify_and_parse(
    &self,
    event_name: &str,
    body: &[u8],
    signature_header: Option<&str>,
  ) -> GitProviderResult<Option<WebhookEvent>> {
    let token = signature_header.ok_or(GitProviderError::BadSignature)?;
    if !verify_gitlab_token(&self.webhook_secret, token) {
      return Err(GitProviderError::BadSignature);
    }

    let json: Value = serde_json::from_slice(body)
      .map_err(|e| GitProviderError::Malformed(e.to_string()))?;

    let event = match event_name {
      "Push Hook" => Self::parse_push(&json),
      "Merge Request Hook" => Self::parse_merge_request(&json),
      _ => None,
    };
    Ok(event)
  }

  async fn upsert_pr_comment(&self, pr: &PullRequestRef, body: &str) -> GitProviderResult<()> {
    let notes_url = format!(
      "{}/projects/{}/merge_requests/{}/notes",
      self.api_base, pr.repo_id, pr.number
    );
    let existing = self
      .client
      .get(&notes_url)
      .header("PRIVATE-TOKEN", &self.token)
      .send()
      .await?
      .json::<Vec<Value>>()
      .await?;

    let marked_body = format!("{PREVIEW_COMMENT_MARKER}\n{body}");
    let existing_note_id = existing.iter().find_map(|note| {
      let text = note["body"].as_str()?;
      text.contains(PREVIEW_COMMENT_MARKER)
        .then(|| note["id"].as_u64())
        .flatten()
    });

    let response = match existing_note_id {
      Some(id) => {
        let url = format!("{notes_url}/{id}");
        self
          .client
          .put(url)
          .header("PRIVATE-TOKEN", &self.token)
          .json(&json!({ "body": marked_body }))
          .send()
          .await?
      }
      None => {
        self
          .client
          .post(&notes_url)
          .header("PRIVATE-TOKEN", &self.token)
          .json(&json!({ "body": marked_body }))
          .send()
          .await?
      }
    };

    if response.status().is_success() {
      Ok(())
    } else {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      Err(GitProviderError::Rejected(format!("{status}: {text}")))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_push_event() {
    let body = json!({
      "ref": "refs/heads/main",
      "after": "abc123",
      "project": { "web_url": "https://gitlab.com/acme/widgets" }
    });
    let event = GitLabProvider::parse_push(&body).unwrap();
    assert_eq!(event.branch, "main");
    assert_eq!(event.commit_sha, "abc123");
    assert!(matches!(event.kind, WebhookEventKind::Push));
  }

  #[test]
  fn parses_merge_request_open_event() {
    let body = json!({
      "object_attributes": {
        "action": "open",
        "iid": 7,
        "url": "https://gitlab.com/acme/widgets/-/merge_requests/7",
        "source_branch": "feature-x",
        "source": { "web_url": "https://gitlab.com/acme/widgets" },
        "last_commit": { "id": "deadbeef" },
      },
      "project": { "id": 42 }
    });
    let event = GitLabProvider::parse_merge_request(&body).unwrap();
    assert!(matches!(event.kind, WebhookEventKind::PullRequestOpened));
    let pr = event.pull_request.unwrap();
    assert_eq!(pr.number, 7);
    assert_eq!(pr.repo_id, "42");
  }

  #[test]
  fn ignores_unrecognized_merge_request_action() {
    let body = json!({
      "object_attributes": { "action": "approved", "iid": 1 },
      "project": { "id": 1 }
    });
    assert!(GitLabProvider::parse_merge_request(&body).is_none());
  }
}
