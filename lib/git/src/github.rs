use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{GitProviderError, GitProviderResult};
use crate::signature::verify_github_signature;
use crate::{
  GitProvider, GitProviderKind, PREVIEW_COMMENT_MARKER, PullRequestRef, WebhookEvent,
  WebhookEventKind,
};

pub struct GitHubProvider {
  token: String,
  webhook_secret: String,
  client: Client,
  api_base: String,
}

impl GitHubProvider {
  pub fn new(token: String, webhook_secret: String) -> Self {
    Self {
      token,
      webhook_secret,
      client: Client::new(),
      api_base: "https://api.github.com".to_string(),
    }
  }

  fn auth_header(&self) -> String {
    format!("Bearer {}", self.token)
  }

  fn parse_push(body: &Value) -> Option<WebhookEvent> {
    let head_repo_url = body["repository"]["html_url"].as_str()?.to_string();
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

  fn parse_pull_request(body: &Value) -> Option<WebhookEvent> {
    let action = body["action"].as_str()?;
    let kind = match action {
      "opened" | "reopened" => WebhookEventKind::PullRequestOpened,
      "synchronize" => WebhookEventKind::PullRequestSynchronize,
      "closed" => WebhookEventKind::PullRequestClosed,
      _ => return None,
    };
    let pr = &body["pull_request"];
    let head_repo_url = pr["head"]["repo"]["html_url"].as_str()?.to_string();
    let branch = pr["head"]["ref"].as_str()?.to_string();
    let commit_sha = pr["head"]["sha"].as_str()?.to_string();
    let number = pr["number"].as_u64()?;
    let html_url = pr["html_url"].as_str()?.to_string();
    let repo_id = body["repository"]["full_name"].as_str()?.to_string();
    Some(WebhookEvent {
      kind,
      head_repo_url,
      branch,
      commit_sha,
      pull_request: Some(PullRequestRef {
        provider: "github".to_string(),
        repo_id,
        number,
        html_url,
      }),
    })
  }
}

#[async_trait::async_trait]
impl GitProvider for GitHubProvider {
  fn kind(&self) -> GitProviderKind {
    GitProviderKind::GitHub
  }

  fn verify_and_parse(
    &self,
    event_name: &str,
    body: &[u8],
    signature_header: Option<&str>,
  ) -> GitProviderResult<Option<WebhookEvent>> {
    let signature = signature_header.ok_or(GitProviderError::BadSignature)?;
    if !verify_github_signature(body, &self.webhook_secret, signature) {
      return Err(GitProviderError::BadSignature);
    }

    let json: Value = serde_json::from_slice(body)
      .map_err(|e| GitProviderError::Malformed(e.to_string()))?;

    let event = match event_name {
      "push" => Self::parse_push(&json),
      "pull_request" => Self::parse_pull_request(&json),
      _ => None,
    };
    Ok(event)
  }

  async fn upsert_pr_comment(&self, pr: &PullRequestRef, body: &str) -> GitProviderResult<()> {
    let comments_url = format!("{}/repos/{}/issues/{}/comments", self.api_base, pr.repo_id, pr.number);
    let existing = self
      .client
      .get(&comments_url)
      .header("Authorization", self.auth_header())
      .header("User-Agent", "zane-compose-core")
      .send()
      .await?
      .json::<Vec<Value>>()
      .await?;

    let marked_body = format!("{PREVIEW_COMMENT_MARKER}\n{body}");
    let existing_comment_id = existing.iter().find_map(|comment| {
      let text = comment["body"].as_str()?;
      text.contains(PREVIEW_COMMENT_MARKER)
        .then(|| comment["id"].as_u64())
        .flatten()
    });

    let response = match existing_comment_id {
      Some(id) => {
        let url = format!("{}/repos/{}/issues/comments/{id}", self.api_base, pr.repo_id);
        self
          .client
          .patch(url)
          .header("Authorization", self.auth_header())
          .header("User-Agent", "zane-compose-core")
          .json(&json!({ "body": marked_body }))
          .send()
          .await?
      }
      None => {
        self
          .client
          .post(&comments_url)
          .header("Authorization", self.auth_header())
          .header("User-Agent", "zane-compose-core")
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
      "repository": { "html_url": "https://github.com/acme/widgets" }
    });
    let event = GitHubProvider::parse_push(&body).unwrap();
    assert_eq!(event.branch, "main");
    assert_eq!(event.commit_sha, "abc123");
    assert!(matches!(event.kind, WebhookEventKind::Push));
  }

  #[test]
  fn parses_pull_request_synchronize_event() {
    let body = json!({
      "action": "synchronize",
      "repository": { "full_name": "acme/widgets" },
      "pull_request": {
        "number": 12,
        "html_url": "https://github.com/acme/widgets/pull/12",
        "head": {
          "ref": "feature-x",
          "sha": "deadbeef",
          "repo": { "html_url": "https://github.com/acme/widgets" }
        }
      }
    });
    let event = GitHubProvider::parse_pull_request(&body).unwrap();
    assert!(matches!(event.kind, WebhookEventKind::PullRequestSynchronize));
    let pr = event.pull_request.unwrap();
    assert_eq!(pr.number, 12);
    assert_eq!(pr.repo_id, "acme/widgets");
  }

  #[test]
  fn ignores_unrecognized_pull_request_action() {
    let body = json!({ "action": "labeled", "pull_request": {}, "repository": {} });
    assert!(GitHubProvider::parse_pull_request(&body).is_none());
  }
}
