use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitProviderError {
  #[error("webhook signature verification failed")]
  BadSignature,
  #[error("unrecognized or unhandled webhook event")]
  UnhandledEvent,
  #[error("failed to parse webhook payload: {0}")]
  Malformed(String),
  #[error("git provider API request failed: {0}")]
  Transient(String),
  #[error("git provider API rejected the request: {0}")]
  Rejected(String),
}

pub type GitProviderResult<T> = Result<T, GitProviderError>;

impl From<reqwest::Error> for GitProviderError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) if status.is_client_error() => GitProviderError::Rejected(err.to_string()),
      _ => GitProviderError::Transient(err.to_string()),
    }
  }
}
