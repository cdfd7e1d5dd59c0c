use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogStoreError {
  #[error("log store request failed: {0}")]
  Transient(String),
  #[error("log store rejected the request: {0}")]
  Rejected(String),
}

pub type LogStoreResult<T> = Result<T, LogStoreError>;

impl From<reqwest::Error> for LogStoreError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) if status.is_client_error() => LogStoreError::Rejected(err.to_string()),
      _ => LogStoreError::Transient(err.to_string()),
    }
  }
}
