use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
  #[error("proxy admin API request failed: {0}")]
  Transient(String),
  #[error("proxy rejected the route config: {0}")]
  Rejected(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<reqwest::Error> for ProxyError {
  fn from(err: reqwest::Error) -> Self {
    ProxyError::Transient(err.to_string())
  }
}
