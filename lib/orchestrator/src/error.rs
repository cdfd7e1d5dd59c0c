use thiserror::Error;

/// Distinguishes transient (retry-worthy) orchestrator failures from
/// permanent ones, feeding spec.md §7's `TransientOrchestrator` vs.
/// `Unrecoverable` error taxonomy directly.
#[derive(Debug, Error)]
pub enum OrchestratorError {
  #[error("orchestrator RPC failed: {0}")]
  Transient(String),
  #[error("orchestrator rejected the request: {0}")]
  Rejected(String),
  #[error("orchestrator command failed: {0}")]
  CommandFailed(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<bollard::errors::Error> for OrchestratorError {
  fn from(err: bollard::errors::Error) -> Self {
    match &err {
      bollard::errors::Error::DockerResponseServerError { status_code, .. }
        if *status_code == 404 =>
      {
        OrchestratorError::Rejected(err.to_string())
      }
      _ => OrchestratorError::Transient(err.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn not_found_maps_to_rejected() {
    let err = bollard::errors::Error::DockerResponseServerError {
      status_code: 404,
      message: "no such service".to_string(),
    };
    assert!(matches!(OrchestratorError::from(err), OrchestratorError::Rejected(_)));
  }

  #[test]
  fn server_error_maps_to_transient() {
    let err = bollard::errors::Error::DockerResponseServerError {
      status_code: 500,
      message: "internal error".to_string(),
    };
    assert!(matches!(OrchestratorError::from(err), OrchestratorError::Transient(_)));
  }
}
