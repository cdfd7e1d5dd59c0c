use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("workflow '{0}' not found")]
  NotFound(String),
  #[error("workflow engine error: {0}")]
  Engine(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
