use thiserror::Error;

/// Mirrors spec.md §7's `InvalidCompose` kind: every failure that should be
/// surfaced to the caller before any state mutation carries an optional
/// YAML-path-ish pointer at the offending field.
#[derive(Debug, Error)]
pub enum ComposeError {
  #[error("{message}")]
  Invalid {
    message: String,
    field_path: Option<String>,
  },
}

impl ComposeError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Invalid {
      message: message.into(),
      field_path: None,
    }
  }

  pub fn invalid_at(message: impl Into<String>, field_path: impl Into<String>) -> Self {
    Self::Invalid {
      message: message.into(),
      field_path: Some(field_path.into()),
    }
  }

  pub fn field_path(&self) -> Option<&str> {
    match self {
      ComposeError::Invalid { field_path, .. } => field_path.as_deref(),
    }
  }
}

pub type ComposeResult<T> = Result<T, ComposeError>;
