//! The §7 error taxonomy as an axum-facing type. `thiserror` wraps the
//! generic "any error with a message" case (Unrecoverable,
//! TransientOrchestrator); the named variants below add the status-code
//! mapping spec.md §7's table requires.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  /// Compose parse, policy, or offline-validator failure. Carries a field
  /// path so the caller can point at the offending key.
  #[error("invalid compose: {message}")]
  InvalidCompose {
    message: String,
    field_path: Option<String>,
  },

  #[error("url conflict: {0}")]
  UrlConflict(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Bad/missing credentials on the one Basic-auth-gated route
  /// (`PUT /internal/logs`, spec.md §6 `SECRET_KEY`).
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// RPC/timeout talking to the orchestrator, proxy, or workflow engine.
  /// Surfaced as 503 when it reaches an HTTP caller directly; inside a
  /// workflow this instead drives the retry-with-backoff loop (spec.md §7).
  #[error("orchestrator unavailable: {0}")]
  TransientOrchestrator(#[source] anyhow::Error),

  /// A resource is irreparably inconsistent; requires a manual operator
  /// step. Never retried.
  #[error("unrecoverable: {0}")]
  Unrecoverable(#[source] anyhow::Error),
}

impl ApiError {
  pub fn invalid_compose(message: impl Into<String>) -> Self {
    Self::InvalidCompose {
      message: message.into(),
      field_path: None,
    }
  }

  pub fn invalid_compose_at(message: impl Into<String>, field_path: impl Into<String>) -> Self {
    Self::InvalidCompose {
      message: message.into(),
      field_path: Some(field_path.into()),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      ApiError::InvalidCompose { .. } => StatusCode::BAD_REQUEST,
      ApiError::UrlConflict(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::TransientOrchestrator(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Unrecoverable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  field_path: Option<String>,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!("{:#}", anyhow::anyhow!("{self}"));
    }
    let field_path = match &self {
      ApiError::InvalidCompose { field_path, .. } => field_path.clone(),
      _ => None,
    };
    let body = ErrorBody {
      error: self.to_string(),
      field_path,
    };
    (status, Json(body)).into_response()
  }
}

impl From<anyhow::Error> for ApiError {
  fn from(err: anyhow::Error) -> Self {
    ApiError::Unrecoverable(err)
  }
}

pub type ApiResult<T> = Result<T, ApiError>;
