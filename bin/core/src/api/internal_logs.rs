//! `PUT /internal/logs`: the one non-table ingest route, used by the
//! Fluentd/Loki sidecar to push raw container log lines into the Log store.
//! Gated by HTTP Basic auth against `secret_key`, not a per-resource token —
//! grounded on
//! `original_source/backend/compose/tests/stack_logs.py`'s
//! `Authorization: Basic base64("zaneops:{SECRET_KEY}")` header on the
//! `logs.ingest` endpoint it calls.

use axum::Json;
use axum::http::StatusCode;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Basic;

use logstore::LogEntry;
use response::{ApiError, ApiResult};

use crate::config::core_config;

pub async fn ingest_logs(
  TypedHeader(auth): TypedHeader<Authorization<Basic>>,
  Json(batch): Json<Vec<LogEntry>>,
) -> ApiResult<StatusCode> {
  if auth.password() != core_config().secret_key {
    return Err(ApiError::Unauthorized("invalid credentials".to_string()));
  }

  crate::state::log_store()
    .ingest(&batch)
    .await
    .map_err(|e| ApiError::TransientOrchestrator(anyhow::anyhow!(e)))?;

  Ok(StatusCode::NO_CONTENT)
}
