//! Log store collaborator seam (spec.md §6: `ingest(batch)`, `search(query)`,
//! `delete(query)`), grounded on
//! `original_source/backend/compose/views/logs.py`'s `LokiSearchClient`
//! (host from `settings.LOKI_HOST`, `.search(query=dict(...))`,
//! `.get_context(timestamp_ns=..., stack_id=..., stack_service_names=...)`)
//! and `original_source/backend/zane_api/management/commands/
//! search_logs_duckdb.py`'s query fields (`content_text`, `deployment_id`,
//! `source`, `time`). `LokiLoqStore` is the one concrete adapter, talking to
//! Loki's push/query_range/compactor-delete HTTP API directly with
//! `reqwest` the same way `lib/proxy`'s `CaddyProxy` talks to Caddy's admin
//! API.

pub mod error;
pub mod loki;

pub use error::{LogStoreError, LogStoreResult};
pub use loki::LokiLogStore;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogSource {
  Service,
  Build,
  System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
  Info,
  Warning,
  Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
  pub stack_id: String,
  pub deployment_id: Option<String>,
  pub service_name: Option<String>,
  pub source: LogSource,
  pub level: LogLevel,
  /// Unix nanosecond timestamp, matching Loki's own line timestamp unit and
  /// the original's `timestamp_ns` parameter.
  pub time_ns: i64,
  pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
  pub stack_id: String,
  pub deployment_id: Option<String>,
  pub service_names: Vec<String>,
  pub sources: Vec<LogSource>,
  pub content_search: Option<String>,
  pub time_after_ns: Option<i64>,
  pub time_before_ns: Option<i64>,
  pub limit: Option<u32>,
}

#[async_trait::async_trait]
pub trait LogStore: Send + Sync {
  async fn ingest(&self, batch: &[LogEntry]) -> LogStoreResult<()>;
  async fn search(&self, query: &LogQuery) -> LogStoreResult<Vec<LogEntry>>;
  async fn delete(&self, query: &LogQuery) -> LogStoreResult<()>;
}
