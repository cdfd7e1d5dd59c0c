use serde::{Deserialize, Serialize};

/// One sample row written by the Metrics workflow (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetricsRow {
  pub stack_id: String,
  pub service: String,
  pub cpu_percent: f64,
  pub memory_bytes: u64,
  pub net_tx_bytes: u64,
  pub net_rx_bytes: u64,
  pub disk_read_bytes: u64,
  pub disk_write_bytes: u64,
  pub recorded_at_ms: i64,
}
