use std::collections::BTreeMap;

use reqwest::Client;
use serde_json::{Value, json};

use crate::error::{LogStoreError, LogStoreResult};
use crate::{LogEntry, LogLevel, LogQuery, LogSource, LogStore};

pub struct LokiLogStore {
  base_url: String,
  client: Client,
}

impl LokiLogStore {
  pub fn new(loki_host: &str) -> Self {
    let base_url = loki_host.trim_end_matches('/').to_string();
    Self {
      base_url,
      client: Client::new(),
    }
  }

  fn stream_labels(entry: &LogEntry) -> BTreeMap<&'static str, String> {
    let mut labels = BTreeMap::new();
    labels.insert("stack_id", entry.stack_id.clone());
    labels.insert("source", source_label(entry.source).to_string());
    labels.insert("level", level_label(entry.level).to_string());
    if let Some(deployment_id) = &entry.deployment_id {
      labels.insert("deployment_id", deployment_id.clone());
    }
    if let Some(service) = &entry.service_name {
      labels.insert("service", service.clone());
    }
    labels
  }

  /// Builds the LogQL stream selector shared by `search` and `delete`
  /// (`original_source/backend/compose/views/logs.py` filters runtime logs
  /// on `stack_id`, `source`, and optionally a service/deployment scope).
  fn selector(query: &LogQuery) -> String {
    let mut matchers = vec![format!("stack_id=\"{}\"", escape(&query.stack_id))];
    if let Some(deployment_id) = &query.deployment_id {
      matchers.push(format!("deployment_id=\"{}\"", escape(deployment_id)));
    }
    if query.service_names.len() == 1 {
      matchers.push(format!("service=\"{}\"", escape(&query.service_names[0])));
    } else if !query.service_names.is_empty() {
      let alternation = query
        .service_names
        .iter()
        .map(|s| escape(s))
        .collect::<Vec<_>>()
        .join("|");
      matchers.push(format!("service=~\"{alternation}\""));
    }
    if query.sources.len() == 1 {
      matchers.push(format!("source=\"{}\"", source_label(query.sources[0])));
    } else if !query.sources.is_empty() {
      let alternation = query
        .sources
        .iter()
        .map(|s| source_label(*s))
        .collect::<Vec<_>>()
        .join("|");
      matchers.push(format!("source=~\"{alternation}\""));
    }
    format!("{{{}}}", matchers.join(","))
  }
}

fn source_label(source: LogSource) -> &'static str {
  match source {
    LogSource::Service => "SERVICE",
    LogSource::Build => "BUILD",
    LogSource::System => "SYSTEM",
  }
}

fn level_label(level: LogLevel) -> &'static str {
  match level {
    LogLevel::Info => "INFO",
    LogLevel::Warning => "WARNING",
    LogLevel::Error => "ERROR",
  }
}

fn escape(s: &str) -> String {
  s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait::async_trait]
impl LogStore for LokiLogStore {
  async fn ingest(&self, batch: &[LogEntry]) -> LogStoreResult<()> {
    if batch.is_empty() {
      return Ok(());
    }
    let mut streams: Vec<(BTreeMap<&'static str, String>, Vec<(String, String)>)> = Vec::new();
    for entry in batch {
      let labels = Self::stream_labels(entry);
      match streams.iter_mut().find(|(l, _)| *l == labels) {
        Some((_, values)) => values.push((entry.time_ns.to_string(), entry.content.clone())),
        None => streams.push((labels, vec![(entry.time_ns.to_string(), entry.content.clone())])),
      }
    }

    let payload = json!({
      "streams": streams.into_iter().map(|(labels, values)| {
        json!({ "stream": labels, "values": values })
      }).collect::<Vec<_>>()
    });

    let response = self
      .client
      .post(format!("{}/loki/api/v1/push", self.base_url))
      .json(&payload)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(LogStoreError::Rejected(format!(
        "loki push returned {}",
        response.status()
      )));
    }
    Ok(())
  }

  async fn search(&self, query: &LogQuery) -> LogStoreResult<Vec<LogEntry>> {
    let mut logql = Self::selector(query);
    if let Some(text) = &query.content_search {
      logql.push_str(&format!(" |= \"{}\"", escape(text)));
    }

    let mut request = self
      .client
      .get(format!("{}/loki/api/v1/query_range", self.base_url))
      .query(&[("query", logql.as_str())]);
    if let Some(start) = query.time_after_ns {
      request = request.query(&[("start", start.to_string())]);
    }
    if let Some(end) = query.time_before_ns {
      request = request.query(&[("end", end.to_string())]);
    }
    if let Some(limit) = query.limit {
      request = request.query(&[("limit", limit.to_string())]);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
      return Err(LogStoreError::Rejected(format!(
        "loki query_range returned {}",
        response.status()
      )));
    }
    let body: Value = response.json().await?;
    Ok(parse_query_range_response(&body))
  }

  async fn delete(&self, query: &LogQuery) -> LogStoreResult<()> {
    // Loki's compactor delete API only accepts label matchers, not line
    // filters, so `content_search` is ignored here even if set on the query.
    let logql = Self::selector(query);
    let mut params = vec![("query".to_string(), logql)];
    if let Some(start) = query.time_after_ns {
      params.push(("start".to_string(), start.to_string()));
    }
    if let Some(end) = query.time_before_ns {
      params.push(("end".to_string(), end.to_string()));
    }

    let response = self
      .client
      .post(format!("{}/loki/api/v1/delete", self.base_url))
      .query(&params)
      .send()
      .await?;
    if !response.status().is_success() {
      return Err(LogStoreError::Rejected(format!(
        "loki delete returned {}",
        response.status()
      )));
    }
    Ok(())
  }
}

fn parse_query_range_response(body: &Value) -> Vec<LogEntry> {
  let mut entries = Vec::new();
  let Some(streams) = body
    .get("data")
    .and_then(|d| d.get("result"))
    .and_then(|r| r.as_array())
  else {
    return entries;
  };

  for stream in streams {
    let labels = stream.get("stream").cloned().unwrap_or_default();
    let stack_id = labels
      .get("stack_id")
      .and_then(|v| v.as_str())
      .unwrap_or_default()
      .to_string();
    let deployment_id = labels
      .get("deployment_id")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    let service_name = labels
      .get("service")
      .and_then(|v| v.as_str())
      .map(str::to_string);
    let source = match labels.get("source").and_then(|v| v.as_str()) {
      Some("BUILD") => LogSource::Build,
      Some("SYSTEM") => LogSource::System,
      _ => LogSource::Service,
    };
    let level = match labels.get("level").and_then(|v| v.as_str()) {
      Some("WARNING") => LogLevel::Warning,
      Some("ERROR") => LogLevel::Error,
      _ => LogLevel::Info,
    };

    let Some(values) = stream.get("values").and_then(|v| v.as_array()) else {
      continue;
    };
    for value in values {
      let Some(pair) = value.as_array() else { continue };
      let (Some(ts), Some(content)) = (pair.first().and_then(|v| v.as_str()), pair.get(1).and_then(|v| v.as_str())) else {
        continue;
      };
      let Ok(time_ns) = ts.parse::<i64>() else { continue };
      entries.push(LogEntry {
        stack_id: stack_id.clone(),
        deployment_id: deployment_id.clone(),
        service_name: service_name.clone(),
        source,
        level,
        time_ns,
        content: content.to_string(),
      });
    }
  }
  entries
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selector_includes_required_labels_only() {
    let query = LogQuery {
      stack_id: "stack1".to_string(),
      ..Default::default()
    };
    assert_eq!(LokiLogStore::selector(&query), r#"{stack_id="stack1"}"#);
  }

  #[test]
  fn selector_expands_multiple_service_names_as_alternation() {
    let query = LogQuery {
      stack_id: "stack1".to_string(),
      service_names: vec!["web".to_string(), "worker".to_string()],
      ..Default::default()
    };
    assert_eq!(
      LokiLogStore::selector(&query),
      r#"{stack_id="stack1",service=~"web|worker"}"#
    );
  }

  #[test]
  fn selector_escapes_quotes_in_stack_id() {
    let query = LogQuery {
      stack_id: "sta\"ck".to_string(),
      ..Default::default()
    };
    assert_eq!(LokiLogStore::selector(&query), r#"{stack_id="sta\"ck"}"#);
  }

  #[test]
  fn parses_streams_into_log_entries() {
    let body = json!({
      "data": {
        "result": [
          {
            "stream": {"stack_id": "stack1", "service": "web", "source": "SERVICE", "level": "INFO"},
            "values": [["1700000000000000000", "hello"]]
          }
        ]
      }
    });
    let entries = parse_query_range_response(&body);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "hello");
    assert_eq!(entries[0].time_ns, 1700000000000000000);
    assert_eq!(entries[0].service_name.as_deref(), Some("web"));
  }
}
