//! Log-line formatting helpers. Grounded on `format_serror`'s call sites in
//! `bin/core/src/resource/stack.rs` (`format_serror(&e.context("...").into())`)
//! — a chained error rendered as one line for a deployment/stack log.

/// Renders an error and its full `.context()` chain as a single
/// human-readable line, innermost cause last.
pub fn format_serror(err: &anyhow::Error) -> String {
  err
    .chain()
    .map(|cause| cause.to_string())
    .collect::<Vec<_>>()
    .join(" -> ")
}

/// Truncates a deploy log line to a sane length so a single runaway service
/// message can't blow up `status_reason` storage.
pub fn truncate_log_line(line: &str, max_len: usize) -> String {
  if line.chars().count() <= max_len {
    return line.to_string();
  }
  let truncated: String = line.chars().take(max_len).collect();
  format!("{truncated}... (truncated)")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chains_context_causes() {
    let err = anyhow::anyhow!("root cause")
      .context("outer context");
    assert_eq!(format_serror(&err), "outer context -> root cause");
  }

  #[test]
  fn truncates_long_lines() {
    let line = "a".repeat(100);
    let truncated = truncate_log_line(&line, 10);
    assert!(truncated.starts_with("aaaaaaaaaa"));
    assert!(truncated.ends_with("(truncated)"));
  }
}
