//! A small, deliberately dumb YAML document model and block-style emitter.
//!
//! `serde_yaml_ng`'s serializer decides scalar style (plain vs quoted) for
//! us and has no per-value override, which is exactly the thing spec.md
//! §9 "YAML emission" forbids relying on. We parse user input with
//! `serde_yaml_ng` (that part is just text → tree, nothing dialect-specific)
//! but walk the result into this `YamlValue` tree and emit it ourselves, so
//! every rule (quote style, null rendering, key order) is explicit.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum YamlValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  /// A scalar emitted plain unless its content forces quoting.
  Str(String),
  /// A scalar that is always emitted double-quoted, regardless of content
  /// (mirrors the original's `class quoted(str)` marker / `QuotedString`).
  Quoted(String),
  Seq(Vec<YamlValue>),
  Map(IndexMap<String, YamlValue>),
}

impl YamlValue {
  pub fn map() -> Self {
    YamlValue::Map(IndexMap::new())
  }

  pub fn as_map(&self) -> Option<&IndexMap<String, YamlValue>> {
    match self {
      YamlValue::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, YamlValue>> {
    match self {
      YamlValue::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn is_empty_container(&self) -> bool {
    match self {
      YamlValue::Map(m) => m.is_empty(),
      YamlValue::Seq(s) => s.is_empty(),
      _ => false,
    }
  }
}

impl From<&str> for YamlValue {
  fn from(value: &str) -> Self {
    YamlValue::Str(value.to_string())
  }
}

impl From<String> for YamlValue {
  fn from(value: String) -> Self {
    YamlValue::Str(value)
  }
}

impl From<bool> for YamlValue {
  fn from(value: bool) -> Self {
    YamlValue::Bool(value)
  }
}

impl From<serde_yaml_ng::Value> for YamlValue {
  fn from(value: serde_yaml_ng::Value) -> Self {
    match value {
      serde_yaml_ng::Value::Null => YamlValue::Null,
      serde_yaml_ng::Value::Bool(b) => YamlValue::Bool(b),
      serde_yaml_ng::Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          YamlValue::Int(i)
        } else {
          YamlValue::Float(n.as_f64().unwrap_or(0.0))
        }
      }
      serde_yaml_ng::Value::String(s) => YamlValue::Str(s),
      serde_yaml_ng::Value::Sequence(seq) => {
        YamlValue::Seq(seq.into_iter().map(YamlValue::from).collect())
      }
      serde_yaml_ng::Value::Mapping(map) => {
        let mut out = IndexMap::new();
        for (k, v) in map {
          let key = match k {
            serde_yaml_ng::Value::String(s) => s,
            other => serde_yaml_ng::to_string(&other)
              .unwrap_or_default()
              .trim()
              .to_string(),
          };
          out.insert(key, YamlValue::from(v));
        }
        YamlValue::Map(out)
      }
      serde_yaml_ng::Value::Tagged(tagged) => YamlValue::from(tagged.value),
    }
  }
}

/// True if `s` cannot safely be emitted as a YAML plain scalar and must be
/// quoted (looks like another type, is empty, or contains syntax-sensitive
/// characters).
fn needs_quote(s: &str) -> bool {
  if s.is_empty() {
    return true;
  }
  let lower = s.to_ascii_lowercase();
  if matches!(
    lower.as_str(),
    "null" | "~" | "true" | "false" | "yes" | "no" | "on" | "off"
  ) {
    return true;
  }
  if s.parse::<f64>().is_ok() {
    return true;
  }
  let first = s.chars().next().unwrap();
  if "!&*-?|>%@`\"'#,[]{}:".contains(first) {
    return true;
  }
  if s.contains(": ") || s.ends_with(':') || s.contains(" #") || s.contains('\n') {
    return true;
  }
  if s.starts_with(' ') || s.ends_with(' ') {
    return true;
  }
  false
}

fn escape_double_quoted(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      _ => out.push(c),
    }
  }
  out.push('"');
  out
}

fn write_scalar(out: &mut String, s: &str, forced_quote: bool) {
  if forced_quote || needs_quote(s) {
    out.push_str(&escape_double_quoted(s));
  } else {
    out.push_str(s);
  }
}

const INDENT: &str = "  ";

/// Serializes `doc` the way the original's `yaml.safe_dump(..., default_flow_style=False,
/// sort_keys=False)` + custom representers did: block style, insertion order
/// preserved, `null` → empty scalar, `Quoted` scalars always double-quoted.
pub fn to_yaml_string(doc: &YamlValue) -> String {
  let mut out = String::new();
  match doc {
    YamlValue::Map(map) if !map.is_empty() => write_map(&mut out, map, 0),
    YamlValue::Seq(seq) if !seq.is_empty() => write_seq(&mut out, seq, 0),
    _ => {}
  }
  out
}

fn write_map(out: &mut String, map: &IndexMap<String, YamlValue>, indent: usize) {
  for (key, value) in map {
    // the original drops keys whose value is an empty dict/list entirely
    if value.is_empty_container() {
      continue;
    }
    out.push_str(&INDENT.repeat(indent));
    write_scalar(out, key, false);
    out.push(':');
    write_value(out, value, indent);
  }
}

fn write_seq(out: &mut String, seq: &[YamlValue], indent: usize) {
  for item in seq {
    out.push_str(&INDENT.repeat(indent));
    out.push('-');
    match item {
      YamlValue::Map(m) if !m.is_empty() => {
        out.push(' ');
        write_inline_first_map(out, m, indent + 1);
      }
      YamlValue::Seq(s) if !s.is_empty() => {
        out.push('\n');
        write_seq(out, s, indent + 1);
      }
      other => {
        out.push(' ');
        write_inline_scalar(out, other);
        out.push('\n');
      }
    }
  }
}

fn write_inline_first_map(out: &mut String, map: &IndexMap<String, YamlValue>, indent: usize) {
  let mut first = true;
  for (key, value) in map {
    if value.is_empty_container() {
      continue;
    }
    if !first {
      out.push_str(&INDENT.repeat(indent));
    }
    first = false;
    write_scalar(out, key, false);
    out.push(':');
    write_value(out, value, indent);
  }
  if first {
    out.push_str("{}\n");
  }
}

fn write_inline_scalar(out: &mut String, value: &YamlValue) {
  match value {
    YamlValue::Null => {}
    YamlValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    YamlValue::Int(i) => out.push_str(&i.to_string()),
    YamlValue::Float(f) => out.push_str(&f.to_string()),
    YamlValue::Str(s) => write_scalar(out, s, false),
    YamlValue::Quoted(s) => write_scalar(out, s, true),
    _ => {}
  }
}

fn write_value(out: &mut String, value: &YamlValue, indent: usize) {
  match value {
    YamlValue::Null => out.push('\n'),
    YamlValue::Bool(_) | YamlValue::Int(_) | YamlValue::Float(_) | YamlValue::Str(_)
    | YamlValue::Quoted(_) => {
      out.push(' ');
      write_inline_scalar(out, value);
      out.push('\n');
    }
    YamlValue::Map(m) => {
      if m.is_empty() {
        out.push_str(" {}\n");
      } else {
        out.push('\n');
        write_map(out, m, indent + 1);
      }
    }
    YamlValue::Seq(s) => {
      if s.is_empty() {
        out.push_str(" []\n");
      } else {
        out.push('\n');
        write_seq(out, s, indent);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_renders_as_empty_scalar() {
    let mut map = IndexMap::new();
    map.insert("deny".to_string(), YamlValue::Null);
    let doc = YamlValue::Map(map);
    assert_eq!(to_yaml_string(&doc), "deny:\n");
  }

  #[test]
  fn quoted_scalar_always_quotes() {
    let mut map = IndexMap::new();
    map.insert("PORT".to_string(), YamlValue::Quoted("8080".to_string()));
    let doc = YamlValue::Map(map);
    assert_eq!(to_yaml_string(&doc), "PORT: \"8080\"\n");
  }

  #[test]
  fn empty_containers_are_dropped() {
    let mut map = IndexMap::new();
    map.insert("networks".to_string(), YamlValue::Map(IndexMap::new()));
    map.insert("image".to_string(), YamlValue::from("redis"));
    let doc = YamlValue::Map(map);
    assert_eq!(to_yaml_string(&doc), "image: redis\n");
  }

  #[test]
  fn nested_map_indents() {
    let mut inner = IndexMap::new();
    inner.insert("driver".to_string(), YamlValue::from("fluentd"));
    let mut outer = IndexMap::new();
    outer.insert("logging".to_string(), YamlValue::Map(inner));
    let doc = YamlValue::Map(outer);
    assert_eq!(to_yaml_string(&doc), "logging:\n  driver: fluentd\n");
  }
}
