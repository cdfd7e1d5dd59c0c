//! Translates a Dokploy template (base64 JSON `{compose, config}`) into our
//! compose dialect (spec.md §4.8), grounded on
//! `backend/compose/adapters.py::DokployComposeAdapter`. `config`'s exact
//! TOML schema isn't in the retrieval pack (only usage sites are); the
//! `DokployConfig` shape below is inferred from those call sites and
//! recorded as such in DESIGN.md.

use std::sync::OnceLock;

use base64::Engine;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use serde_yaml_ng::Value as RawValue;

use crate::error::{ComposeError, ComposeResult};

#[derive(Debug, Deserialize, Default)]
struct DokployConfig {
  #[serde(default)]
  variables: IndexMap<String, String>,
  #[serde(default)]
  env: IndexMap<String, String>,
  #[serde(default)]
  domains: IndexMap<String, Vec<DokployDomain>>,
  #[serde(default)]
  mounts: Vec<DokployMount>,
}

#[derive(Debug, Deserialize)]
struct DokployDomain {
  host: String,
  #[serde(default = "default_path")]
  path: String,
  port: u32,
}

fn default_path() -> String {
  "/".to_string()
}

#[derive(Debug, Deserialize)]
struct DokployMount {
  #[serde(rename = "filePath")]
  file_path: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct DokployTemplate {
  compose: String,
  config: String,
}

fn password_like_pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^\$\{(?:password|base64|hash|jwt)(?::(\d+))?\}$").unwrap()
  })
}

fn convert_placeholder(value: &str) -> String {
  match value {
    "${domain}" => return "{{ generate_domain }}".to_string(),
    "${email}" => return "{{ generate_email }}".to_string(),
    "${username}" => return "{{ generate_username }}".to_string(),
    "${uuid}" => return "{{ generate_uuid }}".to_string(),
    _ => {}
  }
  if let Some(caps) = password_like_pattern().captures(value) {
    let length = caps.get(1).map(|m| m.as_str()).unwrap_or("32");
    return format!("{{{{ generate_password | {length} }}}}");
  }
  value.to_string()
}

/// Rejects Dokploy `config.mounts` whose `filePath` implies a relative bind
/// source (the `../files/...` convention) instead of silently rewriting it
/// (spec.md §9 Open Question, resolved as outright rejection).
fn reject_bind_path_mounts(mounts: &[DokployMount]) -> ComposeResult<()> {
  for mount in mounts {
    if mount.file_path.starts_with("../files") {
      return Err(ComposeError::invalid_at(
        format!(
          "dokploy mount '{}' uses a relative bind-style path, which is not supported",
          mount.file_path
        ),
        "config.mounts",
      ));
    }
  }
  Ok(())
}

/// Decodes and translates a Dokploy template into native compose YAML text.
/// The result is fed back into `parse::parse_compose` exactly like any
/// user-authored document (spec.md §4.8 item 6).
pub fn translate(base64_input: &str) -> ComposeResult<String> {
  let decoded = base64::engine::general_purpose::STANDARD
    .decode(base64_input.trim())
    .map_err(|e| ComposeError::invalid(format!("invalid base64: {e}")))?;
  let decoded = String::from_utf8(decoded)
    .map_err(|e| ComposeError::invalid(format!("invalid utf-8: {e}")))?;
  let template: DokployTemplate = serde_json::from_str(&decoded)
    .map_err(|e| ComposeError::invalid(format!("invalid dokploy template json: {e}")))?;

  let mut compose: RawValue = serde_yaml_ng::from_str(&template.compose)
    .map_err(|e| ComposeError::invalid(format!("invalid compose YAML: {e}")))?;
  let config: DokployConfig = toml::from_str(&template.config)
    .map_err(|e| ComposeError::invalid(format!("invalid dokploy config toml: {e}")))?;

  reject_bind_path_mounts(&config.mounts)?;

  let mut x_env = IndexMap::new();
  for (key, value) in &config.variables {
    x_env.insert(key.clone(), convert_placeholder(value));
  }
  for (key, value) in &config.env {
    x_env.insert(key.clone(), value.clone());
  }

  let compose_map = compose
    .as_mapping_mut()
    .ok_or_else(|| ComposeError::invalid("dokploy compose document must be a mapping"))?;

  if !x_env.is_empty() {
    let mut map = serde_yaml_ng::Mapping::new();
    for (k, v) in &x_env {
      map.insert(RawValue::from(k.as_str()), RawValue::from(v.as_str()));
    }
    compose_map.insert(RawValue::from("x-env"), RawValue::Mapping(map));
  }

  if let Some(RawValue::Mapping(services)) = compose_map.get_mut("services") {
    for (service_name, domains) in &config.domains {
      let Some(RawValue::Mapping(service)) = services.get_mut(service_name.as_str()) else {
        continue;
      };
      let deploy = service
        .entry(RawValue::from("deploy"))
        .or_insert_with(|| RawValue::Mapping(serde_yaml_ng::Mapping::new()));
      let Some(deploy_map) = deploy.as_mapping_mut() else {
        continue;
      };
      let labels = deploy_map
        .entry(RawValue::from("labels"))
        .or_insert_with(|| RawValue::Mapping(serde_yaml_ng::Mapping::new()));
      let Some(labels_map) = labels.as_mapping_mut() else {
        continue;
      };
      for (index, domain) in domains.iter().enumerate() {
        labels_map.insert(
          RawValue::from(format!("zane.http.routes.{index}.domain")),
          RawValue::from(domain.host.as_str()),
        );
        labels_map.insert(
          RawValue::from(format!("zane.http.routes.{index}.base_path")),
          RawValue::from(domain.path.as_str()),
        );
        labels_map.insert(
          RawValue::from(format!("zane.http.routes.{index}.port")),
          RawValue::from(domain.port),
        );
      }
    }
  }

  let mut configs_map = serde_yaml_ng::Mapping::new();
  for mount in &config.mounts {
    let mut entry = serde_yaml_ng::Mapping::new();
    entry.insert(RawValue::from("content"), RawValue::from(mount.content.as_str()));
    configs_map.insert(RawValue::from(mount.file_path.as_str()), RawValue::Mapping(entry));
  }
  compose_map.insert(RawValue::from("configs"), RawValue::Mapping(configs_map));

  // Reorder: version?, x-env?, services, then the rest (spec.md §4.8 item 6).
  let mut ordered = serde_yaml_ng::Mapping::new();
  for key in ["version", "x-env", "services"] {
    if let Some(value) = compose_map.remove(key) {
      ordered.insert(RawValue::from(key), value);
    }
  }
  for (key, value) in compose_map.iter() {
    ordered.insert(key.clone(), value.clone());
  }

  serde_yaml_ng::to_string(&RawValue::Mapping(ordered))
    .map_err(|e| ComposeError::invalid(format!("failed to emit translated compose: {e}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn converts_known_placeholders() {
    assert_eq!(convert_placeholder("${domain}"), "{{ generate_domain }}");
    assert_eq!(convert_placeholder("${password}"), "{{ generate_password | 32 }}");
    assert_eq!(
      convert_placeholder("${password:16}"),
      "{{ generate_password | 16 }}"
    );
    assert_eq!(convert_placeholder("plain-value"), "plain-value");
  }

  #[test]
  fn rejects_relative_bind_mounts() {
    let mounts = vec![DokployMount {
      file_path: "../files/nginx.conf".to_string(),
      content: "x".to_string(),
    }];
    assert!(reject_bind_path_mounts(&mounts).is_err());
  }

  #[test]
  fn translate_full_template() {
    let compose_yaml = "services:\n  web:\n    image: nginx\n";
    let config_toml = "[variables]\nAPP_DOMAIN = \"${domain}\"\n\n[[domains.web]]\nhost = \"example.com\"\npath = \"/\"\nport = 80\n";
    let payload = serde_json::json!({ "compose": compose_yaml, "config": config_toml }).to_string();
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
    let translated = translate(&encoded).unwrap();
    assert!(translated.contains("x-env"));
    assert!(translated.contains("zane.http.routes.0.domain"));
  }
}
