//! YAML text → normalized `ComposeStackSpec`, grounded on
//! `backend/compose/dtos.py`'s `from_dict` classmethods: every heterogeneous
//! compose shape (environment as list/map, volumes as string/dict, networks
//! as list/map) is branched once, here, into one canonical shape.

use indexmap::IndexMap;
use serde_yaml_ng::Value as RawValue;
use zane_client::entities::compose::{
  ComposeConfig, ComposeEnvVar, ComposeNetwork, ComposeService, ComposeStackSpec, ComposeVolume,
  ComposeVolumeMount, DeploySpec, NetworkAttachment, RestartPolicy, UpdateConfig, VolumeMountType,
};

use crate::error::{ComposeError, ComposeResult};
use crate::yaml::YamlValue;

/// The normalized spec plus the untouched parsed document, kept around so
/// the compiler's reconciliation pass (spec.md §4.3 item 7) can merge back
/// whatever fields it doesn't itself understand.
pub struct ParsedDocument {
  pub spec: ComposeStackSpec,
  pub raw: YamlValue,
}

pub fn parse_compose(content: &str) -> ComposeResult<ParsedDocument> {
  let value: RawValue = serde_yaml_ng::from_str(content)
    .map_err(|e| ComposeError::invalid(format!("invalid YAML syntax: {e}")))?;

  if matches!(value, RawValue::Null) {
    return Err(ComposeError::invalid("empty compose file"));
  }
  let mapping = value
    .as_mapping()
    .ok_or_else(|| ComposeError::invalid("compose file must be a YAML mapping"))?;

  let raw = YamlValue::from(value.clone());

  let version = mapping
    .get("version")
    .and_then(|v| v.as_str())
    .map(|s| s.to_string());

  let x_env_raw = mapping
    .get("x-env")
    .or_else(|| mapping.get("x-zane-env"))
    .cloned()
    .unwrap_or(RawValue::Null);
  let x_env = parse_x_env(&x_env_raw)?;

  let mut services = IndexMap::new();
  if let Some(services_raw) = mapping.get("services") {
    let services_map = services_raw
      .as_mapping()
      .ok_or_else(|| ComposeError::invalid_at("services must be a mapping", "services"))?;
    for (name, def) in services_map {
      let name = name
        .as_str()
        .ok_or_else(|| ComposeError::invalid("services: keys must be strings"))?
        .to_string();
      let service = parse_service(&name, def)?;
      services.insert(name, service);
    }
  }

  let mut volumes = IndexMap::new();
  if let Some(volumes_raw) = mapping.get("volumes") {
    if let Some(volumes_map) = volumes_raw.as_mapping() {
      for (name, def) in volumes_map {
        let name = name.as_str().unwrap_or_default().to_string();
        volumes.insert(name.clone(), parse_volume_def(def));
      }
    }
  }

  let mut networks = IndexMap::new();
  if let Some(networks_raw) = mapping.get("networks") {
    if let Some(networks_map) = networks_raw.as_mapping() {
      for (name, def) in networks_map {
        let name = name.as_str().unwrap_or_default().to_string();
        networks.insert(name.clone(), parse_network_def(def));
      }
    }
  }

  let mut configs = IndexMap::new();
  if let Some(configs_raw) = mapping.get("configs") {
    if let Some(configs_map) = configs_raw.as_mapping() {
      for (name, def) in configs_map {
        let name = name.as_str().unwrap_or_default().to_string();
        configs.insert(name.clone(), parse_config_def(def));
      }
    }
  }

  let recognized = [
    "version", "x-env", "x-zane-env", "services", "volumes", "networks", "configs",
  ];
  let mut extra = IndexMap::new();
  for (key, value) in mapping {
    let Some(key) = key.as_str() else { continue };
    if recognized.contains(&key) {
      continue;
    }
    extra.insert(key.to_string(), yaml_to_json(value));
  }

  Ok(ParsedDocument {
    spec: ComposeStackSpec {
      version,
      x_env,
      services,
      volumes,
      configs,
      networks,
      extra,
    },
    raw,
  })
}

fn parse_x_env(value: &RawValue) -> ComposeResult<IndexMap<String, ComposeEnvVar>> {
  let mut out = IndexMap::new();
  let Some(map) = value.as_mapping() else {
    if matches!(value, RawValue::Null) {
      return Ok(out);
    }
    return Err(ComposeError::invalid_at("x-env must be a mapping", "x-env"));
  };
  for (key, value) in map {
    let key = key
      .as_str()
      .ok_or_else(|| ComposeError::invalid("x-env: keys must be strings"))?
      .to_string();
    let value = scalar_to_string(value);
    out.insert(
      key.clone(),
      ComposeEnvVar {
        key,
        value,
        is_newly_generated: false,
      },
    );
  }
  Ok(out)
}

fn scalar_to_string(value: &RawValue) -> String {
  match value {
    RawValue::Null => String::new(),
    RawValue::Bool(b) => b.to_string(),
    RawValue::Number(n) => n.to_string(),
    RawValue::String(s) => s.clone(),
    other => serde_yaml_ng::to_string(other).unwrap_or_default().trim().to_string(),
  }
}

fn parse_service(name: &str, def: &RawValue) -> ComposeResult<ComposeService> {
  let map = def
    .as_mapping()
    .ok_or_else(|| ComposeError::invalid_at(format!("service '{name}' must be a mapping"), name))?;

  let image = map
    .get("image")
    .and_then(|v| v.as_str())
    .ok_or_else(|| {
      ComposeError::invalid_at(
        format!("service '{name}' must have an 'image' field. Build from source is not supported."),
        format!("services.{name}.image"),
      )
    })?
    .to_string();

  let environment = parse_environment(map.get("environment"));
  let networks = parse_service_networks(map.get("networks"));
  let volumes = parse_volumes_list(name, map.get("volumes"))?;
  let depends_on = parse_depends_on(map.get("depends_on"));
  let deploy = parse_deploy(map.get("deploy"));

  Ok(ComposeService {
    name: name.to_string(),
    image,
    environment,
    networks,
    deploy,
    logging: None,
    volumes,
    depends_on,
  })
}

fn parse_environment(value: Option<&RawValue>) -> IndexMap<String, ComposeEnvVar> {
  let mut out = IndexMap::new();
  let Some(value) = value else { return out };
  match value {
    RawValue::Sequence(items) => {
      for item in items {
        let Some(s) = item.as_str() else { continue };
        if let Some((key, val)) = s.split_once('=') {
          out.insert(
            key.to_string(),
            ComposeEnvVar {
              key: key.to_string(),
              value: val.to_string(),
              is_newly_generated: false,
            },
          );
        }
      }
    }
    RawValue::Mapping(map) => {
      for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        let value = scalar_to_string(value);
        out.insert(
          key.to_string(),
          ComposeEnvVar {
            key: key.to_string(),
            value,
            is_newly_generated: false,
          },
        );
      }
    }
    _ => {}
  }
  out
}

fn parse_service_networks(
  value: Option<&RawValue>,
) -> IndexMap<String, Option<NetworkAttachment>> {
  let mut out = IndexMap::new();
  let Some(value) = value else { return out };
  match value {
    RawValue::Sequence(items) => {
      for item in items {
        if let Some(name) = item.as_str() {
          out.insert(name.to_string(), None);
        }
      }
    }
    RawValue::Mapping(map) => {
      for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        let attachment = match value {
          RawValue::Null => None,
          RawValue::Mapping(m) => {
            let aliases = m
              .get("aliases")
              .and_then(|a| a.as_sequence())
              .map(|seq| {
                seq
                  .iter()
                  .filter_map(|v| v.as_str().map(str::to_string))
                  .collect()
              })
              .unwrap_or_default();
            Some(NetworkAttachment { aliases })
          }
          _ => None,
        };
        out.insert(key.to_string(), attachment);
      }
    }
    _ => {}
  }
  out
}

fn parse_volumes_list(
  service_name: &str,
  value: Option<&RawValue>,
) -> ComposeResult<Vec<ComposeVolumeMount>> {
  let mut out = Vec::new();
  let Some(RawValue::Sequence(items)) = value else {
    return Ok(out);
  };
  for item in items {
    out.push(parse_volume_mount(service_name, item)?);
  }
  Ok(out)
}

fn parse_volume_mount(service_name: &str, item: &RawValue) -> ComposeResult<ComposeVolumeMount> {
  match item {
    RawValue::String(s) => {
      let parts: Vec<&str> = s.splitn(3, ':').collect();
      let (source, target) = match parts.as_slice() {
        [single] => (None, single.to_string()),
        [source, target] => (Some(source.to_string()), target.to_string()),
        [source, target, _mode] => (Some(source.to_string()), target.to_string()),
        _ => {
          return Err(ComposeError::invalid_at(
            format!("service '{service_name}' has an invalid volume short syntax '{s}'"),
            format!("services.{service_name}.volumes"),
          ));
        }
      };
      let mount_type = match &source {
        Some(src) if src.starts_with('/') || src.starts_with("./") || src.starts_with("../") => {
          VolumeMountType::Bind
        }
        _ => VolumeMountType::Volume,
      };
      let mut read_only = false;
      let mut selinux = None;
      if parts.len() > 2 {
        match parts[2] {
          "ro" => read_only = true,
          "z" | "Z" => selinux = Some(parts[2].to_string()),
          _ => {}
        }
      }
      Ok(ComposeVolumeMount {
        target,
        source,
        mount_type,
        read_only,
        selinux,
      })
    }
    RawValue::Mapping(map) => {
      let target = map
        .get("target")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
          ComposeError::invalid_at(
            format!("service '{service_name}' has a volume mount missing 'target'"),
            format!("services.{service_name}.volumes"),
          )
        })?
        .to_string();
      let source = map
        .get("source")
        .and_then(|v| v.as_str())
        .map(str::to_string);
      let mount_type = match map.get("type").and_then(|v| v.as_str()) {
        Some("bind") => VolumeMountType::Bind,
        Some("tmpfs") => VolumeMountType::Tmpfs,
        _ => VolumeMountType::Volume,
      };
      let read_only = map
        .get("read_only")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
      let selinux = map
        .get("bind")
        .and_then(|b| b.as_mapping())
        .and_then(|b| b.get("selinux"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
      Ok(ComposeVolumeMount {
        target,
        source,
        mount_type,
        read_only,
        selinux,
      })
    }
    _ => Err(ComposeError::invalid_at(
      format!("service '{service_name}' has an unrecognized volume entry"),
      format!("services.{service_name}.volumes"),
    )),
  }
}

fn parse_depends_on(value: Option<&RawValue>) -> Vec<String> {
  let Some(value) = value else { return Vec::new() };
  match value {
    RawValue::Sequence(items) => items
      .iter()
      .filter_map(|v| v.as_str().map(str::to_string))
      .collect(),
    RawValue::Mapping(map) => map
      .iter()
      .filter_map(|(k, _)| k.as_str().map(str::to_string))
      .collect(),
    _ => Vec::new(),
  }
}

fn parse_deploy(value: Option<&RawValue>) -> DeploySpec {
  let Some(RawValue::Mapping(map)) = value else {
    return DeploySpec::default();
  };
  let mode = map.get("mode").and_then(|v| v.as_str()).map(str::to_string);
  let replicas = map.get("replicas").and_then(|v| v.as_u64()).map(|n| n as u32);
  let update_config = map.get("update_config").and_then(|v| v.as_mapping()).map(|m| {
    UpdateConfig {
      parallelism: m
        .get("parallelism")
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as u32,
      delay: m
        .get("delay")
        .and_then(|v| v.as_str())
        .unwrap_or("0s")
        .to_string(),
      order: m
        .get("order")
        .and_then(|v| v.as_str())
        .unwrap_or("stop-first")
        .to_string(),
      failure_action: m
        .get("failure_action")
        .and_then(|v| v.as_str())
        .unwrap_or("pause")
        .to_string(),
    }
  });
  let restart_policy = map
    .get("restart_policy")
    .and_then(|v| v.as_mapping())
    .map(|m| RestartPolicy {
      condition: m
        .get("condition")
        .and_then(|v| v.as_str())
        .unwrap_or("any")
        .to_string(),
    });
  let mut labels = IndexMap::new();
  if let Some(labels_raw) = map.get("labels") {
    match labels_raw {
      RawValue::Mapping(m) => {
        for (k, v) in m {
          if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
            labels.insert(k.to_string(), v.to_string());
          }
        }
      }
      RawValue::Sequence(seq) => {
        for item in seq {
          if let Some(s) = item.as_str() {
            if let Some((k, v)) = s.split_once('=') {
              labels.insert(k.to_string(), v.to_string());
            }
          }
        }
      }
      _ => {}
    }
  }
  DeploySpec {
    mode,
    replicas,
    update_config,
    restart_policy,
    labels,
  }
}

fn parse_volume_def(def: &RawValue) -> ComposeVolume {
  let Some(map) = def.as_mapping() else {
    return ComposeVolume::default();
  };
  let driver = map.get("driver").and_then(|v| v.as_str()).map(str::to_string);
  let external = map.get("external").and_then(|v| v.as_bool()).unwrap_or(false);
  let driver_opts = map.get("driver_opts").and_then(|v| v.as_mapping()).map(|m| {
    m.iter()
      .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
      .collect()
  });
  let labels = map
    .get("labels")
    .and_then(|v| v.as_mapping())
    .map(|m| {
      m.iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
        .collect()
    })
    .unwrap_or_default();
  ComposeVolume {
    driver,
    external,
    driver_opts,
    labels,
  }
}

fn parse_network_def(def: &RawValue) -> ComposeNetwork {
  let Some(map) = def.as_mapping() else {
    return ComposeNetwork::default();
  };
  ComposeNetwork {
    external: map.get("external").and_then(|v| v.as_bool()).unwrap_or(false),
    driver: map.get("driver").and_then(|v| v.as_str()).map(str::to_string),
  }
}

fn parse_config_def(def: &RawValue) -> ComposeConfig {
  let Some(map) = def.as_mapping() else {
    return ComposeConfig::default();
  };
  let labels = map
    .get("labels")
    .and_then(|v| v.as_mapping())
    .map(|m| {
      m.iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
        .collect()
    })
    .unwrap_or_default();
  ComposeConfig {
    file: map.get("file").and_then(|v| v.as_str()).map(str::to_string),
    content: map.get("content").and_then(|v| v.as_str()).map(str::to_string),
    external: map.get("external").and_then(|v| v.as_bool()).unwrap_or(false),
    labels,
    is_derived_from_content: false,
  }
}

fn yaml_to_json(value: &RawValue) -> serde_json::Value {
  match value {
    RawValue::Null => serde_json::Value::Null,
    RawValue::Bool(b) => serde_json::Value::Bool(*b),
    RawValue::Number(n) => {
      if let Some(i) = n.as_i64() {
        serde_json::Value::from(i)
      } else {
        serde_json::Value::from(n.as_f64().unwrap_or(0.0))
      }
    }
    RawValue::String(s) => serde_json::Value::String(s.clone()),
    RawValue::Sequence(seq) => serde_json::Value::Array(seq.iter().map(yaml_to_json).collect()),
    RawValue::Mapping(map) => {
      let mut out = serde_json::Map::new();
      for (k, v) in map {
        if let Some(k) = k.as_str() {
          out.insert(k.to_string(), yaml_to_json(v));
        }
      }
      serde_json::Value::Object(out)
    }
    RawValue::Tagged(t) => yaml_to_json(&t.value),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_short_bind_mount() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    volumes:\n      - /data:/var/data:ro\n",
    )
    .unwrap();
    let service = &doc.spec.services["web"];
    let mount = &service.volumes[0];
    assert_eq!(mount.mount_type, VolumeMountType::Bind);
    assert!(mount.read_only);
    assert_eq!(mount.source.as_deref(), Some("/data"));
  }

  #[test]
  fn parses_named_volume_short_syntax() {
    let doc = parse_compose(
      "services:\n  db:\n    image: postgres\n    volumes:\n      - db-data:/var/lib/postgresql\n",
    )
    .unwrap();
    let mount = &doc.spec.services["db"].volumes[0];
    assert_eq!(mount.mount_type, VolumeMountType::Volume);
  }

  #[test]
  fn environment_list_form_splits_on_equals() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    environment:\n      - FOO=bar\n",
    )
    .unwrap();
    assert_eq!(doc.spec.services["web"].environment["FOO"].value, "bar");
  }

  #[test]
  fn rejects_service_without_image() {
    let err = parse_compose("services:\n  web:\n    ports:\n      - '80:80'\n").unwrap_err();
    assert!(err.to_string().contains("image"));
  }

  #[test]
  fn rejects_empty_document() {
    assert!(parse_compose("").is_err());
  }

  #[test]
  fn rejects_non_mapping_document() {
    assert!(parse_compose("- a\n- b\n").is_err());
  }
}
