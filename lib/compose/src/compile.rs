//! Turns a normalized, user-authored `ComposeStackSpec` into the platform's
//! deployable artifact bundle: injected networks/labels/logging, resolved
//! `x-env`, reconciled YAML text, and the derived routes/configs/overrides
//! spec.md §4.3 lists as outputs. Grounded on
//! `ComposeSpecProcessor.process_compose_spec` /
//! `_reconcile_computed_spec_with_user_content` / `generate_deployable_yaml`
//! in `processor.py`.

use indexmap::IndexMap;
use interpolate::{resolve_x_env, GenerateContext};
use regex::Regex;
use std::sync::OnceLock;
use zane_client::entities::compose::{
  ComposeConfig, ComposeEnvVar, ComposeNetwork, ComposeService, ComposeStackSpec, ComposeVolume,
  ComposeVolumeMount, DeploySpec, NetworkAttachment, RestartPolicy, UpdateConfig,
};
use zane_client::entities::route::UrlRoute;

use crate::error::{ComposeError, ComposeResult};
use crate::parse::ParsedDocument;
use crate::validate;
use crate::yaml::{to_yaml_string, YamlValue};

pub struct CompileContext<'a> {
  pub stack_id: &'a str,
  pub project_id: &'a str,
  pub environment_id: &'a str,
  pub hash_prefix: &'a str,
  pub network_alias_prefix: &'a str,
  pub env_network_name: &'a str,
  pub zane_internal_domain: &'a str,
  pub fluentd_host: &'a str,
  pub existing_overrides: &'a IndexMap<String, String>,
  pub generate_ctx: GenerateContext<'a>,
}

pub struct CompiledArtifact {
  pub computed_spec: ComposeStackSpec,
  pub computed_content: String,
  /// original (un-hashed) service name -> routes
  pub urls: IndexMap<String, Vec<UrlRoute>>,
  /// config name -> expanded content
  pub configs: IndexMap<String, String>,
  /// only the newly generated x-env entries (spec.md §4.2 contract)
  pub env_overrides: Vec<ComposeEnvVar>,
}

pub fn compile(parsed: &ParsedDocument, ctx: &CompileContext) -> ComposeResult<CompiledArtifact> {
  let mut spec = parsed.spec.clone();

  let resolved_x_env = resolve_x_env(
    &spec.x_env,
    ctx.existing_overrides.clone(),
    &ctx.generate_ctx,
  )
  .map_err(|e| ComposeError::invalid_at(e.to_string(), "x-env"))?;
  spec.x_env = resolved_x_env;

  let merged_env: IndexMap<String, String> = spec
    .x_env
    .values()
    .map(|v| (v.key.clone(), v.value.clone()))
    .collect();

  inject_networks(&mut spec, ctx);
  rename_services(&mut spec, ctx.hash_prefix);
  inject_per_service(&mut spec, ctx, &merged_env);
  label_volumes_and_configs(&mut spec, ctx);

  let urls = extract_routes(&spec, ctx.hash_prefix, &merged_env)?;
  let configs = extract_config_contents(&spec, &merged_env);
  let env_overrides = spec
    .x_env
    .values()
    .filter(|v| v.is_newly_generated)
    .cloned()
    .collect();

  let computed = spec_to_yaml(&spec);
  let reconciled = reconcile(computed, &parsed.raw, ctx.hash_prefix);
  let mut computed_content = to_yaml_string(&reconciled);
  computed_content = interpolate::expand_env(&computed_content, &merged_env);

  Ok(CompiledArtifact {
    computed_spec: spec,
    computed_content,
    urls,
    configs,
    env_overrides,
  })
}

fn inject_networks(spec: &mut ComposeStackSpec, ctx: &CompileContext) {
  spec
    .networks
    .entry(ctx.env_network_name.to_string())
    .or_insert(ComposeNetwork {
      external: true,
      driver: None,
    });
  spec
    .networks
    .entry("zane".to_string())
    .or_insert(ComposeNetwork {
      external: true,
      driver: None,
    });
}

/// Renames every service `S -> <hash_prefix>_S` and rewrites `depends_on`
/// references that resolve to a sibling service (spec.md §4.3 item 2).
fn rename_services(spec: &mut ComposeStackSpec, hash_prefix: &str) {
  let rename = |name: &str| format!("{hash_prefix}_{name}");

  let original_names: Vec<String> = spec.services.keys().cloned().collect();
  let mut renamed = IndexMap::new();
  for (original_name, mut service) in std::mem::take(&mut spec.services) {
    let hashed_name = rename(&original_name);
    service.name = hashed_name.clone();
    let deps = std::mem::take(&mut service.depends_on);
    service.depends_on = deps
      .into_iter()
      .map(|dep| {
        if original_names.contains(&dep) {
          rename(&dep)
        } else {
          dep
        }
      })
      .collect();
    renamed.insert(hashed_name, service);
  }
  spec.services = renamed;
}

fn inject_per_service(
  spec: &mut ComposeStackSpec,
  ctx: &CompileContext,
  merged_env: &IndexMap<String, String>,
) {
  for (hashed_name, service) in spec.services.iter_mut() {
    let original_name = hashed_name
      .strip_prefix(&format!("{}_", ctx.hash_prefix))
      .unwrap_or(hashed_name)
      .to_string();

    service.networks.insert(
      "zane".to_string(),
      Some(NetworkAttachment {
        aliases: vec![format!("{hashed_name}.{}", ctx.zane_internal_domain)],
      }),
    );
    service.networks.insert(
      ctx.env_network_name.to_string(),
      Some(NetworkAttachment {
        aliases: vec![format!("{}-{original_name}", ctx.network_alias_prefix)],
      }),
    );
    let default_entry = service
      .networks
      .entry("default".to_string())
      .or_insert(Some(NetworkAttachment::default()));
    let attachment = default_entry.get_or_insert_with(NetworkAttachment::default);
    if !attachment.aliases.contains(&original_name) {
      attachment.aliases.push(original_name.clone());
    }

    let mut logging_options = IndexMap::new();
    logging_options.insert(
      "fluentd-address".to_string(),
      ctx.fluentd_host.to_string(),
    );
    logging_options.insert(
      "tag".to_string(),
      format!(
        "{{\"zane.stack\": \"{}\", \"zane.service\": \"{original_name}\"}}",
        ctx.stack_id
      ),
    );
    logging_options.insert("fluentd-max-retries".to_string(), "10".to_string());
    logging_options.insert(
      "fluentd-sub-second-precision".to_string(),
      "true".to_string(),
    );
    logging_options.insert("fluentd-async".to_string(), "true".to_string());
    logging_options.insert("mode".to_string(), "non-blocking".to_string());
    service.logging = Some(zane_client::entities::compose::LoggingSpec {
      driver: "fluentd".to_string(),
      options: logging_options,
    });

    if service.deploy.update_config.is_none() {
      service.deploy.update_config = Some(UpdateConfig {
        parallelism: 1,
        delay: "5s".to_string(),
        order: "start-first".to_string(),
        failure_action: "rollback".to_string(),
      });
    }

    let mode = service.deploy.mode.clone().unwrap_or_else(|| "replicated".to_string());
    if service.deploy.restart_policy.is_none() && (mode == "replicated" || mode == "global") {
      service.deploy.restart_policy = Some(RestartPolicy {
        condition: "any".to_string(),
      });
    }

    service
      .deploy
      .labels
      .insert("zane-managed".to_string(), "true".to_string());
    service
      .deploy
      .labels
      .insert("zane-project".to_string(), ctx.project_id.to_string());
    service
      .deploy
      .labels
      .insert("zane-environment".to_string(), ctx.environment_id.to_string());

    let mut final_env: IndexMap<String, ComposeEnvVar> = merged_env
      .iter()
      .map(|(k, v)| {
        (
          k.clone(),
          ComposeEnvVar {
            key: k.clone(),
            value: interpolate::expand_env(v, merged_env),
            is_newly_generated: false,
          },
        )
      })
      .collect();
    for (key, env) in service.environment.iter() {
      final_env.insert(
        key.clone(),
        ComposeEnvVar {
          key: key.clone(),
          value: interpolate::expand_env(&env.value, merged_env),
          is_newly_generated: false,
        },
      );
    }
    service.environment = final_env;
  }
}

fn label_volumes_and_configs(spec: &mut ComposeStackSpec, ctx: &CompileContext) {
  for volume in spec.volumes.values_mut() {
    if !volume.external {
      volume.labels.insert("zane-managed".to_string(), "true".to_string());
      volume.labels.insert("zane-stack".to_string(), ctx.stack_id.to_string());
      volume.labels.insert("zane-project".to_string(), ctx.project_id.to_string());
    }
  }

  for (name, config) in spec.configs.iter_mut() {
    if !config.external {
      config.labels.insert("zane-managed".to_string(), "true".to_string());
      config.labels.insert("zane-stack".to_string(), ctx.stack_id.to_string());
      config.labels.insert("zane-project".to_string(), ctx.project_id.to_string());
    }
    if config.content.is_some() {
      config.file = Some(format!("./{}_{name}.conf", ctx.hash_prefix));
      config.is_derived_from_content = true;
    }
  }
}

fn route_label_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^zane\.http\.routes\.(\d+)\.domain$").unwrap())
}

fn extract_routes(
  spec: &ComposeStackSpec,
  hash_prefix: &str,
  merged_env: &IndexMap<String, String>,
) -> ComposeResult<IndexMap<String, Vec<UrlRoute>>> {
  let mut service_urls = IndexMap::new();
  let mut all_routes: Vec<(String, UrlRoute)> = Vec::new();

  for (hashed_name, service) in &spec.services {
    let original_name = hashed_name
      .strip_prefix(&format!("{hash_prefix}_"))
      .unwrap_or(hashed_name)
      .to_string();
    let labels = &service.deploy.labels;
    let mut routes = Vec::new();

    for label in labels.keys() {
      let Some(caps) = route_label_regex().captures(label) else {
        continue;
      };
      let idx = &caps[1];

      let Some(domain_raw) = labels.get(&format!("zane.http.routes.{idx}.domain")) else {
        continue; // missing domain: drop silently
      };
      let domain = interpolate::expand_env(domain_raw, merged_env);

      let port_raw = labels.get(&format!("zane.http.routes.{idx}.port"));
      let Some(port_raw) = port_raw else {
        return Err(ComposeError::invalid_at(
          format!("service '{original_name}' route {idx} is missing a 'port'"),
          format!("services.{original_name}.deploy.labels"),
        ));
      };
      let port_str = interpolate::expand_env(port_raw, merged_env);
      let port: u32 = port_str.parse().map_err(|_| {
        ComposeError::invalid_at(
          format!("service '{original_name}' route {idx} has an invalid port '{port_str}'"),
          format!("services.{original_name}.deploy.labels"),
        )
      })?;

      let base_path = labels
        .get(&format!("zane.http.routes.{idx}.base_path"))
        .map(|v| interpolate::expand_env(v, merged_env))
        .unwrap_or_else(|| "/".to_string());
      let strip_prefix = labels
        .get(&format!("zane.http.routes.{idx}.strip_prefix"))
        .map(|v| interpolate::expand_env(v, merged_env))
        .unwrap_or_else(|| "true".to_string())
        .to_lowercase()
        == "true";

      let route = UrlRoute {
        domain,
        base_path,
        strip_prefix,
        port,
      };
      all_routes.push((original_name.clone(), route.clone()));
      routes.push(route);
    }

    if !routes.is_empty() {
      service_urls.insert(original_name, routes);
    }
  }

  validate::validate_routes(&all_routes)?;
  Ok(service_urls)
}

fn extract_config_contents(
  spec: &ComposeStackSpec,
  merged_env: &IndexMap<String, String>,
) -> IndexMap<String, String> {
  spec
    .configs
    .iter()
    .filter_map(|(name, config)| {
      if config.is_derived_from_content {
        config
          .content
          .as_ref()
          .map(|c| (name.clone(), interpolate::expand_env(c, merged_env)))
      } else {
        None
      }
    })
    .collect()
}

// --- struct -> YamlValue (mirrors the original's `to_dict` methods) ---

fn volume_mount_to_yaml(mount: &ComposeVolumeMount) -> YamlValue {
  let mut map = IndexMap::new();
  map.insert(
    "type".to_string(),
    YamlValue::from(match mount.mount_type {
      zane_client::entities::compose::VolumeMountType::Volume => "volume",
      zane_client::entities::compose::VolumeMountType::Bind => "bind",
      zane_client::entities::compose::VolumeMountType::Tmpfs => "tmpfs",
    }),
  );
  map.insert("target".to_string(), YamlValue::from(mount.target.as_str()));
  if let Some(source) = &mount.source {
    map.insert("source".to_string(), YamlValue::from(source.as_str()));
  }
  if mount.read_only {
    map.insert("read_only".to_string(), YamlValue::from(true));
  }
  if let Some(selinux) = &mount.selinux {
    let mut bind = IndexMap::new();
    bind.insert("selinux".to_string(), YamlValue::from(selinux.as_str()));
    map.insert("bind".to_string(), YamlValue::Map(bind));
  }
  YamlValue::Map(map)
}

fn network_attachment_to_yaml(attachment: &Option<NetworkAttachment>) -> YamlValue {
  match attachment {
    None => YamlValue::Null,
    Some(a) if a.aliases.is_empty() => YamlValue::map(),
    Some(a) => {
      let mut map = IndexMap::new();
      map.insert(
        "aliases".to_string(),
        YamlValue::Seq(a.aliases.iter().map(|s| YamlValue::from(s.as_str())).collect()),
      );
      YamlValue::Map(map)
    }
  }
}

fn deploy_to_yaml(deploy: &DeploySpec) -> YamlValue {
  let mut map = IndexMap::new();
  if let Some(mode) = &deploy.mode {
    map.insert("mode".to_string(), YamlValue::from(mode.as_str()));
  }
  if let Some(replicas) = deploy.replicas {
    map.insert("replicas".to_string(), YamlValue::Int(replicas as i64));
  }
  if let Some(uc) = &deploy.update_config {
    let mut m = IndexMap::new();
    m.insert("parallelism".to_string(), YamlValue::Int(uc.parallelism as i64));
    m.insert("delay".to_string(), YamlValue::from(uc.delay.as_str()));
    m.insert("order".to_string(), YamlValue::from(uc.order.as_str()));
    m.insert(
      "failure_action".to_string(),
      YamlValue::from(uc.failure_action.as_str()),
    );
    map.insert("update_config".to_string(), YamlValue::Map(m));
  }
  if let Some(rp) = &deploy.restart_policy {
    let mut m = IndexMap::new();
    m.insert("condition".to_string(), YamlValue::from(rp.condition.as_str()));
    map.insert("restart_policy".to_string(), YamlValue::Map(m));
  }
  if !deploy.labels.is_empty() {
    let labels = deploy
      .labels
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::from(v.as_str())))
      .collect();
    map.insert("labels".to_string(), YamlValue::Map(labels));
  }
  YamlValue::Map(map)
}

fn service_to_yaml(service: &ComposeService) -> YamlValue {
  let mut map = IndexMap::new();
  map.insert("image".to_string(), YamlValue::from(service.image.as_str()));

  let networks = service
    .networks
    .iter()
    .map(|(k, v)| (k.clone(), network_attachment_to_yaml(v)))
    .collect();
  map.insert("networks".to_string(), YamlValue::Map(networks));

  map.insert("deploy".to_string(), deploy_to_yaml(&service.deploy));

  if let Some(logging) = &service.logging {
    let mut m = IndexMap::new();
    m.insert("driver".to_string(), YamlValue::from(logging.driver.as_str()));
    let options = logging
      .options
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::from(v.as_str())))
      .collect();
    m.insert("options".to_string(), YamlValue::Map(options));
    map.insert("logging".to_string(), YamlValue::Map(m));
  }

  if !service.volumes.is_empty() {
    map.insert(
      "volumes".to_string(),
      YamlValue::Seq(service.volumes.iter().map(volume_mount_to_yaml).collect()),
    );
  }

  if !service.depends_on.is_empty() {
    map.insert(
      "depends_on".to_string(),
      YamlValue::Seq(
        service
          .depends_on
          .iter()
          .map(|s| YamlValue::from(s.as_str()))
          .collect(),
      ),
    );
  }

  if !service.environment.is_empty() {
    // env values are always force-quoted (spec.md §4.3 item 6)
    let env = service
      .environment
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::Quoted(v.value.clone())))
      .collect();
    map.insert("environment".to_string(), YamlValue::Map(env));
  }

  YamlValue::Map(map)
}

fn volume_to_yaml(volume: &ComposeVolume) -> YamlValue {
  let mut map = IndexMap::new();
  if volume.external {
    map.insert("external".to_string(), YamlValue::from(true));
  } else if let Some(driver) = &volume.driver {
    map.insert("driver".to_string(), YamlValue::from(driver.as_str()));
  } else {
    map.insert("driver".to_string(), YamlValue::from("local"));
  }
  if !volume.labels.is_empty() {
    let labels = volume
      .labels
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::from(v.as_str())))
      .collect();
    map.insert("labels".to_string(), YamlValue::Map(labels));
  }
  if let Some(opts) = &volume.driver_opts {
    let opts = opts
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::from(v.as_str())))
      .collect();
    map.insert("driver_opts".to_string(), YamlValue::Map(opts));
  }
  YamlValue::Map(map)
}

fn network_to_yaml(network: &ComposeNetwork) -> YamlValue {
  let mut map = IndexMap::new();
  if network.external {
    map.insert("external".to_string(), YamlValue::from(true));
  }
  if let Some(driver) = &network.driver {
    map.insert("driver".to_string(), YamlValue::from(driver.as_str()));
  }
  YamlValue::Map(map)
}

fn config_to_yaml(config: &ComposeConfig) -> YamlValue {
  let mut map = IndexMap::new();
  if let Some(file) = &config.file {
    map.insert("file".to_string(), YamlValue::from(file.as_str()));
  }
  if config.content.is_some() && !config.is_derived_from_content {
    map.insert(
      "content".to_string(),
      YamlValue::from(config.content.as_deref().unwrap_or_default()),
    );
  }
  if config.external {
    map.insert("external".to_string(), YamlValue::from(true));
  }
  if !config.labels.is_empty() {
    let labels = config
      .labels
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::from(v.as_str())))
      .collect();
    map.insert("labels".to_string(), YamlValue::Map(labels));
  }
  YamlValue::Map(map)
}

fn spec_to_yaml(spec: &ComposeStackSpec) -> YamlValue {
  let mut map = IndexMap::new();
  if let Some(version) = &spec.version {
    map.insert("version".to_string(), YamlValue::from(version.as_str()));
  }
  if !spec.x_env.is_empty() {
    let env = spec
      .x_env
      .iter()
      .map(|(k, v)| (k.clone(), YamlValue::Quoted(v.value.clone())))
      .collect();
    map.insert("x-env".to_string(), YamlValue::Map(env));
  }
  let services = spec
    .services
    .iter()
    .map(|(k, v)| (k.clone(), service_to_yaml(v)))
    .collect();
  map.insert("services".to_string(), YamlValue::Map(services));

  let volumes = spec
    .volumes
    .iter()
    .map(|(k, v)| (k.clone(), volume_to_yaml(v)))
    .collect();
  map.insert("volumes".to_string(), YamlValue::Map(volumes));

  let networks = spec
    .networks
    .iter()
    .map(|(k, v)| (k.clone(), network_to_yaml(v)))
    .collect();
  map.insert("networks".to_string(), YamlValue::Map(networks));

  let configs = spec
    .configs
    .iter()
    .map(|(k, v)| (k.clone(), config_to_yaml(v)))
    .collect();
  map.insert("configs".to_string(), YamlValue::Map(configs));

  for (k, v) in &spec.extra {
    map.insert(k.clone(), json_to_yaml(v));
  }

  YamlValue::Map(map)
}

fn json_to_yaml(value: &serde_json::Value) -> YamlValue {
  match value {
    serde_json::Value::Null => YamlValue::Null,
    serde_json::Value::Bool(b) => YamlValue::Bool(*b),
    serde_json::Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        YamlValue::Int(i)
      } else {
        YamlValue::Float(n.as_f64().unwrap_or(0.0))
      }
    }
    serde_json::Value::String(s) => YamlValue::from(s.as_str()),
    serde_json::Value::Array(a) => YamlValue::Seq(a.iter().map(json_to_yaml).collect()),
    serde_json::Value::Object(o) => {
      YamlValue::Map(o.iter().map(|(k, v)| (k.clone(), json_to_yaml(v))).collect())
    }
  }
}

/// Merges the computed document with whatever the user wrote that the
/// compiler doesn't model (ports, command, healthcheck, build-unrelated
/// extras, ...), then reorders top-level keys to `version, x-env, services,
/// <rest in the user's original order>` (spec.md §4.3 items 5 & 7).
fn reconcile(computed: YamlValue, raw: &YamlValue, hash_prefix: &str) -> YamlValue {
  let YamlValue::Map(mut computed_map) = computed else {
    return computed;
  };
  let Some(raw_map) = raw.as_map() else {
    return YamlValue::Map(computed_map);
  };

  if let (Some(YamlValue::Map(user_services)), Some(YamlValue::Map(computed_services))) =
    (raw_map.get("services"), computed_map.get_mut("services"))
  {
    for (original_name, user_service) in user_services {
      let hashed_name = format!("{hash_prefix}_{original_name}");
      if let Some(YamlValue::Map(computed_service)) = computed_services.get_mut(&hashed_name) {
        if let Some(user_fields) = user_service.as_map() {
          fill_missing(computed_service, user_fields);
        }
      }
    }
  }

  if let (Some(YamlValue::Map(user_volumes)), Some(YamlValue::Map(computed_volumes))) =
    (raw_map.get("volumes"), computed_map.get_mut("volumes"))
  {
    for (name, user_volume) in user_volumes {
      if let (Some(YamlValue::Map(computed_volume)), Some(user_fields)) =
        (computed_volumes.get_mut(name), user_volume.as_map())
      {
        fill_missing(computed_volume, user_fields);
      }
    }
  }

  for (key, value) in raw_map {
    computed_map.entry(key.clone()).or_insert_with(|| value.clone());
  }

  reorder(computed_map, raw_map)
}

fn fill_missing(target: &mut IndexMap<String, YamlValue>, source: &IndexMap<String, YamlValue>) {
  for (key, value) in source {
    target.entry(key.clone()).or_insert_with(|| value.clone());
  }
}

fn reorder(
  map: IndexMap<String, YamlValue>,
  raw_map: &IndexMap<String, YamlValue>,
) -> YamlValue {
  let mut ordered = IndexMap::new();
  // `map` is itself an IndexMap, so leftover (never explicitly reordered)
  // keys keep a deterministic order here too (spec.md §8 property 9).
  let mut remaining = map;

  for key in ["version", "x-env", "services"] {
    if let Some(value) = remaining.shift_remove(key) {
      ordered.insert(key.to_string(), value);
    }
  }
  for key in raw_map.keys() {
    if key == "version" || key == "x-env" || key == "services" {
      continue;
    }
    if let Some(value) = remaining.shift_remove(key) {
      ordered.insert(key.clone(), value);
    }
  }
  for (key, value) in remaining {
    ordered.insert(key, value);
  }

  YamlValue::Map(ordered)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parse::parse_compose;
  use interpolate::GenerateContext;

  fn ctx<'a>(overrides: &'a IndexMap<String, String>) -> CompileContext<'a> {
    CompileContext {
      stack_id: "stack1",
      project_id: "proj1",
      environment_id: "env1",
      hash_prefix: "abc123",
      network_alias_prefix: "proj1-env1",
      env_network_name: "env1_network",
      zane_internal_domain: "zane.internal",
      fluentd_host: "fluentd.internal:24224",
      existing_overrides: overrides,
      generate_ctx: GenerateContext {
        project_slug: "proj1",
        stack_slug: "stack1",
        root_domain: "example.com",
      },
    }
  }

  #[test]
  fn compile_renames_services_and_injects_networks() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    let artifact = compile(&doc, &ctx(&overrides)).unwrap();

    assert!(artifact.computed_spec.services.contains_key("abc123_web"));
    assert!(artifact.computed_spec.networks.contains_key("zane"));
    assert!(artifact.computed_spec.networks.contains_key("env1_network"));
    assert!(artifact.computed_content.contains("abc123_web"));
    assert!(artifact.computed_content.contains("fluentd"));
  }

  #[test]
  fn compile_rewrites_depends_on_to_hashed_siblings() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    depends_on:\n      - db\n  db:\n    image: postgres\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    let artifact = compile(&doc, &ctx(&overrides)).unwrap();

    let web = artifact.computed_spec.services.get("abc123_web").unwrap();
    assert_eq!(web.depends_on, vec!["abc123_db".to_string()]);
  }

  #[test]
  fn compile_extracts_routes_and_drops_missing_domain() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    deploy:\n      labels:\n        zane.http.routes.0.domain: app.example.com\n        zane.http.routes.0.port: \"8080\"\n        zane.http.routes.1.port: \"9090\"\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    let artifact = compile(&doc, &ctx(&overrides)).unwrap();

    let routes = artifact.urls.get("web").unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].domain, "app.example.com");
    assert_eq!(routes[0].port, 8080);
  }

  #[test]
  fn compile_requires_port_on_declared_route() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    deploy:\n      labels:\n        zane.http.routes.0.domain: app.example.com\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    assert!(compile(&doc, &ctx(&overrides)).is_err());
  }

  #[test]
  fn compile_preserves_unmodeled_user_fields_via_reconciliation() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n    ports:\n      - \"80:80\"\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    let artifact = compile(&doc, &ctx(&overrides)).unwrap();
    assert!(artifact.computed_content.contains("80:80"));
  }

  #[test]
  fn compile_is_deterministic_across_runs() {
    let doc = parse_compose(
      "services:\n  web:\n    image: nginx\n  cache:\n    image: redis\n",
    )
    .unwrap();
    let overrides = IndexMap::new();
    let first = compile(&doc, &ctx(&overrides)).unwrap().computed_content;
    let second = compile(&doc, &ctx(&overrides)).unwrap().computed_content;
    assert_eq!(first, second);
  }
}
