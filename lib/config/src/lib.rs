//! Layered `CoreConfig`: compiled defaults → optional TOML file →
//! environment variables, in ascending precedence. Grounded on
//! `bin/core/src/config.rs`'s `core_config()` OnceLock + `ConfigLoader`
//! pattern, narrowed to this crate's flat env-var surface (no multi-path
//! keyword-matching merge, since nothing in this spec needs it).

use std::path::Path;

use anyhow::Context;
use database::DatabaseConfig;
use serde::Deserialize;
use zane_client::entities::logger::{LogConfig, LogLevel, StdioLogMode};

/// Every field optional: used both for the TOML file layer and the env
/// layer, so both can leave a field unset and fall through to the next
/// layer down.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
  pub root_domain: Option<String>,
  pub zane_app_domain: Option<String>,
  pub zane_internal_domain: Option<String>,
  pub zane_fluentd_host: Option<String>,
  pub caddy_proxy_admin_host: Option<String>,
  pub loki_host: Option<String>,
  pub temporalio_max_concurrent_deploys: Option<u32>,
  pub secret_key: Option<String>,
  pub database_url: Option<String>,
  pub mongo_uri: Option<String>,
  pub mongo_db_name: Option<String>,
  pub mongo_app_name: Option<String>,
  pub http_port: Option<u16>,
  pub workflow_retry_max_attempts: Option<u32>,
  pub orchestrator_retry_backoff_ms: Option<u64>,
  pub deploy_semaphore_timeout_ms: Option<u64>,
  pub deploy_scratch_root: Option<String>,
  pub cleanup_retention_days: Option<u32>,
  pub config_paths: Option<String>,

  pub github_token: Option<String>,
  pub github_webhook_secret: Option<String>,
  pub gitlab_token: Option<String>,
  pub gitlab_webhook_secret: Option<String>,
  pub gitlab_api_base: Option<String>,

  pub logging_level: Option<LogLevel>,
  pub logging_stdio: Option<StdioLogMode>,
  pub logging_pretty: Option<bool>,
  pub logging_ansi: Option<bool>,
  pub logging_location: Option<bool>,
  pub logging_otlp_endpoint: Option<String>,
  pub logging_otlp_service_name: Option<String>,
}

impl PartialConfig {
  fn from_env() -> anyhow::Result<Self> {
    envy::from_env().context("failed to parse environment variables")
  }

  fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
    let text = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read config file {path:?}"))?;
    toml::from_str(&text)
      .with_context(|| format!("failed to parse config file {path:?} as TOML"))
  }

  /// `self` wins over `base` field-by-field (higher-precedence layer
  /// applied on top of a lower one).
  fn merge_over(self, base: PartialConfig) -> PartialConfig {
    PartialConfig {
      root_domain: self.root_domain.or(base.root_domain),
      zane_app_domain: self.zane_app_domain.or(base.zane_app_domain),
      zane_internal_domain: self.zane_internal_domain.or(base.zane_internal_domain),
      zane_fluentd_host: self.zane_fluentd_host.or(base.zane_fluentd_host),
      caddy_proxy_admin_host: self
        .caddy_proxy_admin_host
        .or(base.caddy_proxy_admin_host),
      loki_host: self.loki_host.or(base.loki_host),
      temporalio_max_concurrent_deploys: self
        .temporalio_max_concurrent_deploys
        .or(base.temporalio_max_concurrent_deploys),
      secret_key: self.secret_key.or(base.secret_key),
      database_url: self.database_url.or(base.database_url),
      mongo_uri: self.mongo_uri.or(base.mongo_uri),
      mongo_db_name: self.mongo_db_name.or(base.mongo_db_name),
      mongo_app_name: self.mongo_app_name.or(base.mongo_app_name),
      http_port: self.http_port.or(base.http_port),
      workflow_retry_max_attempts: self
        .workflow_retry_max_attempts
        .or(base.workflow_retry_max_attempts),
      orchestrator_retry_backoff_ms: self
        .orchestrator_retry_backoff_ms
        .or(base.orchestrator_retry_backoff_ms),
      deploy_semaphore_timeout_ms: self
        .deploy_semaphore_timeout_ms
        .or(base.deploy_semaphore_timeout_ms),
      deploy_scratch_root: self.deploy_scratch_root.or(base.deploy_scratch_root),
      cleanup_retention_days: self.cleanup_retention_days.or(base.cleanup_retention_days),
      config_paths: self.config_paths.or(base.config_paths),
      github_token: self.github_token.or(base.github_token),
      github_webhook_secret: self.github_webhook_secret.or(base.github_webhook_secret),
      gitlab_token: self.gitlab_token.or(base.gitlab_token),
      gitlab_webhook_secret: self.gitlab_webhook_secret.or(base.gitlab_webhook_secret),
      gitlab_api_base: self.gitlab_api_base.or(base.gitlab_api_base),
      logging_level: self.logging_level.or(base.logging_level),
      logging_stdio: self.logging_stdio.or(base.logging_stdio),
      logging_pretty: self.logging_pretty.or(base.logging_pretty),
      logging_ansi: self.logging_ansi.or(base.logging_ansi),
      logging_location: self.logging_location.or(base.logging_location),
      logging_otlp_endpoint: self.logging_otlp_endpoint.or(base.logging_otlp_endpoint),
      logging_otlp_service_name: self
        .logging_otlp_service_name
        .or(base.logging_otlp_service_name),
    }
  }
}

/// Resolved configuration for `bin/core`. Every field here is required to
/// have a value after the three layers are merged; [`CoreConfig::load`]
/// fills any still-missing field from compiled defaults.
#[derive(Debug, Clone)]
pub struct CoreConfig {
  pub root_domain: String,
  pub zane_app_domain: String,
  pub zane_internal_domain: String,
  pub zane_fluentd_host: Option<String>,
  pub caddy_proxy_admin_host: String,
  pub loki_host: Option<String>,
  pub max_concurrent_deploys: u32,
  pub secret_key: String,
  pub database: DatabaseConfig,
  pub http_port: u16,
  pub workflow_retry_max_attempts: u32,
  pub orchestrator_retry_backoff_ms: u64,
  pub deploy_semaphore_timeout_ms: u64,
  pub deploy_scratch_root: String,
  /// How long terminal records (REMOVED deployments, old log lines) are
  /// kept before the cleanup sweep purges them (spec.md §7 supplement).
  pub cleanup_retention_days: u32,
  pub github_token: Option<String>,
  pub github_webhook_secret: Option<String>,
  pub gitlab_token: Option<String>,
  pub gitlab_webhook_secret: Option<String>,
  pub gitlab_api_base: String,
  pub logging: LogConfig,
}

impl CoreConfig {
  /// Loads `dotenvy` (best-effort, ignored if absent), then layers
  /// compiled defaults → TOML file(s) named in `CONFIG_PATHS` (comma
  /// separated) → process environment.
  pub fn load() -> anyhow::Result<Self> {
    let _ = dotenvy::dotenv();

    let env = PartialConfig::from_env()?;
    let mut file = PartialConfig::default();
    if let Some(paths) = &env.config_paths {
      for raw_path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let layer = PartialConfig::from_toml_file(Path::new(raw_path))?;
        file = layer.merge_over(file);
      }
    }
    let merged = env.merge_over(file);

    let database_uri = merged
      .database_url
      .or(merged.mongo_uri)
      .context("one of DATABASE_URL or MONGO_URI must be set")?;
    let secret_key = merged
      .secret_key
      .context("SECRET_KEY must be set")?;

    Ok(CoreConfig {
      root_domain: merged.root_domain.unwrap_or_else(|| "localhost".to_string()),
      zane_app_domain: merged
        .zane_app_domain
        .unwrap_or_else(|| "zaneops.local".to_string()),
      zane_internal_domain: merged
        .zane_internal_domain
        .unwrap_or_else(|| "zane.internal".to_string()),
      zane_fluentd_host: merged.zane_fluentd_host,
      caddy_proxy_admin_host: merged
        .caddy_proxy_admin_host
        .unwrap_or_else(|| "http://localhost:2019".to_string()),
      loki_host: merged.loki_host,
      max_concurrent_deploys: merged.temporalio_max_concurrent_deploys.unwrap_or(5),
      secret_key,
      database: DatabaseConfig {
        uri: database_uri,
        db_name: merged.mongo_db_name.unwrap_or_else(|| "zane_compose".to_string()),
        app_name: merged.mongo_app_name.or_else(|| Some("zane-core".to_string())),
      },
      http_port: merged.http_port.unwrap_or(8000),
      workflow_retry_max_attempts: merged.workflow_retry_max_attempts.unwrap_or(5),
      orchestrator_retry_backoff_ms: merged.orchestrator_retry_backoff_ms.unwrap_or(500),
      deploy_semaphore_timeout_ms: merged.deploy_semaphore_timeout_ms.unwrap_or(30_000),
      deploy_scratch_root: merged
        .deploy_scratch_root
        .unwrap_or_else(|| "/var/lib/zane-core/deploy-scratch".to_string()),
      cleanup_retention_days: merged.cleanup_retention_days.unwrap_or(14),
      github_token: merged.github_token,
      github_webhook_secret: merged.github_webhook_secret,
      gitlab_token: merged.gitlab_token,
      gitlab_webhook_secret: merged.gitlab_webhook_secret,
      gitlab_api_base: merged
        .gitlab_api_base
        .unwrap_or_else(|| "https://gitlab.com/api/v4".to_string()),
      logging: LogConfig {
        level: merged.logging_level.unwrap_or_default(),
        stdio: merged.logging_stdio.unwrap_or_default(),
        pretty: merged.logging_pretty.unwrap_or(false),
        ansi: merged.logging_ansi.unwrap_or(true),
        location: merged.logging_location.unwrap_or(false),
        otlp_endpoint: merged.logging_otlp_endpoint.unwrap_or_default(),
        otlp_service_name: merged
          .logging_otlp_service_name
          .unwrap_or_else(|| "zane-core".to_string()),
      },
    })
  }
}
