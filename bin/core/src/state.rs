//! Process-wide collaborator handles, each lazily built behind a
//! `OnceLock` the first time it's needed and panicking loudly on
//! misconfiguration rather than failing a request deep in a handler.
//! Grounded on the teacher's own `state.rs` (`db_client()`,
//! `init_db_client()`, the per-collaborator `OnceLock` accessor idiom).

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, anyhow};
use git::{GitHubProvider, GitLabProvider};
use logstore::{LogStore, loki::LokiLogStore};
use orchestrator::{Orchestrator, SwarmOrchestrator};
use proxy::{CaddyProxy, Proxy};
use workflow::engine::InProcessEngine;
use workflow::retry::RetryPolicy;
use workflow::semaphore::DeploySemaphore;
use workflow::WorkflowEngine;

use crate::config::core_config;

static DB_CLIENT: OnceLock<database::Client> = OnceLock::new();

/// Connects on first access. Exits the process on failure the same way the
/// teacher's `init_db_client()` does: a core that can't reach its database
/// has nothing useful left to do.
pub async fn db_client() -> &'static database::Client {
  if DB_CLIENT.get().is_none() {
    let init = async {
      let client = database::Client::new(&core_config().database)
        .await
        .context("failed to initialize database client")?;
      DB_CLIENT
        .set(client)
        .map_err(|_| anyhow!("db_client initialized more than once"))?;
      anyhow::Ok(())
    }
    .await;
    if let Err(e) = init {
      error!("FATAL: failed to initialize database::Client | {e:#} | exiting");
      std::process::exit(1);
    }
  }
  DB_CLIENT.get().expect("just initialized above")
}

/// Synchronous accessor for call sites that run after startup, where
/// `db_client()`'s async init is known to have already run.
pub fn db_client_sync() -> &'static database::Client {
  DB_CLIENT.get().unwrap_or_else(|| {
    error!("FATAL: db_client accessed before init_db_client() ran | exiting");
    std::process::exit(1)
  })
}

pub fn orchestrator() -> &'static SwarmOrchestrator {
  static ORCHESTRATOR: OnceLock<SwarmOrchestrator> = OnceLock::new();
  ORCHESTRATOR.get_or_init(|| {
    SwarmOrchestrator::connect().unwrap_or_else(|e| {
      error!("FATAL: failed to initialize swarm orchestrator | {e:#} | exiting");
      std::process::exit(1)
    })
  })
}

/// Wires `lib/compose`'s validator seam to [`orchestrator`] without
/// `lib/compose` depending on `orchestrator` directly (spec.md §4.1 item 2).
pub fn spec_validator() -> orchestrator::ValidatorAdapter<'static, SwarmOrchestrator> {
  orchestrator::ValidatorAdapter(orchestrator())
}

pub fn proxy() -> &'static CaddyProxy {
  static PROXY: OnceLock<CaddyProxy> = OnceLock::new();
  PROXY.get_or_init(|| CaddyProxy::new(&core_config().caddy_proxy_admin_host))
}

pub fn workflow_engine() -> &'static InProcessEngine {
  static ENGINE: OnceLock<InProcessEngine> = OnceLock::new();
  ENGINE.get_or_init(|| InProcessEngine::new(crate::stack::deploy::dispatch()))
}

pub fn log_store() -> &'static LokiLogStore {
  static LOG_STORE: OnceLock<LokiLogStore> = OnceLock::new();
  LOG_STORE.get_or_init(|| {
    let host = core_config()
      .loki_host
      .clone()
      .unwrap_or_else(|| "http://localhost:3100".to_string());
    LokiLogStore::new(&host)
  })
}

/// `None` when no Git provider credentials are configured (spec.md's
/// preview-environment PR comments are a capability, not a requirement —
/// nothing breaks if neither provider is set up).
pub fn github_provider() -> Option<&'static GitHubProvider> {
  static PROVIDER: OnceLock<Option<GitHubProvider>> = OnceLock::new();
  PROVIDER
    .get_or_init(|| {
      let config = core_config();
      match (&config.github_token, &config.github_webhook_secret) {
        (Some(token), Some(secret)) => {
          Some(GitHubProvider::new(token.clone(), secret.clone()))
        }
        _ => None,
      }
    })
    .as_ref()
}

pub fn gitlab_provider() -> Option<&'static GitLabProvider> {
  static PROVIDER: OnceLock<Option<GitLabProvider>> = OnceLock::new();
  PROVIDER
    .get_or_init(|| {
      let config = core_config();
      match (&config.gitlab_token, &config.gitlab_webhook_secret) {
        (Some(token), Some(secret)) => Some(GitLabProvider::new(
          token.clone(),
          secret.clone(),
          config.gitlab_api_base.clone(),
        )),
        _ => None,
      }
    })
    .as_ref()
}

pub fn deploy_semaphore() -> &'static DeploySemaphore {
  static SEMAPHORE: OnceLock<DeploySemaphore> = OnceLock::new();
  SEMAPHORE.get_or_init(|| {
    let config = core_config();
    DeploySemaphore::new(
      config.max_concurrent_deploys,
      Duration::from_millis(config.deploy_semaphore_timeout_ms),
    )
  })
}

pub fn retry_policy() -> &'static RetryPolicy {
  static POLICY: OnceLock<RetryPolicy> = OnceLock::new();
  POLICY.get_or_init(|| RetryPolicy {
    max_attempts: core_config().workflow_retry_max_attempts,
    base_delay: Duration::from_millis(core_config().orchestrator_retry_backoff_ms),
    max_delay: Duration::from_secs(30),
  })
}
