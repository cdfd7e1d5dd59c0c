//! Reverse-proxy collaborator seam (spec.md §6 "Proxy": `upsertRoute`,
//! `removeRoute`, `lookupRoute`). `CaddyProxy` is the only implementation,
//! talking to Caddy's admin API (`CADDY_PROXY_ADMIN_HOST`). Routes are
//! keyed by `zane_client::entities::route::RouteKey` and addressed in
//! Caddy's config tree by a derived `@id` tag, so upsert/remove are plain
//! `PUT`/`DELETE` against `/id/<id>` — idempotent by construction, which
//! spec.md §7's retry-with-backoff policy for `TransientOrchestrator`-class
//! errors depends on.

pub mod caddy;
pub mod error;

pub use caddy::CaddyProxy;
pub use error::{ProxyError, ProxyResult};

use zane_client::entities::route::{ProxyTarget, RouteKey, UrlRoute};

#[async_trait::async_trait]
pub trait Proxy: Send + Sync {
  async fn upsert_route(
    &self,
    key: &RouteKey,
    route: &UrlRoute,
    target_service: &str,
  ) -> ProxyResult<()>;

  async fn remove_route(&self, key: &RouteKey) -> ProxyResult<()>;

  async fn lookup_route(&self, key: &RouteKey) -> ProxyResult<Option<ProxyTarget>>;
}

pub(crate) fn route_id(key: &RouteKey) -> String {
  format!("zane_route_{}_{}_{}", key.stack_id, key.service, key.index)
}
