//! Every HTTP route this core exposes: spec.md §6's `/projects/<slug>/<env>/
//! stacks/...` table, the tokened webhook row, the Git-provider webhook
//! intake route, and the internal log-ingest route. No frontend to serve
//! and no typed RPC envelope here — the teacher's `ts_client`/static-file
//! routes don't apply to this spec's plain method+path surface, so `app()`
//! is rebuilt around `Router::nest`/`Router::route` directly, keeping the
//! teacher's security-header layering (`SetResponseHeaderLayer` stack) and
//! `cors_layer()` unchanged.

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, put};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::cors_layer;

pub mod deployments;
pub mod git_webhook;
pub mod internal_logs;
pub mod scope;
pub mod stacks;

pub fn app() -> Router {
  let stacks_scope = Router::new()
    .route(
      "/projects/{project_slug}/{env_name}/stacks",
      get(stacks::list_stacks).post(stacks::create_stack),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/from-dokploy",
      axum::routing::post(stacks::create_stack_from_dokploy),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}",
      get(stacks::stack_detail).delete(stacks::archive_stack),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}/request-change",
      put(stacks::request_change),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}/deploy",
      put(stacks::deploy_stack),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}/toggle",
      put(stacks::toggle_stack),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}/deployments/{hash}",
      get(deployments::deployment_detail),
    )
    .route(
      "/projects/{project_slug}/{env_name}/stacks/{slug}/deployments/{hash}/cancel",
      put(deployments::cancel_deployment),
    );

  Router::new()
    .route("/version", get(|| async { env!("CARGO_PKG_VERSION") }))
    .merge(stacks_scope)
    .route("/stacks/webhook/{deploy_token}", put(stacks::webhook_deploy))
    .merge(git_webhook::router())
    .route("/internal/logs", put(internal_logs::ingest_logs))
    .layer(cors_layer())
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-content-type-options"),
      HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-frame-options"),
      HeaderValue::from_static("DENY"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-xss-protection"),
      HeaderValue::from_static("1; mode=block"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("referrer-policy"),
      HeaderValue::from_static("strict-origin-when-cross-origin"),
    ))
}
