//! Caddy admin-API client. Each route is a tagged config object
//! (`@id: zane_route_<stack>_<service>_<index>`) so idempotent upsert is a
//! `PUT /id/<id>` (replace-or-fail) with a `POST` fallback to append into
//! the server's route array the first time that id doesn't exist yet.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use zane_client::entities::route::{ProxyTarget, RouteKey, UrlRoute};

use crate::error::{ProxyError, ProxyResult};
use crate::route_id;

pub struct CaddyProxy {
  admin_base: String,
  client: Client,
  /// Path to the server's route array new routes are appended into
  /// (`POST` target when a `PUT /id/<id>` 404s).
  routes_path: String,
}

impl CaddyProxy {
  pub fn new(admin_host: &str) -> Self {
    Self {
      admin_base: admin_host.trim_end_matches('/').to_string(),
      client: Client::new(),
      routes_path: "config/apps/http/servers/zane/routes".to_string(),
    }
  }

  fn id_url(&self, id: &str) -> String {
    format!("{}/id/{id}", self.admin_base)
  }

  fn routes_url(&self) -> String {
    format!("{}/{}", self.admin_base, self.routes_path)
  }

  fn route_config(id: &str, route: &UrlRoute, target_service: &str) -> Value {
    let mut handlers = vec![];
    if route.strip_prefix && route.base_path != "/" {
      handlers.push(json!({
        "handler": "rewrite",
        "strip_path_prefix": route.base_path,
      }));
    }
    handlers.push(json!({
      "handler": "reverse_proxy",
      "upstreams": [{ "dial": format!("{target_service}:{}", route.port) }],
    }));

    json!({
      "@id": id,
      "match": [{
        "host": [route.domain],
        "path": [format!("{}*", route.base_path)],
      }],
      "handle": handlers,
    })
  }
}

#[async_trait::async_trait]
impl crate::Proxy for CaddyProxy {
  async fn upsert_route(
    &self,
    key: &RouteKey,
    route: &UrlRoute,
    target_service: &str,
  ) -> ProxyResult<()> {
    let id = route_id(key);
    let config = Self::route_config(&id, route, target_service);

    let put_resp = self
      .client
      .put(self.id_url(&id))
      .json(&config)
      .send()
      .await?;

    if put_resp.status().is_success() {
      return Ok(());
    }
    if put_resp.status() != StatusCode::NOT_FOUND
      && put_resp.status() != StatusCode::BAD_REQUEST
    {
      let body = put_resp.text().await.unwrap_or_default();
      return Err(ProxyError::Rejected(body));
    }

    let post_resp = self
      .client
      .post(self.routes_url())
      .json(&config)
      .send()
      .await?;
    if post_resp.status().is_success() {
      Ok(())
    } else {
      let body = post_resp.text().await.unwrap_or_default();
      Err(ProxyError::Rejected(body))
    }
  }

  async fn remove_route(&self, key: &RouteKey) -> ProxyResult<()> {
    let id = route_id(key);
    let resp = self.client.delete(self.id_url(&id)).send().await?;
    if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
      Ok(())
    } else {
      let body = resp.text().await.unwrap_or_default();
      Err(ProxyError::Rejected(body))
    }
  }

  async fn lookup_route(&self, key: &RouteKey) -> ProxyResult<Option<ProxyTarget>> {
    let id = route_id(key);
    let resp = self.client.get(self.id_url(&id)).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !resp.status().is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(ProxyError::Rejected(body));
    }

    let body: Value = resp.json().await?;
    let domain = body["match"][0]["host"][0].as_str().unwrap_or_default().to_string();
    let base_path = body["match"][0]["path"][0]
      .as_str()
      .unwrap_or("/*")
      .trim_end_matches('*')
      .to_string();
    let dial = body["handle"]
      .as_array()
      .and_then(|handlers| {
        handlers.iter().find_map(|h| {
          h["upstreams"][0]["dial"].as_str().map(|s| s.to_string())
        })
      })
      .unwrap_or_default();
    let (target_service, port) = dial
      .rsplit_once(':')
      .map(|(s, p)| (s.to_string(), p.parse().unwrap_or(0)))
      .unwrap_or_default();
    let strip_prefix = body["handle"]
      .as_array()
      .map(|h| h.iter().any(|x| x["handler"] == "rewrite"))
      .unwrap_or(false);

    Ok(Some(ProxyTarget {
      key: key.clone(),
      route: UrlRoute {
        domain,
        base_path,
        strip_prefix,
        port,
      },
      target_service,
    }))
  }
}
