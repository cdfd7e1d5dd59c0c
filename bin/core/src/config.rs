use std::sync::OnceLock;

use axum::http::HeaderValue;
use tower_http::cors::CorsLayer;

pub fn core_config() -> &'static config::CoreConfig {
  static CORE_CONFIG: OnceLock<config::CoreConfig> = OnceLock::new();
  CORE_CONFIG.get_or_init(|| match config::CoreConfig::load() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("failed to load core config | {e:?}");
      std::process::exit(1);
    }
  })
}

/// No `cors_allowed_origins` concept survives in this spec's config surface
/// (no browser-facing auth model to protect), so this simply allows any
/// origin the same way the teacher's default (no origins configured) does.
pub fn cors_layer() -> CorsLayer {
  CorsLayer::new()
    .allow_origin(HeaderValue::from_static("*"))
    .allow_methods(tower_http::cors::Any)
    .allow_headers(tower_http::cors::Any)
}
