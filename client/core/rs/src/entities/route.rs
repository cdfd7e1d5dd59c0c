use serde::{Deserialize, Serialize};

/// A `(domain, base_path, strip_prefix, port)` tuple registered with the
/// reverse proxy and pointing at a stack service (spec.md GLOSSARY "Route").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRoute {
  pub domain: String,
  pub base_path: String,
  pub strip_prefix: bool,
  pub port: u32,
}

impl UrlRoute {
  /// True if `self` is a wildcard host (`*.domain`) that would shadow `other`
  /// because `other` is a concrete subdomain of the wildcard with an equal
  /// path (spec.md §4.1, §8 property 4's wildcard-shadow rule).
  pub fn shadows(&self, other: &UrlRoute) -> bool {
    if self.base_path != other.base_path {
      return false;
    }
    match self.domain.strip_prefix("*.") {
      Some(suffix) => {
        other.domain != self.domain
          && (other.domain == suffix
            || other.domain.ends_with(&format!(".{suffix}")))
      }
      None => false,
    }
  }

  pub fn collides_with(&self, other: &UrlRoute) -> bool {
    (self.domain == other.domain && self.base_path == other.base_path)
      || self.shadows(other)
      || other.shadows(self)
  }
}

/// Identifies a route for diff/reconciliation purposes
/// (spec.md §9 "Reverse-proxy reconciliation": routes are keyed by
/// `(stack, service, index)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
  pub stack_id: String,
  pub service: String,
  pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
  pub key: RouteKey,
  pub route: UrlRoute,
  /// The fully deployed (hash-prefixed) service name the proxy forwards to.
  pub target_service: String,
}
