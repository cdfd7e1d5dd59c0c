//! Webhook authenticity checks. GitHub signs the body with HMAC-SHA256 and
//! sends the hex digest in `X-Hub-Signature-256: sha256=<hex>`; GitLab
//! instead sends a static shared token verbatim in `X-Gitlab-Token`. Both
//! are real, documented, provider-specific mechanisms, not a single scheme
//! unified here for convenience.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a GitHub `X-Hub-Signature-256` header against `body` and
/// `secret`. Constant-time by comparing raw bytes after hex decoding,
/// rather than the signature strings themselves.
pub fn verify_github_signature(body: &[u8], secret: &str, signature_header: &str) -> bool {
  let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
    return false;
  };
  let Ok(expected) = hex::decode(hex_digest) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  mac.verify_slice(&expected).is_ok()
}

/// Verifies a GitLab `X-Gitlab-Token` header: a plain shared-secret
/// comparison, per GitLab's own webhook model (no payload signing).
pub fn verify_gitlab_token(secret: &str, token_header: &str) -> bool {
  secret.as_bytes().ct_eq(token_header.as_bytes()).into()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn github_signature_roundtrip() {
    let secret = "topsecret";
    let body = b"{\"ref\":\"refs/heads/main\"}";
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    let digest = hex::encode(mac.finalize().into_bytes());
    let header = format!("sha256={digest}");
    assert!(verify_github_signature(body, secret, &header));
  }

  #[test]
  fn github_signature_rejects_wrong_secret() {
    let body = b"payload";
    let mut mac = HmacSha256::new_from_slice(b"right").unwrap();
    mac.update(body);
    let header = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));
    assert!(!verify_github_signature(body, "wrong", &header));
  }

  #[test]
  fn github_signature_rejects_missing_prefix() {
    assert!(!verify_github_signature(b"x", "secret", "deadbeef"));
  }

  #[test]
  fn gitlab_token_exact_match_only() {
    assert!(verify_gitlab_token("abc123", "abc123"));
    assert!(!verify_gitlab_token("abc123", "abc124"));
    assert!(!verify_gitlab_token("abc123", "abc12"));
  }
}
