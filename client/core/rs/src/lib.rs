pub mod entities;

/// Current unix timestamp in milliseconds.
pub fn zane_timestamp() -> i64 {
  chrono::Utc::now().timestamp_millis()
}

/// Short, prefixed, URL-safe identifier in the style of Komodo's
/// `ShortUUIDField`: a fixed string prefix plus a lowercase base32 tail
/// taken from a fresh UUIDv4, so ids remain greppable by entity kind.
pub fn generate_prefixed_id(prefix: &str, len: usize) -> String {
  let raw = uuid::Uuid::new_v4().simple().to_string();
  format!("{prefix}{}", &raw[..len.min(raw.len())])
}
