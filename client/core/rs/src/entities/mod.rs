pub mod change;
pub mod compose;
pub mod deployment;
pub mod env_override;
pub mod environment;
pub mod logger;
pub mod metrics;
pub mod project;
pub mod route;
pub mod stack;

/// A value that may be `null` in JSON and must round-trip through YAML as an
/// empty scalar rather than the literal string `"null"` (spec.md §4.3 item 6 /
/// §9 "YAML emission"). Kept as its own marker type so the compose YAML
/// emitter can special-case it instead of relying on library defaults.
pub type MaybeNull<T> = Option<T>;

/// A string value that must always be rendered double-quoted when the
/// compose document is serialized back to YAML, regardless of whether it
/// looks numeric/boolean to the YAML parser. Mirrors the original's
/// `class quoted(str)` marker.
#[derive(
  Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct QuotedString(pub String);

impl From<String> for QuotedString {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl From<&str> for QuotedString {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl std::fmt::Display for QuotedString {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}
