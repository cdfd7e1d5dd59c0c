//! Two-stage "magic" resolution over compose stack env values
//! (spec.md §4.2):
//!
//! 1. Generator placeholders: `{{ fn }}` / `{{ fn | arg }}`.
//! 2. Env expansion: `${NAME}` / `$NAME` against a merged environment.
//!
//! Grounded on `original_source/backend/compose/processor.py`'s
//! `_extract_template_expression`/`_generate_template_value` (narrower, 4
//! functions) generalized to the full table spec.md §4.2 specifies (9
//! functions, `| arg` pipe syntax) — per instructions, spec.md's content
//! supersedes the narrower original where the two disagree.

use std::sync::OnceLock;

use indexmap::IndexMap;
use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;
use zane_client::entities::compose::ComposeEnvVar;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolateError {
  #[error("unsupported generator function '{0}'")]
  UnsupportedFunction(String),
  #[error(
    "generate_password|generate_random_chars length {0} out of range 1..8192"
  )]
  LengthOutOfRange(u32),
  #[error("generator argument required for '{0}'")]
  MissingArgument(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorFn {
  Username,
  RandomSlug,
  SecurePassword,
  Password(u32),
  RandomChars(u32),
  Uuid,
  Base64(String),
  Domain,
  Email,
}

fn placeholder_regex() -> &'static regex::Regex {
  static RE: OnceLock<regex::Regex> = OnceLock::new();
  RE.get_or_init(|| {
    regex::Regex::new(
      r#"^\{\{\s*(?P<fn>[a-zA-Z_][a-zA-Z0-9_]*)\s*(\|\s*(?P<arg>'[^']*'|"[^"]*"|\d+)\s*)?\}\}$"#,
    )
    .expect("static placeholder regex is valid")
  })
}

/// Parses a value as a generator placeholder. Returns `None` if the value is
/// not *exactly* one placeholder expression — partial interpolation (a
/// placeholder embedded in surrounding text) is not supported (spec.md
/// §4.2).
pub fn parse_placeholder(
  value: &str,
) -> Result<Option<GeneratorFn>, InterpolateError> {
  let Some(caps) = placeholder_regex().captures(value.trim()) else {
    return Ok(None);
  };
  let func = &caps["fn"];
  let arg = caps.name("arg").map(|m| m.as_str());

  let parsed = match func {
    "generate_username" => GeneratorFn::Username,
    "generate_random_slug" => GeneratorFn::RandomSlug,
    "generate_secure_password" => GeneratorFn::SecurePassword,
    "generate_password" => {
      GeneratorFn::Password(parse_length_arg(arg, 32)?)
    }
    "generate_random_chars" => {
      GeneratorFn::RandomChars(parse_length_arg(arg, 32)?)
    }
    "generate_uuid" => GeneratorFn::Uuid,
    "generate_base64" => {
      let text = arg
        .map(unquote)
        .ok_or_else(|| {
          InterpolateError::MissingArgument("generate_base64".into())
        })?;
      GeneratorFn::Base64(text)
    }
    "generate_domain" => GeneratorFn::Domain,
    "generate_email" => GeneratorFn::Email,
    other => {
      return Err(InterpolateError::UnsupportedFunction(other.to_string()));
    }
  };
  Ok(Some(parsed))
}

fn parse_length_arg(
  arg: Option<&str>,
  default: u32,
) -> Result<u32, InterpolateError> {
  let n = match arg {
    None => default,
    Some(raw) => raw
      .parse::<u32>()
      .map_err(|_| InterpolateError::LengthOutOfRange(0))?,
  };
  if n == 0 || n > 8192 {
    return Err(InterpolateError::LengthOutOfRange(n));
  }
  Ok(n)
}

fn unquote(raw: &str) -> String {
  let bytes = raw.as_bytes();
  if bytes.len() >= 2
    && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
      || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
  {
    raw[1..raw.len() - 1].to_string()
  } else {
    raw.to_string()
  }
}

/// Context a generator run needs for stack/project-scoped values.
pub struct GenerateContext<'a> {
  pub project_slug: &'a str,
  pub stack_slug: &'a str,
  pub root_domain: &'a str,
}

const COLORS: &[&str] = &[
  "red", "blue", "green", "amber", "violet", "coral", "azure", "slate",
  "teal", "rose",
];
const WORDS: &[&str] = &[
  "falcon", "harbor", "ember", "cinder", "meadow", "granite", "willow",
  "onyx", "quartz", "tundra",
];

pub fn generate(func: &GeneratorFn, ctx: &GenerateContext) -> String {
  let mut rng = rand::rng();
  match func {
    GeneratorFn::Username => {
      let color = COLORS[rng.random_range(0..COLORS.len())];
      let word = WORDS[rng.random_range(0..WORDS.len())];
      let n: u32 = rng.random_range(10..100);
      format!("{color}{word}{n}")
    }
    GeneratorFn::RandomSlug => {
      let a = WORDS[rng.random_range(0..WORDS.len())];
      let b = COLORS[rng.random_range(0..COLORS.len())];
      let n: u32 = rng.random_range(100..1000);
      format!("{a}-{b}-{n}")
    }
    GeneratorFn::SecurePassword => {
      let bytes: [u8; 32] = rng.random();
      hex::encode(bytes)
    }
    GeneratorFn::Password(n) | GeneratorFn::RandomChars(n) => {
      (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(*n as usize)
        .map(char::from)
        .collect()
    }
    GeneratorFn::Uuid => uuid::Uuid::new_v4().to_string(),
    GeneratorFn::Base64(text) => {
      use base64::Engine;
      base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
    }
    GeneratorFn::Domain => {
      // Open Question (spec.md §9) resolved: a leading wildcard prefix on
      // ROOT_DOMAIN is stripped before composition, since a generated
      // concrete host can never itself be a wildcard.
      let root = ctx.root_domain.strip_prefix("*.").unwrap_or(ctx.root_domain);
      let suffix: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .filter(|b| b.is_ascii_alphabetic())
        .take(10)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
      format!(
        "{}-{}-{}.{}",
        ctx.project_slug, ctx.stack_slug, suffix, root
      )
    }
    GeneratorFn::Email => {
      let local: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
      format!("{local}@example.com")
    }
  }
}

/// Expands `${NAME}`/`$NAME` references against `env` in a single pass.
/// Undefined references expand to the empty string (spec.md §4.2 item 3).
pub fn expand_env(input: &str, env: &IndexMap<String, String>) -> String {
  static RE: OnceLock<regex::Regex> = OnceLock::new();
  let re = RE.get_or_init(|| {
    regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
      .expect("static env-expansion regex is valid")
  });
  re.replace_all(input, |caps: &regex::Captures| {
    let name = caps
      .get(1)
      .or_else(|| caps.get(2))
      .map(|m| m.as_str())
      .unwrap_or_default();
    env.get(name).cloned().unwrap_or_default()
  })
  .into_owned()
}

/// Implements spec.md §4.2's resolution order over `x-env`:
/// 1. Start from the persisted override map.
/// 2. Walk `x_env` in order; overrides win, else generate placeholders.
/// 3. Expand every resulting value once against the merged environment.
///
/// Returns the resolved map plus the subset of keys that were newly
/// generated this pass (candidates for ENV_OVERRIDE ADD changes).
pub fn resolve_x_env(
  x_env: &IndexMap<String, ComposeEnvVar>,
  mut overrides: IndexMap<String, String>,
  ctx: &GenerateContext,
) -> Result<IndexMap<String, ComposeEnvVar>, InterpolateError> {
  let mut resolved: IndexMap<String, ComposeEnvVar> = IndexMap::new();

  for (key, entry) in x_env {
    let raw_value = &entry.value;
    let (value, is_newly_generated) = if let Some(existing) =
      overrides.get(key)
    {
      (existing.clone(), false)
    } else if let Some(func) = parse_placeholder(raw_value)? {
      let generated = generate(&func, ctx);
      (generated, true)
    } else {
      (raw_value.clone(), false)
    };
    overrides.insert(key.clone(), value.clone());
    resolved.insert(
      key.clone(),
      ComposeEnvVar {
        key: key.clone(),
        value,
        is_newly_generated,
      },
    );
  }

  // Fixed-point expansion pass against the merged environment (spec.md §4.2
  // item 3 / §9 "one fixed-point pass over a dependency graph").
  let merged = overrides;
  for env in resolved.values_mut() {
    env.value = expand_env(&env.value, &merged);
  }

  Ok(resolved)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx() -> GenerateContext<'static> {
    GenerateContext {
      project_slug: "demo",
      stack_slug: "web",
      root_domain: "*.example.com",
    }
  }

  #[test]
  fn parses_simple_placeholder() {
    assert_eq!(
      parse_placeholder("{{ generate_uuid }}").unwrap(),
      Some(GeneratorFn::Uuid)
    );
  }

  #[test]
  fn parses_pipe_arg_numeric() {
    assert_eq!(
      parse_placeholder("{{ generate_password | 16 }}").unwrap(),
      Some(GeneratorFn::Password(16))
    );
  }

  #[test]
  fn parses_pipe_arg_quoted() {
    assert_eq!(
      parse_placeholder("{{ generate_base64 | 'hello' }}").unwrap(),
      Some(GeneratorFn::Base64("hello".to_string()))
    );
  }

  #[test]
  fn rejects_partial_interpolation() {
    assert_eq!(
      parse_placeholder("prefix-{{ generate_uuid }}").unwrap(),
      None
    );
  }

  #[test]
  fn rejects_out_of_range_length() {
    assert!(matches!(
      parse_placeholder("{{ generate_password | 0 }}"),
      Err(InterpolateError::LengthOutOfRange(0))
    ));
    assert!(matches!(
      parse_placeholder("{{ generate_password | 9000 }}"),
      Err(InterpolateError::LengthOutOfRange(9000))
    ));
  }

  #[test]
  fn domain_strips_wildcard_prefix() {
    let value = generate(&GeneratorFn::Domain, &ctx());
    assert!(value.starts_with("demo-web-"));
    assert!(value.ends_with(".example.com"));
    assert!(!value.contains("*."));
  }

  #[test]
  fn expand_env_leaves_undefined_empty() {
    let env = IndexMap::new();
    assert_eq!(expand_env("http://${HOST}/api", &env), "http:///api");
  }

  fn env_var(value: &str) -> ComposeEnvVar {
    ComposeEnvVar {
      key: String::new(),
      value: value.to_string(),
      is_newly_generated: false,
    }
  }

  #[test]
  fn resolve_x_env_generates_and_expands() {
    let mut x_env = IndexMap::new();
    x_env.insert(
      "APP_DOMAIN".to_string(),
      env_var("{{ generate_domain }}"),
    );
    x_env.insert(
      "API_URL".to_string(),
      env_var("http://${APP_DOMAIN}/api"),
    );
    let resolved =
      resolve_x_env(&x_env, IndexMap::new(), &ctx()).unwrap();
    assert!(resolved["APP_DOMAIN"].is_newly_generated);
    assert!(!resolved["API_URL"].value.contains("${"));
    assert!(
      resolved["API_URL"]
        .value
        .contains(&resolved["APP_DOMAIN"].value)
    );
  }

  #[test]
  fn resolve_x_env_prefers_existing_override() {
    let mut x_env = IndexMap::new();
    x_env.insert(
      "APP_DOMAIN".to_string(),
      env_var("{{ generate_domain }}"),
    );
    let mut overrides = IndexMap::new();
    overrides.insert("APP_DOMAIN".to_string(), "fixed.example.com".to_string());
    let resolved = resolve_x_env(&x_env, overrides, &ctx()).unwrap();
    assert_eq!(resolved["APP_DOMAIN"].value, "fixed.example.com");
    assert!(!resolved["APP_DOMAIN"].is_newly_generated);
  }
}
