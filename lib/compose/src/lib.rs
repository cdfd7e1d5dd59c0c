//! Compose document parsing, policy validation, and spec compilation
//! (spec.md §4.1, §4.3, §4.8). Grounded throughout on
//! `original_source/backend/compose/{dtos,processor,adapters}.py`.

pub mod compile;
pub mod dokploy;
pub mod error;
pub mod parse;
pub mod validate;
pub mod yaml;

pub use compile::{compile, CompileContext, CompiledArtifact};
pub use error::{ComposeError, ComposeResult};
pub use parse::{parse_compose, ParsedDocument};
pub use validate::{enforce_policy, revalidate_with_config_stub, ExternalSpecValidator};
