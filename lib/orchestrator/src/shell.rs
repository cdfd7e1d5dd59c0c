//! Minimal process runner for the two `docker stack` operations Swarm has
//! no REST endpoint for (`config` and `deploy`), grounded on
//! `original_source/backend/compose/processor.py::_run_docker_validation`
//! (writes content to a `NamedTemporaryFile`, shells `docker stack config
//! -c <path>`). Scoped down relative to the teacher's `command` crate
//! (`examples/rrik-komodo/lib/command`), which also handles multiline
//! parsing, secret redaction, and PTY streaming for long-running remote
//! builds — none of which apply here, since both invocations are
//! short-lived and local to the core process.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

pub struct CommandOutput {
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn combined(&self) -> String {
    if self.stderr.trim().is_empty() {
      self.stdout.clone()
    } else {
      format!("{}\n{}", self.stdout.trim(), self.stderr.trim())
    }
  }
}

/// Writes `yaml_content` to a temp file and runs `docker <args_before> <path>
/// <args_after>`.
pub async fn run_docker_with_temp_compose_file(
  args_before: &[&str],
  yaml_content: &str,
  args_after: &[&str],
) -> std::io::Result<CommandOutput> {
  let mut file = tempfile::Builder::new()
    .suffix(".yml")
    .tempfile()?;
  file.write_all(yaml_content.as_bytes())?;
  file.flush()?;

  let path = file.path().to_string_lossy().into_owned();
  let output = Command::new("docker")
    .args(args_before)
    .arg(&path)
    .args(args_after)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await?;

  Ok(CommandOutput {
    success: output.status.success(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

/// Like [`run_docker_with_temp_compose_file`], but writes the compose file
/// into `dir` instead of the system temp directory. `deploy_stack` needs
/// this: inline-config `file:` references are relative paths, resolved by
/// `docker stack deploy` against the compose file's own directory, so the
/// compose file must live alongside the materialized config files the
/// deploy workflow wrote into its per-deploy scratch directory.
pub async fn run_docker_with_compose_file_in(
  args_before: &[&str],
  yaml_content: &str,
  args_after: &[&str],
  dir: &Path,
) -> std::io::Result<CommandOutput> {
  let path = dir.join("docker-stack.yml");
  std::fs::write(&path, yaml_content)?;

  let output = Command::new("docker")
    .args(args_before)
    .arg(path.to_string_lossy().as_ref())
    .args(args_after)
    .current_dir(dir)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await?;

  Ok(CommandOutput {
    success: output.status.success(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}
