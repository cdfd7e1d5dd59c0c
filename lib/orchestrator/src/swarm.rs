//! `bollard`-backed `Orchestrator` implementation. Query/inspect operations
//! mirror the exact call shape of
//! `examples/rrik-komodo/bin/periphery/src/docker/{service,task,swarm,secret}.rs`
//! (the teacher's periphery agent, which only ever queries Swarm; it never
//! mutates it — `docker stack deploy` does). Mutating calls
//! (create/remove network/volume/config, scale/remove service) use
//! `bollard`'s equivalent typed methods the same way, generalized from
//! query to create/update/delete.

use bollard::Docker;
use bollard::query_parameters::{
  InspectServiceOptions, ListServicesOptions, ListTasksOptions,
};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::shell::{run_docker_with_compose_file_in, run_docker_with_temp_compose_file};
use crate::{ConfigSpecInput, NetworkSpec, ServiceFilter, ServiceSummary, TaskInfo, VolumeSpec};

/// Pure predicate pulled out of `list_services` so the name-prefix/label
/// matching logic can be unit tested without a Docker daemon.
fn matches_filter(
  name: &str,
  labels: &std::collections::HashMap<String, String>,
  filter: &ServiceFilter,
) -> bool {
  if let Some(prefix) = &filter.name_prefix {
    if !name.starts_with(prefix.as_str()) {
      return false;
    }
  }
  filter
    .labels
    .iter()
    .all(|(k, v)| labels.get(k).map(|lv| lv == v).unwrap_or(false))
}

pub struct SwarmOrchestrator {
  docker: Docker,
}

impl SwarmOrchestrator {
  pub fn connect() -> anyhow::Result<Self> {
    let docker = Docker::connect_with_defaults()?;
    Ok(Self { docker })
  }
}

#[async_trait::async_trait]
impl crate::Orchestrator for SwarmOrchestrator {
  async fn validate_spec(&self, yaml_text: &str) -> Result<(), String> {
    let result = run_docker_with_temp_compose_file(
      &["stack", "config", "-c"],
      yaml_text,
      &[],
    )
    .await
    .map_err(|e| e.to_string())?;

    if result.success {
      Ok(())
    } else {
      Err(result.stderr.trim().to_string())
    }
  }

  async fn deploy_stack(
    &self,
    namespace: &str,
    compose_yaml: &str,
    scratch_dir: &std::path::Path,
  ) -> OrchestratorResult<()> {
    let result = run_docker_with_compose_file_in(
      &["stack", "deploy", "--with-registry-auth", "-c"],
      compose_yaml,
      &[namespace],
      scratch_dir,
    )
    .await
    .map_err(|e| OrchestratorError::Transient(e.to_string()))?;

    if result.success {
      Ok(())
    } else {
      Err(OrchestratorError::CommandFailed(result.combined()))
    }
  }

  async fn list_services(
    &self,
    filter: &ServiceFilter,
  ) -> OrchestratorResult<Vec<ServiceSummary>> {
    let services = self
      .docker
      .list_services(Option::<ListServicesOptions>::None)
      .await?;

    let summaries = services
      .into_iter()
      .filter_map(|service| {
        let spec = service.spec?;
        let name = spec.name.clone().unwrap_or_default();
        let labels = spec.labels.clone().unwrap_or_default();
        if !matches_filter(&name, &labels, filter) {
          return None;
        }
        let image = spec
          .task_template
          .as_ref()
          .and_then(|t| t.container_spec.as_ref())
          .and_then(|c| c.image.clone());
        let replicas = spec
          .mode
          .as_ref()
          .and_then(|m| m.replicated.as_ref())
          .and_then(|r| r.replicas);
        Some(ServiceSummary {
          id: service.id.unwrap_or_default(),
          name,
          image,
          replicas,
        })
      })
      .collect();
    Ok(summaries)
  }

  async fn scale_service(
    &self,
    service_name: &str,
    replicas: u64,
  ) -> OrchestratorResult<()> {
    let current = self
      .docker
      .inspect_service(
        service_name,
        Some(InspectServiceOptions {
          insert_defaults: true,
        }),
      )
      .await?;

    let Some(mut spec) = current.spec else {
      return Err(OrchestratorError::Rejected(format!(
        "service '{service_name}' has no spec to scale"
      )));
    };
    let version = current
      .version
      .and_then(|v| v.index)
      .ok_or_else(|| OrchestratorError::Transient("service has no version index".to_string()))?;

    if let Some(mode) = spec.mode.as_mut() {
      if let Some(replicated) = mode.replicated.as_mut() {
        replicated.replicas = Some(replicas);
      }
    }

    self
      .docker
      .update_service(
        service_name,
        spec,
        bollard::query_parameters::UpdateServiceOptions {
          version,
          ..Default::default()
        },
        None,
      )
      .await?;
    Ok(())
  }

  async fn remove_service(&self, service_name: &str) -> OrchestratorResult<()> {
    match self.docker.delete_service(service_name).await {
      Ok(()) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(()), // already gone: idempotent
        other => Err(other),
      },
    }
  }

  async fn list_tasks(&self, service_name: &str) -> OrchestratorResult<Vec<TaskInfo>> {
    let tasks = self
      .docker
      .list_tasks(Option::<ListTasksOptions>::None)
      .await?;

    let infos = tasks
      .into_iter()
      .filter(|t| t.service_id.as_deref() == Some(service_name))
      .filter_map(|task| {
        let status = task.status;
        Some(TaskInfo {
          id: task.id.unwrap_or_default(),
          service_id: task.service_id,
          node_id: task.node_id,
          state: status.as_ref().and_then(|s| s.state.as_ref()).map(|s| format!("{s:?}")),
          desired_state: task.desired_state.map(|s| format!("{s:?}")),
          message: status.as_ref().and_then(|s| s.message.clone()),
          exit_code: status
            .as_ref()
            .and_then(|s| s.container_status.as_ref())
            .and_then(|c| c.exit_code),
        })
      })
      .collect();
    Ok(infos)
  }

  async fn get_config(&self, name: &str) -> OrchestratorResult<Option<ConfigSpecInput>> {
    match self.docker.inspect_config(name).await {
      Ok(config) => {
        let spec = config.spec.unwrap_or_default();
        let content = spec
          .data
          .as_deref()
          .map(|d| String::from_utf8_lossy(d.as_bytes()).into_owned())
          .unwrap_or_default();
        Ok(Some(ConfigSpecInput {
          name: spec.name.unwrap_or_default(),
          content,
          labels: spec.labels.unwrap_or_default().into_iter().collect(),
        }))
      }
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(None),
        other => Err(other),
      },
    }
  }

  async fn create_config(&self, spec: &ConfigSpecInput) -> OrchestratorResult<()> {
    let request = bollard::models::ConfigSpec {
      name: Some(spec.name.clone()),
      labels: Some(spec.labels.clone().into_iter().collect()),
      data: Some(spec.content.clone()),
      templating: None,
    };
    match self.docker.create_config(request).await {
      Ok(_) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(msg) if msg.contains("already exists") => Ok(()),
        other => Err(other),
      },
    }
  }

  async fn remove_config(&self, name: &str) -> OrchestratorResult<()> {
    match self.docker.delete_config(name).await {
      Ok(()) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(()),
        other => Err(other),
      },
    }
  }

  async fn get_volume(&self, name: &str) -> OrchestratorResult<Option<VolumeSpec>> {
    match self.docker.inspect_volume(name).await {
      Ok(volume) => Ok(Some(VolumeSpec {
        name: volume.name,
        driver: Some(volume.driver),
        labels: volume.labels.into_iter().collect(),
      })),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(None),
        other => Err(other),
      },
    }
  }

  async fn create_volume(&self, spec: &VolumeSpec) -> OrchestratorResult<()> {
    let options = bollard::volume::CreateVolumeOptions {
      name: spec.name.clone(),
      driver: spec.driver.clone().unwrap_or_else(|| "local".to_string()),
      labels: spec.labels.clone().into_iter().collect(),
      ..Default::default()
    };
    match self.docker.create_volume(options).await {
      Ok(_) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(msg) if msg.contains("already exists") => Ok(()),
        other => Err(other),
      },
    }
  }

  async fn remove_volume(&self, name: &str) -> OrchestratorResult<()> {
    match self
      .docker
      .remove_volume(name, Option::<bollard::query_parameters::RemoveVolumeOptions>::None)
      .await
    {
      Ok(()) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(()),
        other => Err(other),
      },
    }
  }

  async fn get_network(&self, name: &str) -> OrchestratorResult<Option<NetworkSpec>> {
    match self.docker.inspect_network(name, Option::<bollard::query_parameters::InspectNetworkOptions>::None).await {
      Ok(network) => Ok(Some(NetworkSpec {
        name: network.name.unwrap_or_default(),
        driver: network.driver,
        labels: network.labels.unwrap_or_default().into_iter().collect(),
      })),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(None),
        other => Err(other),
      },
    }
  }

  async fn create_network(&self, spec: &NetworkSpec) -> OrchestratorResult<()> {
    let request = bollard::models::NetworkCreateRequest {
      name: spec.name.clone(),
      driver: spec.driver.clone(),
      labels: Some(spec.labels.clone().into_iter().collect()),
      ..Default::default()
    };
    match self.docker.create_network(request).await {
      Ok(_) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(msg) if msg.contains("already exists") => Ok(()),
        other => Err(other),
      },
    }
  }

  async fn remove_network(&self, name: &str) -> OrchestratorResult<()> {
    match self.docker.remove_network(name).await {
      Ok(()) => Ok(()),
      Err(err) => match OrchestratorError::from(err) {
        OrchestratorError::Rejected(_) => Ok(()),
        other => Err(other),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn empty_filter_matches_everything() {
    let filter = ServiceFilter {
      name_prefix: None,
      labels: Vec::new(),
    };
    assert!(matches_filter("abc123_web", &labels(&[]), &filter));
  }

  #[test]
  fn name_prefix_rejects_mismatched_service() {
    let filter = ServiceFilter {
      name_prefix: Some("abc123_".to_string()),
      labels: Vec::new(),
    };
    assert!(matches_filter("abc123_web", &labels(&[]), &filter));
    assert!(!matches_filter("other_web", &labels(&[]), &filter));
  }

  #[test]
  fn label_filter_requires_all_pairs_to_match() {
    let filter = ServiceFilter {
      name_prefix: None,
      labels: vec![
        ("zane.stack".to_string(), "stack1".to_string()),
        ("zane.env".to_string(), "env1".to_string()),
      ],
    };
    assert!(matches_filter(
      "abc123_web",
      &labels(&[("zane.stack", "stack1"), ("zane.env", "env1")]),
      &filter
    ));
    assert!(!matches_filter(
      "abc123_web",
      &labels(&[("zane.stack", "stack1")]),
      &filter
    ));
  }
}
