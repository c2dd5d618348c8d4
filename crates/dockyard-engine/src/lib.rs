use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions, Stats,
    StatsOptions,
};
use bollard::errors::Error as BollardError; // Alias bollard error
use bollard::image::{BuildImageOptions, RemoveImageOptions};
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use dockyard_common::{
    short_container_id, short_image_id, BuiltImage, ContainerEngine, ContainerStatus,
    ContainerSummary, CreateContainerRequest, CreatedContainer, EngineError, EngineResult,
    StatsSnapshot,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// Re-export dependencies potentially needed by consumers (like the runner)
pub use bollard;
pub use dockyard_common as common;

pub mod config;
pub mod context;
pub mod test_utils;

pub use config::EngineConfig;

const BUILD_LOG_TARGET: &str = "dockyard::build";

/// Maps a bollard error onto the engine error taxonomy.
pub fn map_bollard_error(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code: 400,
            message,
        } => EngineError::InvalidRequest(message),
        other => EngineError::Api(other.to_string()),
    }
}

fn status_from_state(state: Option<&str>, container_id: &str) -> EngineResult<ContainerStatus> {
    let state = state.unwrap_or_default();
    ContainerStatus::from_engine_state(state).ok_or_else(|| {
        EngineError::Api(format!(
            "unrecognised state '{state}' reported for container {container_id}"
        ))
    })
}

fn inspected_status(details: &ContainerInspectResponse, container_id: &str) -> EngineResult<ContainerStatus> {
    let state = details
        .state
        .as_ref()
        .and_then(|state| state.status.as_ref())
        .map(|status| status.to_string());
    status_from_state(state.as_deref(), container_id)
}

fn snapshot_from_stats(raw: &Stats) -> EngineResult<StatsSnapshot> {
    serde_json::to_value(raw)
        .and_then(serde_json::from_value)
        .map_err(|e| EngineError::Stream(format!("malformed stats document: {e}")))
}

// --- DockerEngine Implementation ---

#[derive(Clone)]
pub struct DockerEngine {
    docker: Arc<Docker>,
}

impl DockerEngine {
    pub fn new(docker: Arc<Docker>) -> Self {
        Self { docker }
    }

    /// Connects to the engine described by `config` and verifies it answers.
    #[instrument(skip(config), fields(host = config.host.as_deref().unwrap_or("local")))]
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        let docker = Self::client_for(config)?;

        docker
            .ping()
            .await
            .map_err(|e| EngineError::Connection(format!("engine did not answer ping: {e}")))?;

        info!("Successfully created the docker client");
        Ok(Self::new(Arc::new(docker)))
    }

    fn client_for(config: &EngineConfig) -> EngineResult<Docker> {
        let connection_error = |e: BollardError| EngineError::Connection(e.to_string());

        let Some(host) = config.host.as_deref() else {
            return Docker::connect_with_local_defaults().map_err(connection_error);
        };

        if config.tls_verify {
            let (Some(key), Some(cert), Some(ca)) =
                (config.key_file(), config.cert_file(), config.ca_file())
            else {
                return Err(EngineError::Connection(format!(
                    "TLS verification requested for {host} but no certificate path is set"
                )));
            };
            return Docker::connect_with_ssl(
                host,
                &key,
                &cert,
                &ca,
                config.timeout_secs,
                API_DEFAULT_VERSION,
            )
            .map_err(connection_error);
        }

        #[cfg(unix)]
        if host.starts_with("unix://") {
            return Docker::connect_with_unix(host, config.timeout_secs, API_DEFAULT_VERSION)
                .map_err(connection_error);
        }

        Docker::connect_with_http(host, config.timeout_secs, API_DEFAULT_VERSION)
            .map_err(connection_error)
    }

    pub fn client(&self) -> Arc<Docker> {
        Arc::clone(&self.docker)
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(skip(self, context), fields(context = %context.display()))]
    async fn build_image(&self, context: &Path, tag: &str) -> EngineResult<BuiltImage> {
        info!("Please wait while image is being built.");
        let context_dir = context.to_path_buf();
        let tarball = tokio::task::spawn_blocking(move || context::pack_build_context(&context_dir))
            .await
            .map_err(|e| EngineError::Build(format!("build context packaging panicked: {e}")))??;

        let options = BuildImageOptions {
            dockerfile: context::DOCKERFILE.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut build = Box::pin(self.docker.build_image(options, None, Some(tarball.into())));
        let mut reported_id = None;
        while let Some(item) = build.next().await {
            let info = item.map_err(|e| match map_bollard_error(e) {
                EngineError::Api(message) => EngineError::Build(message),
                other => other,
            })?;
            if let Some(error) = info.error {
                return Err(EngineError::Build(error));
            }
            if let Some(line) = info.stream.as_deref() {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(target: BUILD_LOG_TARGET, %tag, "{}", line);
                }
            }
            if let Some(id) = info.aux.and_then(|aux| aux.id) {
                reported_id = Some(id);
            }
        }

        let inspect = self
            .docker
            .inspect_image(tag)
            .await
            .map_err(map_bollard_error)?;
        let id = inspect
            .id
            .or(reported_id)
            .ok_or_else(|| EngineError::Build(format!("engine reported no image id for {tag}")))?;
        let tags = inspect
            .repo_tags
            .filter(|tags| !tags.is_empty())
            .unwrap_or_else(|| vec![tag.to_string()]);

        info!(%id, "Docker image built successfully.");
        Ok(BuiltImage {
            short_id: short_image_id(&id),
            id,
            tags,
        })
    }

    #[instrument(skip(self))]
    async fn remove_image(&self, image_id: &str) -> EngineResult<()> {
        self.docker
            .remove_image(image_id, None::<RemoveImageOptions>, None)
            .await
            .map_err(map_bollard_error)?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(image = %request.image, host_port = request.host_port))]
    async fn create_container(
        &self,
        request: CreateContainerRequest,
    ) -> EngineResult<CreatedContainer> {
        let port_key = format!("{}/tcp", request.container_port);
        let port_bindings = HashMap::from([(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(request.host_port.to_string()),
            }]),
        )]);

        let config = Config {
            image: Some(request.image.clone()),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = request.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            ..Default::default()
        });

        let created = self
            .docker
            .create_container(create_options, config)
            .await
            .map_err(map_bollard_error)?;
        for warning in &created.warnings {
            warn!(container_id = %created.id, %warning, "Engine warning on container creation");
        }

        let details = self
            .docker
            .inspect_container(&created.id, None::<InspectContainerOptions>)
            .await
            .map_err(map_bollard_error)?;
        let name = details
            .name
            .as_deref()
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_default();
        let status = inspected_status(&details, &created.id)?;

        info!(container_id = %created.id, %name, "Container created.");
        Ok(CreatedContainer {
            short_id: short_container_id(&created.id),
            id: created.id,
            name,
            status,
        })
    }

    #[instrument(skip(self))]
    async fn start_container(&self, container_id: &str) -> EngineResult<()> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_bollard_error)
    }

    #[instrument(skip(self))]
    async fn kill_container(&self, container_id: &str) -> EngineResult<()> {
        self.docker
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await
            .map_err(map_bollard_error)
    }

    async fn container_status(&self, container_id: &str) -> EngineResult<ContainerStatus> {
        let details = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(map_bollard_error)?;
        inspected_status(&details, container_id)
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, container_id: &str) -> EngineResult<()> {
        self.docker
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
            .map_err(map_bollard_error)
    }

    async fn list_containers(&self) -> EngineResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_bollard_error)?;

        let mut summaries = Vec::with_capacity(containers.len());
        for container in containers {
            let id = container.id.unwrap_or_default();
            let Some(status) = container
                .state
                .as_deref()
                .and_then(ContainerStatus::from_engine_state)
            else {
                debug!(container_id = %id, state = ?container.state, "Skipping container with unrecognised state");
                continue;
            };
            let name = container
                .names
                .and_then(|names| names.into_iter().next())
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_default();
            summaries.push(ContainerSummary { id, name, status });
        }
        Ok(summaries)
    }

    fn stats_stream(&self, container_id: &str) -> BoxStream<'static, EngineResult<StatsSnapshot>> {
        let docker = Arc::clone(&self.docker);
        let container_id = container_id.to_string();
        Box::pin(async_stream::stream! {
            let options = StatsOptions {
                stream: true,
                one_shot: false,
            };
            let mut stats = Box::pin(docker.stats(&container_id, Some(options)));
            while let Some(item) = stats.next().await {
                yield item
                    .map_err(map_bollard_error)
                    .and_then(|raw| snapshot_from_stats(&raw));
            }
        })
    }

    fn log_stream(
        &self,
        container_id: &str,
        since: i64,
    ) -> BoxStream<'static, EngineResult<String>> {
        let docker = Arc::clone(&self.docker);
        let container_id = container_id.to_string();
        Box::pin(async_stream::stream! {
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                since,
                ..Default::default()
            };
            let mut logs = Box::pin(docker.logs(&container_id, Some(options)));
            while let Some(item) = logs.next().await {
                match item {
                    Ok(output) => {
                        let text = output.to_string();
                        for line in text.lines() {
                            yield Ok(line.to_string());
                        }
                    }
                    Err(e) => yield Err(map_bollard_error(e)),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_mapping() {
        let err = map_bollard_error(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: missing".to_string(),
        });
        assert!(err.is_not_found());

        let err = map_bollard_error(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        });
        assert!(matches!(err, EngineError::Api(_)));
    }

    #[test]
    fn test_status_from_state() {
        assert_eq!(
            status_from_state(Some("running"), "abc").unwrap(),
            ContainerStatus::Running
        );
        assert!(status_from_state(None, "abc").is_err());
    }
}
