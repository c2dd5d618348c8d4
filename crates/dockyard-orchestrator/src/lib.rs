use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use dockyard_common::{
    ContainerEngine, ContainerStatus, CreateContainerRequest, EngineError, EngineResult,
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub use dockyard_common as common;

pub mod config;
pub mod dispatcher;
pub mod lifecycle;
pub mod logs;
pub mod registry;
pub mod sink;
pub mod telemetry;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{DockyardConfig, MonitoringConfig, OrchestratorConfig, RemovalOrder};
pub use dispatcher::{Dispatcher, MonitoringHandle};
pub use lifecycle::{ContainerRecord, ImageRecord};
pub use registry::{ContainerRegistry, ImageRegistry, Registry};
pub use worker::{WorkerEnd, WorkerKind, WorkerReport};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Image build failed for {tag}: {source}")]
    Build {
        tag: String,
        #[source]
        source: EngineError,
    },
    #[error("Container creation failed for image {image}: {source}")]
    ContainerCreation {
        image: String,
        #[source]
        source: EngineError,
    },
    #[error("Container not found in registry: {0}")]
    ContainerNotFound(String),
    #[error("Image not found in registry: {0}")]
    ImageNotFound(String),
    #[error("Engine Error: {0}")]
    Engine(#[from] EngineError),
    #[error("Configuration Error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Clone, Copy)]
enum Transition {
    Start,
    Stop,
}

impl Transition {
    fn verb(self) -> &'static str {
        match self {
            Transition::Start => "starting",
            Transition::Stop => "stopping",
        }
    }
}

/// Builds images and drives container lifecycles against one engine,
/// tracking what it created in two local registries.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn ContainerEngine>,
    images: Arc<ImageRegistry>,
    containers: Arc<ContainerRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::with_config(engine, OrchestratorConfig::default())
    }

    pub fn with_config(engine: Arc<dyn ContainerEngine>, config: OrchestratorConfig) -> Self {
        Self {
            engine,
            images: Arc::new(ImageRegistry::new()),
            containers: Arc::new(ContainerRegistry::new()),
            config,
        }
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        Arc::clone(&self.engine)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // --- Images ---

    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn build_image(&self, path: impl AsRef<Path>, tag: &str) -> Result<ImageRecord> {
        let built = self
            .engine
            .build_image(path.as_ref(), tag)
            .await
            .map_err(|source| {
                error!(error = %source, "Docker image build failed");
                OrchestratorError::Build {
                    tag: tag.to_string(),
                    source,
                }
            })?;

        let record = ImageRecord::from_built(built, tag);
        info!(id = %record.id, tag = %record.tag, "Image built");
        self.images.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Like [`Self::get_image`] but reports an unknown id as an error.
    pub fn require_image(&self, image_id: &str) -> Result<ImageRecord> {
        self.images.get(image_id).ok_or_else(|| {
            error!(%image_id, "Image was not found");
            info!(available = ?self.images.ids(), "Available images");
            OrchestratorError::ImageNotFound(image_id.to_string())
        })
    }

    pub fn get_image(&self, image_id: &str) -> Option<ImageRecord> {
        self.require_image(image_id).ok()
    }

    #[instrument(skip(self))]
    pub async fn remove_image(&self, image_id: &str) -> bool {
        if self.require_image(image_id).is_err() {
            return false;
        }
        let removed = remove_tracked(
            self.images.as_ref(),
            image_id,
            self.config.removal_order,
            self.engine.remove_image(image_id),
        )
        .await;
        if removed {
            info!(%image_id, "Removed image");
        }
        removed
    }

    pub fn available_images(&self) -> HashMap<String, ImageRecord> {
        self.images.snapshot()
    }

    // --- Containers ---

    /// Creates a detached container publishing the application port on
    /// `port`, or on the configured default host port.
    #[instrument(skip(self))]
    pub async fn create_container(
        &self,
        image_id: &str,
        name: Option<&str>,
        port: Option<u16>,
    ) -> Result<ContainerRecord> {
        let host_port = port.unwrap_or(self.config.default_host_port);
        let request = CreateContainerRequest {
            image: image_id.to_string(),
            name: name.map(str::to_string),
            container_port: self.config.container_port,
            host_port,
        };

        let created = self
            .engine
            .create_container(request)
            .await
            .map_err(|source| {
                error!(error = %source, "Container creation failed");
                OrchestratorError::ContainerCreation {
                    image: image_id.to_string(),
                    source,
                }
            })?;

        let record = ContainerRecord::from_created(created, image_id, host_port);
        info!(
            id = %record.id,
            name = %record.name,
            port = host_port,
            status = %record.status,
            "Container created"
        );
        self.containers.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn start_container(&self, container_id: &str) -> bool {
        self.transition(container_id, Transition::Start).await
    }

    /// Stops a container with a forceful kill.
    #[instrument(skip(self))]
    pub async fn stop_container(&self, container_id: &str) -> bool {
        self.transition(container_id, Transition::Stop).await
    }

    async fn transition(&self, container_id: &str, transition: Transition) -> bool {
        info!(%container_id, "{} container", transition.verb());
        let outcome = match transition {
            Transition::Start => self.engine.start_container(container_id).await,
            Transition::Stop => self.engine.kill_container(container_id).await,
        };
        if let Err(e) = outcome {
            error!(%container_id, error = %e, "Error while {} container", transition.verb());
            warn!(%container_id, "Cached status left unrefreshed");
            return false;
        }

        let status = match self.engine.container_status(container_id).await {
            Ok(status) => status,
            Err(e) => {
                error!(%container_id, error = %e, "Status query failed after {}", transition.verb());
                warn!(%container_id, "Cached status left unrefreshed");
                return false;
            }
        };

        if !self
            .containers
            .update(container_id, |record| record.refresh_status(status))
        {
            debug!(%container_id, %status, "Container is not tracked locally");
        }
        true
    }

    pub fn get_container(&self, container_id: &str) -> Option<ContainerRecord> {
        let record = self.containers.get(container_id);
        if record.is_none() {
            error!(%container_id, "Container was not found");
            info!(available = ?self.containers.ids(), "Available containers");
        }
        record
    }

    /// Cached status of a tracked container.
    pub fn container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        self.containers
            .get(container_id)
            .map(|record| record.status)
            .ok_or_else(|| OrchestratorError::ContainerNotFound(container_id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn remove_container(&self, container_id: &str) -> bool {
        if self.get_container(container_id).is_none() {
            return false;
        }
        let removed = remove_tracked(
            self.containers.as_ref(),
            container_id,
            self.config.removal_order,
            self.engine.remove_container(container_id),
        )
        .await;
        if removed {
            info!(%container_id, "Removed container");
        }
        removed
    }

    pub fn available_containers(&self) -> HashMap<String, ContainerRecord> {
        self.containers.snapshot()
    }

    /// Locally tracked containers whose cached status is running.
    pub fn running_containers(&self) -> Vec<ContainerRecord> {
        self.containers.filtered(ContainerRecord::is_running)
    }

    /// `(name, id)` of every running container the engine knows about,
    /// tracked locally or not.
    pub async fn running_containers_on_server(&self) -> Result<Vec<(String, String)>> {
        let listed = self.engine.list_containers().await.map_err(|e| {
            error!(error = %e, "Listing engine containers failed");
            OrchestratorError::Engine(e)
        })?;
        Ok(listed
            .into_iter()
            .filter(|summary| summary.status.is_running())
            .map(|summary| (summary.name, summary.id))
            .collect())
    }
}

/// Removes `id` from `registry` and from the engine in the configured order.
/// `remote` is only polled when the order requires it.
async fn remove_tracked<R: Clone>(
    registry: &Registry<R>,
    id: &str,
    order: RemovalOrder,
    remote: impl Future<Output = EngineResult<()>>,
) -> bool {
    match order {
        RemovalOrder::LocalFirst => {
            registry.remove(id);
            match remote.await {
                Ok(()) => true,
                Err(e) => {
                    error!(%id, error = %e, "Engine removal failed");
                    warn!(%id, "Dropped locally but still present on the engine");
                    false
                }
            }
        }
        RemovalOrder::EngineFirst => match remote.await {
            Ok(()) => {
                registry.remove(id);
                true
            }
            Err(e) => {
                error!(%id, error = %e, "Engine removal failed, keeping local record");
                false
            }
        },
    }
}
