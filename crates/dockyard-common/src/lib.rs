// Re-export dependencies used in public interfaces of common types

use std::fmt::Display;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod stats;

pub use stats::StatsSnapshot;

/// Length of a container short id, prefix excluded.
pub const SHORT_ID_LEN: usize = 12;

const IMAGE_DIGEST_PREFIX: &str = "sha256:";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine Connection Error: {0}")]
    Connection(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Image Build Error: {0}")]
    Build(String),

    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    #[error("Engine API Error: {0}")]
    Api(String),

    #[error("Stream Error: {0}")]
    Stream(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

// Define the primary Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Lifecycle state of a container as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Failed,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Failed => "failed",
        }
    }

    /// Maps an engine state string. The engine calls a failed container `dead`.
    pub fn from_engine_state(state: &str) -> Option<Self> {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Some(ContainerStatus::Created),
            "running" => Some(ContainerStatus::Running),
            "paused" => Some(ContainerStatus::Paused),
            "restarting" => Some(ContainerStatus::Restarting),
            "removing" => Some(ContainerStatus::Removing),
            "exited" => Some(ContainerStatus::Exited),
            "dead" | "failed" => Some(ContainerStatus::Failed),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == ContainerStatus::Running
    }
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container short id: the first twelve characters of the id.
pub fn short_container_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Image short id: the digest prefix kept, followed by twelve characters.
pub fn short_image_id(id: &str) -> String {
    match id.strip_prefix(IMAGE_DIGEST_PREFIX) {
        Some(digest) => format!("{IMAGE_DIGEST_PREFIX}{}", short_container_id(digest)),
        None => short_container_id(id),
    }
}

/// Outcome of a successful image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltImage {
    pub id: String,
    pub short_id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContainerRequest {
    pub image: String,
    pub name: Option<String>,
    /// Port the application listens on inside the container.
    pub container_port: u16,
    /// Host port the container port is published on.
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedContainer {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub status: ContainerStatus,
}

/// One entry of the engine's container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
}

/// Contract of a connected container engine client.
///
/// Streams are `'static` so that ingestion workers can own them on their own
/// tasks. A stream ends when the engine closes it, e.g. because the
/// container stopped.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Builds an image from a directory holding a Dockerfile.
    async fn build_image(&self, context: &Path, tag: &str) -> EngineResult<BuiltImage>;

    async fn remove_image(&self, image_id: &str) -> EngineResult<()>;

    /// Creates a detached container without starting it.
    async fn create_container(
        &self,
        request: CreateContainerRequest,
    ) -> EngineResult<CreatedContainer>;

    async fn start_container(&self, container_id: &str) -> EngineResult<()>;

    /// Forcefully stops a container.
    async fn kill_container(&self, container_id: &str) -> EngineResult<()>;

    async fn container_status(&self, container_id: &str) -> EngineResult<ContainerStatus>;

    async fn remove_container(&self, container_id: &str) -> EngineResult<()>;

    async fn list_containers(&self) -> EngineResult<Vec<ContainerSummary>>;

    /// Unbounded stream of resource snapshots, one per engine tick.
    fn stats_stream(&self, container_id: &str) -> BoxStream<'static, EngineResult<StatsSnapshot>>;

    /// Follows stdout and stderr, starting at `since` (unix seconds).
    fn log_stream(&self, container_id: &str, since: i64)
        -> BoxStream<'static, EngineResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_engine_state() {
        assert_eq!(
            ContainerStatus::from_engine_state("running"),
            Some(ContainerStatus::Running)
        );
        assert_eq!(
            ContainerStatus::from_engine_state("Exited"),
            Some(ContainerStatus::Exited)
        );
        assert_eq!(
            ContainerStatus::from_engine_state("dead"),
            Some(ContainerStatus::Failed)
        );
        assert_eq!(ContainerStatus::from_engine_state(""), None);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ContainerStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(ContainerStatus::Exited.to_string(), "exited");
    }

    #[test]
    fn test_short_ids() {
        let container_id = "4f66ad9a0b2e5e2b1c3d4e5f60718293a4b5c6d7e8f9";
        assert_eq!(short_container_id(container_id), "4f66ad9a0b2e");

        let image_id = "sha256:9c7a54a9a43cca047013b82af109fe963fde787f63f9e016fdc3384500c2823d";
        assert_eq!(short_image_id(image_id), "sha256:9c7a54a9a43c");
        assert_eq!(short_image_id("abc"), "abc");
    }
}
