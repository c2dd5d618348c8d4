//! Image and container records kept by the orchestrator.

use dockyard_common::{BuiltImage, ContainerStatus, CreatedContainer};
use serde::{Deserialize, Serialize};

/// Descriptor of a successfully built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub short_id: String,
    pub tag: String,
}

impl ImageRecord {
    /// The first engine tag wins; the requested tag is the fallback.
    pub fn from_built(built: BuiltImage, requested_tag: &str) -> Self {
        let tag = built
            .tags
            .into_iter()
            .next()
            .unwrap_or_else(|| requested_tag.to_string());
        Self {
            id: built.id,
            short_id: built.short_id,
            tag,
        }
    }
}

/// A container created through the orchestrator.
///
/// `status` is a cached copy of the engine state, refreshed only after a
/// successful start or stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub image_id: String,
    pub port: u16,
    pub status: ContainerStatus,
}

impl ContainerRecord {
    pub fn from_created(created: CreatedContainer, image_id: &str, port: u16) -> Self {
        Self {
            id: created.id,
            short_id: created.short_id,
            name: created.name,
            image_id: image_id.to_string(),
            port,
            status: created.status,
        }
    }

    pub fn refresh_status(&mut self, status: ContainerStatus) {
        self.status = status;
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}
