//! Orchestrator and monitoring settings.
//!
//! Both structs deserialize with defaults for every missing field, so a
//! configuration file only needs to name what it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, Result};

/// Port the sample web application listens on inside every container.
pub const DEFAULT_CONTAINER_PORT: u16 = 5000;
pub const DEFAULT_HOST_PORT: u16 = 5000;
pub const DEFAULT_MONITORING_LOG: &str = "./Monitoring.log";

/// Order in which a removal touches the local registry and the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOrder {
    /// Drop the local record, then ask the engine. An engine failure leaves
    /// the two diverged.
    #[default]
    LocalFirst,
    /// Ask the engine first and drop the local record only on success.
    EngineFirst,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub container_port: u16,
    pub default_host_port: u16,
    pub removal_order: RemovalOrder,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            container_port: DEFAULT_CONTAINER_PORT,
            default_host_port: DEFAULT_HOST_PORT,
            removal_order: RemovalOrder::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Append-only file shared by every telemetry worker.
    pub log_path: PathBuf,
    /// Append each sample line to `log_path` in addition to stdout.
    pub save_to_file: bool,
    /// Print the raw stats document before each sample line.
    pub raw_output: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_MONITORING_LOG),
            save_to_file: true,
            raw_output: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockyardConfig {
    pub orchestrator: OrchestratorConfig,
    pub monitoring: MonitoringConfig,
}

impl MonitoringConfig {
    /// Reads a standalone monitoring section from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref()).await
    }
}

impl DockyardConfig {
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref()).await
    }
}

async fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OrchestratorError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| OrchestratorError::Config(format!("invalid {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DockyardConfig::default();
        assert_eq!(config.orchestrator.container_port, 5000);
        assert_eq!(config.orchestrator.default_host_port, 5000);
        assert_eq!(config.orchestrator.removal_order, RemovalOrder::LocalFirst);
        assert_eq!(config.monitoring.log_path, PathBuf::from("./Monitoring.log"));
        assert!(config.monitoring.save_to_file);
        assert!(!config.monitoring.raw_output);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.json");
        std::fs::write(
            &path,
            r#"{"orchestrator": {"removal_order": "engine_first"}, "monitoring": {"save_to_file": false}}"#,
        )
        .unwrap();

        let config = DockyardConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.orchestrator.removal_order, RemovalOrder::EngineFirst);
        assert_eq!(config.orchestrator.container_port, 5000);
        assert!(!config.monitoring.save_to_file);
        assert_eq!(config.monitoring.log_path, PathBuf::from(DEFAULT_MONITORING_LOG));
    }

    #[tokio::test]
    async fn test_monitoring_section_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitoring.json");
        std::fs::write(&path, r#"{"log_path": "/tmp/stats.log", "raw_output": true}"#).unwrap();

        let config = MonitoringConfig::load(&path).await.unwrap();
        assert_eq!(config.log_path, PathBuf::from("/tmp/stats.log"));
        assert!(config.raw_output);
        assert!(config.save_to_file);
    }

    #[tokio::test]
    async fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dockyard.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = DockyardConfig::load_from_file(&path).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));

        let err = DockyardConfig::load_from_file(dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }
}
