//! Docker engine adapter tests against a live daemon.
//! Run with: cargo test -p dockyard-engine --test docker_engine -- --ignored

use dockyard_common::{ContainerEngine, ContainerStatus, CreateContainerRequest};
use dockyard_engine::{require_docker, DockerEngine, EngineConfig};
use futures::StreamExt;
use serial_test::serial;
use std::time::Duration;

const TEST_TAG: &str = "dockyard-engine-test:latest";

fn write_context(dockerfile: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), dockerfile).unwrap();
    dir
}

async fn connect() -> DockerEngine {
    DockerEngine::connect(&EngineConfig::from_env())
        .await
        .expect("Docker should be reachable")
}

#[tokio::test]
#[ignore = "Requires Docker"]
#[serial]
async fn test_container_lifecycle_round_trip() {
    require_docker!();
    let engine = connect().await;

    let context = write_context(
        "FROM alpine:latest\nCMD [\"sh\", \"-c\", \"while true; do echo tick; sleep 1; done\"]\n",
    );
    let image = engine.build_image(context.path(), TEST_TAG).await.unwrap();
    assert!(image.id.starts_with("sha256:"));
    assert!(image.tags.iter().any(|tag| tag == TEST_TAG));

    let created = engine
        .create_container(CreateContainerRequest {
            image: image.id.clone(),
            name: None,
            container_port: 5000,
            host_port: 15_001,
        })
        .await
        .unwrap();
    assert_eq!(created.status, ContainerStatus::Created);
    assert!(!created.name.is_empty());

    engine.start_container(&created.id).await.unwrap();
    assert_eq!(
        engine.container_status(&created.id).await.unwrap(),
        ContainerStatus::Running
    );

    let running = engine.list_containers().await.unwrap();
    assert!(running
        .iter()
        .any(|c| c.id == created.id && c.status == ContainerStatus::Running));

    let mut stats = engine.stats_stream(&created.id);
    let first = tokio::time::timeout(Duration::from_secs(10), stats.next())
        .await
        .expect("stats tick should arrive")
        .expect("stream should yield")
        .expect("snapshot should decode");
    assert!(first.pids_stats.current.unwrap_or(0) >= 1);

    engine.kill_container(&created.id).await.unwrap();
    assert_eq!(
        engine.container_status(&created.id).await.unwrap(),
        ContainerStatus::Exited
    );

    engine.remove_container(&created.id).await.unwrap();
    let err = engine.container_status(&created.id).await.unwrap_err();
    assert!(err.is_not_found());

    engine.remove_image(&image.id).await.unwrap();
}

#[tokio::test]
#[ignore = "Requires Docker"]
#[serial]
async fn test_unknown_container_is_not_found() {
    require_docker!();
    let engine = connect().await;

    let err = engine
        .start_container("dockyard-no-such-container")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "Requires Docker"]
#[serial]
async fn test_broken_dockerfile_is_build_error() {
    require_docker!();
    let engine = connect().await;

    let context = write_context("FROM alpine:latest\nRUN exit 3\n");
    let err = engine
        .build_image(context.path(), "dockyard-engine-broken:latest")
        .await
        .unwrap_err();
    assert!(matches!(err, dockyard_common::EngineError::Build(_)));
}

#[tokio::test]
async fn test_connect_rejects_tls_without_certificates() {
    let config = EngineConfig {
        host: Some("tcp://127.0.0.1:2376".to_string()),
        tls_verify: true,
        cert_path: None,
        ..Default::default()
    };

    let err = DockerEngine::connect(&config).await.err().unwrap();
    assert!(matches!(err, dockyard_common::EngineError::Connection(_)));
}
