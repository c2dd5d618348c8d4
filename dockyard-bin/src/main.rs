mod args;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre;
use dockyard_engine::{DockerEngine, EngineConfig};
use dockyard_orchestrator::{
    Dispatcher, DockyardConfig, MonitoringConfig, Orchestrator, WorkerReport,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Cli;

/// Used when `RUST_LOG` is unset. Container output is logged at debug level.
const DEFAULT_LOG_FILTER: &str = "info,dockyard::container_logs=debug";

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        error!("{e}");
        return Err(e);
    }

    let config = match &cli.config {
        Some(path) => DockyardConfig::load_from_file(path).await?,
        None => DockyardConfig::default(),
    };
    let monitoring = cli.monitoring_config(config.monitoring);

    info!("Connecting to the Docker engine...");
    let engine = DockerEngine::connect(&EngineConfig::from_env()).await?;
    let orchestrator = Orchestrator::with_config(Arc::new(engine), config.orchestrator);

    launch(&cli, &orchestrator).await?;
    monitor(orchestrator, monitoring).await
}

/// Builds the image, then creates and starts every container.
async fn launch(cli: &Cli, orchestrator: &Orchestrator) -> eyre::Result<()> {
    let image = orchestrator.build_image(&cli.context, &cli.image_name).await?;

    for (index, port) in cli.container_ports.iter().enumerate() {
        if let Err(e) = orchestrator
            .create_container(&image.id, cli.container_name(index), Some(*port))
            .await
        {
            error!(port, error = %e, "Container was not created");
        }
    }

    let mut created: Vec<_> = orchestrator.available_containers().into_values().collect();
    if created.len() == cli.container_number {
        debug!("All containers created successfully");
    }
    created.sort_by_key(|record| record.port);

    for record in created {
        orchestrator.start_container(&record.id).await;
        match orchestrator.container_status(&record.id) {
            Ok(status) if status.is_running() => {
                info!("Container: {} at: {} is running OK.", record.id, record.port)
            }
            _ => warn!("Container: {} at: {} failed to run.", record.id, record.port),
        }
    }
    Ok(())
}

/// Streams telemetry and logs until every worker ends or Ctrl-C arrives.
async fn monitor(orchestrator: Orchestrator, monitoring: MonitoringConfig) -> eyre::Result<()> {
    let handle = Dispatcher::new(orchestrator, monitoring).dispatch();
    info!(workers = handle.worker_count(), "Monitoring started, press Ctrl-C to stop");

    let cancel = handle.cancellation_token();
    let mut workers = tokio::spawn(handle.join());
    let reports = tokio::select! {
        joined = &mut workers => joined?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, stopping monitoring");
            cancel.cancel();
            workers.await?
        }
    };

    summarize(&reports);
    Ok(())
}

fn summarize(reports: &[WorkerReport]) {
    for report in reports {
        info!(
            kind = %report.kind,
            container_id = %report.container_id,
            items = report.items,
            end = ?report.end,
            "Worker finished"
        );
    }
}
