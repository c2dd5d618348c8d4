//! Fans out telemetry and log ingestion over the running containers.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::MonitoringConfig;
use crate::lifecycle::ContainerRecord;
use crate::logs::LogIngestor;
use crate::sink::MonitoringSink;
use crate::telemetry::TelemetryIngestor;
use crate::worker::{WorkerEnd, WorkerKind, WorkerReport};
use crate::Orchestrator;

pub struct Dispatcher {
    orchestrator: Orchestrator,
    config: MonitoringConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(orchestrator: Orchestrator, config: MonitoringConfig) -> Self {
        Self {
            orchestrator,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the workers of every handle this
    /// dispatcher has returned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawns a telemetry and a log worker for each locally running
    /// container and returns without waiting for them.
    ///
    /// The container list is read once. Containers started afterwards are
    /// not picked up. Must be called within a tokio runtime.
    pub fn dispatch(&self) -> MonitoringHandle {
        let running = self.orchestrator.running_containers();
        let cancel = self.cancel.child_token();
        let mut workers = JoinSet::new();

        for record in &running {
            self.spawn_telemetry(&mut workers, record, cancel.clone());
            self.spawn_logs(&mut workers, record, cancel.clone());
        }

        let spawned = workers.len();
        info!(containers = running.len(), workers = spawned, "Monitoring dispatched");
        MonitoringHandle {
            cancel,
            workers,
            spawned,
            container_ids: running.into_iter().map(|r| r.id).collect(),
        }
    }

    fn spawn_telemetry(
        &self,
        workers: &mut JoinSet<WorkerReport>,
        record: &ContainerRecord,
        cancel: CancellationToken,
    ) {
        let engine = self.orchestrator.engine();
        let config = self.config.clone();
        let ingestor = TelemetryIngestor::new(record.id.clone(), config.raw_output);
        workers.spawn(async move {
            let mut sink = match MonitoringSink::open(&config).await {
                Ok(sink) => sink,
                Err(e) => {
                    error!(path = %config.log_path.display(), error = %e, "Cannot open monitoring log");
                    return WorkerReport::new(
                        WorkerKind::Telemetry,
                        ingestor.container_id(),
                        0,
                        WorkerEnd::SinkFailed(e.to_string()),
                    );
                }
            };
            let stream = engine.stats_stream(ingestor.container_id());
            ingestor.run(stream, &mut sink, cancel).await
        });
    }

    fn spawn_logs(
        &self,
        workers: &mut JoinSet<WorkerReport>,
        record: &ContainerRecord,
        cancel: CancellationToken,
    ) {
        let engine = self.orchestrator.engine();
        let ingestor = LogIngestor::new(record.id.clone(), record.name.clone());
        workers.spawn(async move { ingestor.run(engine.as_ref(), cancel).await });
    }
}

/// Owns the workers of one dispatch.
#[derive(Debug)]
pub struct MonitoringHandle {
    cancel: CancellationToken,
    workers: JoinSet<WorkerReport>,
    spawned: usize,
    container_ids: Vec<String>,
}

impl MonitoringHandle {
    /// Number of workers spawned, finished ones included.
    pub fn worker_count(&self) -> usize {
        self.spawned
    }

    pub fn monitored_containers(&self) -> &[String] {
        &self.container_ids
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits until every worker has ended on its own. A worker that panicked
    /// is logged and has no report.
    pub async fn join(mut self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.spawned);
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "Monitoring worker did not finish"),
            }
        }
        reports
    }

    /// Cancels every worker and collects their reports.
    pub async fn shutdown(self) -> Vec<WorkerReport> {
        info!(workers = self.spawned, "Shutting down monitoring");
        self.cancel.cancel();
        self.join().await
    }
}
