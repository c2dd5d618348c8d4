//! Converts raw stats snapshots into per-tick metric samples.

use std::fmt;

use dockyard_common::{EngineResult, StatsSnapshot};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::sink::MetricsSink;
use crate::worker::{WorkerEnd, WorkerKind, WorkerReport};

const MIB: f64 = 1024.0 * 1024.0;
const KIB: f64 = 1024.0;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Scales a rounded fraction to a percentage. The product is rounded again
/// so binary noise from the multiplication ("56.99999999999999") never
/// reaches the line.
fn as_percent(fraction: f64) -> f64 {
    round_to(fraction * 100.0, 2)
}

fn as_f64(value: Option<u64>) -> f64 {
    value.unwrap_or(0) as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSample {
    pub container_id: String,
    pub cpu_percent: f64,
    pub mem_usage_mb: f64,
    pub mem_limit_mb: f64,
    pub mem_percent: f64,
    pub net_rx_kb: f64,
    pub net_tx_kb: f64,
    pub block_read_kb: f64,
    pub block_write_kb: f64,
    pub pid_count: u64,
}

impl MetricsSample {
    /// Derives a sample from one snapshot.
    ///
    /// CPU is kernel-mode time over total system time for this single
    /// snapshot, not the delta between two ticks. Missing counters read as
    /// zero and a zero denominator yields 0.0.
    pub fn from_snapshot(container_id: &str, snapshot: &StatsSnapshot) -> Self {
        let mem_usage_mb = round_to(as_f64(snapshot.memory_stats.usage) / MIB, 2);
        let mem_limit_mb = round_to(as_f64(snapshot.memory_stats.limit) / MIB, 2);
        let mem_percent = as_percent(round_to(ratio(mem_usage_mb, mem_limit_mb), 2));

        let cpu = &snapshot.cpu_stats;
        let cpu_percent = as_percent(round_to(
            ratio(
                as_f64(cpu.cpu_usage.usage_in_kernelmode),
                as_f64(cpu.system_cpu_usage),
            ),
            4,
        ));

        let (net_rx_kb, net_tx_kb) = snapshot
            .primary_network()
            .map(|(_, counters)| {
                (
                    round_to(counters.rx_bytes as f64 / KIB, 2),
                    round_to(counters.tx_bytes as f64 / KIB, 2),
                )
            })
            .unwrap_or((0.0, 0.0));

        let (block_read_kb, block_write_kb) = match snapshot.block_io_entries() {
            [read, write, ..] => (
                round_to(read.value as f64 / KIB, 2),
                round_to(write.value as f64 / KIB, 2),
            ),
            _ => (0.0, 0.0),
        };

        Self {
            container_id: container_id.to_string(),
            cpu_percent,
            mem_usage_mb,
            mem_limit_mb,
            mem_percent,
            net_rx_kb,
            net_tx_kb,
            block_read_kb,
            block_write_kb,
            pid_count: snapshot.pids_stats.current.unwrap_or(0),
        }
    }
}

// Floats use `{:?}` so whole numbers keep their fractional part ("2.0").
impl fmt::Display for MetricsSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Container ID: {}\tCPU %: {:?}\tMem Usage/Limit: {:?} Mib/{:?} Mib\tMem %: {:?}\tNet I/O: {:?} kB/{:?} kB\tBlock I/O: {:?} kB/{:?} kB\tPIDS: {}",
            self.container_id,
            self.cpu_percent,
            self.mem_usage_mb,
            self.mem_limit_mb,
            self.mem_percent,
            self.net_rx_kb,
            self.net_tx_kb,
            self.block_read_kb,
            self.block_write_kb,
            self.pid_count,
        )
    }
}

/// Consumes one container's stats stream, writing a line per snapshot.
#[derive(Debug, Clone)]
pub struct TelemetryIngestor {
    container_id: String,
    raw_output: bool,
}

impl TelemetryIngestor {
    pub fn new(container_id: impl Into<String>, raw_output: bool) -> Self {
        Self {
            container_id: container_id.into(),
            raw_output,
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    #[instrument(skip_all, fields(container_id = %self.container_id))]
    pub async fn run<S, K>(&self, mut stream: S, sink: &mut K, cancel: CancellationToken) -> WorkerReport
    where
        S: Stream<Item = EngineResult<StatsSnapshot>> + Unpin + Send,
        K: MetricsSink + ?Sized,
    {
        info!("Telemetry ingestion started");
        let mut samples = 0u64;
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break WorkerEnd::Cancelled,
                next = stream.next() => next,
            };

            let snapshot = match next {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(e)) => {
                    warn!(error = %e, "Stats stream failed");
                    break WorkerEnd::StreamFailed(e.to_string());
                }
                None => break WorkerEnd::StreamClosed,
            };

            if self.raw_output {
                match serde_json::to_string(&snapshot) {
                    Ok(raw) => {
                        if let Err(e) = sink.write_raw(&raw).await {
                            error!(error = %e, "Writing raw snapshot failed");
                            break WorkerEnd::SinkFailed(e.to_string());
                        }
                    }
                    Err(e) => warn!(error = %e, "Raw snapshot could not be serialized"),
                }
            }

            let sample = MetricsSample::from_snapshot(&self.container_id, &snapshot);
            if let Err(e) = sink.write_line(&sample.to_string()).await {
                error!(error = %e, "Writing sample failed");
                break WorkerEnd::SinkFailed(e.to_string());
            }
            samples += 1;
        };

        debug!(samples, end = ?end, "Telemetry ingestion finished");
        WorkerReport::new(WorkerKind::Telemetry, self.container_id.clone(), samples, end)
    }
}
