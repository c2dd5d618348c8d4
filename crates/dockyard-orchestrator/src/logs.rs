use dockyard_common::{ContainerEngine, EngineResult};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::worker::{WorkerEnd, WorkerKind, WorkerReport};

/// Tracing target carrying forwarded container output.
pub const CONTAINER_LOG_TARGET: &str = "dockyard::container_logs";

/// Follows one container's stdout and stderr from the moment it starts.
#[derive(Debug, Clone)]
pub struct LogIngestor {
    container_id: String,
    container_name: String,
}

impl LogIngestor {
    pub fn new(container_id: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            container_name: container_name.into(),
        }
    }

    /// Only output produced after this call is forwarded.
    pub async fn run(&self, engine: &dyn ContainerEngine, cancel: CancellationToken) -> WorkerReport {
        let since = chrono::Utc::now().timestamp();
        let stream = engine.log_stream(&self.container_id, since);
        self.forward(stream, cancel).await
    }

    #[instrument(skip_all, fields(container = %self.container_name))]
    async fn forward<S>(&self, mut stream: S, cancel: CancellationToken) -> WorkerReport
    where
        S: Stream<Item = EngineResult<String>> + Unpin + Send,
    {
        info!("Log ingestion started");
        let mut lines = 0u64;
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break WorkerEnd::Cancelled,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(line)) => {
                    debug!(
                        target: CONTAINER_LOG_TARGET,
                        container = %self.container_name,
                        "{} : {}",
                        self.container_name,
                        line.trim_end()
                    );
                    lines += 1;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Log stream failed");
                    break WorkerEnd::StreamFailed(e.to_string());
                }
                None => break WorkerEnd::StreamClosed,
            }
        };

        debug!(lines, end = ?end, "Log ingestion finished");
        WorkerReport::new(WorkerKind::Logs, self.container_id.clone(), lines, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEngine, StreamTail};
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl CapturedOutput {
        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl io::Write for CapturedOutput {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwards_every_line_since_start() {
        let engine = MockEngine::new();
        let id = engine.add_container("web", dockyard_common::ContainerStatus::Running);
        engine.script_logs(&id, ["booting\n", "listening on :5000  \n", "GET / 200"]);

        let before = chrono::Utc::now().timestamp();
        let report = LogIngestor::new(&id, "web")
            .run(&engine, CancellationToken::new())
            .await;

        assert_eq!(report.kind, WorkerKind::Logs);
        assert_eq!(report.items, 3);
        assert_eq!(report.end, WorkerEnd::StreamClosed);

        let requests = engine.log_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, id);
        assert!(requests[0].1 >= before);
    }

    #[tokio::test]
    async fn test_lines_reach_subscriber_under_container_target() {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let engine = MockEngine::new();
        let id = engine.add_container("web", dockyard_common::ContainerStatus::Running);
        engine.script_logs(&id, ["listening on :5000  \n"]);

        let report = LogIngestor::new(&id, "web")
            .run(&engine, CancellationToken::new())
            .await;
        assert_eq!(report.items, 1);

        let captured = output.contents();
        let line = captured
            .lines()
            .find(|l| l.contains(CONTAINER_LOG_TARGET))
            .unwrap_or_else(|| panic!("no container log line in {captured:?}"));
        assert!(line.contains("DEBUG"), "{line}");
        assert!(line.contains("web : listening on :5000"), "{line}");
        assert!(line.contains("container=web"), "{line}");
        assert!(!line.contains(":5000  "), "trailing whitespace kept: {line}");
    }

    #[tokio::test]
    async fn test_stream_error_ends_worker() {
        let engine = MockEngine::new();
        let id = engine.add_container("web", dockyard_common::ContainerStatus::Running);
        engine.script_logs(&id, ["one"]);
        engine.set_stream_tail(StreamTail::Fail);

        let report = LogIngestor::new(&id, "web")
            .run(&engine, CancellationToken::new())
            .await;
        assert_eq!(report.items, 1);
        assert!(matches!(report.end, WorkerEnd::StreamFailed(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_followed_stream() {
        let engine = MockEngine::new();
        let id = engine.add_container("web", dockyard_common::ContainerStatus::Running);
        engine.set_stream_tail(StreamTail::Hold);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = LogIngestor::new(&id, "web").run(&engine, cancel).await;
        assert!(report.is_cancelled());
        assert_eq!(report.items, 0);
    }
}
