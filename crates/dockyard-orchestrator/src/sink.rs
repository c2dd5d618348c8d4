//! Destinations for telemetry sample lines.

use std::io::Write;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::MonitoringConfig;

#[async_trait]
pub trait MetricsSink: Send {
    /// Writes one formatted sample line. The sink appends the newline.
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Receives the raw stats document when raw output is enabled.
    async fn write_raw(&mut self, _raw: &str) -> std::io::Result<()> {
        Ok(())
    }
}

/// Prints every line to stdout and optionally appends it to the monitoring
/// log.
///
/// Each worker opens its own append handle. A line goes out in a single
/// `write_all` and is flushed before the next one, so lines from different
/// workers do not interleave.
#[derive(Debug)]
pub struct MonitoringSink {
    file: Option<File>,
}

impl MonitoringSink {
    pub async fn open(config: &MonitoringConfig) -> std::io::Result<Self> {
        let file = if config.save_to_file {
            debug!(path = %config.log_path.display(), "Opening monitoring log");
            Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&config.log_path)
                    .await?,
            )
        } else {
            None
        };
        Ok(Self { file })
    }

    fn print(text: &str) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}")?;
        stdout.flush()
    }
}

#[async_trait]
impl MetricsSink for MonitoringSink {
    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        Self::print(line)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(format!("{line}\n").as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn write_raw(&mut self, raw: &str) -> std::io::Result<()> {
        Self::print(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_appends_and_flushes_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Monitoring.log");
        std::fs::write(&path, "earlier\n").unwrap();
        let config = MonitoringConfig {
            log_path: path.clone(),
            save_to_file: true,
            raw_output: false,
        };

        let mut sink = MonitoringSink::open(&config).await.unwrap();
        sink.write_line("first").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nfirst\n");

        sink.write_raw("{\"raw\": true}").await.unwrap();
        sink.write_line("second").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier\nfirst\nsecond\n"
        );
    }

    #[tokio::test]
    async fn test_no_file_when_saving_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Monitoring.log");
        let config = MonitoringConfig {
            log_path: path.clone(),
            save_to_file: false,
            raw_output: false,
        };

        let mut sink = MonitoringSink::open(&config).await.unwrap();
        sink.write_line("only stdout").await.unwrap();
        assert!(!path.exists());
    }
}
