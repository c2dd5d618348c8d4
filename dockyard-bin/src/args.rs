use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre;
use dockyard_orchestrator::MonitoringConfig;

/// Builds an image, runs a number of containers from it and streams their
/// resource usage and logs until interrupted.
#[derive(Parser, Debug)]
#[command(name = "dockyard", version, about, long_about = None)]
pub struct Cli {
    /// Tag to give the image. Prefer <name>:latest.
    #[arg(short = 'i', long, env = "DOCKYARD_IMAGE", default_value = "simple_flask:latest")]
    pub image_name: String,

    /// Number of containers to run.
    #[arg(short = 'n', long, default_value_t = 3)]
    pub container_number: usize,

    /// Host port of each container, one per container.
    #[arg(short = 'p', long, value_delimiter = ',', default_values_t = [5001u16, 5002, 5003])]
    pub container_ports: Vec<u16>,

    /// Name of each container. Generated by the engine when omitted.
    #[arg(long, value_delimiter = ',')]
    pub container_names: Vec<String>,

    /// Directory holding the Dockerfile.
    #[arg(long, default_value = "docker_image_files")]
    pub context: PathBuf,

    /// JSON file with `orchestrator` and `monitoring` sections.
    #[arg(short, long, env = "DOCKYARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Monitoring log path, overriding the config file.
    #[arg(long)]
    pub monitoring_log: Option<PathBuf>,

    /// Print samples to stdout only.
    #[arg(long)]
    pub no_save: bool,

    /// Print each raw stats document before its sample.
    #[arg(long)]
    pub raw_output: bool,
}

impl Cli {
    pub fn validate(&self) -> eyre::Result<()> {
        let names_mismatch =
            !self.container_names.is_empty() && self.container_names.len() != self.container_number;
        if self.container_ports.len() != self.container_number || names_mismatch {
            eyre::bail!("Number of containers, ports and names must be the same.");
        }
        Ok(())
    }

    /// Applies the command-line overrides on top of `base`.
    pub fn monitoring_config(&self, mut base: MonitoringConfig) -> MonitoringConfig {
        if let Some(path) = &self.monitoring_log {
            base.log_path = path.clone();
        }
        if self.no_save {
            base.save_to_file = false;
        }
        if self.raw_output {
            base.raw_output = true;
        }
        base
    }

    pub fn container_name(&self, index: usize) -> Option<&str> {
        self.container_names.get(index).map(String::as_str)
    }
}
