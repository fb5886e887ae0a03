use std::path::PathBuf;

use anyhow::Context;
use canny::pgm::{default_output_path, load_pgm, save_pgm};
use canny::{detect_edges, Partition, PipelineConfig, StagePartitions, WorkerKind};
use clap::Parser;
use common::log_setup::setup_logging;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "canny_edge")]
#[command(about = "Canny edge detection split between the host and a remote accelerator")]
#[command(version)]
struct Cli {
    /// Input PGM image
    image: PathBuf,

    /// Host share of the Gaussian stage, in percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    gaussian: u8,

    /// Host share of the derivative stage, in percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    derivative: u8,

    /// Host share of the magnitude stage, in percent
    #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
    magnitude: u8,

    /// YAML or JSON pipeline config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the writeback diagnostic before smoothing
    #[arg(long)]
    writeback: bool,

    /// Diff every stage against a single-agent scalar run
    #[arg(long)]
    verify: bool,

    #[arg(long, value_enum)]
    host_worker: Option<WorkerKind>,

    #[arg(long, value_enum)]
    remote_worker: Option<WorkerKind>,

    /// Output edge map, defaults to `<IMAGE>_out.pgm`
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        config.partitions = StagePartitions {
            gaussian: Partition::new(self.gaussian)?,
            derivative: Partition::new(self.derivative)?,
            magnitude: Partition::new(self.magnitude)?,
        };
        config.writeback |= self.writeback;
        config.verify |= self.verify;
        if let Some(worker) = self.host_worker {
            config.host_worker = worker;
        }
        if let Some(worker) = self.remote_worker {
            config.remote_worker = worker;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level).context("starting logger")?;

    let config = cli.pipeline_config()?;
    let image = load_pgm(&cli.image).context("reading input image")?;

    let detection = detect_edges(&image, &config)
        .await
        .context("edge detection failed")?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.image));
    save_pgm(&output, &detection.edges).context("writing edge map")?;

    let report = &detection.report;
    if report.writeback.is_some_and(|w| !w.is_clean()) {
        warn!("Writeback diagnostic reported mismatches");
    }
    if report.verification.iter().any(|d| !d.diff.is_exact()) {
        warn!("Split run diverged from the scalar reference");
    }
    info!("{}", report);
    info!("Edge map written to {}", output.display());

    Ok(())
}
