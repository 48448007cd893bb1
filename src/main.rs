use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use notion_imagegen::config::{self, CliOverrides};
use notion_imagegen::pipeline::Pipeline;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Generate images for Notion records missing one and write them back"
)]
struct Args {
    /// Path to YAML config file (defaults to ./config.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum records processed in this run
    #[arg(long)]
    max_per_run: Option<usize>,

    /// Concurrent generation requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Generate and report only; leave the records untouched
    #[arg(long)]
    no_write_back: bool,

    /// Only process records whose status equals this value
    #[arg(long)]
    only_status: Option<String>,

    /// Where to write the JSON report
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;
    cfg.apply_cli(CliOverrides {
        max_per_run: args.max_per_run,
        concurrency: args.concurrency,
        no_write_back: args.no_write_back,
        only_status: args.only_status,
        report_path: args.report.map(|p| p.to_string_lossy().into_owned()),
    });
    let pipeline = Pipeline::from_config(&cfg)?;

    let run_id = Uuid::new_v4();
    info!(%run_id, "starting image generation run");
    let report = pipeline.run(run_id).await?;
    report.persist(Path::new(&cfg.app.report_path)).await;

    info!(
        processed = report.processed,
        succeeded = report.succeeded,
        failed = report.failed,
        "done"
    );
    Ok(())
}
