use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use agripipe_core::context::PipelineContext;
use agripipe_core::{ingestion, loader, quality, transformation};

/// Batch pipeline for agricultural IoT sensor readings.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest new raw files: schema gate, profiling, checkpointing.
    Ingest,
    /// Clean, calibrate, and derive features over ingested files.
    ///
    /// The rolling average uses a 7-row trailing window, not 7 calendar
    /// days.
    Transform,
    /// Run data quality checks and write the consolidated report.
    Validate,
    /// Publish transformed files into the partitioned analytics dataset.
    Load,
    /// Run ingest, transform, validate, and load in order.
    RunAll,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = PipelineContext::from_env().context("failed to load pipeline configuration")?;
    ctx.ensure_directories()
        .context("failed to create pipeline directories")?;

    match cli.command {
        Command::Ingest => run_ingest(&ctx),
        Command::Transform => run_transform(&ctx),
        Command::Validate => run_validate(&ctx),
        Command::Load => run_load(&ctx),
        Command::RunAll => {
            run_ingest(&ctx)?;
            run_transform(&ctx)?;
            run_validate(&ctx)?;
            run_load(&ctx)
        }
    }
}

fn run_ingest(ctx: &PipelineContext) -> Result<()> {
    info!("starting ingestion phase");
    let summary = ingestion::run(ctx).context("ingestion stage failed")?;
    info!(
        ingested = summary.ingested,
        quarantined = summary.quarantined,
        failed = summary.failed,
        "ingestion phase finished"
    );
    Ok(())
}

fn run_transform(ctx: &PipelineContext) -> Result<()> {
    info!("starting transformation phase");
    let summary = transformation::run(ctx).context("transformation stage failed")?;
    info!(
        transformed = summary.transformed,
        failed = summary.failed,
        "transformation phase finished"
    );
    Ok(())
}

fn run_validate(ctx: &PipelineContext) -> Result<()> {
    info!("starting data quality validation phase");
    let reports = quality::run(ctx).context("validation stage failed")?;
    info!(files = reports.len(), "validation phase finished");
    Ok(())
}

fn run_load(ctx: &PipelineContext) -> Result<()> {
    info!("starting load phase");
    let summary = loader::run(ctx).context("load stage failed")?;
    info!(
        files = summary.files_loaded,
        partitions = summary.partitions_written,
        "load phase finished"
    );
    Ok(())
}
