///
/// This module implements the CLI interface for dicom-ingest: command
/// parsing, wiring collaborators together and printing batch results.
///
/// All grouping, de-identification and upload logic lives in the
/// [`dicom-ingest-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `scan <paths>...` groups the selection into series and prints them.
/// - `upload --config <file> [--exclude <key>]... <paths>...` runs the full
///   pipeline against the configured endpoint (or the dry-run client).
///
/// For programmatic and integration use call [`run`] with a constructed
/// [`Cli`].
///
/// [`dicom-ingest-core`]: ../../dicom-ingest-core/
use crate::envelope::ElementIndexer;
use crate::load_config::load_config;
use crate::observer::TracingObserver;
use crate::upload::{DryRunUploader, HttpUploader};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use dicom_ingest_core::contract::SeriesUploader;
use dicom_ingest_core::record::SeriesStatus;
use dicom_ingest_core::series::SeriesKey;
use dicom_ingest_core::source::LocalFileSource;
use dicom_ingest_core::{IngestConfig, IngestOrchestrator};
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for dicom-ingest: group DICOM files into series and upload them
/// de-identified.
#[derive(Parser)]
#[clap(
    name = "dicom-ingest",
    version,
    about = "Group DICOM files into series and upload them de-identified"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the series found in the given files and folders without uploading
    Scan {
        /// Files or folders to scan
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Upload every series found in the given files and folders
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Series key to leave out (repeatable)
        #[clap(long)]
        exclude: Vec<String>,
        /// Files or folders to upload
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn orchestrator(config: IngestConfig) -> IngestOrchestrator {
    IngestOrchestrator::new(
        config,
        Arc::new(LocalFileSource::new()),
        Arc::new(ElementIndexer::new()),
        Arc::new(TracingObserver),
    )
}

async fn ingest_paths(orchestrator: &mut IngestOrchestrator, paths: &[PathBuf]) -> Result<()> {
    let selection = try_join_all(paths.iter().map(LocalFileSource::entry))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read selection: {e}"))?;
    let summary = orchestrator.ingest(selection).await;
    println!(
        "{} files accepted, {} ignored, {} series",
        summary.files_accepted, summary.files_ignored, summary.series
    );
    for ignored in orchestrator.ignored() {
        println!("  ignored {}: {}", ignored.name, ignored.reason);
    }
    Ok(())
}

fn print_series(orchestrator: &IngestOrchestrator) {
    for record in orchestrator.series() {
        let expected = record
            .expected_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into());
        let description = record
            .first()
            .and_then(|f| f.metadata.series_description.clone())
            .unwrap_or_default();
        println!(
            "{}  {}/{} files  {} bytes  {}",
            record.key,
            record.members.len(),
            expected,
            record.accumulated_size,
            description
        );
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Scan { paths } => {
            tracing::info!(command = "scan", paths = paths.len(), "Scanning selection");
            let mut orchestrator = orchestrator(IngestConfig::default());
            ingest_paths(&mut orchestrator, &paths).await?;
            print_series(&orchestrator);
            Ok(())
        }
        Commands::Upload {
            config,
            exclude,
            paths,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "upload", paths = paths.len(), "Starting upload");

            let mut orchestrator = orchestrator(config.ingest.clone());
            ingest_paths(&mut orchestrator, &paths).await?;
            for key in exclude {
                if !orchestrator.set_included(&SeriesKey(key.clone()), false) {
                    tracing::warn!(key = %key, "Excluded key matches no series");
                }
            }
            print_series(&orchestrator);

            let uploader: Box<dyn SeriesUploader> = match config.upload.endpoint {
                Some(endpoint) if !config.upload.dry_run => Box::new(HttpUploader::new(endpoint)),
                _ => Box::new(DryRunUploader),
            };
            let report = orchestrator.commit(uploader.as_ref()).await;

            let mut failed = 0;
            for series in &report.series {
                println!(
                    "{}  {:?}  {}/{} uploaded",
                    series.key,
                    series.status,
                    series.uploaded(),
                    series.files.len()
                );
                if matches!(series.status, SeriesStatus::Failed(_)) {
                    failed += 1;
                }
            }
            if failed > 0 {
                tracing::error!(command = "upload", failed, "Upload finished with failures");
                bail!("{failed} series failed to upload");
            }
            tracing::info!(command = "upload", series = report.series.len(), "Upload complete");
            Ok(())
        }
    }
}
