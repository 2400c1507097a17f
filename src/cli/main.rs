//! Background Removal Studio CLI
//!
//! Command-line front end acting as the presentation layer for a single
//! image: it reads the file, drives the orchestrator, and downloads the
//! result.

use super::config::CliConfigBuilder;
use crate::{
    orchestrator::Orchestrator,
    services::{DirectorySink, TracingObserver},
    tracing_config::{TracingConfig, TracingFormat},
    types::{FileCandidate, SessionSnapshot, Status},
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Remove the background from one image and save the result
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-studio")]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Declared media type of the input (default: guessed from the extension)
    #[arg(long, value_name = "TYPE")]
    pub media_type: Option<String>,

    /// External removal program, e.g. imgly-bgremove
    #[arg(
        long,
        value_name = "PROGRAM",
        conflicts_with = "endpoint",
        required_unless_present = "endpoint"
    )]
    pub command: Option<PathBuf>,

    /// Argument template for --command; {input} and {output} are substituted (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true, requires = "command")]
    pub args: Vec<String>,

    /// HTTP endpoint accepting the raw image and returning the processed one
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Directory the result is downloaded into
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the download filename
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Process the image but skip the download
    #[arg(long)]
    pub no_download: bool,

    /// Hide the processing spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[cfg(feature = "tracing-json")]
    #[arg(long)]
    pub json_logs: bool,

    /// Write logs to this file instead of stderr
    #[cfg(feature = "tracing-files")]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let remover = CliConfigBuilder::remover_from_cli(&cli).context("Invalid removal capability")?;

    info!(
        input = %cli.input.display(),
        remover = %remover.name(),
        output_dir = %cli.output_dir.display(),
        "Starting background removal"
    );

    let orchestrator = Orchestrator::builder(remover)
        .config(config)
        .sink(Arc::new(DirectorySink::new(&cli.output_dir)))
        .observer(Arc::new(TracingObserver::new(cli.verbose > 0)))
        .build()
        .context("Failed to create orchestrator")?;

    let mut candidate = FileCandidate::from_path(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    if let Some(media_type) = &cli.media_type {
        candidate.media_type.clone_from(media_type);
    }
    debug!(media_type = %candidate.media_type, bytes = candidate.len(), "Input loaded");

    let start_time = Instant::now();
    if orchestrator.accept(Some(candidate)).is_err() {
        return Err(session_failure(&orchestrator.snapshot()));
    }

    let spinner = create_spinner(&cli);
    orchestrator.settle().await;
    spinner.finish_and_clear();

    let snapshot = orchestrator.snapshot();
    if snapshot.status != Status::Ready {
        return Err(session_failure(&snapshot));
    }

    if let Some(info) = snapshot.original_preview.as_ref().and_then(|p| p.info.as_ref()) {
        debug!(width = info.width, height = info.height, "Original image");
    }
    info!(
        "Background removed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    if cli.no_download {
        info!("Skipping download (--no-download)");
        return Ok(());
    }

    let saved = orchestrator.download().context("Failed to save result")?;
    println!("{}", saved.display());
    Ok(())
}

/// Error describing why the session ended without a result
fn session_failure(snapshot: &SessionSnapshot) -> anyhow::Error {
    let message = snapshot
        .error_message
        .clone()
        .unwrap_or_else(|| format!("session ended in state {}", snapshot.status));
    anyhow::anyhow!(message)
}

fn create_spinner(cli: &Cli) -> ProgressBar {
    if cli.no_progress {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Processing...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Initialize tracing based on CLI flags
fn init_tracing(cli: &Cli) -> Result<()> {
    #[allow(unused_mut)]
    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_run_id(uuid::Uuid::new_v4().to_string());

    #[cfg(feature = "tracing-json")]
    if cli.json_logs {
        config = config.with_format(TracingFormat::Json);
    }

    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::File(path.clone()));
    }

    config.init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_requires_a_capability() {
        assert!(Cli::try_parse_from(["bgremove-studio", "in.png"]).is_err());
        assert!(Cli::try_parse_from([
            "bgremove-studio",
            "in.png",
            "--command",
            "tool",
            "--endpoint",
            "http://localhost/remove"
        ])
        .is_err());
    }

    #[test]
    fn test_parses_command_with_args() {
        let cli = Cli::try_parse_from([
            "bgremove-studio",
            "in.png",
            "--command",
            "imgly-bgremove",
            "--arg",
            "{input}",
            "--arg",
            "-o",
            "--arg",
            "{output}",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.args, vec!["{input}", "-o", "{output}"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_session_failure_uses_error_message() {
        let snapshot = SessionSnapshot {
            generation: crate::types::Generation::INITIAL,
            status: Status::Failed,
            original_preview: None,
            processed_result: None,
            error_message: Some("Please select a valid image file".to_string()),
            failure_kind: Some(crate::types::FailureKind::Validation),
            downloaded: false,
        };
        assert_eq!(
            session_failure(&snapshot).to_string(),
            "Please select a valid image file"
        );
    }
}
