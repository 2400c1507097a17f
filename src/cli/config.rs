//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::OrchestratorConfig,
    remover::{BackgroundRemover, CommandRemover, HttpRemover},
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Convert CLI arguments to orchestrator configuration and collaborators
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build `OrchestratorConfig` from the optional config file and flag overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<OrchestratorConfig> {
        let mut config = match &cli.config {
            Some(path) => OrchestratorConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => OrchestratorConfig::default(),
        };

        if let Some(filename) = &cli.filename {
            config.download_filename.clone_from(filename);
        }

        config.validate()?;
        Ok(config)
    }

    /// Pick the removal capability named on the command line
    pub(crate) fn remover_from_cli(cli: &Cli) -> Result<Arc<dyn BackgroundRemover>> {
        match (&cli.command, &cli.endpoint) {
            (Some(program), None) => {
                let mut remover = CommandRemover::new(program);
                if !cli.args.is_empty() {
                    remover = remover.with_args(cli.args.iter().cloned());
                }
                Ok(Arc::new(remover))
            },
            (None, Some(endpoint)) => {
                if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                    anyhow::bail!("endpoint must be an http(s) URL, got '{}'", endpoint);
                }
                Ok(Arc::new(HttpRemover::new(endpoint.clone())))
            },
            _ => anyhow::bail!("exactly one of --command or --endpoint is required"),
        }
    }
}
