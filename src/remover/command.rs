//! Removal capability backed by an external program
//!
//! The program is given an input path and an output path, for example the
//! `imgly-bgremove` command-line tool:
//!
//! ```text
//! imgly-bgremove /tmp/xyz/input.jpg --output /tmp/xyz/output.png
//! ```

use super::{BackgroundRemover, ProcessedImage, DEFAULT_OUTPUT_MEDIA_TYPE};
use crate::types::FileCandidate;
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Placeholder replaced by the input file path
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the output file path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

const OUTPUT_FILE_NAME: &str = "output.png";

/// Runs an external command once per removal request
#[derive(Debug, Clone)]
pub struct CommandRemover {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl CommandRemover {
    /// Create a remover with the default argument template
    /// `{input} --output {output}`
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map_or_else(|| "command".to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            program,
            args: vec![
                INPUT_PLACEHOLDER.to_string(),
                "--output".to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
            ],
            name,
        }
    }

    /// Replace the argument template
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Expand placeholders in the argument template
    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

/// File extension matching a declared media type, used for the scratch input
fn input_extension(media_type: &str) -> &'static str {
    image::ImageFormat::from_mime_type(media_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("img")
}

#[async_trait]
impl BackgroundRemover for CommandRemover {
    async fn remove(&self, file: &FileCandidate) -> anyhow::Result<ProcessedImage> {
        let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
        let input = scratch
            .path()
            .join(format!("input.{}", input_extension(&file.media_type)));
        let output = scratch.path().join(OUTPUT_FILE_NAME);

        tokio::fs::write(&input, &file.bytes)
            .await
            .with_context(|| format!("failed to write scratch input {}", input.display()))?;

        let args = self.expand_args(&input, &output);
        tracing::debug!(program = %self.program.display(), ?args, "Running removal command");

        let result = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            );
        }

        let bytes = tokio::fs::read(&output).await.with_context(|| {
            format!(
                "{} did not produce {}",
                self.program.display(),
                output.display()
            )
        })?;

        Ok(ProcessedImage::new(bytes, DEFAULT_OUTPUT_MEDIA_TYPE))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
