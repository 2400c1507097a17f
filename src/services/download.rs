//! Download sink service
//!
//! This module separates the "save to the user's machine" side effect from
//! the orchestrator, making download behaviour testable.

use crate::{
    error::{Result, StudioError},
    handle::Blob,
};
use std::path::{Path, PathBuf};

/// Destination for client-side saves of processed results
pub trait DownloadSink: Send + Sync {
    /// Save `blob` under `filename`
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - Location the blob was written to
    /// * `Err(StudioError)` - The save did not happen
    fn save(&self, filename: &str, blob: &Blob) -> Result<PathBuf>;
}

/// Sink writing downloads into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    /// Create a sink writing into `directory`
    ///
    /// The directory is created on first save if it doesn't exist.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl DownloadSink for DirectorySink {
    fn save(&self, filename: &str, blob: &Blob) -> Result<PathBuf> {
        if filename.is_empty() || filename.contains(['/', '\\']) {
            return Err(StudioError::invalid_config(format!(
                "download filename '{}' must be a bare file name",
                filename
            )));
        }

        std::fs::create_dir_all(&self.directory).map_err(|e| {
            StudioError::file_io_error("create download directory", &self.directory, &e)
        })?;

        let path = self.directory.join(filename);
        std::fs::write(&path, &blob.bytes)
            .map_err(|e| StudioError::file_io_error("write download", &path, &e))?;

        log::debug!(
            "Saved {} bytes ({}) to {}",
            blob.len(),
            blob.media_type,
            path.display()
        );
        Ok(path)
    }
}
