//! Configuration types for the processing orchestrator

use crate::error::{Result, StudioError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Canonical filename used when saving a processed result
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "background-removed.png";

/// User-facing message shown when intake validation fails
pub const DEFAULT_VALIDATION_MESSAGE: &str = "Please select a valid image file";

/// User-facing message shown when the removal capability fails
pub const DEFAULT_PROCESSING_MESSAGE: &str = "Failed to process image. Please try another image";

/// Configuration for the processing orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Filename handed to the download sink
    pub download_filename: String,

    /// Message stored on the session when a candidate is rejected at intake
    pub validation_message: String,

    /// Message stored on the session when the capability fails
    pub processing_message: String,

    /// Reject candidates larger than this many bytes (None = unlimited)
    pub max_input_bytes: Option<u64>,

    /// Decode the source image to attach preview metadata
    pub decode_preview: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            download_filename: DEFAULT_DOWNLOAD_FILENAME.to_string(),
            validation_message: DEFAULT_VALIDATION_MESSAGE.to_string(),
            processing_message: DEFAULT_PROCESSING_MESSAGE.to_string(),
            max_input_bytes: None,
            decode_preview: true,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_studio::OrchestratorConfig;
    ///
    /// let config = OrchestratorConfig::builder()
    ///     .download_filename("cutout.png")
    ///     .max_input_bytes(20 * 1024 * 1024)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.download_filename, "cutout.png");
    /// ```
    #[must_use]
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The loaded configuration is
    /// validated before it is returned.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StudioError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            StudioError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - Download filename: non-empty, no path separators
    /// - Messages: non-empty, validation and processing messages must differ
    /// - Input limit: when set, at least one byte
    pub fn validate(&self) -> Result<()> {
        let filename = self.download_filename.trim();
        if filename.is_empty() {
            return Err(StudioError::invalid_config("download filename is empty"));
        }
        if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
            return Err(StudioError::invalid_config(format!(
                "download filename '{}' must be a bare file name",
                self.download_filename
            )));
        }

        if self.validation_message.trim().is_empty() || self.processing_message.trim().is_empty() {
            return Err(StudioError::invalid_config(
                "validation and processing messages must not be empty",
            ));
        }
        if self.validation_message == self.processing_message {
            return Err(StudioError::invalid_config(
                "validation and processing messages must be distinct",
            ));
        }

        if let Some(limit) = self.max_input_bytes {
            if limit == 0 {
                return Err(StudioError::config_value_error(
                    "max_input_bytes",
                    limit,
                    "1..",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `OrchestratorConfig`
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    /// Set the download filename
    #[must_use]
    pub fn download_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.config.download_filename = filename.into();
        self
    }

    /// Set the validation failure message
    #[must_use]
    pub fn validation_message<S: Into<String>>(mut self, message: S) -> Self {
        self.config.validation_message = message.into();
        self
    }

    /// Set the processing failure message
    #[must_use]
    pub fn processing_message<S: Into<String>>(mut self, message: S) -> Self {
        self.config.processing_message = message.into();
        self
    }

    /// Limit accepted input size
    #[must_use]
    pub fn max_input_bytes(mut self, limit: u64) -> Self {
        self.config.max_input_bytes = Some(limit);
        self
    }

    /// Enable or disable preview decoding
    #[must_use]
    pub fn decode_preview(mut self, enabled: bool) -> Self {
        self.config.decode_preview = enabled;
        self
    }

    /// Build the configuration, validating it first
    pub fn build(self) -> Result<OrchestratorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
