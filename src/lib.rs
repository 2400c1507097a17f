#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal Studio
//!
//! Image intake and processing orchestration for background removal.
//!
//! A user submits an image (from a file picker or a drop), the image is run
//! through an external background-removal capability, and the result is
//! presented for download. This crate implements the state machine between
//! those steps:
//!
//! - **Validation**: only candidates declaring an `image/*` media type are
//!   accepted; everything else fails the session immediately
//! - **Resource lifetimes**: the source preview and the processed result are
//!   exposed as addressable handles that are released exactly once
//! - **Async coordination**: one capability call per accepted file, with
//!   generation tokens so that superseded results are discarded
//! - **User intents**: `accept`, `download` and `reset`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_studio::{CommandRemover, DirectorySink, FileCandidate, Orchestrator, Status};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::builder(Arc::new(CommandRemover::new("imgly-bgremove")))
//!     .sink(Arc::new(DirectorySink::new("downloads")))
//!     .build()?;
//!
//! let file = FileCandidate::from_path("portrait.jpg").await?;
//! orchestrator.accept(Some(file))?;
//! orchestrator.settle().await;
//!
//! if orchestrator.status() == Status::Ready {
//!     let saved = orchestrator.download()?;
//!     println!("saved to {}", saved.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): the `bgremove-studio` command-line front end
//! - `webp-support` (default): WebP preview decoding
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log output to a file

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod preview;
pub mod remover;
pub mod services;
pub mod test_utils;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder, DEFAULT_DOWNLOAD_FILENAME};
pub use error::{Result, StudioError};
pub use handle::{Blob, InMemoryResourceStore, ResourceHandle, ResourceStore, ResourceStoreStats};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use preview::decode_preview;
pub use remover::{BackgroundRemover, CommandRemover, HttpRemover, ProcessedImage};
pub use services::{
    DirectorySink, DownloadSink, NoOpObserver, SessionObserver, TracingObserver, Transition,
};
pub use types::{
    FailureKind, FileCandidate, Generation, OriginalPreview, PreviewInfo, SessionSnapshot, Status,
};

pub use tracing_config::{TracingConfig, TracingFormat, TracingOutput};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_compiles() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.download_filename, DEFAULT_DOWNLOAD_FILENAME);
    }
}
