//! Background-removal capability abstraction
//!
//! The orchestrator treats background removal as a black box: a file-like
//! object goes in, a processed image comes out or the call fails with an
//! opaque error. No retry is attempted by the caller.

pub mod command;
pub mod http;

pub use command::CommandRemover;
pub use http::HttpRemover;

use crate::types::FileCandidate;
use async_trait::async_trait;

/// Media type assumed for capability output when none is reported
pub const DEFAULT_OUTPUT_MEDIA_TYPE: &str = "image/png";

/// Output resource produced by a removal capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Media type of `bytes`
    pub media_type: String,
}

impl ProcessedImage {
    pub fn new<S: Into<String>>(bytes: Vec<u8>, media_type: S) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Wrap PNG-encoded bytes
    #[must_use]
    pub fn png(bytes: Vec<u8>) -> Self {
        Self::new(bytes, DEFAULT_OUTPUT_MEDIA_TYPE)
    }
}

/// Asynchronous background-removal capability
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from `file`
    ///
    /// # Errors
    /// Any failure (decoding, network, internal) is reported as an opaque
    /// error; callers log it and never show it verbatim to the user.
    async fn remove(&self, file: &FileCandidate) -> anyhow::Result<ProcessedImage>;

    /// Short name used in logs and spans
    fn name(&self) -> &str;
}
