//! Core types shared by the orchestrator, its collaborators and the presentation layer

use crate::{
    error::{Result, StudioError},
    handle::ResourceHandle,
};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, sync::Arc};

/// Media type used when nothing better can be inferred
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// A file-like object coming from a picker or a drop
///
/// Only the declared media type and the raw bytes are relied upon; the name
/// is carried for diagnostics.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    /// Original file name, if the input source provided one
    pub name: Option<String>,
    /// Declared media type (e.g. `image/png`)
    pub media_type: String,
    /// Raw file contents
    pub bytes: Arc<[u8]>,
}

impl FileCandidate {
    /// Create a candidate from a declared media type and raw bytes
    pub fn new<S: Into<String>, B: Into<Arc<[u8]>>>(media_type: S, bytes: B) -> Self {
        Self {
            name: None,
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Attach a file name
    #[must_use]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Read a candidate from disk, guessing its media type from the extension
    ///
    /// Files with unknown extensions get `application/octet-stream`, which
    /// intake rejects as not being an image.
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StudioError::file_io_error("read input file", path, &e))?;

        let media_type = guess_media_type(path);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Ok(Self {
            name,
            media_type,
            bytes: bytes.into(),
        })
    }

    /// Size of the payload in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the declared media type names an image
    #[must_use]
    pub fn declares_image(&self) -> bool {
        is_image_media_type(&self.media_type)
    }

    /// Name used in logs
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Check whether a media type string names an image (`image/<subtype>`)
///
/// The comparison is case-insensitive and parameters such as `; charset=`
/// are ignored.
#[must_use]
pub fn is_image_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence.split_once('/') {
        Some((kind, subtype)) => kind.eq_ignore_ascii_case("image") && !subtype.trim().is_empty(),
        None => false,
    }
}

/// Guess a media type from a file extension
#[must_use]
pub fn guess_media_type(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MEDIA_TYPE.to_string())
}

/// Status of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No session; waiting for input
    Idle,
    /// The removal capability is running for the current session
    Processing,
    /// A processed result is available
    Ready,
    /// The session failed at intake or during processing
    Failed,
}

impl Default for Status {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Processing => write!(f, "processing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Version marker attached to asynchronous work at invocation time
///
/// A result is applied only if the generation it was started under is still
/// the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any session was started
    pub const INITIAL: Self = Self(0);

    /// The following generation
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw counter value
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Why the current session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Candidate missing or not an image
    Validation,
    /// The removal capability failed
    Processing,
}

/// Metadata obtained by decoding the source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewInfo {
    pub width: u32,
    pub height: u32,
    /// Detected container format, if recognised
    pub format: Option<image::ImageFormat>,
}

/// Addressable representation of the source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPreview {
    /// Handle addressing the raw source bytes
    pub handle: ResourceHandle,
    /// Decoded metadata, filled in once decoding completes
    pub info: Option<PreviewInfo>,
}

/// Read-only view of the session for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub generation: Generation,
    pub status: Status,
    pub original_preview: Option<OriginalPreview>,
    pub processed_result: Option<ResourceHandle>,
    pub error_message: Option<String>,
    pub failure_kind: Option<FailureKind>,
    /// The processed result was saved and its handle released
    pub downloaded: bool,
}

impl SessionSnapshot {
    /// Whether `download()` would currently succeed
    #[must_use]
    pub fn can_download(&self) -> bool {
        self.status == Status::Ready && self.processed_result.is_some()
    }
}
