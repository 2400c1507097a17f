//! Test utilities and mock collaborators for exercising the orchestrator
//!
//! This module provides mock implementations of the removal capability, the
//! resource store, the download sink and the session observer, so that
//! orchestration behaviour can be tested without external programs or
//! services.

use crate::{
    error::{Result, StudioError},
    handle::{Blob, InMemoryResourceStore, ResourceHandle, ResourceStore},
    remover::{BackgroundRemover, ProcessedImage},
    services::{DownloadSink, SessionObserver, Transition},
    types::{FileCandidate, Generation, PreviewInfo, Status},
};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use std::{
    collections::HashMap,
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Encode a solid-colour PNG
#[must_use]
pub fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    buffer.into_inner()
}

/// How a [`MockRemover`] resolves
#[derive(Debug, Clone)]
enum MockBehavior {
    Succeed(Vec<u8>),
    /// Return the input bytes unchanged
    Echo,
    Fail(String),
    Panic,
}

/// Mock removal capability with controllable delay and outcome
#[derive(Debug, Clone)]
pub struct MockRemover {
    behavior: MockBehavior,
    delay: Duration,
    /// Per-input-size delays, used to make specific files slower than others
    delays_by_len: HashMap<usize, Duration>,
    failures_by_len: HashMap<usize, String>,
    calls: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<FileCandidate>>>,
}

impl MockRemover {
    /// Succeeds immediately with a small transparent PNG
    #[must_use]
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::Succeed(solid_png(4, 4, [0, 0, 0, 0])),
            delay: Duration::ZERO,
            delays_by_len: HashMap::new(),
            failures_by_len: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails with the given cause
    #[must_use]
    pub fn failing<S: Into<String>>(cause: S) -> Self {
        let mut remover = Self::new();
        remover.behavior = MockBehavior::Fail(cause.into());
        remover
    }

    /// Succeeds with the input bytes as output
    #[must_use]
    pub fn echo() -> Self {
        let mut remover = Self::new();
        remover.behavior = MockBehavior::Echo;
        remover
    }

    /// Panics inside `remove`
    #[must_use]
    pub fn panicking() -> Self {
        let mut remover = Self::new();
        remover.behavior = MockBehavior::Panic;
        remover
    }

    /// Succeed with the given output bytes
    #[must_use]
    pub fn with_output(mut self, bytes: Vec<u8>) -> Self {
        self.behavior = MockBehavior::Succeed(bytes);
        self
    }

    /// Wait this long before resolving
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wait `delay` for inputs of exactly `len` bytes
    #[must_use]
    pub fn with_delay_for_len(mut self, len: usize, delay: Duration) -> Self {
        self.delays_by_len.insert(len, delay);
        self
    }

    /// Fail with `cause` for inputs of exactly `len` bytes
    #[must_use]
    pub fn with_failure_for_len<S: Into<String>>(mut self, len: usize, cause: S) -> Self {
        self.failures_by_len.insert(len, cause.into());
        self
    }

    /// Number of `remove` invocations so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs received so far
    #[must_use]
    pub fn inputs(&self) -> Vec<FileCandidate> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Default for MockRemover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundRemover for MockRemover {
    async fn remove(&self, file: &FileCandidate) -> anyhow::Result<ProcessedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(file.clone());

        let delay = self
            .delays_by_len
            .get(&file.len())
            .copied()
            .unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(cause) = self.failures_by_len.get(&file.len()) {
            return Err(anyhow::anyhow!("{}", cause));
        }

        match &self.behavior {
            MockBehavior::Succeed(bytes) => Ok(ProcessedImage::png(bytes.clone())),
            MockBehavior::Echo => Ok(ProcessedImage::png(file.bytes.to_vec())),
            MockBehavior::Fail(cause) => Err(anyhow::anyhow!("{}", cause)),
            MockBehavior::Panic => panic!("mock remover panicked"),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Resource store that counts releases per handle and flags double releases
#[derive(Default)]
pub struct TrackingResourceStore {
    inner: InMemoryResourceStore,
    issued: Mutex<Vec<ResourceHandle>>,
    releases: Mutex<HashMap<ResourceHandle, usize>>,
    resolves_after_release: AtomicUsize,
}

impl TrackingResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handle issued so far, in order
    #[must_use]
    pub fn issued(&self) -> Vec<ResourceHandle> {
        self.issued.lock().unwrap().clone()
    }

    /// How many times `handle` was released (successfully or not)
    #[must_use]
    pub fn release_count(&self, handle: &ResourceHandle) -> usize {
        self.releases
            .lock()
            .unwrap()
            .get(handle)
            .copied()
            .unwrap_or(0)
    }

    /// Whether any handle was released more than once
    #[must_use]
    pub fn double_release_detected(&self) -> bool {
        self.releases.lock().unwrap().values().any(|&count| count > 1)
    }

    /// Resolve attempts on handles that had already been released
    #[must_use]
    pub fn resolves_after_release(&self) -> usize {
        self.resolves_after_release.load(Ordering::SeqCst)
    }
}

impl ResourceStore for TrackingResourceStore {
    fn create(&self, blob: Blob) -> ResourceHandle {
        let handle = self.inner.create(blob);
        self.issued.lock().unwrap().push(handle.clone());
        handle
    }

    fn resolve(&self, handle: &ResourceHandle) -> Result<Blob> {
        if self.release_count(handle) > 0 {
            self.resolves_after_release.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.resolve(handle)
    }

    fn release(&self, handle: &ResourceHandle) -> Result<()> {
        *self
            .releases
            .lock()
            .unwrap()
            .entry(handle.clone())
            .or_insert(0) += 1;
        self.inner.release(handle)
    }

    fn live_count(&self) -> usize {
        self.inner.live_count()
    }
}

/// A save recorded by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSave {
    pub filename: String,
    pub blob: Blob,
}

/// Download sink that records saves instead of writing files
#[derive(Default)]
pub struct RecordingSink {
    saves: Mutex<Vec<RecordedSave>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next save fail with an I/O error
    pub fn fail_next<S: Into<String>>(&self, reason: S) {
        *self.fail_next.lock().unwrap() = Some(reason.into());
    }

    #[must_use]
    pub fn saves(&self) -> Vec<RecordedSave> {
        self.saves.lock().unwrap().clone()
    }
}

impl DownloadSink for RecordingSink {
    fn save(&self, filename: &str, blob: &Blob) -> Result<PathBuf> {
        if let Some(reason) = self.fail_next.lock().unwrap().take() {
            return Err(StudioError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                reason,
            )));
        }
        self.saves.lock().unwrap().push(RecordedSave {
            filename: filename.to_string(),
            blob: blob.clone(),
        });
        Ok(Path::new("/recorded").join(filename))
    }
}

/// Observer recording every notification
#[derive(Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<Transition>>,
    previews: Mutex<Vec<(Generation, PreviewInfo)>>,
    stale: Mutex<Vec<(Generation, Generation)>>,
    downloads: Mutex<Vec<PathBuf>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions.lock().unwrap().clone()
    }

    /// Status sequence starting from the first recorded `from` state
    #[must_use]
    pub fn status_sequence(&self) -> Vec<Status> {
        let transitions = self.transitions.lock().unwrap();
        let mut sequence: Vec<Status> = transitions.first().map(|t| t.from).into_iter().collect();
        sequence.extend(transitions.iter().map(|t| t.to));
        sequence
    }

    #[must_use]
    pub fn previews(&self) -> Vec<(Generation, PreviewInfo)> {
        self.previews.lock().unwrap().clone()
    }

    #[must_use]
    pub fn stale_results(&self) -> Vec<(Generation, Generation)> {
        self.stale.lock().unwrap().clone()
    }

    #[must_use]
    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_transition(&self, transition: &Transition) {
        self.transitions.lock().unwrap().push(transition.clone());
    }

    fn on_preview(&self, generation: Generation, info: &PreviewInfo) {
        self.previews.lock().unwrap().push((generation, info.clone()));
    }

    fn on_stale_result(&self, stale: Generation, current: Generation) {
        self.stale.lock().unwrap().push((stale, current));
    }

    fn on_download(&self, _generation: Generation, path: &Path) {
        self.downloads.lock().unwrap().push(path.to_path_buf());
    }
}
