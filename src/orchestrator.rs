//! Image intake and processing orchestration
//!
//! The [`Orchestrator`] owns the single active session and exposes the user
//! intents `accept`, `download` and `reset`. Asynchronous work (preview
//! decoding and the removal capability) is spawned on a tokio runtime and
//! tagged with the session's [`Generation`]; a result is applied only if its
//! generation is still current, so a superseded session can never overwrite
//! a newer one.
//!
//! ```text
//! Idle --accept(valid)--> Processing --success--> Ready --download--> Ready (consumed)
//!   |                         |
//!   +--accept(invalid)--> Failed <--failure--+
//! any --reset--> Idle        any --accept--> new session
//! ```

use crate::{
    config::OrchestratorConfig,
    error::{Result, StudioError},
    handle::{Blob, InMemoryResourceStore, ResourceHandle, ResourceStore},
    preview::decode_preview_async,
    remover::{BackgroundRemover, ProcessedImage},
    services::{DirectorySink, DownloadSink, SessionObserver, TracingObserver, Transition},
    tracing_config::{events, spans},
    types::{
        FailureKind, FileCandidate, Generation, OriginalPreview, PreviewInfo, SessionSnapshot,
        Status,
    },
};
use instant::Instant;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, warn, Instrument};

/// State of the one active session
#[derive(Default)]
struct Session {
    generation: Generation,
    status: Status,
    original: Option<OriginalPreview>,
    processed: Option<ResourceHandle>,
    downloaded: bool,
    failure: Option<(FailureKind, String)>,
    /// Transitions applied so far, across all generations
    sequence: u64,
}

impl Session {
    /// Release every handle owned by the session
    fn release_resources(&mut self, store: &dyn ResourceStore) {
        let handles = self
            .original
            .take()
            .map(|preview| preview.handle)
            .into_iter()
            .chain(self.processed.take());

        for handle in handles {
            if let Err(e) = store.release(&handle) {
                events::error_with_context(&e, "releasing session resource");
            }
        }
    }

    /// Start a new generation with no resources and no failure
    fn start_over(&mut self, store: &dyn ResourceStore) -> Generation {
        self.release_resources(store);
        self.generation = self.generation.next();
        self.downloaded = false;
        self.failure = None;
        self.generation
    }

    /// Record a status change; must be called with the session locked
    fn transition(&mut self, from: Status, to: Status) -> Transition {
        self.status = to;
        self.sequence += 1;
        Transition::new(self.generation, self.sequence, from, to)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            status: self.status,
            original_preview: self.original.clone(),
            processed_result: self.processed.clone(),
            error_message: self.failure.as_ref().map(|(_, message)| message.clone()),
            failure_kind: self.failure.as_ref().map(|(kind, _)| *kind),
            downloaded: self.downloaded,
        }
    }
}

struct Inner {
    config: OrchestratorConfig,
    remover: Arc<dyn BackgroundRemover>,
    store: Arc<dyn ResourceStore>,
    sink: Arc<dyn DownloadSink>,
    observer: Arc<dyn SessionObserver>,
    runtime: Handle,
    session: Mutex<Session>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

/// Processing orchestrator
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    remover: Arc<dyn BackgroundRemover>,
    config: OrchestratorConfig,
    store: Option<Arc<dyn ResourceStore>>,
    sink: Option<Arc<dyn DownloadSink>>,
    observer: Option<Arc<dyn SessionObserver>>,
    runtime: Option<Handle>,
}

impl OrchestratorBuilder {
    /// Start building an orchestrator around a removal capability
    pub fn new(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            remover,
            config: OrchestratorConfig::default(),
            store: None,
            sink: None,
            observer: None,
            runtime: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom handle store (default: [`InMemoryResourceStore`])
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Where downloads are saved (default: current directory)
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn DownloadSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Session observer (default: [`TracingObserver`])
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runtime used for asynchronous work (default: the current runtime)
    #[must_use]
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    /// - Invalid configuration
    /// - No runtime given and none is current
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| {
                StudioError::internal(format!("no tokio runtime available: {}", e))
            })?,
        };

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                remover: self.remover,
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(InMemoryResourceStore::new())),
                sink: self
                    .sink
                    .unwrap_or_else(|| Arc::new(DirectorySink::new("."))),
                observer: self
                    .observer
                    .unwrap_or_else(|| Arc::new(TracingObserver::new(false))),
                runtime,
                session: Mutex::new(Session::default()),
                pending: Mutex::new(Vec::new()),
            }),
        })
    }
}

impl Orchestrator {
    /// Create a builder around a removal capability
    pub fn builder(remover: Arc<dyn BackgroundRemover>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(remover)
    }

    /// Orchestrator with default collaborators on the current runtime
    pub fn new(remover: Arc<dyn BackgroundRemover>) -> Result<Self> {
        Self::builder(remover).build()
    }

    /// Accept a candidate from the input source
    ///
    /// Any active session is discarded first. Invalid or absent candidates
    /// move the session to `Failed` with the validation message; valid ones
    /// move it to `Processing` and start the removal in the background.
    ///
    /// # Returns
    /// * `Ok(Generation)` - token of the new processing session
    /// * `Err(StudioError::Validation)` - the candidate was rejected
    pub fn accept(&self, candidate: Option<FileCandidate>) -> Result<Generation> {
        let inner = &self.inner;
        let validated = self.validate(candidate);

        let mut session = inner.lock_session();
        let from = session.status;
        let generation = session.start_over(&*inner.store);

        let file = match validated {
            Ok(file) => file,
            Err((reason, media_type)) => {
                session.failure = Some((
                    FailureKind::Validation,
                    inner.config.validation_message.clone(),
                ));
                let transition = session.transition(from, Status::Failed);
                drop(session);

                events::candidate_rejected(&reason, media_type.as_deref());
                inner.observer.on_transition(&transition);
                return Err(StudioError::validation(reason));
            },
        };

        let preview_handle = inner
            .store
            .create(Blob::new(file.bytes.clone(), file.media_type.clone()));
        session.original = Some(OriginalPreview {
            handle: preview_handle,
            info: None,
        });
        let transition = session.transition(from, Status::Processing);
        drop(session);

        info!(
            generation = %generation,
            file = %file.display_name(),
            bytes = file.len(),
            media_type = %file.media_type,
            "Accepted image"
        );
        inner.observer.on_transition(&transition);

        self.spawn_session(generation, file);
        Ok(generation)
    }

    /// Save the processed result and release its handle
    ///
    /// The result can be downloaded once per session; accept a new file to
    /// download again.
    ///
    /// # Errors
    /// - Usage error when the session is not `Ready` or was already downloaded
    /// - Sink errors; the result is kept so the download can be retried
    pub fn download(&self) -> Result<PathBuf> {
        let inner = &self.inner;
        let (generation, handle, blob) = {
            let session = inner.lock_session();
            if session.status != Status::Ready {
                return Err(StudioError::usage(format!(
                    "download requires a ready result (status: {})",
                    session.status
                )));
            }
            let Some(handle) = session.processed.clone() else {
                return Err(StudioError::usage(
                    "the processed result was already downloaded; accept a new image first",
                ));
            };
            let blob = inner.store.resolve(&handle)?;
            (session.generation, handle, blob)
        };

        // The sink may block on I/O; the session lock is not held here.
        let path = inner.sink.save(&inner.config.download_filename, &blob)?;

        let mut session = inner.lock_session();
        if session.generation != generation {
            // Superseded while saving; start_over already released the handle
            drop(session);
            debug!(generation = %generation, path = %path.display(), "Session changed during download");
            return Ok(path);
        }
        if session.processed.as_ref() != Some(&handle) {
            return Err(StudioError::usage(
                "the processed result was already downloaded; accept a new image first",
            ));
        }

        if let Err(e) = inner.store.release(&handle) {
            events::error_with_context(&e, "releasing downloaded result");
        }
        session.processed = None;
        session.downloaded = true;
        drop(session);

        inner.observer.on_download(generation, &path);
        Ok(path)
    }

    /// Discard the session and return to `Idle`
    ///
    /// Idempotent; results of in-flight work are discarded when they arrive.
    pub fn reset(&self) {
        let inner = &self.inner;
        let mut session = inner.lock_session();
        let from = session.status;
        if from == Status::Idle {
            return;
        }

        let generation = session.start_over(&*inner.store);
        let transition = session.transition(from, Status::Idle);
        drop(session);

        debug!(generation = %generation, from = %from, "Session reset");
        inner.observer.on_transition(&transition);
    }

    /// Current state for the presentation layer
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock_session().snapshot()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> Status {
        self.inner.lock_session().status
    }

    /// Read the data behind a handle issued by this orchestrator
    ///
    /// # Errors
    /// - Usage error if the handle has been released
    pub fn resolve(&self, handle: &ResourceHandle) -> Result<Blob> {
        self.inner.store.resolve(handle)
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Wait until all spawned work, including superseded sessions, has finished
    pub async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.lock_pending());
            if tasks.is_empty() {
                break;
            }
            for result in futures::future::join_all(tasks).await {
                if let Err(e) = result {
                    error!(error = %e, "Session task ended abnormally");
                }
            }
        }
    }

    /// Intake checks; no resources are allocated here
    fn validate(
        &self,
        candidate: Option<FileCandidate>,
    ) -> std::result::Result<FileCandidate, (String, Option<String>)> {
        let Some(file) = candidate else {
            return Err(("no file was provided".to_string(), None));
        };

        if !file.declares_image() {
            return Err((
                format!("'{}' is not an image media type", file.media_type),
                Some(file.media_type),
            ));
        }

        if file.is_empty() {
            return Err(("file is empty".to_string(), Some(file.media_type)));
        }

        if let Some(limit) = self.inner.config.max_input_bytes {
            if file.len() as u64 > limit {
                return Err((
                    format!("file is {} bytes, limit is {}", file.len(), limit),
                    Some(file.media_type),
                ));
            }
        }

        Ok(file)
    }

    fn spawn_session(&self, generation: Generation, file: FileCandidate) {
        let span = spans::session(generation, file.display_name(), self.inner.remover.name());
        let this = self.clone();
        let task = self
            .inner
            .runtime
            .spawn(async move { this.run_session(generation, file).await }.instrument(span));

        let mut pending = self.inner.lock_pending();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    /// Decode the preview and run the capability concurrently
    async fn run_session(&self, generation: Generation, file: FileCandidate) {
        let preview = async {
            if !self.inner.config.decode_preview {
                return;
            }
            let span = spans::preview(file.len());
            match decode_preview_async(file.bytes.clone()).instrument(span).await {
                Ok(info) => self.apply_preview(generation, info),
                Err(e) => warn!(generation = %generation, error = %e, "Preview decoding failed"),
            }
        };

        let removal = async {
            let outcome = self.invoke_remover(&file).await;
            self.apply_outcome(generation, outcome);
        };

        tokio::join!(preview, removal);
    }

    /// Run the capability on its own task so a panic becomes a failure
    async fn invoke_remover(&self, file: &FileCandidate) -> anyhow::Result<ProcessedImage> {
        let remover = Arc::clone(&self.inner.remover);
        let input = file.clone();
        let span = spans::removal(remover.name(), file.len());
        let start = Instant::now();

        let joined = self
            .inner
            .runtime
            .spawn(async move { remover.remove(&input).await }.instrument(span))
            .await;

        events::performance_metric("background_removal", start.elapsed().as_millis() as u64);

        match joined {
            Ok(Ok(image)) if image.bytes.is_empty() => {
                Err(anyhow::anyhow!("capability returned an empty image"))
            },
            Ok(outcome) => outcome,
            Err(e) => Err(anyhow::anyhow!("capability task aborted: {}", e)),
        }
    }

    fn apply_preview(&self, generation: Generation, info: PreviewInfo) {
        let inner = &self.inner;
        let mut session = inner.lock_session();
        if session.generation != generation {
            return;
        }
        let Some(original) = session.original.as_mut() else {
            return;
        };
        original.info = Some(info.clone());
        drop(session);

        inner.observer.on_preview(generation, &info);
    }

    fn apply_outcome(&self, generation: Generation, outcome: anyhow::Result<ProcessedImage>) {
        let inner = &self.inner;
        let mut session = inner.lock_session();

        if session.generation != generation || session.status != Status::Processing {
            let current = session.generation;
            drop(session);
            debug!(
                stale = %generation,
                current = %current,
                succeeded = outcome.is_ok(),
                "Discarding superseded result"
            );
            inner.observer.on_stale_result(generation, current);
            return;
        }

        let to = match outcome {
            Ok(image) => {
                let handle = inner
                    .store
                    .create(Blob::new(image.bytes, image.media_type));
                session.processed = Some(handle);
                Status::Ready
            },
            Err(cause) => {
                events::removal_failed(inner.remover.name(), &cause);
                session.failure = Some((
                    FailureKind::Processing,
                    inner.config.processing_message.clone(),
                ));
                Status::Failed
            },
        };
        let transition = session.transition(Status::Processing, to);
        drop(session);

        inner.observer.on_transition(&transition);
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
