//! Error handling and edge cases
//!
//! Invalid intents, resource release guarantees and misbehaving
//! collaborators.

use bgremove_studio::{
    error::StudioError,
    handle::{Blob, ResourceStore},
    services::DownloadSink,
    test_utils::{
        solid_png, MockRemover, RecordingObserver, RecordingSink, TrackingResourceStore,
    },
    FailureKind, FileCandidate, Orchestrator, OrchestratorConfig, Status,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn build(
    remover: MockRemover,
) -> (
    Orchestrator,
    Arc<TrackingResourceStore>,
    Arc<RecordingSink>,
    Arc<RecordingObserver>,
) {
    let store = Arc::new(TrackingResourceStore::new());
    let sink = Arc::new(RecordingSink::new());
    let observer = Arc::new(RecordingObserver::new());
    let orchestrator = Orchestrator::builder(Arc::new(remover))
        .store(store.clone())
        .sink(sink.clone())
        .observer(observer.clone())
        .build()
        .unwrap();
    (orchestrator, store, sink, observer)
}

fn png() -> FileCandidate {
    FileCandidate::new("image/png", solid_png(8, 8, [10, 200, 10, 255])).with_name("leaf.png")
}

#[tokio::test(start_paused = true)]
async fn test_invalid_candidates_fail_validation() {
    let (orchestrator, store, _, _) = build(MockRemover::new());

    let candidates = vec![
        None,
        Some(FileCandidate::new("text/plain", b"plain".to_vec())),
        Some(FileCandidate::new("application/pdf", b"%PDF-1.7".to_vec())),
        Some(FileCandidate::new("", b"x".to_vec())),
        Some(FileCandidate::new("image/", b"x".to_vec())),
        Some(FileCandidate::new("image/png", Vec::new())),
    ];

    for candidate in candidates {
        let result = orchestrator.accept(candidate);
        assert!(matches!(result, Err(StudioError::Validation(_))));

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.failure_kind, Some(FailureKind::Validation));
        assert!(snapshot.error_message.is_some());
        assert!(snapshot.original_preview.is_none());
    }

    orchestrator.settle().await;
    assert!(store.issued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_accept_releases_prior_session() {
    let (orchestrator, store, _, _) = build(MockRemover::new());

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let snapshot = orchestrator.snapshot();
    let preview = snapshot.original_preview.unwrap().handle;
    let result = snapshot.processed_result.unwrap();

    assert!(orchestrator
        .accept(Some(FileCandidate::new("text/plain", b"oops".to_vec())))
        .is_err());

    assert_eq!(store.release_count(&preview), 1);
    assert_eq!(store.release_count(&result), 1);
    assert_eq!(store.live_count(), 0);
    assert!(orchestrator.resolve(&result).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_oversized_input_is_rejected() {
    let store = Arc::new(TrackingResourceStore::new());
    let remover = MockRemover::new();
    let config = OrchestratorConfig::builder()
        .max_input_bytes(16)
        .build()
        .unwrap();
    let orchestrator = Orchestrator::builder(Arc::new(remover.clone()))
        .config(config)
        .store(store.clone())
        .build()
        .unwrap();

    let result = orchestrator.accept(Some(png()));
    assert!(matches!(result, Err(StudioError::Validation(_))));
    orchestrator.settle().await;
    assert_eq!(remover.call_count(), 0);
    assert!(store.issued().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reset_is_idempotent_from_every_state() {
    // Idle
    let (orchestrator, _, _, _) = build(MockRemover::new());
    orchestrator.reset();
    let first = orchestrator.snapshot();
    orchestrator.reset();
    assert_eq!(orchestrator.snapshot(), first);
    assert_eq!(first.status, Status::Idle);

    // Processing
    let (orchestrator, store, _, _) = build(MockRemover::new().with_delay(Duration::from_secs(1)));
    orchestrator.accept(Some(png())).unwrap();
    orchestrator.reset();
    let first = orchestrator.snapshot();
    orchestrator.reset();
    assert_eq!(orchestrator.snapshot(), first);
    orchestrator.settle().await;
    assert_eq!(orchestrator.snapshot(), first);
    assert!(!store.double_release_detected());

    // Ready
    let (orchestrator, store, _, _) = build(MockRemover::new());
    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let result = orchestrator.snapshot().processed_result.unwrap();
    orchestrator.reset();
    orchestrator.reset();
    assert_eq!(orchestrator.status(), Status::Idle);
    assert_eq!(store.release_count(&result), 1);
    assert!(!store.double_release_detected());

    // Failed
    let (orchestrator, _, _, observer) = build(MockRemover::failing("boom"));
    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    orchestrator.reset();
    let first = orchestrator.snapshot();
    orchestrator.reset();
    assert_eq!(orchestrator.snapshot(), first);
    assert!(first.error_message.is_none());
    assert_eq!(
        observer.status_sequence(),
        vec![Status::Idle, Status::Processing, Status::Failed, Status::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn test_download_rejected_outside_ready() {
    let (orchestrator, _, sink, _) =
        build(MockRemover::failing("nope").with_delay(Duration::from_millis(100)));

    // Idle
    let err = orchestrator.download().unwrap_err();
    assert!(err.is_usage());
    assert_eq!(orchestrator.status(), Status::Idle);

    // Processing
    orchestrator.accept(Some(png())).unwrap();
    let before = orchestrator.snapshot();
    assert!(orchestrator.download().unwrap_err().is_usage());
    assert_eq!(orchestrator.snapshot(), before);

    // Failed
    orchestrator.settle().await;
    let before = orchestrator.snapshot();
    assert_eq!(before.status, Status::Failed);
    assert!(orchestrator.download().unwrap_err().is_usage());
    assert_eq!(orchestrator.snapshot(), before);

    assert!(sink.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_download_is_rejected() {
    let (orchestrator, store, sink, _) = build(MockRemover::new());

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let result = orchestrator.snapshot().processed_result.unwrap();

    orchestrator.download().unwrap();
    let err = orchestrator.download().unwrap_err();
    assert!(err.is_usage());

    assert_eq!(sink.saves().len(), 1);
    assert_eq!(store.release_count(&result), 1);
    assert_eq!(store.resolves_after_release(), 0);
    assert!(!store.double_release_detected());
}

#[tokio::test(start_paused = true)]
async fn test_released_handles_are_never_dereferenced() {
    let (orchestrator, store, _, _) = build(MockRemover::new());

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    orchestrator.reset();

    // Download after reset must not touch the released result
    assert!(orchestrator.download().unwrap_err().is_usage());
    assert_eq!(store.resolves_after_release(), 0);
    assert!(!store.double_release_detected());

    for handle in store.issued() {
        assert_eq!(store.release_count(&handle), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_keeps_result_for_retry() {
    let (orchestrator, store, sink, observer) = build(MockRemover::new());

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let result = orchestrator.snapshot().processed_result.unwrap();

    sink.fail_next("disk full");
    let err = orchestrator.download().unwrap_err();
    assert!(matches!(err, StudioError::Io(_)));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(snapshot.processed_result.as_ref(), Some(&result));
    assert_eq!(store.release_count(&result), 0);
    assert!(observer.downloads().is_empty());

    orchestrator.download().unwrap();
    assert_eq!(sink.saves().len(), 1);
    assert_eq!(store.release_count(&result), 1);
}

/// Sink that calls back into the orchestrator while saving
#[derive(Default)]
struct ReentrantSink {
    orchestrator: Mutex<Option<Orchestrator>>,
    reset_during_save: bool,
    seen: Mutex<Vec<Status>>,
}

impl DownloadSink for ReentrantSink {
    fn save(&self, filename: &str, _blob: &Blob) -> bgremove_studio::Result<PathBuf> {
        let orchestrator = self.orchestrator.lock().unwrap().clone();
        if let Some(orchestrator) = orchestrator {
            self.seen.lock().unwrap().push(orchestrator.status());
            if self.reset_during_save {
                orchestrator.reset();
            }
        }
        Ok(PathBuf::from("/saved").join(filename))
    }
}

fn build_with_reentrant_sink(
    reset_during_save: bool,
) -> (
    Orchestrator,
    Arc<ReentrantSink>,
    Arc<TrackingResourceStore>,
    Arc<RecordingObserver>,
) {
    let sink = Arc::new(ReentrantSink {
        reset_during_save,
        ..ReentrantSink::default()
    });
    let store = Arc::new(TrackingResourceStore::new());
    let observer = Arc::new(RecordingObserver::new());
    let orchestrator = Orchestrator::builder(Arc::new(MockRemover::new()))
        .store(store.clone())
        .sink(sink.clone())
        .observer(observer.clone())
        .build()
        .unwrap();
    *sink.orchestrator.lock().unwrap() = Some(orchestrator.clone());
    (orchestrator, sink, store, observer)
}

#[tokio::test(start_paused = true)]
async fn test_session_is_readable_while_sink_saves() {
    let (orchestrator, sink, store, observer) = build_with_reentrant_sink(false);

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let result = orchestrator.snapshot().processed_result.unwrap();

    let path = orchestrator.download().unwrap();
    assert_eq!(path, PathBuf::from("/saved/background-removed.png"));
    assert_eq!(*sink.seen.lock().unwrap(), vec![Status::Ready]);
    assert_eq!(store.release_count(&result), 1);
    assert_eq!(observer.downloads(), vec![path]);
    assert!(orchestrator.snapshot().downloaded);
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_save_keeps_newer_session() {
    let (orchestrator, _sink, store, observer) = build_with_reentrant_sink(true);

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;
    let result = orchestrator.snapshot().processed_result.unwrap();

    // The file was written, but the session moved on before the save returned
    orchestrator.download().unwrap();

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, Status::Idle);
    assert!(!snapshot.downloaded);
    assert_eq!(store.release_count(&result), 1);
    assert!(!store.double_release_detected());
    assert!(observer.downloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_capability_becomes_processing_failure() {
    let (orchestrator, store, _, observer) = build(MockRemover::panicking());

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, Status::Failed);
    assert_eq!(snapshot.failure_kind, Some(FailureKind::Processing));
    assert_eq!(
        observer.status_sequence(),
        vec![Status::Idle, Status::Processing, Status::Failed]
    );

    // The orchestrator stays usable
    orchestrator.reset();
    assert_eq!(orchestrator.status(), Status::Idle);
    assert_eq!(store.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_capability_output_is_a_failure() {
    let (orchestrator, _, _, _) = build(MockRemover::new().with_output(Vec::new()));

    orchestrator.accept(Some(png())).unwrap();
    orchestrator.settle().await;

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, Status::Failed);
    assert_eq!(snapshot.failure_kind, Some(FailureKind::Processing));
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_image_still_reaches_capability() {
    let remover = MockRemover::new();
    let (orchestrator, _, _, observer) = build(remover.clone());

    // Declares an image but is not one; the capability decides
    let candidate = FileCandidate::new("image/png", b"definitely not a png".to_vec());
    orchestrator.accept(Some(candidate)).unwrap();
    orchestrator.settle().await;

    assert_eq!(remover.call_count(), 1);
    assert_eq!(orchestrator.status(), Status::Ready);
    assert!(observer.previews().is_empty());
    let preview = orchestrator.snapshot().original_preview.unwrap();
    assert!(preview.info.is_none());
}

#[test]
fn test_build_without_runtime_fails() {
    let result = Orchestrator::builder(Arc::new(MockRemover::new())).build();
    assert!(matches!(result, Err(StudioError::Internal(_))));
}

#[test]
fn test_build_with_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let orchestrator = Orchestrator::builder(Arc::new(MockRemover::new()))
        .runtime(runtime.handle().clone())
        .build()
        .unwrap();

    orchestrator.accept(Some(png())).unwrap();
    runtime.block_on(orchestrator.settle());
    assert_eq!(orchestrator.status(), Status::Ready);
}

#[test]
fn test_invalid_config_is_rejected_at_build() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut config = OrchestratorConfig::default();
    config.download_filename = "../escape.png".to_string();

    let result = Orchestrator::builder(Arc::new(MockRemover::new()))
        .config(config)
        .runtime(runtime.handle().clone())
        .build();
    assert!(matches!(result, Err(StudioError::InvalidConfig(_))));
}
