//! Session observation service
//!
//! This module separates reporting of session transitions from the
//! orchestrator's business logic, allowing different frontends to react to
//! state changes in their own way.

use crate::types::{Generation, PreviewInfo, Status};
use chrono::{DateTime, Utc};
use std::path::Path;

/// A status change of the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Session the transition belongs to
    pub generation: Generation,
    /// Position in the orchestrator's transition history, starting at 1
    pub sequence: u64,
    pub from: Status,
    pub to: Status,
    /// When the transition was applied
    pub at: DateTime<Utc>,
}

impl Transition {
    #[must_use]
    pub fn new(generation: Generation, sequence: u64, from: Status, to: Status) -> Self {
        Self {
            generation,
            sequence,
            from,
            to,
            at: Utc::now(),
        }
    }

    /// Human-readable description of the transition
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self.to {
            Status::Idle => "Session reset",
            Status::Processing => "Removing background",
            Status::Ready => "Background removed",
            Status::Failed => "Session failed",
        }
    }
}

/// Trait for observing orchestrator sessions
///
/// Callbacks run on whichever task applied the change, after the session
/// lock has been dropped; implementations must not block.
///
/// On a multi-threaded runtime two transitions applied back to back (a
/// result arriving while `reset` runs, say) can reach the observer in either
/// order. `Transition::sequence` is assigned under the lock and reflects the
/// order in which they were applied.
pub trait SessionObserver: Send + Sync {
    /// A status transition was applied
    fn on_transition(&self, transition: &Transition);

    /// The original preview finished decoding
    fn on_preview(&self, generation: Generation, info: &PreviewInfo) {
        let _ = (generation, info);
    }

    /// A result arrived for a superseded session and was discarded
    fn on_stale_result(&self, stale: Generation, current: Generation) {
        let _ = (stale, current);
    }

    /// The processed result was saved
    fn on_download(&self, generation: Generation, path: &Path) {
        let _ = (generation, path);
    }
}

/// No-op observer that discards all notifications
pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {
    fn on_transition(&self, _transition: &Transition) {
        // Intentionally empty - discards transitions
    }
}

/// Observer that logs every notification through `tracing`
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    /// Create a new tracing observer
    ///
    /// # Arguments
    /// * `verbose` - Whether to log preview and stale-result details at info level
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl SessionObserver for TracingObserver {
    fn on_transition(&self, transition: &Transition) {
        tracing::info!(
            generation = %transition.generation,
            sequence = transition.sequence,
            from = %transition.from,
            to = %transition.to,
            "{}",
            transition.description()
        );
    }

    fn on_preview(&self, generation: Generation, info: &PreviewInfo) {
        if self.verbose {
            tracing::info!(
                generation = %generation,
                width = info.width,
                height = info.height,
                format = ?info.format,
                "Preview decoded"
            );
        } else {
            tracing::debug!(generation = %generation, width = info.width, height = info.height, "Preview decoded");
        }
    }

    fn on_stale_result(&self, stale: Generation, current: Generation) {
        if self.verbose {
            tracing::info!(stale = %stale, current = %current, "Discarded superseded result");
        } else {
            tracing::debug!(stale = %stale, current = %current, "Discarded superseded result");
        }
    }

    fn on_download(&self, generation: Generation, path: &Path) {
        tracing::info!(generation = %generation, path = %path.display(), "Result saved");
    }
}
