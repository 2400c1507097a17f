//! Service layer for the orchestrator's side effects
//!
//! Observation and download concerns are kept out of the state machine so
//! that frontends can plug in their own implementations.

pub mod download;
pub mod observer;

pub use download::{DirectorySink, DownloadSink};
pub use observer::{NoOpObserver, SessionObserver, TracingObserver, Transition};
