//! Observer trait for pipeline events.
//!
//! Inject an [`Arc<dyn SearchifyObserver>`] via
//! [`crate::config::SearchifyConfigBuilder::observer`] to receive an event at
//! every stage boundary: document start, each page stage start/finish, each
//! assembly step start/finish, and document completion. Finish events carry
//! the elapsed wall-clock time of the step.
//!
//! The observer is purely informational. The pipeline never reads anything
//! back from it, so having no observer (the default) changes nothing about
//! the result.
//!
//! # Example
//!
//! ```rust
//! use pdfsearchify::{PipelineEvent, SearchifyConfig, SearchifyObserver};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl SearchifyObserver for Printer {
//!     fn on_event(&self, event: &PipelineEvent) {
//!         if let Some(elapsed) = event.elapsed() {
//!             eprintln!("{} after {:?}", event.name(), elapsed);
//!         }
//!     }
//! }
//!
//! let config = SearchifyConfig::builder()
//!     .observer(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::page::{Classification, Stage};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Document-level steps that run after the page barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStep {
    ComposeBitonal,
    ComposeColor,
    Merge,
    AddText,
    RestoreMetadata,
}

impl AssemblyStep {
    pub fn started_event(self) -> &'static str {
        match self {
            AssemblyStep::ComposeBitonal => "composeJBIG2",
            AssemblyStep::ComposeColor => "composeJPEG",
            AssemblyStep::Merge => "mergePDF",
            AssemblyStep::AddText => "addText",
            AssemblyStep::RestoreMetadata => "restoreMetadata",
        }
    }

    pub fn finished_event(self) -> &'static str {
        match self {
            AssemblyStep::ComposeBitonal => "composedJBIG2",
            AssemblyStep::ComposeColor => "composedJPEG",
            AssemblyStep::Merge => "mergedPDF",
            AssemblyStep::AddText => "textAdded",
            AssemblyStep::RestoreMetadata => "metadataRestored",
        }
    }
}

impl fmt::Display for AssemblyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssemblyStep::ComposeBitonal => "bitonal compose",
            AssemblyStep::ComposeColor => "color compose",
            AssemblyStep::Merge => "merge",
            AssemblyStep::AddText => "text overlay",
            AssemblyStep::RestoreMetadata => "metadata restore",
        })
    }
}

/// A stage-boundary notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Start {
        input: PathBuf,
        output: PathBuf,
    },
    PageStarted {
        page: usize,
    },
    StageStarted {
        page: usize,
        stage: Stage,
    },
    StageFinished {
        page: usize,
        stage: Stage,
        elapsed: Duration,
    },
    PageFinished {
        page: usize,
        classification: Classification,
        elapsed: Duration,
    },
    AssemblyStarted {
        step: AssemblyStep,
    },
    AssemblyFinished {
        step: AssemblyStep,
        /// False when the step had nothing to do (empty stream, pass-through merge).
        produced: bool,
        elapsed: Duration,
    },
    Done {
        output: PathBuf,
        elapsed: Duration,
    },
}

impl PipelineEvent {
    /// The wire name of the event (`start`, `extractPNM`, `PNMExtracted`, …).
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Start { .. } => "start",
            PipelineEvent::PageStarted { .. } => "startPage",
            PipelineEvent::StageStarted { stage, .. } => stage.started_event(),
            PipelineEvent::StageFinished { stage, .. } => stage.finished_event(),
            PipelineEvent::PageFinished { .. } => "donePage",
            PipelineEvent::AssemblyStarted { step } => step.started_event(),
            PipelineEvent::AssemblyFinished { step, .. } => step.finished_event(),
            PipelineEvent::Done { .. } => "done",
        }
    }

    /// The page this event belongs to, for page-scoped events.
    pub fn page(&self) -> Option<usize> {
        match self {
            PipelineEvent::PageStarted { page }
            | PipelineEvent::StageStarted { page, .. }
            | PipelineEvent::StageFinished { page, .. }
            | PipelineEvent::PageFinished { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Elapsed time, present on every completion event.
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            PipelineEvent::StageFinished { elapsed, .. }
            | PipelineEvent::PageFinished { elapsed, .. }
            | PipelineEvent::AssemblyFinished { elapsed, .. }
            | PipelineEvent::Done { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }
}

/// Receives pipeline events.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` page events
/// arrive from several tasks at once, interleaved in completion order.
pub trait SearchifyObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent) {
        let _ = event;
    }
}

/// Discards every event. Used when no observer is configured.
pub struct NoopObserver;

impl SearchifyObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::SearchifyConfig`].
pub type Observer = Arc<dyn SearchifyObserver>;
