//! Error types for the pdfsearchify library.
//!
//! Three layers of failure, from the inside out:
//!
//! * [`ToolError`]: one external program (gs, convert, tesseract, pdftk,
//!   jbig2, …) exited non-zero or produced nothing we could use. Carries the
//!   operation name, how the process ended, and whatever it printed.
//!
//! * [`PageError`]: a page stage failed. Wraps the [`ToolError`] with the
//!   page number and the stage it happened in. Fatal to the page, and the
//!   document aborts once in-flight pages drain.
//!
//! * [`SearchifyError`]: fatal to the whole document. Returned as
//!   `Err(SearchifyError)` from [`crate::convert::searchify`]. There is no
//!   partial success: either the output file is written or it is not.

use crate::pipeline::page::{PageState, Stage};
use crate::progress::AssemblyStep;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The external capabilities the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PageCount,
    DumpMetadata,
    ExtractRaster,
    DetectColor,
    Deskew,
    Cleanup,
    Ocr,
    Resample,
    ComposeBitonal,
    ComposeColor,
    Merge,
    OverlayText,
    ApplyMetadata,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::PageCount => "page-count",
            Operation::DumpMetadata => "dump-metadata",
            Operation::ExtractRaster => "extract-raster",
            Operation::DetectColor => "detect-color",
            Operation::Deskew => "deskew",
            Operation::Cleanup => "cleanup",
            Operation::Ocr => "ocr",
            Operation::Resample => "resample",
            Operation::ComposeBitonal => "compose-bitonal",
            Operation::ComposeColor => "compose-color",
            Operation::Merge => "merge",
            Operation::OverlayText => "overlay-text",
            Operation::ApplyMetadata => "apply-metadata",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an external invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExitInfo {
    /// Process exited with a non-zero status.
    Code(i32),
    /// Process was killed by a signal (no exit code available).
    Terminated,
    /// The program could not be started at all.
    SpawnFailed(String),
    /// Exit status was zero but stdout could not be parsed.
    UnparseableOutput,
    /// Exit status was zero but the expected file never appeared.
    MissingOutput(PathBuf),
    /// The blocking worker running the tool panicked or was cancelled.
    Aborted(String),
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exit status {code}"),
            ExitInfo::Terminated => f.write_str("terminated by signal"),
            ExitInfo::SpawnFailed(reason) => write!(f, "could not start: {reason}"),
            ExitInfo::UnparseableOutput => f.write_str("unparseable output"),
            ExitInfo::MissingOutput(path) => write!(f, "no output at {}", path.display()),
            ExitInfo::Aborted(reason) => write!(f, "worker aborted: {reason}"),
        }
    }
}

/// An external operation failed.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed ({exit}){}", diagnostic_suffix(.diagnostic))]
pub struct ToolError {
    pub operation: Operation,
    pub exit: ExitInfo,
    /// Captured stderr (or stdout when stderr is empty), trimmed.
    pub diagnostic: String,
}

impl ToolError {
    pub fn new(operation: Operation, exit: ExitInfo, diagnostic: impl Into<String>) -> Self {
        Self {
            operation,
            exit,
            diagnostic: diagnostic.into().trim().to_string(),
        }
    }
}

fn diagnostic_suffix(diagnostic: &str) -> String {
    if diagnostic.is_empty() {
        String::new()
    } else {
        format!(": {diagnostic}")
    }
}

/// A single page failed to make it through the page pipeline.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// An external tool failed during one of the page stages.
    #[error("Page {page}: {stage} stage failed: {source}")]
    StageFailed {
        page: usize,
        stage: Stage,
        #[source]
        source: ToolError,
    },

    /// A stage was run out of order.
    #[error("Page {page}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        page: usize,
        from: PageState,
        to: PageState,
    },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::StageFailed { page, .. } | PageError::InvalidTransition { page, .. } => {
                *page
            }
        }
    }
}

/// All fatal errors returned by the pdfsearchify library.
#[derive(Debug, Error)]
pub enum SearchifyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Input and output resolve to the same file.
    #[error("Output '{path}' is the input file; choose a different destination")]
    SameInputOutput { path: PathBuf },

    /// The page-count query reported zero pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Processing errors ─────────────────────────────────────────────────
    /// A document-level tool call (page count, metadata dump) failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A page failed; no assembly was attempted.
    #[error(transparent)]
    Page(#[from] PageError),

    /// Compose, merge, text overlay or metadata restore failed.
    #[error("{step} failed: {source}")]
    AssemblyFailed {
        step: AssemblyStep,
        #[source]
        source: ToolError,
    },

    /// The OCR text layer for a page is gone by the time of text overlay.
    #[error("Text layer for page {page} is missing at '{path}'")]
    MissingTextLayer { page: usize, path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the working directory.
    #[error("Failed to create working directory: {source}")]
    WorkDir {
        #[source]
        source: std::io::Error,
    },

    /// Could not move the finished PDF to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
