//! # pdfsearchify
//!
//! Turn scanned PDFs into searchable PDFs: every page keeps its scanned
//! image and gains an invisible, selectable OCR text layer.
//!
//! ## Why split by color?
//!
//! Most pages of a scanned document are black text on white paper. Those
//! compress an order of magnitude better as bitonal JBIG2 than as color
//! images, so each page is classified first. Bitonal pages go into one JBIG2
//! stream, color pages into a color stream, and the two are interleaved back
//! into source order before the text layer is applied.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate path, PDF magic, output ≠ input
//!  ├─ 2. Pages     extract → classify → deskew → preprocess → OCR → downsample
//!  │               (bounded concurrency, each tool call on spawn_blocking)
//!  ├─ 3. Compose   bitonal pages → JBIG2 PDF, color pages → color PDF
//!  ├─ 4. Merge     interleave both streams back into source order
//!  ├─ 5. Overlay   lay the hOCR text layers over the pages
//!  └─ 6. Metadata  re-apply the original document info, atomic write
//! ```
//!
//! All imaging, OCR and PDF work is done by external programs (Ghostscript,
//! ImageMagick, Tesseract, pdftk, jbig2enc and helper scripts) behind the
//! [`ExternalTools`] trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfsearchify::{searchify, SearchifyConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchifyConfig::builder()
//!         .downsample_resolution(150)
//!         .build()?;
//!     let output = searchify("scan.pdf", "scan-searchable.pdf", &config).await?;
//!     eprintln!("{} pages, {} color", output.page_count, output.stats.color_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfsearchify` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfsearchify = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    PreprocessProfile, SearchifyConfig, SearchifyConfigBuilder, ToolCommand, ToolCommands,
};
pub use convert::{inspect, searchify, searchify_sync, Searchifier};
pub use error::{ExitInfo, Operation, PageError, SearchifyError, ToolError};
pub use output::{DocumentInfo, PageResult, PageSummary, SearchifyOutput, SearchifyStats};
pub use pipeline::merge::{MergeEntry, MergeInstruction, StreamTag};
pub use pipeline::page::{Classification, PageContext, PageState, Stage};
pub use progress::{AssemblyStep, NoopObserver, Observer, PipelineEvent, SearchifyObserver};
pub use tools::{CommandTools, ExternalTools};
