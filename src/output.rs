//! Result types returned by the conversion entry points.

use crate::pipeline::page::Classification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Immutable snapshot of a page that went through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    pub classification: Classification,
    /// hOCR text layer, aligned to `image`.
    pub text_layer: PathBuf,
    /// Raster embedded in the output (deskewed, optionally resampled).
    pub image: PathBuf,
}

/// Per-page line of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_num: usize,
    pub classification: Classification,
}

impl From<&PageResult> for PageSummary {
    fn from(p: &PageResult) -> Self {
        Self {
            page_num: p.page_num,
            classification: p.classification,
        }
    }
}

/// Timing and classification counts for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchifyStats {
    pub total_pages: usize,
    pub bitonal_pages: usize,
    pub color_pages: usize,
    /// Wall-clock time for the whole run (ms).
    pub total_duration_ms: u64,
    /// Time spent in page pipelines, up to the barrier (ms).
    pub pages_duration_ms: u64,
    /// Time spent composing, merging, overlaying and restoring metadata (ms).
    pub assembly_duration_ms: u64,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchifyOutput {
    /// The searchable PDF, at the caller's requested path.
    pub output_path: PathBuf,
    pub page_count: usize,
    /// Pages in source order.
    pub pages: Vec<PageSummary>,
    pub stats: SearchifyStats,
    /// Working directory, when intermediate files were preserved.
    pub work_dir: Option<PathBuf>,
}

/// Page count and document info of a PDF, without processing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Info dictionary entries (Title, Author, Producer, …).
    pub info: BTreeMap<String, String>,
}
