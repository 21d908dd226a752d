//! Order-preserving merge of the bitonal and color streams.
//!
//! Each composite PDF numbers its pages 1..k in the order they appear in its
//! own stream, so page 5 of the source might be page 2 of the color PDF. The
//! [`MergeInstruction`] maps every source page, in order, to its stream and
//! stream-local index; pdftk's `cat` then rebuilds the original order:
//!
//! ```text
//! source:   1 (bitonal)  2 (color)  3 (bitonal)
//! handles:  A=jbig2.pdf  B=jpeg.pdf
//! cat:      A1 B1 A2
//! ```
//!
//! When only one stream exists it already is the whole document in order,
//! and no merge tool runs.

use crate::error::{Operation, SearchifyError};
use crate::output::PageResult;
use crate::pipeline::compose::CompositeArtifacts;
use crate::pipeline::page::Classification;
use crate::progress::{AssemblyStep, PipelineEvent, SearchifyObserver};
use crate::tools::{run_blocking, ExternalTools};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Which composite stream a page lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamTag {
    /// The JBIG2 stream, handle `A`.
    Bitonal,
    /// The color stream, handle `B`.
    Color,
}

impl StreamTag {
    /// pdftk input handle for the stream.
    pub fn handle(self) -> char {
        match self {
            StreamTag::Bitonal => 'A',
            StreamTag::Color => 'B',
        }
    }
}

impl From<Classification> for StreamTag {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Bitonal => StreamTag::Bitonal,
            Classification::Color => StreamTag::Color,
        }
    }
}

/// One source page: its stream and its 1-based position within that stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeEntry {
    pub stream: StreamTag,
    pub index: usize,
}

impl fmt::Display for MergeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stream.handle(), self.index)
    }
}

/// Source-order list of [`MergeEntry`], one per page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeInstruction {
    entries: Vec<MergeEntry>,
}

impl MergeInstruction {
    /// Plan the merge for pages sorted by page number.
    pub fn plan(pages: &[PageResult]) -> Self {
        let mut bitonal = 1;
        let mut color = 1;
        let entries = pages
            .iter()
            .map(|p| {
                let stream = StreamTag::from(p.classification);
                let counter = match stream {
                    StreamTag::Bitonal => &mut bitonal,
                    StreamTag::Color => &mut color,
                };
                let entry = MergeEntry {
                    stream,
                    index: *counter,
                };
                *counter += 1;
                entry
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<MergeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MergeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of pages taken from `stream`.
    pub fn stream_len(&self, stream: StreamTag) -> usize {
        self.entries.iter().filter(|e| e.stream == stream).count()
    }

    /// `cat` ranges in source order: `["A1", "B1", "A2"]`.
    pub fn page_ranges(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for MergeInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.page_ranges().join(" "))
    }
}

/// Merge the composite streams into one PDF in source page order.
///
/// Returns the path of the merged PDF, which is one of the composites
/// itself when only one stream exists.
pub(crate) async fn merge(
    tools: &Arc<dyn ExternalTools>,
    observer: &dyn SearchifyObserver,
    artifacts: &CompositeArtifacts,
    pages: &[PageResult],
    work_dir: &Path,
) -> Result<PathBuf, SearchifyError> {
    let step = AssemblyStep::Merge;
    observer.on_event(&PipelineEvent::AssemblyStarted { step });
    let started = Instant::now();

    let (merged, produced) = match (&artifacts.bitonal, &artifacts.color) {
        (Some(bitonal), None) => (bitonal.clone(), false),
        (None, Some(color)) => (color.clone(), false),
        (Some(bitonal), Some(color)) => {
            let instruction = MergeInstruction::plan(pages);
            debug!("Merging streams: {}", instruction);
            let out = work_dir.join("merged.pdf");
            let (a, b, dst) = (bitonal.clone(), color.clone(), out.clone());
            run_blocking(tools, Operation::Merge, move |t| {
                t.merge(&a, &b, &instruction, &dst)
            })
            .await
            .map_err(|source| SearchifyError::AssemblyFailed { step, source })?;
            (out, true)
        }
        (None, None) => {
            return Err(SearchifyError::Internal(
                "no composite stream to merge".into(),
            ))
        }
    };

    observer.on_event(&PipelineEvent::AssemblyFinished {
        step,
        produced,
        elapsed: started.elapsed(),
    });
    Ok(merged)
}
