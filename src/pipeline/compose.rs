//! Color-split composition.
//!
//! Finished pages are split by classification into a bitonal stream and a
//! color stream, each keeping source order. The bitonal stream becomes one
//! JBIG2-compressed PDF, the color stream one color-image PDF. An empty
//! stream yields no file at all rather than a zero-page PDF.

use crate::error::{Operation, SearchifyError};
use crate::output::PageResult;
use crate::pipeline::merge::StreamTag;
use crate::pipeline::page::Classification;
use crate::progress::{AssemblyStep, PipelineEvent, SearchifyObserver};
use crate::tools::{run_blocking, ExternalTools};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// The (at most two) composite PDFs. `None` means the stream had no pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeArtifacts {
    pub bitonal: Option<PathBuf>,
    pub color: Option<PathBuf>,
}

/// Page images of each stream, in source order: `(bitonal, color)`.
pub fn partition(pages: &[PageResult]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut bitonal = Vec::new();
    let mut color = Vec::new();
    for page in pages {
        match page.classification {
            Classification::Bitonal => bitonal.push(page.image.clone()),
            Classification::Color => color.push(page.image.clone()),
        }
    }
    (bitonal, color)
}

/// Build both composite PDFs at `dpi`. The two builds run concurrently.
pub(crate) async fn compose(
    tools: &Arc<dyn ExternalTools>,
    observer: &dyn SearchifyObserver,
    pages: &[PageResult],
    work_dir: &Path,
    dpi: u32,
) -> Result<CompositeArtifacts, SearchifyError> {
    let (bitonal_images, color_images) = partition(pages);
    debug!(
        "Composing {} bitonal and {} color pages",
        bitonal_images.len(),
        color_images.len()
    );

    let (bitonal, color) = tokio::try_join!(
        compose_stream(
            tools,
            observer,
            StreamTag::Bitonal,
            bitonal_images,
            work_dir.join("jbig2.pdf"),
            dpi,
        ),
        compose_stream(
            tools,
            observer,
            StreamTag::Color,
            color_images,
            work_dir.join("jpeg.pdf"),
            dpi,
        ),
    )?;

    Ok(CompositeArtifacts { bitonal, color })
}

async fn compose_stream(
    tools: &Arc<dyn ExternalTools>,
    observer: &dyn SearchifyObserver,
    stream: StreamTag,
    images: Vec<PathBuf>,
    out: PathBuf,
    dpi: u32,
) -> Result<Option<PathBuf>, SearchifyError> {
    let step = match stream {
        StreamTag::Bitonal => AssemblyStep::ComposeBitonal,
        StreamTag::Color => AssemblyStep::ComposeColor,
    };
    observer.on_event(&PipelineEvent::AssemblyStarted { step });
    let started = Instant::now();

    if images.is_empty() {
        observer.on_event(&PipelineEvent::AssemblyFinished {
            step,
            produced: false,
            elapsed: started.elapsed(),
        });
        return Ok(None);
    }

    let dst = out.clone();
    let result = match stream {
        StreamTag::Bitonal => {
            run_blocking(tools, Operation::ComposeBitonal, move |t| {
                t.compose_bitonal(&images, dpi, &dst)
            })
            .await
        }
        StreamTag::Color => {
            run_blocking(tools, Operation::ComposeColor, move |t| {
                t.compose_color(&images, dpi, &dst)
            })
            .await
        }
    };
    result.map_err(|source| SearchifyError::AssemblyFailed { step, source })?;

    observer.on_event(&PipelineEvent::AssemblyFinished {
        step,
        produced: true,
        elapsed: started.elapsed(),
    });
    Ok(Some(out))
}
