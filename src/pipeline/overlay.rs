//! Final assembly: text overlay and metadata restore.

use crate::error::{Operation, SearchifyError};
use crate::output::PageResult;
use crate::progress::{AssemblyStep, PipelineEvent, SearchifyObserver};
use crate::tools::{run_blocking, ExternalTools};
use std::fs::Permissions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Lay every page's text layer over the merged PDF.
///
/// Page `i` of `merged` receives the text layer of the `i`-th entry of
/// `pages`, which must be sorted by page number.
pub(crate) async fn add_text(
    tools: &Arc<dyn ExternalTools>,
    observer: &dyn SearchifyObserver,
    merged: &Path,
    pages: &[PageResult],
    work_dir: &Path,
) -> Result<PathBuf, SearchifyError> {
    let step = AssemblyStep::AddText;
    observer.on_event(&PipelineEvent::AssemblyStarted { step });
    let started = Instant::now();

    let mut layers = Vec::with_capacity(pages.len());
    for page in pages {
        if !page.text_layer.is_file() {
            return Err(SearchifyError::MissingTextLayer {
                page: page.page_num,
                path: page.text_layer.clone(),
            });
        }
        layers.push((page.page_num, page.text_layer.clone()));
    }

    let out = work_dir.join("searchified.pdf");
    let (src, dst) = (merged.to_path_buf(), out.clone());
    run_blocking(tools, Operation::OverlayText, move |t| {
        t.overlay_text(&src, &layers, &dst)
    })
    .await
    .map_err(|source| SearchifyError::AssemblyFailed { step, source })?;

    observer.on_event(&PipelineEvent::AssemblyFinished {
        step,
        produced: true,
        elapsed: started.elapsed(),
    });
    Ok(out)
}

/// Write `pdf` to `output` with the original document info re-applied.
///
/// An absent or empty metadata dump is not an error: the PDF is copied
/// unchanged. The destination only ever sees a complete file; the result is
/// written beside it first and renamed into place.
pub(crate) async fn restore_metadata(
    tools: &Arc<dyn ExternalTools>,
    observer: &dyn SearchifyObserver,
    pdf: &Path,
    info: &Path,
    output: &Path,
) -> Result<(), SearchifyError> {
    let step = AssemblyStep::RestoreMetadata;
    observer.on_event(&PipelineEvent::AssemblyStarted { step });
    let started = Instant::now();

    let write_failed = |source: std::io::Error| SearchifyError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await.map_err(write_failed)?;

    // Removed on drop unless persisted.
    let tmp = tempfile::Builder::new()
        .prefix(".pdfsearchify-")
        .suffix(".pdf.tmp")
        .tempfile_in(&parent)
        .map_err(write_failed)?
        .into_temp_path();

    let has_info = tokio::fs::metadata(info)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false);

    let produced = if has_info {
        let (src, meta, dst) = (pdf.to_path_buf(), info.to_path_buf(), tmp.to_path_buf());
        run_blocking(tools, Operation::ApplyMetadata, move |t| {
            t.apply_metadata(&src, &meta, &dst)
        })
        .await
        .map_err(|source| SearchifyError::AssemblyFailed { step, source })?;
        true
    } else {
        warn!("No document metadata to restore; copying PDF unchanged");
        tokio::fs::copy(pdf, &tmp).await.map_err(write_failed)?;
        false
    };

    let permissions = output_permissions(output, &tmp).await.map_err(write_failed)?;
    tokio::fs::set_permissions(&tmp, permissions)
        .await
        .map_err(write_failed)?;
    tmp.persist(output).map_err(|e| write_failed(e.error))?;
    debug!("Wrote {}", output.display());

    observer.on_event(&PipelineEvent::AssemblyFinished {
        step,
        produced,
        elapsed: started.elapsed(),
    });
    Ok(())
}

/// Mode for the finished file. An existing destination keeps its own; a new
/// one gets 0644 instead of the owner-only mode of the staged temp file.
async fn output_permissions(output: &Path, staged: &Path) -> std::io::Result<Permissions> {
    if let Ok(existing) = tokio::fs::metadata(output).await {
        return Ok(existing.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = staged;
        Ok(Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        Ok(tokio::fs::metadata(staged).await?.permissions())
    }
}
