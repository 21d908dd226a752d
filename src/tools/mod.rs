//! External tool adapter.
//!
//! Every image, OCR and PDF operation is delegated to an external program.
//! [`ExternalTools`] is the typed seam: one method per capability, structured
//! arguments in, an output path (or parsed scalar) out, [`ToolError`] on any
//! failure. [`command::CommandTools`] is the production implementation that
//! spawns processes; tests substitute an in-memory fake.
//!
//! Methods are blocking. The orchestrator calls them through
//! [`run_blocking`], which moves the call onto tokio's blocking pool so a
//! long OCR run never stalls the async workers.

pub mod command;
pub mod pdftk;

use crate::config::PreprocessProfile;
use crate::error::{ExitInfo, Operation, ToolError};
use crate::pipeline::merge::MergeInstruction;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use command::CommandTools;

/// Skew-correction tolerance passed to the deskew operation, in percent.
pub const DESKEW_THRESHOLD_PERCENT: u32 = 40;

/// The external capabilities consumed by the pipeline.
///
/// Implementations write their outputs to the paths they are given and never
/// delete anything; the caller owns the working directory.
pub trait ExternalTools: Send + Sync {
    /// Number of pages in `pdf`.
    fn page_count(&self, pdf: &Path) -> Result<usize, ToolError>;

    /// Write the document's metadata dump to `out`.
    fn dump_metadata(&self, pdf: &Path, out: &Path) -> Result<(), ToolError>;

    /// Rasterise exactly one page (1-based) at `dpi` into `out`.
    fn extract_raster(&self, pdf: &Path, page: usize, dpi: u32, out: &Path)
        -> Result<(), ToolError>;

    /// Classification code for a raster; `"0"` means bitonal.
    fn detect_color(&self, raster: &Path) -> Result<String, ToolError>;

    fn deskew(&self, input: &Path, threshold_percent: u32, out: &Path) -> Result<(), ToolError>;

    fn cleanup(&self, input: &Path, profile: PreprocessProfile, out: &Path)
        -> Result<(), ToolError>;

    /// Run OCR on `input`, returning the path of the hOCR file written next to `out_base`.
    fn ocr(&self, input: &Path, out_base: &Path) -> Result<PathBuf, ToolError>;

    fn resample(&self, input: &Path, from_dpi: u32, to_dpi: u32, out: &Path)
        -> Result<(), ToolError>;

    /// Build a JBIG2-compressed PDF, one page per image, in the given order.
    fn compose_bitonal(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError>;

    /// Build a color-image PDF, one page per image, in the given order, laid
    /// out at `dpi` so pages keep the geometry of the bitonal stream.
    fn compose_color(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError>;

    /// Interleave the two streams into `out` following `instruction`.
    fn merge(
        &self,
        bitonal: &Path,
        color: &Path,
        instruction: &MergeInstruction,
        out: &Path,
    ) -> Result<(), ToolError>;

    /// Lay each `(page, hocr)` text layer over the matching page of `pdf`.
    fn overlay_text(&self, pdf: &Path, layers: &[(usize, PathBuf)], out: &Path)
        -> Result<(), ToolError>;

    /// Copy `pdf` to `out` with the metadata from `info` applied.
    fn apply_metadata(&self, pdf: &Path, info: &Path, out: &Path) -> Result<(), ToolError>;
}

/// Run a blocking tool call on the blocking thread pool.
pub(crate) async fn run_blocking<T, F>(
    tools: &Arc<dyn ExternalTools>,
    operation: Operation,
    f: F,
) -> Result<T, ToolError>
where
    F: FnOnce(&dyn ExternalTools) -> Result<T, ToolError> + Send + 'static,
    T: Send + 'static,
{
    let tools = Arc::clone(tools);
    tokio::task::spawn_blocking(move || f(tools.as_ref()))
        .await
        .map_err(|e| ToolError::new(operation, ExitInfo::Aborted(e.to_string()), ""))?
}

/// Fail with [`ExitInfo::MissingOutput`] unless `path` exists.
pub(crate) fn expect_output(operation: Operation, path: &Path) -> Result<(), ToolError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolError::new(
            operation,
            ExitInfo::MissingOutput(path.to_path_buf()),
            "",
        ))
    }
}
