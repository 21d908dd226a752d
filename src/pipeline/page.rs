//! Per-page pipeline: extract → classify → deskew → preprocess → OCR → downsample.
//!
//! Each page is tracked by one [`PageContext`], created by the orchestrator
//! and moved into its pipeline run. The context is a small state machine:
//!
//! ```text
//! Pending ─▶ Extracted ─▶ Classified ─▶ Deskewed ─▶ Preprocessed ─▶ Recognized ─▶ Downsampled ─▶ Done
//!    └──────────┴────────────┴────────────┴─────────────┴──────────────┴──────────────┴──▶ Failed
//! ```
//!
//! Every page takes the same path regardless of its classification; the
//! classification only decides which composite stream the final raster joins.
//! The OCR input is the cleaned raster, but the page image kept for the output
//! is the deskewed one (resampled when downsampling is enabled), since that is
//! the geometry the hOCR text layer is overlaid on.

use crate::config::SearchifyConfig;
use crate::error::{Operation, PageError, ToolError};
use crate::output::PageResult;
use crate::progress::{PipelineEvent, SearchifyObserver};
use crate::tools::{run_blocking, ExternalTools, DESKEW_THRESHOLD_PERCENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Color class of a page, derived from the detector's classification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Two-tone content, encoded into the JBIG2 stream.
    Bitonal,
    /// Anything else, encoded into the color stream.
    Color,
}

impl Classification {
    /// The detector prints this code for bitonal pages.
    pub const BITONAL_CODE: &'static str = "0";

    pub fn from_code(code: &str) -> Self {
        if code.trim() == Self::BITONAL_CODE {
            Classification::Bitonal
        } else {
            Classification::Color
        }
    }
}

/// One step of the page pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Classify,
    Deskew,
    Preprocess,
    Recognize,
    Downsample,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Classify,
        Stage::Deskew,
        Stage::Preprocess,
        Stage::Recognize,
        Stage::Downsample,
    ];

    /// State the page must be in before this stage runs.
    pub fn requires(self) -> PageState {
        match self {
            Stage::Extract => PageState::Pending,
            Stage::Classify => PageState::Extracted,
            Stage::Deskew => PageState::Classified,
            Stage::Preprocess => PageState::Deskewed,
            Stage::Recognize => PageState::Preprocessed,
            Stage::Downsample => PageState::Recognized,
        }
    }

    /// State the page is in after this stage succeeds.
    pub fn produces(self) -> PageState {
        match self {
            Stage::Extract => PageState::Extracted,
            Stage::Classify => PageState::Classified,
            Stage::Deskew => PageState::Deskewed,
            Stage::Preprocess => PageState::Preprocessed,
            Stage::Recognize => PageState::Recognized,
            Stage::Downsample => PageState::Downsampled,
        }
    }

    pub fn started_event(self) -> &'static str {
        match self {
            Stage::Extract => "extractPNM",
            Stage::Classify => "detectColor",
            Stage::Deskew => "deskewPNM",
            Stage::Preprocess => "preprocessPage",
            Stage::Recognize => "ocrPage",
            Stage::Downsample => "downsamplePage",
        }
    }

    pub fn finished_event(self) -> &'static str {
        match self {
            Stage::Extract => "PNMExtracted",
            Stage::Classify => "colorDetected",
            Stage::Deskew => "PNMDeskewed",
            Stage::Preprocess => "pagePreprocessed",
            Stage::Recognize => "pageOcred",
            Stage::Downsample => "pageDownsampled",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Classify => "classify",
            Stage::Deskew => "deskew",
            Stage::Preprocess => "preprocess",
            Stage::Recognize => "recognize",
            Stage::Downsample => "downsample",
        })
    }
}

/// Where a page is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    Pending,
    Extracted,
    Classified,
    Deskewed,
    Preprocessed,
    Recognized,
    Downsampled,
    Done,
    Failed,
}

/// Intermediate files produced for one page, all inside the working directory.
#[derive(Debug, Clone, Default)]
pub struct PageArtifacts {
    pub origin: Option<PathBuf>,
    pub deskewed: Option<PathBuf>,
    pub preprocessed: Option<PathBuf>,
    pub text_layer: Option<PathBuf>,
    pub downsampled: Option<PathBuf>,
}

/// Mutable state of one page while its pipeline runs.
#[derive(Debug)]
pub struct PageContext {
    page: usize,
    source: PathBuf,
    work_dir: PathBuf,
    state: PageState,
    classification: Option<Classification>,
    artifacts: PageArtifacts,
}

impl PageContext {
    /// `page` is 1-based.
    pub fn new(page: usize, source: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            page,
            source: source.into(),
            work_dir: work_dir.into(),
            state: PageState::Pending,
            classification: None,
            artifacts: PageArtifacts::default(),
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn classification(&self) -> Option<Classification> {
        self.classification
    }

    pub fn artifacts(&self) -> &PageArtifacts {
        &self.artifacts
    }

    fn work_file(&self, stem: &str, ext: &str) -> PathBuf {
        self.work_dir.join(format!("{stem}-{}.{ext}", self.page))
    }

    fn invalid(&self, to: PageState) -> PageError {
        PageError::InvalidTransition {
            page: self.page,
            from: self.state,
            to,
        }
    }

    /// Move to the state `stage` produces; rejects anything out of order.
    fn advance(&mut self, stage: Stage) -> Result<(), PageError> {
        if self.state != stage.requires() {
            return Err(self.invalid(stage.produces()));
        }
        self.state = stage.produces();
        Ok(())
    }

    fn require(&self, artifact: &Option<PathBuf>, stage: Stage) -> Result<PathBuf, PageError> {
        artifact.clone().ok_or_else(|| self.invalid(stage.produces()))
    }

    /// Record the classification code. Only valid straight after extraction,
    /// so it is set exactly once.
    pub fn classify(&mut self, code: &str) -> Result<Classification, PageError> {
        self.advance(Stage::Classify)?;
        let class = Classification::from_code(code);
        self.classification = Some(class);
        Ok(class)
    }

    /// The raster that ends up in the output document.
    pub fn final_image(&self) -> Option<&Path> {
        self.artifacts
            .downsampled
            .as_deref()
            .or(self.artifacts.deskewed.as_deref())
    }

    pub fn fail(&mut self) {
        self.state = PageState::Failed;
    }

    /// Snapshot a finished page. Fails unless every stage has run.
    pub fn finish(&mut self) -> Result<PageResult, PageError> {
        if self.state != PageState::Downsampled {
            return Err(self.invalid(PageState::Done));
        }
        let (Some(classification), Some(text_layer), Some(image)) = (
            self.classification,
            self.artifacts.text_layer.clone(),
            self.final_image().map(Path::to_path_buf),
        ) else {
            return Err(self.invalid(PageState::Done));
        };
        self.state = PageState::Done;
        Ok(PageResult {
            page_num: self.page,
            classification,
            text_layer,
            image,
        })
    }
}

/// Runs page contexts through the stage sequence.
pub(crate) struct PageRunner<'a> {
    pub tools: &'a Arc<dyn ExternalTools>,
    pub config: &'a SearchifyConfig,
    pub observer: &'a dyn SearchifyObserver,
}

impl PageRunner<'_> {
    /// Run every stage for one page. On failure the context is left in
    /// [`PageState::Failed`] and the first error is returned.
    pub async fn run(&self, ctx: &mut PageContext) -> Result<PageResult, PageError> {
        let page = ctx.page();
        let started = Instant::now();
        self.observer.on_event(&PipelineEvent::PageStarted { page });

        for stage in Stage::ALL {
            if let Err(e) = self.run_stage(ctx, stage).await {
                ctx.fail();
                return Err(e);
            }
        }

        let result = ctx.finish()?;
        self.observer.on_event(&PipelineEvent::PageFinished {
            page,
            classification: result.classification,
            elapsed: started.elapsed(),
        });
        Ok(result)
    }

    async fn run_stage(&self, ctx: &mut PageContext, stage: Stage) -> Result<(), PageError> {
        let page = ctx.page();

        // A no-op downsample still moves the state machine forward, silently.
        if stage == Stage::Downsample && !self.config.downsample_enabled() {
            return ctx.advance(stage);
        }

        self.observer
            .on_event(&PipelineEvent::StageStarted { page, stage });
        let started = Instant::now();
        debug!("Page {}: {} started", page, stage);

        let failed = |source: ToolError| PageError::StageFailed {
            page,
            stage,
            source,
        };

        match stage {
            Stage::Extract => {
                let out = ctx.work_file("original", "pnm");
                let (src, dst) = (ctx.source.clone(), out.clone());
                let dpi = self.config.upsample_resolution;
                run_blocking(self.tools, Operation::ExtractRaster, move |t| {
                    t.extract_raster(&src, page, dpi, &dst)
                })
                .await
                .map_err(failed)?;
                ctx.artifacts.origin = Some(out);
                ctx.advance(stage)?;
            }
            Stage::Classify => {
                let origin = ctx.require(&ctx.artifacts.origin, stage)?;
                let code = run_blocking(self.tools, Operation::DetectColor, move |t| {
                    t.detect_color(&origin)
                })
                .await
                .map_err(failed)?;
                let class = ctx.classify(&code)?;
                debug!("Page {}: classified {:?} (code {:?})", page, class, code.trim());
            }
            Stage::Deskew => {
                let origin = ctx.require(&ctx.artifacts.origin, stage)?;
                let out = ctx.work_file("deskew", "pnm");
                let dst = out.clone();
                run_blocking(self.tools, Operation::Deskew, move |t| {
                    t.deskew(&origin, DESKEW_THRESHOLD_PERCENT, &dst)
                })
                .await
                .map_err(failed)?;
                ctx.artifacts.deskewed = Some(out);
                ctx.advance(stage)?;
            }
            Stage::Preprocess => {
                let deskewed = ctx.require(&ctx.artifacts.deskewed, stage)?;
                let out = ctx.work_file("preprocessed", "pnm");
                let dst = out.clone();
                let profile = self.config.preprocess;
                run_blocking(self.tools, Operation::Cleanup, move |t| {
                    t.cleanup(&deskewed, profile, &dst)
                })
                .await
                .map_err(failed)?;
                ctx.artifacts.preprocessed = Some(out);
                ctx.advance(stage)?;
            }
            Stage::Recognize => {
                let cleaned = ctx.require(&ctx.artifacts.preprocessed, stage)?;
                let base = ctx.work_dir.join(format!("ocr-{page}"));
                let hocr = run_blocking(self.tools, Operation::Ocr, move |t| {
                    t.ocr(&cleaned, &base)
                })
                .await
                .map_err(failed)?;
                ctx.artifacts.text_layer = Some(hocr);
                ctx.advance(stage)?;
            }
            Stage::Downsample => {
                let deskewed = ctx.require(&ctx.artifacts.deskewed, stage)?;
                let out = ctx.work_file("downsample", "pnm");
                let dst = out.clone();
                let from = self.config.upsample_resolution;
                let to = self.config.effective_output_resolution();
                run_blocking(self.tools, Operation::Resample, move |t| {
                    t.resample(&deskewed, from, to, &dst)
                })
                .await
                .map_err(failed)?;
                ctx.artifacts.downsampled = Some(out);
                ctx.advance(stage)?;
            }
        }

        self.observer.on_event(&PipelineEvent::StageFinished {
            page,
            stage,
            elapsed: started.elapsed(),
        });
        Ok(())
    }
}
