//! Document orchestration: the conversion entry points.
//!
//! A run validates its input, fans pages out to a bounded set of concurrent
//! page pipelines, waits for every page (the barrier), and only then
//! assembles the output. Any page failure stops new pages from starting and
//! fails the run before assembly, so a partial PDF is never produced.

use crate::config::SearchifyConfig;
use crate::error::{Operation, PageError, SearchifyError};
use crate::output::{DocumentInfo, PageResult, PageSummary, SearchifyOutput, SearchifyStats};
use crate::pipeline::page::{Classification, PageContext, PageRunner};
use crate::pipeline::{compose, input, merge, overlay};
use crate::progress::{NoopObserver, PipelineEvent, SearchifyObserver};
use crate::tools::{pdftk, run_blocking, CommandTools, ExternalTools};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// File name of the metadata dump inside the working directory.
const METADATA_FILE: &str = "pdfinfo.txt";

/// Converts scanned PDFs into searchable PDFs with one set of tools.
///
/// ```rust,no_run
/// use pdfsearchify::{SearchifyConfig, Searchifier};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let searchifier = Searchifier::new(SearchifyConfig::default())?;
/// let output = searchifier.run("scan.pdf", "scan-searchable.pdf").await?;
/// println!("{} pages ({} color)", output.page_count, output.stats.color_pages);
/// # Ok(())
/// # }
/// ```
pub struct Searchifier {
    config: SearchifyConfig,
    tools: Arc<dyn ExternalTools>,
}

impl Searchifier {
    /// Use the external programs named in `config.tools`.
    pub fn new(config: SearchifyConfig) -> Result<Self, SearchifyError> {
        let tools = Arc::new(CommandTools::new(config.tools.clone()));
        Self::with_tools(config, tools)
    }

    /// Use a custom [`ExternalTools`] implementation.
    pub fn with_tools(
        config: SearchifyConfig,
        tools: Arc<dyn ExternalTools>,
    ) -> Result<Self, SearchifyError> {
        config.validate()?;
        Ok(Self { config, tools })
    }

    pub fn config(&self) -> &SearchifyConfig {
        &self.config
    }

    /// Convert `input` into a searchable PDF written to `output`.
    ///
    /// # Errors
    /// Any failure is fatal: input validation, a document-level tool call,
    /// any single page, or any assembly step. On error the destination is
    /// left untouched.
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<SearchifyOutput, SearchifyError> {
        let total_start = Instant::now();
        let observer = self.observer();

        // ── Step 1: Validate input ───────────────────────────────────────
        let paths = input::resolve(input.as_ref(), output.as_ref())?;
        info!("Starting searchify: {}", paths.input.display());
        observer.on_event(&PipelineEvent::Start {
            input: paths.input.clone(),
            output: paths.output.clone(),
        });

        // ── Step 2: Count pages ──────────────────────────────────────────
        let src = paths.input.clone();
        let page_count =
            run_blocking(&self.tools, Operation::PageCount, move |t| t.page_count(&src)).await?;
        if page_count == 0 {
            return Err(SearchifyError::EmptyDocument { path: paths.input });
        }
        info!("PDF has {} pages", page_count);

        // ── Step 3: Working directory ────────────────────────────────────
        let work = WorkDir::create(&self.config)?;
        debug!("Working directory: {}", work.path().display());

        let result = self
            .run_in(work.path(), &paths.input, &paths.output, page_count, observer)
            .await;

        // Cleanup happens on success and failure alike.
        let kept = work.finish();

        let (pages, mut stats) = result?;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Searchify complete: {} pages ({} bitonal, {} color), {}ms total",
            page_count, stats.bitonal_pages, stats.color_pages, stats.total_duration_ms
        );
        observer.on_event(&PipelineEvent::Done {
            output: paths.output.clone(),
            elapsed: total_start.elapsed(),
        });

        Ok(SearchifyOutput {
            output_path: paths.output,
            page_count,
            pages,
            stats,
            work_dir: kept,
        })
    }

    /// Page count and document info of `input`, without processing it.
    pub async fn inspect(&self, input: impl AsRef<Path>) -> Result<DocumentInfo, SearchifyError> {
        let pdf = input::resolve_input(input.as_ref())?;

        let src = pdf.clone();
        let page_count =
            run_blocking(&self.tools, Operation::PageCount, move |t| t.page_count(&src)).await?;

        let dump = tempfile::Builder::new()
            .prefix("pdfsearchify-info")
            .suffix(".txt")
            .tempfile()
            .map_err(|e| SearchifyError::Internal(format!("tempfile: {e}")))?
            .into_temp_path();
        let (src, dst) = (pdf.clone(), dump.to_path_buf());
        run_blocking(&self.tools, Operation::DumpMetadata, move |t| {
            t.dump_metadata(&src, &dst)
        })
        .await?;
        let text = tokio::fs::read(&dump)
            .await
            .map_err(|e| SearchifyError::Internal(format!("reading metadata dump: {e}")))?;

        Ok(DocumentInfo {
            page_count,
            info: pdftk::parse_info(&String::from_utf8_lossy(&text)),
        })
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn observer(&self) -> &dyn SearchifyObserver {
        match &self.config.observer {
            Some(o) => o.as_ref(),
            None => &NoopObserver,
        }
    }

    /// Everything that happens inside the working directory.
    async fn run_in(
        &self,
        work_dir: &Path,
        input: &Path,
        output: &Path,
        page_count: usize,
        observer: &dyn SearchifyObserver,
    ) -> Result<(Vec<PageSummary>, SearchifyStats), SearchifyError> {
        // ── Step 4: Capture metadata ─────────────────────────────────────
        let info = work_dir.join(METADATA_FILE);
        let (src, dst) = (input.to_path_buf(), info.clone());
        run_blocking(&self.tools, Operation::DumpMetadata, move |t| {
            t.dump_metadata(&src, &dst)
        })
        .await?;

        // ── Step 5: Page pipelines, then the barrier ─────────────────────
        let pages_start = Instant::now();
        let pages = self
            .process_pages(input, work_dir, page_count, observer)
            .await?;
        let pages_duration_ms = pages_start.elapsed().as_millis() as u64;
        info!("Processed {} pages in {}ms", pages.len(), pages_duration_ms);

        // ── Step 6: Assembly ─────────────────────────────────────────────
        let assembly_start = Instant::now();
        let dpi = self.config.effective_output_resolution();
        let composites = compose::compose(&self.tools, observer, &pages, work_dir, dpi).await?;
        let merged = merge::merge(&self.tools, observer, &composites, &pages, work_dir).await?;
        let searchable = overlay::add_text(&self.tools, observer, &merged, &pages, work_dir).await?;
        overlay::restore_metadata(&self.tools, observer, &searchable, &info, output).await?;
        let assembly_duration_ms = assembly_start.elapsed().as_millis() as u64;

        let bitonal_pages = pages
            .iter()
            .filter(|p| p.classification == Classification::Bitonal)
            .count();
        let stats = SearchifyStats {
            total_pages: page_count,
            bitonal_pages,
            color_pages: page_count - bitonal_pages,
            total_duration_ms: 0,
            pages_duration_ms,
            assembly_duration_ms,
        };
        Ok((pages.iter().map(PageSummary::from).collect(), stats))
    }

    /// Run every page through its pipeline with at most `concurrency` pages
    /// in flight, returning results sorted by page number.
    ///
    /// After the first failure no further page starts. Pages already running
    /// finish, but their results are discarded and the first failure (in
    /// completion order) is returned.
    async fn process_pages(
        &self,
        input: &Path,
        work_dir: &Path,
        page_count: usize,
        observer: &dyn SearchifyObserver,
    ) -> Result<Vec<PageResult>, PageError> {
        let runner = PageRunner {
            tools: &self.tools,
            config: &self.config,
            observer,
        };
        let abort = AtomicBool::new(false);

        let outcomes: Vec<Option<Result<PageResult, PageError>>> = stream::iter(1..=page_count)
            .map(|page| {
                let runner = &runner;
                let abort = &abort;
                async move {
                    if abort.load(Ordering::SeqCst) {
                        debug!("Page {}: skipped after earlier failure", page);
                        return None;
                    }
                    let mut ctx = PageContext::new(page, input, work_dir);
                    let result = runner.run(&mut ctx).await;
                    if let Err(ref e) = result {
                        warn!("{}", e);
                        abort.store(true, Ordering::SeqCst);
                    }
                    Some(result)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut pages = Vec::with_capacity(page_count);
        for outcome in outcomes.into_iter().flatten() {
            pages.push(outcome?);
        }
        pages.sort_by_key(|p| p.page_num);
        Ok(pages)
    }
}

/// Convert `input` into a searchable PDF at `output` using the external
/// programs named in `config`.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// See [`Searchifier::run`].
pub async fn searchify(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &SearchifyConfig,
) -> Result<SearchifyOutput, SearchifyError> {
    Searchifier::new(config.clone())?.run(input, output).await
}

/// Synchronous wrapper around [`searchify`].
///
/// Creates a temporary tokio runtime internally.
pub fn searchify_sync(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &SearchifyConfig,
) -> Result<SearchifyOutput, SearchifyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SearchifyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(searchify(input, output, config))
}

/// Read page count and document info without converting anything.
pub async fn inspect(
    input: impl AsRef<Path>,
    config: &SearchifyConfig,
) -> Result<DocumentInfo, SearchifyError> {
    Searchifier::new(config.clone())?.inspect(input).await
}

// ── Working directory ────────────────────────────────────────────────────

/// The run's private scratch directory.
struct WorkDir {
    dir: TempDir,
    preserve: bool,
}

impl WorkDir {
    fn create(config: &SearchifyConfig) -> Result<Self, SearchifyError> {
        let root = config
            .work_dir_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root).map_err(|source| SearchifyError::WorkDir { source })?;
        let dir = tempfile::Builder::new()
            .prefix("pdfsearchify")
            .keep(config.preserve_intermediate_files)
            .tempdir_in(&root)
            .map_err(|source| SearchifyError::WorkDir { source })?;
        Ok(Self {
            dir,
            preserve: config.preserve_intermediate_files,
        })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory unless it is being preserved, returning its path
    /// when it was kept. Removal failures are logged, never raised.
    fn finish(self) -> Option<PathBuf> {
        if self.preserve {
            let path = self.dir.path().to_path_buf();
            info!("Intermediate files kept in {}", path.display());
            return Some(path);
        }
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed working directory {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove working directory {}: {}",
                path.display(),
                e
            ),
        }
        None
    }
}
