//! CLI binary for pdfsearchify.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SearchifyConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfsearchify::{
    inspect, searchify, AssemblyStep, Classification, PipelineEvent, PreprocessProfile,
    SearchifyConfig, SearchifyObserver, ToolCommands,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner counting finished pages, one log line per
/// page and one per assembly step. Pages may finish out of order.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  {pos:>3} pages  ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SearchifyObserver for CliObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Start { input, .. } => {
                self.bar.set_prefix("Searchifying");
                self.bar.println(format!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("Starting {}", input.display()))
                ));
            }
            PipelineEvent::StageStarted { page, stage } => {
                self.bar.set_message(format!("page {page}: {stage}"));
            }
            PipelineEvent::PageFinished {
                page,
                classification,
                elapsed,
            } => {
                let class = match classification {
                    Classification::Bitonal => "bitonal",
                    Classification::Color => "color",
                };
                self.bar.println(format!(
                    "  {} Page {:>3}  {:<8}  {}",
                    green("✓"),
                    page,
                    dim(class),
                    dim(&format!("{:.1}s", elapsed.as_secs_f64())),
                ));
                self.bar.inc(1);
            }
            PipelineEvent::AssemblyStarted { step } => {
                self.bar.set_prefix("Assembling");
                self.bar.set_message(step.to_string());
            }
            PipelineEvent::AssemblyFinished {
                step,
                produced,
                elapsed,
            } => {
                // Skipped compose/merge steps are not worth a line.
                if *produced || *step == AssemblyStep::RestoreMetadata {
                    self.bar.println(format!(
                        "  {} {:<16}  {}",
                        green("✓"),
                        step.to_string(),
                        dim(&format!("{:.1}s", elapsed.as_secs_f64())),
                    ));
                }
            }
            PipelineEvent::Done { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion
  pdfsearchify scan.pdf scan-searchable.pdf

  # Smaller output: extract and OCR at 300 DPI, embed images at 150 DPI
  pdfsearchify --downsample 150 scan.pdf out.pdf

  # Stronger cleanup for noisy scans
  pdfsearchify --preprocess lat scan.pdf out.pdf

  # Keep intermediate files for debugging
  pdfsearchify --keep-files --work-dir ./work scan.pdf out.pdf

  # Page count and document info only
  pdfsearchify --inspect-only scan.pdf

  # Tool locations from a JSON file
  pdfsearchify --tools-config tools.json scan.pdf out.pdf

REQUIRED TOOLS:
  gs (Ghostscript), convert (ImageMagick), tesseract (with hOCR output),
  pdftk, jbig2 (jbig2enc), plus the color detector, JBIG2 PDF wrapper and
  hOCR overlay helpers. Override any of them with --tools-config:

    { "tesseract": { "program": "/opt/tesseract/bin/tesseract" },
      "color_detector": { "program": "python3", "args": ["detectColor.py"] } }

ENVIRONMENT VARIABLES:
  Every flag has a PDFSEARCHIFY_* counterpart, e.g. PDFSEARCHIFY_CONCURRENCY.
  RUST_LOG overrides the log filter.
"#;

/// Turn scanned PDFs into searchable PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsearchify",
    version,
    about = "Turn scanned PDFs into searchable PDFs",
    long_about = "Rasterise every page of a scanned PDF, deskew and clean it, run OCR, \
then rebuild the PDF with JBIG2-compressed bitonal pages, color pages where needed, \
and an invisible text layer. The original document info is preserved.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Scanned input PDF.
    input: PathBuf,

    /// Destination for the searchable PDF.
    #[arg(required_unless_present = "inspect_only")]
    output: Option<PathBuf>,

    /// Extraction and OCR resolution in DPI.
    #[arg(long, env = "PDFSEARCHIFY_UPSAMPLE", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(1..))]
    upsample: u32,

    /// Resolution of the embedded images in DPI (default: same as --upsample).
    #[arg(long, env = "PDFSEARCHIFY_DOWNSAMPLE",
          value_parser = clap::value_parser!(u32).range(1..))]
    downsample: Option<u32>,

    /// Image cleanup profile: quick or lat.
    #[arg(long, env = "PDFSEARCHIFY_PREPROCESS", default_value = "quick")]
    preprocess: PreprocessProfile,

    /// Keep the working directory and its intermediate files.
    #[arg(long, env = "PDFSEARCHIFY_KEEP_FILES")]
    keep_files: bool,

    /// Number of pages processed concurrently (default: CPU count).
    #[arg(short, long, env = "PDFSEARCHIFY_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Parent directory for the working directory (default: system temp).
    #[arg(long, env = "PDFSEARCHIFY_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// JSON file overriding the external tool commands.
    #[arg(long, env = "PDFSEARCHIFY_TOOLS_CONFIG")]
    tools_config: Option<PathBuf>,

    /// Print the result (or inspect output) as JSON on stdout.
    #[arg(long, env = "PDFSEARCHIFY_JSON")]
    json: bool,

    /// Print page count and document info only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress output.
    #[arg(long, env = "PDFSEARCHIFY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSEARCHIFY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSEARCHIFY_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let observer = if show_progress {
        Some(CliObserver::new())
    } else {
        None
    };
    let config = build_config(&cli, observer).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Pages:        {}", info.page_count);
            for (key, value) in &info.info {
                println!("{:<13} {}", format!("{key}:"), value);
            }
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli
        .output
        .as_ref()
        .context("An output path is required")?;
    let output = searchify(&cli.input, output_path, &config)
        .await
        .context("Searchify failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages ({} bitonal, {} color)  {}ms  →  {}",
            green("✔"),
            output.page_count,
            output.stats.bitonal_pages,
            output.stats.color_pages,
            output.stats.total_duration_ms,
            bold(&output.output_path.display().to_string()),
        );
        if let Some(ref dir) = output.work_dir {
            eprintln!("   intermediate files: {}", dim(&dir.display().to_string()));
        }
    }

    Ok(())
}

/// Map CLI args to `SearchifyConfig`.
async fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<SearchifyConfig> {
    let tools = match cli.tools_config {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read tools config from {:?}", path))?;
            serde_json::from_str::<ToolCommands>(&text)
                .with_context(|| format!("Invalid tools config in {:?}", path))?
        }
        None => ToolCommands::default(),
    };

    let mut builder = SearchifyConfig::builder()
        .upsample_resolution(cli.upsample)
        .preprocess(cli.preprocess)
        .preserve_intermediate_files(cli.keep_files)
        .tools(tools);

    if let Some(dpi) = cli.downsample {
        builder = builder.downsample_resolution(dpi);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir_root(dir);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}
