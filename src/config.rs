//! Configuration types for searchable-PDF conversion.
//!
//! All conversion behaviour is controlled through [`SearchifyConfig`], built
//! via its [`SearchifyConfigBuilder`]. The external programs the pipeline
//! drives are described by [`ToolCommands`], which is plain data so it can be
//! loaded from a JSON file or overridden field by field.

use crate::error::SearchifyError;
use crate::progress::Observer;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration for a searchify run.
///
/// Built via [`SearchifyConfig::builder()`] or using
/// [`SearchifyConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfsearchify::{PreprocessProfile, SearchifyConfig};
///
/// let config = SearchifyConfig::builder()
///     .upsample_resolution(300)
///     .downsample_resolution(150)
///     .preprocess(PreprocessProfile::Lat)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_output_resolution(), 150);
/// ```
#[derive(Clone)]
pub struct SearchifyConfig {
    /// Rasterisation DPI for page extraction. Default: 300.
    ///
    /// OCR accuracy degrades quickly below 300 DPI on typical scans, so this
    /// is both the extraction resolution and the resolution OCR sees.
    pub upsample_resolution: u32,

    /// Resolution of the image embedded in the output. Default: None.
    ///
    /// When set and different from `upsample_resolution`, the deskewed raster
    /// is resampled down before composition. Otherwise the deskewed raster is
    /// embedded as-is.
    pub downsample_resolution: Option<u32>,

    /// Image-cleanup profile applied before OCR. Default: [`PreprocessProfile::Quick`].
    pub preprocess: PreprocessProfile,

    /// Keep the working directory and every intermediate raster. Default: false.
    pub preserve_intermediate_files: bool,

    /// Maximum number of pages processed at once. Default: available parallelism.
    ///
    /// Each page runs a chain of external processes; 1 processes pages
    /// strictly one after another.
    pub concurrency: usize,

    /// Parent directory for the per-document working directory.
    /// If None, uses the system temp directory.
    pub work_dir_root: Option<PathBuf>,

    /// External programs used for each operation.
    pub tools: ToolCommands,

    /// Receives stage-boundary events. Default: None.
    pub observer: Option<Observer>,
}

impl Default for SearchifyConfig {
    fn default() -> Self {
        Self {
            upsample_resolution: 300,
            downsample_resolution: None,
            preprocess: PreprocessProfile::default(),
            preserve_intermediate_files: false,
            concurrency: default_concurrency(),
            work_dir_root: None,
            tools: ToolCommands::default(),
            observer: None,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl fmt::Debug for SearchifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchifyConfig")
            .field("upsample_resolution", &self.upsample_resolution)
            .field("downsample_resolution", &self.downsample_resolution)
            .field("preprocess", &self.preprocess)
            .field("preserve_intermediate_files", &self.preserve_intermediate_files)
            .field("concurrency", &self.concurrency)
            .field("work_dir_root", &self.work_dir_root)
            .field("tools", &self.tools)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SearchifyObserver>"))
            .finish()
    }
}

impl SearchifyConfig {
    /// Create a new builder for `SearchifyConfig`.
    pub fn builder() -> SearchifyConfigBuilder {
        SearchifyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the downsample stage does any work.
    pub fn downsample_enabled(&self) -> bool {
        matches!(self.downsample_resolution, Some(d) if d != self.upsample_resolution)
    }

    /// Resolution of the final embedded page images.
    pub fn effective_output_resolution(&self) -> u32 {
        self.downsample_resolution
            .unwrap_or(self.upsample_resolution)
    }

    pub(crate) fn validate(&self) -> Result<(), SearchifyError> {
        if self.upsample_resolution == 0 {
            return Err(SearchifyError::InvalidConfig(
                "Upsample resolution must be > 0".into(),
            ));
        }
        if let Some(down) = self.downsample_resolution {
            if down == 0 || down > self.upsample_resolution {
                return Err(SearchifyError::InvalidConfig(format!(
                    "Downsample resolution must be 1–{}, got {}",
                    self.upsample_resolution, down
                )));
            }
        }
        if self.concurrency == 0 {
            return Err(SearchifyError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SearchifyConfig`].
pub struct SearchifyConfigBuilder {
    config: SearchifyConfig,
}

impl fmt::Debug for SearchifyConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchifyConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl SearchifyConfigBuilder {
    pub fn upsample_resolution(mut self, dpi: u32) -> Self {
        self.config.upsample_resolution = dpi;
        self
    }

    pub fn downsample_resolution(mut self, dpi: u32) -> Self {
        self.config.downsample_resolution = Some(dpi);
        self
    }

    pub fn preprocess(mut self, profile: PreprocessProfile) -> Self {
        self.config.preprocess = profile;
        self
    }

    pub fn preserve_intermediate_files(mut self, v: bool) -> Self {
        self.config.preserve_intermediate_files = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn work_dir_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir_root = Some(dir.into());
        self
    }

    pub fn tools(mut self, tools: ToolCommands) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SearchifyConfig, SearchifyError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Image cleanup applied to the deskewed raster before OCR.
///
/// The cleaned raster is only ever fed to the OCR engine; the page image that
/// ends up in the output is the deskewed (optionally resampled) one.
///
/// | Profile | Operations |
/// |---------|------------|
/// | `quick` | grayscale, contrast normalise, despeckle, threshold at 50% |
/// | `lat`   | locally-adaptive threshold, morphological thinning |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessProfile {
    #[default]
    Quick,
    Lat,
}

impl FromStr for PreprocessProfile {
    type Err = SearchifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(PreprocessProfile::Quick),
            "lat" => Ok(PreprocessProfile::Lat),
            other => Err(SearchifyError::InvalidConfig(format!(
                "Unknown preprocess profile '{other}' (expected quick or lat)"
            ))),
        }
    }
}

impl fmt::Display for PreprocessProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PreprocessProfile::Quick => "quick",
            PreprocessProfile::Lat => "lat",
        })
    }
}

// ── External programs ────────────────────────────────────────────────────

/// A program plus the arguments that always precede the operation's own.
///
/// `ToolCommand::new("python").arg("utils/detectColor.py")` runs the Python
/// script with the raster path appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Parse a whitespace-separated command line such as `"python utils/pdf.py"`.
    ///
    /// No quoting rules apply; use [`ToolCommand::new`] and [`ToolCommand::arg`]
    /// for programs whose paths contain spaces.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub(crate) fn leading_args(&self) -> impl Iterator<Item = OsString> + '_ {
        self.args.iter().map(OsString::from)
    }
}

/// The external programs behind each operation.
///
/// Defaults match a stock Linux install with the helper scripts checked out
/// under `utils/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCommands {
    /// Ghostscript, for page rasterisation.
    pub ghostscript: ToolCommand,
    /// ImageMagick `convert`, for deskew, cleanup, resampling and the color PDF.
    pub convert: ToolCommand,
    /// Tesseract, for hOCR output.
    pub tesseract: ToolCommand,
    /// pdftk, for page count, metadata and the two-stream merge.
    pub pdftk: ToolCommand,
    /// jbig2enc encoder.
    pub jbig2: ToolCommand,
    /// Prints a classification code for a raster (`0` = bitonal).
    pub color_detector: ToolCommand,
    /// Wraps jbig2enc output into a PDF, written to stdout.
    pub jbig2_pdf: ToolCommand,
    /// Lays hOCR text invisibly over each page of a PDF.
    pub hocr_overlay: ToolCommand,
}

impl Default for ToolCommands {
    fn default() -> Self {
        Self {
            ghostscript: ToolCommand::new("gs"),
            convert: ToolCommand::new("convert"),
            tesseract: ToolCommand::new("tesseract"),
            pdftk: ToolCommand::new("pdftk"),
            jbig2: ToolCommand::new("jbig2"),
            color_detector: ToolCommand::new("python").arg("utils/detectColor.py"),
            jbig2_pdf: ToolCommand::new("python").arg("utils/pdf.py"),
            hocr_overlay: ToolCommand::new("python").arg("utils/hocr-pdf"),
        }
    }
}
