//! Process-backed [`ExternalTools`] implementation.
//!
//! Every call builds an argument vector and spawns the program directly with
//! [`std::process::Command`]. No shell is involved, so file names containing
//! quotes, spaces or `$(…)` reach the tool verbatim and cannot be
//! interpreted as commands.

use super::{expect_output, pdftk, ExternalTools};
use crate::config::{PreprocessProfile, ToolCommand, ToolCommands};
use crate::error::{ExitInfo, Operation, ToolError};
use crate::pipeline::merge::MergeInstruction;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Runs each operation as a child process.
#[derive(Debug, Clone, Default)]
pub struct CommandTools {
    commands: ToolCommands,
}

impl CommandTools {
    pub fn new(commands: ToolCommands) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &ToolCommands {
        &self.commands
    }

    fn command(&self, tool: &ToolCommand, args: Vec<OsString>) -> Command {
        let mut cmd = Command::new(&tool.program);
        cmd.args(tool.leading_args()).args(args).stdin(Stdio::null());
        cmd
    }

    /// Run to completion, capturing stdout and stderr.
    fn run(
        &self,
        operation: Operation,
        tool: &ToolCommand,
        args: Vec<OsString>,
    ) -> Result<Output, ToolError> {
        let mut cmd = self.command(tool, args);
        debug!("{}: {:?}", operation, cmd);
        let output = cmd
            .output()
            .map_err(|e| ToolError::new(operation, ExitInfo::SpawnFailed(e.to_string()), ""))?;
        check_status(operation, output)
    }

    /// Run to completion with stdout written to `out`.
    fn run_to_file(
        &self,
        operation: Operation,
        tool: &ToolCommand,
        args: Vec<OsString>,
        out: &Path,
    ) -> Result<(), ToolError> {
        let file = File::create(out).map_err(|e| {
            ToolError::new(
                operation,
                ExitInfo::SpawnFailed(format!("cannot create {}: {e}", out.display())),
                "",
            )
        })?;
        let mut cmd = self.command(tool, args);
        cmd.stdout(Stdio::from(file));
        debug!("{}: {:?} > {}", operation, cmd, out.display());
        let output = cmd
            .output()
            .map_err(|e| ToolError::new(operation, ExitInfo::SpawnFailed(e.to_string()), ""))?;
        check_status(operation, output).map(|_| ())
    }
}

fn check_status(operation: Operation, output: Output) -> Result<Output, ToolError> {
    if output.status.success() {
        return Ok(output);
    }
    let exit = match output.status.code() {
        Some(code) => ExitInfo::Code(code),
        None => ExitInfo::Terminated,
    };
    let stderr = String::from_utf8_lossy(&output.stderr);
    let diagnostic = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    };
    Err(ToolError::new(operation, exit, diagnostic))
}

fn os(s: impl AsRef<OsStr>) -> OsString {
    s.as_ref().to_os_string()
}

/// `KEY=path` arguments as used by pdftk handles and the hOCR overlay script.
fn keyed(key: impl AsRef<OsStr>, path: &Path) -> OsString {
    let mut arg = os(key);
    arg.push("=");
    arg.push(path);
    arg
}

/// `base` + `suffix`, without treating dots in `base` as an extension.
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

// ── Argument builders ────────────────────────────────────────────────────

pub(crate) fn extract_args(pdf: &Path, page: usize, dpi: u32, out: &Path) -> Vec<OsString> {
    vec![
        os("-dNOPAUSE"),
        os("-dSAFER"),
        os("-dBATCH"),
        os("-sDEVICE=pnmraw"),
        os(format!("-r{dpi}")),
        os(format!("-dFirstPage={page}")),
        os(format!("-dLastPage={page}")),
        os("-o"),
        os(out),
        os(pdf),
    ]
}

pub(crate) fn deskew_args(input: &Path, threshold_percent: u32, out: &Path) -> Vec<OsString> {
    vec![
        os(input),
        os("-deskew"),
        os(format!("{threshold_percent}%")),
        os(out),
    ]
}

/// ImageMagick operators for each cleanup profile.
pub(crate) fn profile_operators(profile: PreprocessProfile) -> &'static [&'static str] {
    match profile {
        PreprocessProfile::Quick => &[
            "-type", "grayscale", "-blur", "1x65000", "-contrast", "-normalize", "-despeckle",
            "-despeckle", "-threshold", "50%",
        ],
        PreprocessProfile::Lat => &[
            "-respect-parentheses",
            "(",
            "-clone", "0", "-colorspace", "gray", "-negate", "-lat", "15x15+5%",
            "-contrast-stretch", "0",
            ")",
            "-compose", "copy_opacity", "-composite", "-opaque", "none", "+matte",
            "-modulate", "100,100", "-blur", "1x1", "-adaptive-sharpen", "0x2", "-negate",
            "-define", "morphology:compose=darken", "-morphology", "Thinning",
            "Rectangle:1x30+0+0", "-negate",
        ],
    }
}

pub(crate) fn cleanup_args(input: &Path, profile: PreprocessProfile, out: &Path) -> Vec<OsString> {
    let mut args = vec![os(input)];
    args.extend(profile_operators(profile).iter().map(os));
    args.push(os(out));
    args
}

pub(crate) fn resample_args(input: &Path, from_dpi: u32, to_dpi: u32, out: &Path) -> Vec<OsString> {
    vec![
        os("-density"),
        os(from_dpi.to_string()),
        os(input),
        os("-resample"),
        os(to_dpi.to_string()),
        os(out),
    ]
}

pub(crate) fn jbig2_args(basename: &Path, images: &[PathBuf]) -> Vec<OsString> {
    let mut args = vec![os("-s"), os("-p"), os("-v"), os("-b"), os(basename)];
    args.extend(images.iter().map(os));
    args
}

/// PNM carries no resolution; without `-density` ImageMagick assumes 72 DPI.
pub(crate) fn compose_color_args(images: &[PathBuf], dpi: u32, out: &Path) -> Vec<OsString> {
    let mut args = vec![os("-density"), os(dpi.to_string())];
    args.extend(images.iter().map(os));
    args.push(os(out));
    args
}

pub(crate) fn merge_args(
    bitonal: &Path,
    color: &Path,
    instruction: &MergeInstruction,
    out: &Path,
) -> Vec<OsString> {
    let mut args = vec![keyed("A", bitonal), keyed("B", color), os("cat")];
    args.extend(instruction.page_ranges().into_iter().map(OsString::from));
    args.push(os("output"));
    args.push(os(out));
    args
}

pub(crate) fn overlay_args(pdf: &Path, layers: &[(usize, PathBuf)], out: &Path) -> Vec<OsString> {
    let mut args = vec![keyed("output", out)];
    args.extend(
        layers
            .iter()
            .map(|(page, hocr)| keyed(page.to_string(), hocr)),
    );
    args.push(os(pdf));
    args
}

// ── ExternalTools ────────────────────────────────────────────────────────

impl ExternalTools for CommandTools {
    fn page_count(&self, pdf: &Path) -> Result<usize, ToolError> {
        let op = Operation::PageCount;
        let output = self.run(op, &self.commands.pdftk, vec![os(pdf), os("dump_data")])?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        pdftk::parse_page_count(&stdout).ok_or_else(|| {
            ToolError::new(
                op,
                ExitInfo::UnparseableOutput,
                String::from_utf8_lossy(&output.stderr),
            )
        })
    }

    fn dump_metadata(&self, pdf: &Path, out: &Path) -> Result<(), ToolError> {
        let op = Operation::DumpMetadata;
        self.run(
            op,
            &self.commands.pdftk,
            vec![os(pdf), os("dump_data"), os("output"), os(out)],
        )?;
        expect_output(op, out)
    }

    fn extract_raster(
        &self,
        pdf: &Path,
        page: usize,
        dpi: u32,
        out: &Path,
    ) -> Result<(), ToolError> {
        let op = Operation::ExtractRaster;
        self.run(op, &self.commands.ghostscript, extract_args(pdf, page, dpi, out))?;
        expect_output(op, out)
    }

    fn detect_color(&self, raster: &Path) -> Result<String, ToolError> {
        let op = Operation::DetectColor;
        let output = self.run(op, &self.commands.color_detector, vec![os(raster)])?;
        let code = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if code.is_empty() {
            return Err(ToolError::new(
                op,
                ExitInfo::UnparseableOutput,
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(code)
    }

    fn deskew(&self, input: &Path, threshold_percent: u32, out: &Path) -> Result<(), ToolError> {
        let op = Operation::Deskew;
        self.run(op, &self.commands.convert, deskew_args(input, threshold_percent, out))?;
        expect_output(op, out)
    }

    fn cleanup(
        &self,
        input: &Path,
        profile: PreprocessProfile,
        out: &Path,
    ) -> Result<(), ToolError> {
        let op = Operation::Cleanup;
        self.run(op, &self.commands.convert, cleanup_args(input, profile, out))?;
        expect_output(op, out)
    }

    fn ocr(&self, input: &Path, out_base: &Path) -> Result<PathBuf, ToolError> {
        let op = Operation::Ocr;
        self.run(
            op,
            &self.commands.tesseract,
            vec![os(input), os(out_base), os("hocr")],
        )?;
        let hocr = with_suffix(out_base, ".hocr");
        expect_output(op, &hocr)?;
        Ok(hocr)
    }

    fn resample(
        &self,
        input: &Path,
        from_dpi: u32,
        to_dpi: u32,
        out: &Path,
    ) -> Result<(), ToolError> {
        let op = Operation::Resample;
        self.run(op, &self.commands.convert, resample_args(input, from_dpi, to_dpi, out))?;
        expect_output(op, out)
    }

    fn compose_bitonal(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError> {
        let op = Operation::ComposeBitonal;
        // jbig2enc writes <basename>.sym plus <basename>.0000, .0001, … which
        // the PDF wrapper picks up by the same basename.
        let basename = out.with_extension("");
        self.run(op, &self.commands.jbig2, jbig2_args(&basename, images))?;
        self.run_to_file(
            op,
            &self.commands.jbig2_pdf,
            vec![os(&basename), os(dpi.to_string())],
            out,
        )?;
        expect_output(op, out)
    }

    fn compose_color(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError> {
        let op = Operation::ComposeColor;
        self.run(op, &self.commands.convert, compose_color_args(images, dpi, out))?;
        expect_output(op, out)
    }

    fn merge(
        &self,
        bitonal: &Path,
        color: &Path,
        instruction: &MergeInstruction,
        out: &Path,
    ) -> Result<(), ToolError> {
        let op = Operation::Merge;
        self.run(
            op,
            &self.commands.pdftk,
            merge_args(bitonal, color, instruction, out),
        )?;
        expect_output(op, out)
    }

    fn overlay_text(
        &self,
        pdf: &Path,
        layers: &[(usize, PathBuf)],
        out: &Path,
    ) -> Result<(), ToolError> {
        let op = Operation::OverlayText;
        self.run(op, &self.commands.hocr_overlay, overlay_args(pdf, layers, out))?;
        expect_output(op, out)
    }

    fn apply_metadata(&self, pdf: &Path, info: &Path, out: &Path) -> Result<(), ToolError> {
        let op = Operation::ApplyMetadata;
        self.run(
            op,
            &self.commands.pdftk,
            vec![os(pdf), os("update_info"), os(info), os("output"), os(out)],
        )?;
        expect_output(op, out)
    }
}
