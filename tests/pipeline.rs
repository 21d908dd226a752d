//! Orchestrator tests against an in-memory tool set.
//!
//! `FakeTools` stands in for every external program. Each file it writes
//! carries the page it came from (`page:N`, `hocr:N`), and its "PDFs" are
//! plain text with one line per page, so the final output can be read back
//! to check page order, text-layer alignment and metadata.

use pdfsearchify::{
    inspect, AssemblyStep, Classification, ExitInfo, ExternalTools, MergeInstruction, Operation,
    PageError, PipelineEvent, PreprocessProfile, SearchifyConfig, SearchifyError,
    SearchifyObserver, Searchifier, Stage, ToolError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const INFO_MARKER: &str = "--info--";
const INFO_DUMP: &str = "InfoBegin\nInfoKey: Title\nInfoValue: Field Notes &amp; Sketches\n\
InfoBegin\nInfoKey: Author\nInfoValue: A. Archivist\nNumberOfPages: 3\n";

// ── Fake tool set ────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeTools {
    /// Classification code printed for page N (index N-1).
    codes: Vec<&'static str>,
    fail_ocr_on: Option<usize>,
    /// OCR reports success but writes no hOCR file.
    skip_hocr: bool,
    fail_merge: bool,
    /// `apply_metadata` leaves a partial file behind, then fails.
    fail_apply_metadata: bool,
    info: String,
    calls: Mutex<Vec<String>>,
    merge_plan: Mutex<Option<Vec<String>>>,
    resample_dpi: Mutex<Option<(u32, u32)>>,
    compose_dpi: Mutex<Vec<(&'static str, u32)>>,
}

impl FakeTools {
    fn new(codes: &[&'static str]) -> Self {
        Self {
            codes: codes.to_vec(),
            info: INFO_DUMP.to_string(),
            ..Default::default()
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

fn copy(input: &Path, out: &Path) -> Result<(), ToolError> {
    std::fs::copy(input, out)
        .map(|_| ())
        .map_err(|e| ToolError::new(Operation::Deskew, ExitInfo::Code(1), e.to_string()))
}

fn page_of(raster: &Path) -> usize {
    read(raster)
        .trim()
        .trim_start_matches("page:")
        .parse()
        .unwrap_or(0)
}

impl ExternalTools for FakeTools {
    fn page_count(&self, _pdf: &Path) -> Result<usize, ToolError> {
        self.record("page_count");
        Ok(self.codes.len())
    }

    fn dump_metadata(&self, _pdf: &Path, out: &Path) -> Result<(), ToolError> {
        self.record("dump_metadata");
        std::fs::write(out, &self.info).unwrap();
        Ok(())
    }

    fn extract_raster(&self, _pdf: &Path, page: usize, _dpi: u32, out: &Path) -> Result<(), ToolError> {
        self.record(format!("extract:{page}"));
        std::fs::write(out, format!("page:{page}")).unwrap();
        Ok(())
    }

    fn detect_color(&self, raster: &Path) -> Result<String, ToolError> {
        let page = page_of(raster);
        self.record(format!("detect:{page}"));
        Ok(self.codes[page - 1].to_string())
    }

    fn deskew(&self, input: &Path, threshold: u32, out: &Path) -> Result<(), ToolError> {
        assert_eq!(threshold, 40);
        self.record(format!("deskew:{}", page_of(input)));
        copy(input, out)
    }

    fn cleanup(&self, input: &Path, _profile: PreprocessProfile, out: &Path) -> Result<(), ToolError> {
        self.record(format!("cleanup:{}", page_of(input)));
        copy(input, out)
    }

    fn ocr(&self, input: &Path, out_base: &Path) -> Result<PathBuf, ToolError> {
        let page = page_of(input);
        self.record(format!("ocr:{page}"));
        if self.fail_ocr_on == Some(page) {
            return Err(ToolError::new(
                Operation::Ocr,
                ExitInfo::Code(1),
                "Error: image too small to scale",
            ));
        }
        let hocr = PathBuf::from(format!("{}.hocr", out_base.display()));
        if !self.skip_hocr {
            std::fs::write(&hocr, format!("hocr:{page}")).unwrap();
        }
        Ok(hocr)
    }

    fn resample(&self, input: &Path, from: u32, to: u32, out: &Path) -> Result<(), ToolError> {
        self.record(format!("resample:{}", page_of(input)));
        *self.resample_dpi.lock().unwrap() = Some((from, to));
        copy(input, out)
    }

    fn compose_bitonal(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError> {
        self.record("compose_bitonal");
        self.compose_dpi.lock().unwrap().push(("bitonal", dpi));
        let body: Vec<String> = images.iter().map(|p| read(p)).collect();
        std::fs::write(out, body.join("\n")).unwrap();
        Ok(())
    }

    fn compose_color(&self, images: &[PathBuf], dpi: u32, out: &Path) -> Result<(), ToolError> {
        self.record("compose_color");
        self.compose_dpi.lock().unwrap().push(("color", dpi));
        let body: Vec<String> = images.iter().map(|p| read(p)).collect();
        std::fs::write(out, body.join("\n")).unwrap();
        Ok(())
    }

    fn merge(
        &self,
        bitonal: &Path,
        color: &Path,
        instruction: &MergeInstruction,
        out: &Path,
    ) -> Result<(), ToolError> {
        self.record("merge");
        if self.fail_merge {
            return Err(ToolError::new(
                Operation::Merge,
                ExitInfo::Code(3),
                "Error: Unexpected Exception in open_reader()",
            ));
        }
        *self.merge_plan.lock().unwrap() = Some(instruction.page_ranges());
        let a = read(bitonal);
        let b = read(color);
        let a: Vec<&str> = a.lines().collect();
        let b: Vec<&str> = b.lines().collect();
        let merged: Vec<&str> = instruction
            .entries()
            .iter()
            .map(|e| match e.stream.handle() {
                'A' => a[e.index - 1],
                _ => b[e.index - 1],
            })
            .collect();
        std::fs::write(out, merged.join("\n")).unwrap();
        Ok(())
    }

    fn overlay_text(&self, pdf: &Path, layers: &[(usize, PathBuf)], out: &Path) -> Result<(), ToolError> {
        self.record("overlay_text");
        let pages = read(pdf);
        let pages: Vec<&str> = pages.lines().collect();
        assert_eq!(pages.len(), layers.len());
        let body: Vec<String> = pages
            .iter()
            .zip(layers)
            .map(|(page, (_, hocr))| format!("{page}|{}", read(hocr)))
            .collect();
        std::fs::write(out, body.join("\n")).unwrap();
        Ok(())
    }

    fn apply_metadata(&self, pdf: &Path, info: &Path, out: &Path) -> Result<(), ToolError> {
        self.record("apply_metadata");
        if self.fail_apply_metadata {
            std::fs::write(out, "%PDF-1.4 truncated").unwrap();
            return Err(ToolError::new(
                Operation::ApplyMetadata,
                ExitInfo::Code(1),
                "Error: Failed to open PDF file",
            ));
        }
        std::fs::write(out, format!("{}\n{INFO_MARKER}\n{}", read(pdf), read(info))).unwrap();
        Ok(())
    }
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<PipelineEvent>>,
}

impl SearchifyObserver for Recorder {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl Recorder {
    fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    fn names_for_page(&self, page: usize) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.page() == Some(page))
            .map(|e| e.name())
            .collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Fixture {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
    work_root: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.pdf");
    std::fs::write(&input, b"%PDF-1.4\n% fake scan\n").unwrap();
    let output = dir.path().join("out").join("searchable.pdf");
    let work_root = dir.path().join("work");
    std::fs::create_dir_all(&work_root).unwrap();
    Fixture {
        dir,
        input,
        output,
        work_root,
    }
}

fn config(fx: &Fixture, concurrency: usize) -> SearchifyConfig {
    SearchifyConfig::builder()
        .concurrency(concurrency)
        .work_dir_root(&fx.work_root)
        .build()
        .unwrap()
}

fn searchifier(config: SearchifyConfig, tools: &Arc<FakeTools>) -> Searchifier {
    Searchifier::with_tools(config, Arc::clone(tools) as Arc<dyn ExternalTools>).unwrap()
}

/// Page lines of a finished output, without the metadata trailer.
fn output_pages(path: &Path) -> Vec<String> {
    let text = read(path);
    text.split(INFO_MARKER)
        .next()
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn expected_pages(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("page:{i}|hocr:{i}")).collect()
}

fn work_root_is_empty(fx: &Fixture) -> bool {
    std::fs::read_dir(&fx.work_root).unwrap().next().is_none()
}

/// Names in the output directory, staged temp files included.
fn output_dir_entries(fx: &Fixture) -> Vec<String> {
    match std::fs::read_dir(fx.output.parent().unwrap()) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn has_staged_temp(fx: &Fixture) -> bool {
    output_dir_entries(fx)
        .iter()
        .any(|name| name.starts_with(".pdfsearchify-") && name.ends_with(".pdf.tmp"))
}

// ── Page order and merge ─────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_document_keeps_source_order() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0\n", "1", "0\n", "1", "1", "0"]));
    let out = searchifier(config(&fx, 4), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    assert_eq!(out.page_count, 6);
    assert_eq!(output_pages(&fx.output), expected_pages(6));
    let classes: Vec<Classification> = out.pages.iter().map(|p| p.classification).collect();
    assert_eq!(
        classes,
        [
            Classification::Bitonal,
            Classification::Color,
            Classification::Bitonal,
            Classification::Color,
            Classification::Color,
            Classification::Bitonal,
        ]
    );
    assert_eq!(out.stats.bitonal_pages, 3);
    assert_eq!(out.stats.color_pages, 3);
    assert!(out.work_dir.is_none());
}

#[tokio::test]
async fn merge_receives_interleaving_instruction() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1", "0"]));
    searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    let plan = tools.merge_plan.lock().unwrap().clone();
    assert_eq!(plan.unwrap(), ["A1", "B1", "A2"]);
}

#[tokio::test]
async fn all_bitonal_document_skips_color_and_merge() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "0\n", "0"]));
    searchifier(config(&fx, 3), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    assert!(tools.called("compose_bitonal"));
    assert!(!tools.called("compose_color"));
    assert!(!tools.called("merge"));
    assert_eq!(output_pages(&fx.output), expected_pages(3));
}

#[tokio::test]
async fn all_color_document_skips_bitonal_and_merge() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["1", "2"]));
    searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    assert!(!tools.called("compose_bitonal"));
    assert!(tools.called("compose_color"));
    assert!(!tools.called("merge"));
    assert_eq!(output_pages(&fx.output), expected_pages(2));
}

#[tokio::test]
async fn sequential_and_concurrent_runs_agree() {
    let codes = ["1", "0", "0", "1", "0", "1", "1", "0"];
    let mut outputs = Vec::new();
    for concurrency in [1, 3, 8] {
        let fx = fixture();
        let tools = Arc::new(FakeTools::new(&codes));
        searchifier(config(&fx, concurrency), &tools)
            .run(&fx.input, &fx.output)
            .await
            .unwrap();
        outputs.push(read(&fx.output));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn page_failure_aborts_before_assembly() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        fail_ocr_on: Some(2),
        ..FakeTools::new(&["0", "1", "0", "1"])
    });
    let err = searchifier(config(&fx, 1), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    match err {
        SearchifyError::Page(PageError::StageFailed { page, stage, source }) => {
            assert_eq!(page, 2);
            assert_eq!(stage, Stage::Recognize);
            assert_eq!(source.operation, Operation::Ocr);
            assert!(source.diagnostic.contains("too small"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(!fx.output.exists(), "no output may be written");
    assert!(!tools.called("compose"));
    assert!(!tools.called("merge"));
    assert!(!tools.called("overlay_text"));
    // Sequential run: nothing after the failing page starts.
    assert!(!tools.called("extract:3"));
    assert!(!tools.called("extract:4"));
    assert!(work_root_is_empty(&fx));
}

#[tokio::test]
async fn page_failure_with_concurrency_still_yields_no_output() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        fail_ocr_on: Some(5),
        ..FakeTools::new(&["0"; 12])
    });
    let err = searchifier(config(&fx, 4), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SearchifyError::Page(PageError::StageFailed { page: 5, .. })
    ));
    assert!(!fx.output.exists());
    assert!(!tools.called("compose"));
}

#[tokio::test]
async fn same_input_and_output_is_rejected_before_any_tool_runs() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0"]));
    let err = searchifier(config(&fx, 1), &tools)
        .run(&fx.input, &fx.input)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchifyError::SameInputOutput { .. }));
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn missing_input_is_reported() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0"]));
    let err = searchifier(config(&fx, 1), &tools)
        .run(fx.dir.path().join("absent.pdf"), &fx.output)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchifyError::FileNotFound { .. }));
    assert!(tools.calls().is_empty());
}

#[tokio::test]
async fn zero_page_document_is_rejected() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&[]));
    let err = searchifier(config(&fx, 1), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchifyError::EmptyDocument { .. }));
    assert!(!tools.called("extract"));
    assert!(!fx.output.exists());
}

#[tokio::test]
async fn missing_text_layer_fails_before_overlay() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        skip_hocr: true,
        ..FakeTools::new(&["0", "1"])
    });
    let err = searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    match err {
        SearchifyError::MissingTextLayer { page, path } => {
            assert_eq!(page, 1);
            assert!(path.ends_with("ocr-1.hocr"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!tools.called("overlay_text"));
    assert!(!tools.called("apply_metadata"));
    assert!(!fx.output.exists());
    assert!(!has_staged_temp(&fx));
    assert!(work_root_is_empty(&fx));
}

#[tokio::test]
async fn merge_failure_is_reported_as_assembly_error() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        fail_merge: true,
        ..FakeTools::new(&["0", "1", "0"])
    });
    let err = searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    match err {
        SearchifyError::AssemblyFailed { step, source } => {
            assert_eq!(step, AssemblyStep::Merge);
            assert_eq!(source.operation, Operation::Merge);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!tools.called("overlay_text"));
    assert!(!fx.output.exists());
    assert!(!has_staged_temp(&fx));
    assert!(work_root_is_empty(&fx));
}

#[tokio::test]
async fn metadata_failure_leaves_no_partial_output() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        fail_apply_metadata: true,
        ..FakeTools::new(&["0", "1"])
    });
    let err = searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    match err {
        SearchifyError::AssemblyFailed { step, source } => {
            assert_eq!(step, AssemblyStep::RestoreMetadata);
            assert_eq!(source.operation, Operation::ApplyMetadata);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fx.output.exists());
    assert!(output_dir_entries(&fx).is_empty(), "{:?}", output_dir_entries(&fx));
}

#[tokio::test]
async fn metadata_failure_keeps_existing_destination() {
    let fx = fixture();
    std::fs::create_dir_all(fx.output.parent().unwrap()).unwrap();
    std::fs::write(&fx.output, "previous").unwrap();
    let tools = Arc::new(FakeTools {
        fail_apply_metadata: true,
        ..FakeTools::new(&["1"])
    });
    let err = searchifier(config(&fx, 1), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SearchifyError::AssemblyFailed {
            step: AssemblyStep::RestoreMetadata,
            ..
        }
    ));
    assert_eq!(read(&fx.output), "previous");
    assert!(!has_staged_temp(&fx));
}

// ── Working directory and metadata ───────────────────────────────────────────

#[tokio::test]
async fn repeated_runs_are_identical_and_leave_no_work_dirs() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1", "1", "0"]));
    let s = searchifier(config(&fx, 2), &tools);

    s.run(&fx.input, &fx.output).await.unwrap();
    let first = read(&fx.output);
    s.run(&fx.input, &fx.output).await.unwrap();
    let second = read(&fx.output);

    assert_eq!(first, second);
    assert!(work_root_is_empty(&fx));
}

#[tokio::test]
async fn preserved_work_dir_keeps_intermediates() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1"]));
    let config = SearchifyConfig::builder()
        .work_dir_root(&fx.work_root)
        .preserve_intermediate_files(true)
        .build()
        .unwrap();
    let out = searchifier(config, &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    let work = out.work_dir.expect("work dir should be reported");
    assert!(work.starts_with(&fx.work_root));
    for name in [
        "original-1.pnm",
        "deskew-2.pnm",
        "ocr-1.hocr",
        "jbig2.pdf",
        "jpeg.pdf",
        "merged.pdf",
        "searchified.pdf",
        "pdfinfo.txt",
    ] {
        assert!(work.join(name).exists(), "{name} should be kept");
    }
}

#[tokio::test]
async fn document_info_is_restored() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1", "0"]));
    searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    let text = read(&fx.output);
    let trailer = text.split(INFO_MARKER).nth(1).unwrap();
    assert!(trailer.contains("InfoKey: Title"));
    assert!(trailer.contains("InfoValue: A. Archivist"));
}

#[tokio::test]
async fn empty_metadata_dump_copies_pdf_unchanged() {
    let fx = fixture();
    let tools = Arc::new(FakeTools {
        info: String::new(),
        ..FakeTools::new(&["0", "1"])
    });
    searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    assert!(!tools.called("apply_metadata"));
    assert!(!read(&fx.output).contains(INFO_MARKER));
    assert_eq!(output_pages(&fx.output), expected_pages(2));
}

#[tokio::test]
async fn inspect_reports_pages_and_info() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1", "0"]));
    let info = searchifier(config(&fx, 1), &tools)
        .inspect(&fx.input)
        .await
        .unwrap();

    assert_eq!(info.page_count, 3);
    assert_eq!(info.info["Title"], "Field Notes & Sketches");
    assert_eq!(info.info["Author"], "A. Archivist");
    assert!(!tools.called("extract"));
}

#[tokio::test]
async fn inspect_rejects_non_pdf() {
    let fx = fixture();
    let bogus = fx.dir.path().join("notes.txt");
    std::fs::write(&bogus, "hello").unwrap();
    let err = inspect(&bogus, &config(&fx, 1)).await.unwrap_err();
    assert!(matches!(err, SearchifyError::NotAPdf { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn new_output_is_world_readable() {
    use std::os::unix::fs::PermissionsExt;

    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1"]));
    searchifier(config(&fx, 2), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    let mode = std::fs::metadata(&fx.output).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[cfg(unix)]
#[tokio::test]
async fn existing_output_keeps_its_mode() {
    use std::os::unix::fs::PermissionsExt;

    let fx = fixture();
    std::fs::create_dir_all(fx.output.parent().unwrap()).unwrap();
    std::fs::write(&fx.output, "previous").unwrap();
    std::fs::set_permissions(&fx.output, std::fs::Permissions::from_mode(0o640)).unwrap();

    let tools = Arc::new(FakeTools::new(&["0"]));
    searchifier(config(&fx, 1), &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    let mode = std::fs::metadata(&fx.output).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
    assert_eq!(output_pages(&fx.output), expected_pages(1));
}

// ── Resolution ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn downsample_runs_only_when_resolutions_differ() {
    let fx = fixture();
    let tools = Arc::new(FakeTools::new(&["0", "1"]));
    let same = SearchifyConfig::builder()
        .work_dir_root(&fx.work_root)
        .upsample_resolution(300)
        .downsample_resolution(300)
        .build()
        .unwrap();
    searchifier(same, &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();
    assert!(!tools.called("resample"));

    let tools = Arc::new(FakeTools::new(&["0", "1"]));
    let lower = SearchifyConfig::builder()
        .work_dir_root(&fx.work_root)
        .upsample_resolution(300)
        .downsample_resolution(150)
        .build()
        .unwrap();
    searchifier(lower, &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();
    assert!(tools.called("resample:1"));
    assert!(tools.called("resample:2"));
    assert_eq!(*tools.resample_dpi.lock().unwrap(), Some((300, 150)));
    let mut composed = tools.compose_dpi.lock().unwrap().clone();
    composed.sort();
    assert_eq!(composed, [("bitonal", 150), ("color", 150)]);
    assert_eq!(output_pages(&fx.output), expected_pages(2));
}

// ── Observer ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_page_and_assembly_events_in_order() {
    let fx = fixture();
    let recorder = Arc::new(Recorder::default());
    let tools = Arc::new(FakeTools::new(&["0", "1", "0"]));
    let config = SearchifyConfig::builder()
        .concurrency(2)
        .work_dir_root(&fx.work_root)
        .observer(recorder.clone())
        .build()
        .unwrap();
    searchifier(config, &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap();

    for page in 1..=3 {
        assert_eq!(
            recorder.names_for_page(page),
            [
                "startPage",
                "extractPNM",
                "PNMExtracted",
                "detectColor",
                "colorDetected",
                "deskewPNM",
                "PNMDeskewed",
                "preprocessPage",
                "pagePreprocessed",
                "ocrPage",
                "pageOcred",
                "donePage",
            ],
            "page {page}"
        );
    }

    let names = recorder.names();
    assert_eq!(names.first(), Some(&"start"));
    assert_eq!(names.last(), Some(&"done"));
    let pos = |name: &str| names.iter().position(|n| *n == name).unwrap();
    let last_page_done = names.iter().rposition(|n| *n == "donePage").unwrap();
    assert!(last_page_done < pos("composeJBIG2"));
    assert!(last_page_done < pos("composeJPEG"));
    assert!(pos("composedJBIG2") < pos("mergePDF"));
    assert!(pos("composedJPEG") < pos("mergePDF"));
    assert!(pos("mergedPDF") < pos("addText"));
    assert!(pos("textAdded") < pos("restoreMetadata"));
    assert!(pos("metadataRestored") < pos("done"));

    let merge_produced = recorder.events.lock().unwrap().iter().any(|e| {
        matches!(
            e,
            PipelineEvent::AssemblyFinished {
                step: AssemblyStep::Merge,
                produced: true,
                ..
            }
        )
    });
    assert!(merge_produced);
}

#[tokio::test]
async fn failed_page_emits_no_done_events() {
    let fx = fixture();
    let recorder = Arc::new(Recorder::default());
    let tools = Arc::new(FakeTools {
        fail_ocr_on: Some(1),
        ..FakeTools::new(&["0", "0"])
    });
    let config = SearchifyConfig::builder()
        .concurrency(1)
        .work_dir_root(&fx.work_root)
        .observer(recorder.clone())
        .build()
        .unwrap();
    searchifier(config, &tools)
        .run(&fx.input, &fx.output)
        .await
        .unwrap_err();

    let names = recorder.names();
    assert!(names.contains(&"ocrPage"));
    assert!(!names.contains(&"pageOcred"));
    assert!(!names.contains(&"donePage"));
    assert!(!names.contains(&"done"));
    assert!(!names.contains(&"composeJBIG2"));
}
