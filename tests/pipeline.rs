//! Integration tests for the render → annotate → extract pipeline.
//!
//! The annotator talks to a scripted [`VisionModel`] instead of the network.
//! Page images are synthesised with the `image` crate; page `n` is `10 + n`
//! pixels wide, which lets the fake model tell pages apart from the encoded
//! bytes alone, whatever order the calls arrive in.
//!
//! The pdfium-backed tests need a pdfium library on the system and are gated
//! behind `PDF2HTML_E2E`:
//!
//!   PDF2HTML_E2E=1 PDFIUM_LIB_PATH=/path/to/lib cargo test --test pipeline

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_pdf2html::{
    annotate_dir, extract_dir, process_document, render_pdf, AnthropicClient, EncodedImage,
    PageError, Pdf2HtmlError, PipelineConfig, ProgressCallback, ResponseRecord, Stage,
    VisionError, VisionModel,
};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Scripted vision model keyed by the page encoded in the image width.
#[derive(Default)]
struct ScriptedModel {
    calls: AtomicUsize,
    fail: Vec<u32>,
    offline: Vec<u32>,
    no_fence: Vec<u32>,
    seen: Mutex<Vec<(u32, image::ColorType)>>,
}

impl ScriptedModel {
    fn failing(pages: &[u32]) -> Self {
        Self {
            fail: pages.to_vec(),
            ..Default::default()
        }
    }

    /// The connection drops for these pages before any reply arrives.
    fn offline_for(pages: &[u32]) -> Self {
        Self {
            offline: pages.to_vec(),
            ..Default::default()
        }
    }

    fn without_fence(pages: &[u32]) -> Self {
        Self {
            no_fence: pages.to_vec(),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<(u32, image::ColorType)> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort_by_key(|(page, _)| *page);
        seen
    }
}

impl VisionModel for ScriptedModel {
    async fn describe(&self, prompt: &str, image: &EncodedImage) -> Result<String, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!prompt.is_empty());
        assert_eq!(image.media_type, "image/png");

        let bytes = STANDARD
            .decode(&image.data)
            .map_err(|e| VisionError::Malformed(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
            .map_err(|e| VisionError::Malformed(e.to_string()))?;
        let page = decoded.width() - 10;
        self.seen.lock().unwrap().push((page, decoded.color()));

        if self.fail.contains(&page) {
            return Err(VisionError::Api {
                status: 400,
                body: format!("page {page} rejected"),
            });
        }
        if self.offline.contains(&page) {
            return Err(VisionError::Transport(format!(
                "connection reset while sending page {page}"
            )));
        }
        if self.no_fence.contains(&page) {
            return Ok(format!("I could not convert page {page}."));
        }
        Ok(format!(
            "Here is the HTML:\n```html\n<h1>Page {page} heading</h1>\n```\nDone."
        ))
    }

    fn model_name(&self) -> &str {
        "scripted-vision"
    }
}

fn page_image(index: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(10 + index, 6, Rgb([200, 200, 200])))
}

fn write_page(dir: &Path, name: &str, img: &DynamicImage) {
    img.save(dir.join(name)).unwrap();
}

/// `p1.png` … `p{count}.png` plus files that must be ignored.
fn image_dir(count: u32) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=count {
        write_page(dir.path(), &format!("p{i}.png"), &page_image(i));
    }
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
    write_page(dir.path(), "cover.png", &page_image(99));
    dir
}

fn write_record(responses: &Path, index: u32, response: &str) {
    let record = ResponseRecord {
        image: format!("p{index}.png"),
        prompt: "Convert".into(),
        response: response.into(),
        page: None,
        model: None,
    };
    std::fs::write(
        responses.join(format!("p{index}.json")),
        serde_json::to_string_pretty(&record).unwrap(),
    )
    .unwrap();
}

fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn positions(haystack: &str, needles: &[&str]) -> Vec<usize> {
    needles
        .iter()
        .map(|n| haystack.find(n).unwrap_or_else(|| panic!("missing {n}")))
        .collect()
}

// ── Naming round-trip ────────────────────────────────────────────────────────

#[tokio::test]
async fn images_records_and_fragments_share_indices() {
    let dir = image_dir(3);
    let model = ScriptedModel::default();
    let config = PipelineConfig::default();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(annotation.attempted, 3);
    assert_eq!(annotation.written, vec![1, 2, 3]);
    assert_eq!(model.calls(), 3);

    let responses = dir.path().join("claude_responses");
    for i in 1..=3 {
        let record: ResponseRecord =
            serde_json::from_str(&read(responses.join(format!("p{i}.json")))).unwrap();
        assert_eq!(record.image, format!("p{i}.png"));
        assert_eq!(record.page, Some(i));
        assert_eq!(record.model.as_deref(), Some("scripted-vision"));
        assert!(record.response.contains(&format!("Page {i} heading")));
    }

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert_eq!(extraction.indices(), vec![1, 2, 3]);
    for i in 1..=3 {
        assert_eq!(
            read(dir.path().join(format!("p{i}.html"))),
            format!("<h1>Page {i} heading</h1>\n")
        );
    }
    assert_eq!(
        extraction.combined_path.as_deref(),
        Some(dir.path().join("combined.html").as_path())
    );
}

#[tokio::test]
async fn record_layout_is_pretty_json() {
    let dir = image_dir(1);
    let config = PipelineConfig::builder().prompt("Make HTML").build().unwrap();
    assert_ok!(annotate_dir(dir.path(), &ScriptedModel::default(), &config).await);

    let raw = read(dir.path().join("claude_responses/p1.json"));
    assert!(raw.starts_with("{\n  \"image\": \"p1.png\",\n  \"prompt\": \"Make HTML\","));
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["prompt"], "Make HTML");
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_page_is_skipped_and_rest_continue() {
    let dir = image_dir(3);
    let model = ScriptedModel::failing(&[2]);
    let config = PipelineConfig::default();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(model.calls(), 3);
    assert_eq!(annotation.written, vec![1, 3]);
    assert!(annotation.is_success());
    assert!(matches!(
        annotation.failures.as_slice(),
        [PageError::ModelFailed { page: 2, retries: 0, .. }]
    ));
    assert!(!dir.path().join("claude_responses/p2.json").exists());

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert_eq!(extraction.indices(), vec![1, 3]);
    let combined = read(dir.path().join("combined.html"));
    assert!(combined.contains("Page 1</div>"));
    assert!(!combined.contains("Page 2</div>"));
    assert!(combined.contains("Page 3</div>"));
}

#[tokio::test]
async fn transport_failure_skips_only_that_page() {
    let dir = image_dir(3);
    let model = ScriptedModel::offline_for(&[2]);
    let config = PipelineConfig::default();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(model.calls(), 3);
    assert_eq!(annotation.written, vec![1, 3]);
    match annotation.failures.as_slice() {
        [PageError::ModelFailed { page: 2, retries: 0, detail }] => {
            assert!(detail.contains("connection reset"), "{detail}");
        }
        other => panic!("unexpected failures: {other:?}"),
    }
    assert!(!dir.path().join("claude_responses/p2.json").exists());

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert_eq!(extraction.indices(), vec![1, 3]);
    assert!(!dir.path().join("p2.html").exists());
    let combined = read(dir.path().join("combined.html"));
    let pos = positions(&combined, &["Page 1 heading", "Page 3 heading"]);
    assert!(pos[0] < pos[1]);
    assert!(!combined.contains("Page 2</div>"));
}

#[tokio::test]
async fn transport_failure_survives_exhausted_retries() {
    let dir = image_dir(2);
    let model = ScriptedModel::offline_for(&[1]);
    let config = PipelineConfig::builder()
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(model.calls(), 4);
    assert_eq!(annotation.written, vec![2]);
    assert!(matches!(
        annotation.failures.as_slice(),
        [PageError::ModelFailed { page: 1, retries: 2, .. }]
    ));
}

#[tokio::test]
async fn every_page_failing_is_reported_not_raised() {
    let dir = image_dir(2);
    let model = ScriptedModel::failing(&[1, 2]);
    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &PipelineConfig::default()).await);
    assert!(!annotation.is_success());
    assert_eq!(annotation.failures.len(), 2);
}

#[tokio::test]
async fn reply_without_fence_is_omitted_from_combined() {
    let dir = image_dir(3);
    let model = ScriptedModel::without_fence(&[2]);
    let config = PipelineConfig::default();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(annotation.written, vec![1, 2, 3]);

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert_eq!(extraction.indices(), vec![1, 3]);
    assert_eq!(extraction.missing, vec![2]);
    assert!(!dir.path().join("p2.html").exists());

    let combined = read(dir.path().join("combined.html"));
    assert!(!combined.contains("Page 2"));
    assert_eq!(combined.matches("<div class=\"page-break\"></div>").count(), 1);
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn combined_document_follows_index_not_listing_order() {
    let dir = tempfile::tempdir().unwrap();
    let responses = dir.path().join("claude_responses");
    std::fs::create_dir(&responses).unwrap();
    for i in [3, 1, 2, 10] {
        write_record(&responses, i, &format!("```html\n<p>body {i}</p>\n```"));
    }

    let report = assert_ok!(extract_dir(dir.path(), &PipelineConfig::default()).await);
    assert_eq!(report.indices(), vec![1, 2, 3, 10]);

    let combined = read(dir.path().join("combined.html"));
    let at = positions(
        &combined,
        &["<p>body 1</p>", "<p>body 2</p>", "<p>body 3</p>", "<p>body 10</p>"],
    );
    assert!(at.windows(2).all(|w| w[0] < w[1]), "out of order: {at:?}");
}

#[tokio::test]
async fn page_breaks_only_between_pages() {
    let dir = image_dir(3);
    let config = PipelineConfig::default();
    assert_ok!(annotate_dir(dir.path(), &ScriptedModel::default(), &config).await);
    assert_ok!(extract_dir(dir.path(), &config).await);

    let combined = read(dir.path().join("combined.html"));
    assert_eq!(combined.matches("<div class=\"page-break\"></div>").count(), 2);
    assert_eq!(combined.matches("<div class=\"page-number\">").count(), 3);
    let tail = &combined[combined.find("Page 3</div>").unwrap()..];
    assert!(!tail.contains("page-break\"></div>"));
    assert!(combined.ends_with("</body>\n</html>"));
}

#[tokio::test]
async fn concurrent_annotation_matches_sequential() {
    let dir = image_dir(6);
    let model = ScriptedModel::failing(&[4]);
    let config = PipelineConfig::builder().concurrency(4).build().unwrap();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &config).await);
    assert_eq!(annotation.written, vec![1, 2, 3, 5, 6]);
    assert_eq!(
        model.seen().iter().map(|(p, _)| *p).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5, 6]
    );

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert_eq!(extraction.indices(), vec![1, 2, 3, 5, 6]);
}

// ── Discovery edge cases ─────────────────────────────────────────────────────

#[tokio::test]
async fn empty_image_dir_is_fatal_without_model_calls() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("readme.md"), "nothing here").unwrap();
    let model = ScriptedModel::default();

    let err = assert_err!(annotate_dir(dir.path(), &model, &PipelineConfig::default()).await);
    assert!(matches!(err, Pdf2HtmlError::NoImagesFound { .. }));
    assert_eq!(model.calls(), 0);
    assert!(!dir.path().join("claude_responses").exists());
}

#[tokio::test]
async fn mixed_colour_modes_reach_the_model_as_rgb() {
    let dir = tempfile::tempdir().unwrap();
    write_page(
        dir.path(),
        "p1.png",
        &DynamicImage::ImageRgba8(RgbaImage::from_pixel(11, 6, Rgba([9, 9, 9, 40]))),
    );
    write_page(
        dir.path(),
        "p2.png",
        &DynamicImage::ImageLuma8(GrayImage::from_pixel(12, 6, Luma([128]))),
    );
    write_page(
        dir.path(),
        "p3.gif",
        &DynamicImage::ImageRgba8(RgbaImage::from_pixel(13, 6, Rgba([0, 0, 255, 255]))),
    );
    let model = ScriptedModel::default();

    let annotation = assert_ok!(annotate_dir(dir.path(), &model, &PipelineConfig::default()).await);
    assert_eq!(annotation.written, vec![1, 2, 3]);
    assert_eq!(
        model.seen(),
        vec![
            (1, image::ColorType::Rgb8),
            (2, image::ColorType::Rgb8),
            (3, image::ColorType::Rgb8),
        ]
    );
    let record: ResponseRecord =
        serde_json::from_str(&read(dir.path().join("claude_responses/p3.json"))).unwrap();
    assert_eq!(record.image, "p3.gif");
}

#[tokio::test]
async fn gaps_in_numbering_keep_their_indices() {
    let dir = tempfile::tempdir().unwrap();
    for i in [2, 5, 11] {
        write_page(dir.path(), &format!("p{i}.png"), &page_image(i));
    }
    let config = PipelineConfig::default();
    let annotation = assert_ok!(annotate_dir(dir.path(), &ScriptedModel::default(), &config).await);
    assert_eq!(annotation.written, vec![2, 5, 11]);

    let extraction = assert_ok!(extract_dir(dir.path(), &config).await);
    assert!(dir.path().join("p11.html").exists());
    assert!(!dir.path().join("p1.html").exists());
    assert_eq!(extraction.indices(), vec![2, 5, 11]);
}

#[test]
fn blank_credential_is_fatal_before_any_call() {
    let config = PipelineConfig::builder().api_key("   ").build().unwrap();
    let err = assert_err!(AnthropicClient::from_config(&config));
    assert!(matches!(err, Pdf2HtmlError::MissingCredential { .. }));
}

// ── Progress callbacks ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        self.events.lock().unwrap().push(format!("{stage}:start:{total_pages}"));
    }

    fn on_page_error(&self, stage: Stage, page: u32, _error: &str) {
        self.events.lock().unwrap().push(format!("{stage}:error:{page}"));
    }

    fn on_stage_complete(&self, stage: Stage, total_pages: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{stage}:done:{success_count}/{total_pages}"));
    }
}

#[tokio::test]
async fn stages_report_progress() {
    let dir = image_dir(3);
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    assert_ok!(annotate_dir(dir.path(), &ScriptedModel::without_fence(&[3]), &config).await);
    assert_ok!(extract_dir(dir.path(), &config).await);

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "annotate:start:3",
            "annotate:done:3/3",
            "extract:start:3",
            "extract:error:3",
            "extract:done:2/3",
        ]
    );
}

// ── pdfium-backed tests (PDF2HTML_E2E) ───────────────────────────────────────

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("PDF2HTML_E2E").is_err() {
            println!("SKIP: set PDF2HTML_E2E=1 to run pdfium-backed tests");
            return;
        }
    };
}

/// Two blank 200×100 pt pages with a correct xref table.
fn tiny_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >>",
    ];
    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}

fn write_tiny_pdf(dir: &Path) -> PathBuf {
    let path = dir.join("tiny.pdf");
    std::fs::write(&path, tiny_pdf()).unwrap();
    path
}

fn e2e_config() -> PipelineConfig {
    let mut builder = PipelineConfig::builder().dpi(72);
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(lib);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn render_writes_one_image_per_page() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let pdf = write_tiny_pdf(tmp.path());
    let out = tmp.path().join("output_images");

    let output = assert_ok!(render_pdf(pdf.to_str().unwrap(), &out, &e2e_config()).await);
    assert_eq!(output.total_pages, 2);
    assert_eq!(output.pages.iter().map(|p| p.index).collect::<Vec<_>>(), vec![1, 2]);
    for page in &output.pages {
        let on_disk = image::open(&page.path).unwrap();
        assert_eq!((on_disk.width(), on_disk.height()), (200, 100));
        assert_eq!(on_disk.color(), image::ColorType::Rgb8);
    }
}

#[tokio::test]
async fn full_document_through_all_stages() {
    e2e_skip_unless_enabled!();
    let tmp = tempfile::tempdir().unwrap();
    let pdf = write_tiny_pdf(tmp.path());
    let img_dir = tmp.path().join("tiny");

    // 200 px wide pages decode as "page 190" in the scripted model.
    let model = ScriptedModel::default();
    let report = assert_ok!(
        process_document(pdf.to_str().unwrap(), &img_dir, &model, &e2e_config()).await
    );
    assert!(report.is_success());
    assert_eq!(report.rendered, 2);
    assert_eq!(model.calls(), 2);
    assert!(img_dir.join("p1.png").exists());
    assert!(img_dir.join("claude_responses/p2.json").exists());
    assert!(img_dir.join("p2.html").exists());
    assert!(img_dir.join("combined.html").exists());
}
