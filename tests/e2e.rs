//! End-to-end integration tests for docshot.
//!
//! These tests drive the real toolchain: pdfium, LibreOffice (`soffice`),
//! `ffmpeg` and a local Chrome. They are gated behind the `E2E_ENABLED`
//! environment variable so they do not run in CI unless explicitly
//! requested, and each test also skips when its tool is not installed.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test e2e -- --nocapture
//!
//! Fixtures (PDF, DOCX, MP4) are generated on the fly, so no test files
//! need to be checked in.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use docshot::job::JobWorkspace;
use docshot::{
    router, AppState, BrowserRuntime, ConversionConfig, ConversionJob, Converter, PageCapturer,
    ScreenshotRequest, Toolchain,
};
use futures::stream;
use http_body_util::BodyExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and `$tool` answers `--version`.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        init_tracing();
    }};
    ($tool:expr) => {{
        e2e_skip_unless_ready!();
        if !tool_available($tool) {
            println!("SKIP: {} not found on PATH", $tool);
            return;
        }
    }};
}

/// Route library logs to the test output; `RUST_LOG=docshot=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tool_available(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn config() -> ConversionConfig {
    let mut builder = ConversionConfig::builder().dpi(72);
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library_dir(PathBuf::from(dir));
    }
    builder.build().expect("valid config")
}

/// A small valid PDF with `pages` Letter-sized pages, each labelled.
fn minimal_pdf(pages: usize) -> Vec<u8> {
    let font_id = 3 + 2 * pages;
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {pages} >>", kids.join(" ")),
    ];
    for i in 0..pages {
        let content = format!("BT /F1 48 Tf 72 700 Td (Page {}) Tj ET", i + 1);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {} 0 R >>",
            4 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ));
    }
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{obj}\nendobj\n", i + 1).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

/// A one-paragraph Word document.
fn minimal_docx() -> Vec<u8> {
    use zip::write::{FileOptions, ZipWriter};

    let files = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#,
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#,
        ),
        (
            "word/document.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body><w:p><w:r><w:t>Hello from docshot</w:t></w:r></w:p></w:body>
</w:document>"#,
        ),
    ];

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A one-second synthetic clip, generated with ffmpeg's test source.
fn synthetic_video(dir: &Path) -> PathBuf {
    let path = dir.join("clip.mp4");
    let status = std::process::Command::new("ffmpeg")
        .args([
            "-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i",
            "testsrc=duration=1:size=320x240:rate=10", "-pix_fmt", "yuv420p",
        ])
        .arg(&path)
        .status()
        .expect("ffmpeg runs");
    assert!(status.success(), "ffmpeg failed to generate the fixture");
    path
}

/// Spool `data` into a fresh workspace and prepare a job for it.
async fn prepare_job(root: &Path, filename: &str, data: Vec<u8>) -> ConversionJob {
    let workspace = JobWorkspace::create(Some(root)).unwrap();
    let chunks = stream::iter([Ok::<_, std::io::Error>(Bytes::from(data))]);
    let artifact = workspace.spool(filename, None, chunks).await.unwrap();
    ConversionJob::prepare(workspace, artifact).unwrap()
}

fn assert_decodes(jpeg: &[u8], context: &str) -> (u32, u32) {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .unwrap_or_else(|e| panic!("[{context}] not a JPEG: {e}"));
    assert!(img.width() > 0 && img.height() > 0, "[{context}] empty image");
    (img.width(), img.height())
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_pages_in_order() {
    e2e_skip_unless_ready!();
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    let job = prepare_job(root.path(), "three.pdf", minimal_pdf(3)).await;
    let pages = toolchain.convert(job).await.unwrap().collect_all().await.unwrap();

    assert_eq!(pages.len(), 3);
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.index(), i + 1);
        assert_eq!(page.filename(), format!("page-{}.jpg", i + 1));
        // 612×792 pt at 72 DPI, give or take rounding
        let (w, h) = assert_decodes(page.data(), "pdf");
        assert!(w.abs_diff(612) <= 1 && h.abs_diff(792) <= 1, "got {w}x{h}");
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_corrupt_pdf_is_rejected() {
    e2e_skip_unless_ready!();
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    let job = prepare_job(root.path(), "broken.pdf", b"%PDF-1.4\ngarbage".to_vec()).await;
    let err = toolchain.convert(job).await.unwrap().collect_all().await.unwrap_err();
    assert_eq!(err.code(), "corrupt-pdf", "got: {err}");
}

#[tokio::test]
async fn test_dropping_sequence_stops_rendering() {
    e2e_skip_unless_ready!();
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    let job = prepare_job(root.path(), "long.pdf", minimal_pdf(50)).await;
    let mut seq = toolchain.convert(job).await.unwrap();
    let first = seq.next_page().await.unwrap().unwrap();
    assert_eq!(first.index(), 1);
    drop(seq);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pdf_conversions() {
    e2e_skip_unless_ready!();
    let root = tempfile::tempdir().unwrap();
    let toolchain = Arc::new(Toolchain::new(Arc::new(config())));

    let jobs = (0..3).map(|n| {
        let toolchain = Arc::clone(&toolchain);
        let root = root.path().to_path_buf();
        tokio::spawn(async move {
            let job = prepare_job(&root, &format!("doc-{n}.pdf"), minimal_pdf(4 + n)).await;
            toolchain.convert(job).await?.collect_all().await
        })
    });
    for (n, joined) in futures::future::join_all(jobs).await.into_iter().enumerate() {
        let pages = joined.unwrap().unwrap();
        assert_eq!(pages.len(), 4 + n);
        for page in &pages {
            assert_decodes(page.data(), "concurrent pdf");
        }
    }
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_consumer_does_not_block_other_documents() {
    e2e_skip_unless_ready!();
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    // The first job's worker is left parked with page 2 ready.
    let slow = prepare_job(root.path(), "slow.pdf", minimal_pdf(10)).await;
    let mut slow = toolchain.convert(slow).await.unwrap();
    assert_eq!(slow.next_page().await.unwrap().unwrap().index(), 1);

    let fast = prepare_job(root.path(), "fast.pdf", minimal_pdf(3)).await;
    let pages = tokio::time::timeout(Duration::from_secs(60), async {
        toolchain.convert(fast).await.unwrap().collect_all().await
    })
    .await
    .expect("second document rendered while the first was stalled")
    .unwrap();
    assert_eq!(pages.len(), 3);

    let mut rest = 0;
    while let Some(page) = slow.next_page().await {
        page.unwrap();
        rest += 1;
    }
    assert_eq!(rest, 9);
}

// ── Office ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_docx_via_office_suite() {
    e2e_skip_unless_ready!("soffice");
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    let job = prepare_job(root.path(), "hello.docx", minimal_docx()).await;
    let pages = toolchain.convert(job).await.unwrap().collect_all().await.unwrap();
    assert!(!pages.is_empty());
    assert_decodes(pages[0].data(), "docx");
}

// ── Video ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_video_yields_one_frame() {
    e2e_skip_unless_ready!("ffmpeg");
    let fixtures = tempfile::tempdir().unwrap();
    let clip = std::fs::read(synthetic_video(fixtures.path())).unwrap();

    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));
    let job = prepare_job(root.path(), "clip.mp4", clip).await;
    let pages = toolchain.convert(job).await.unwrap().collect_all().await.unwrap();

    assert_eq!(pages.len(), 1);
    assert_eq!(assert_decodes(pages[0].data(), "video"), (320, 240));
}

#[tokio::test]
async fn test_garbage_video_is_a_conversion_error() {
    e2e_skip_unless_ready!("ffmpeg");
    let root = tempfile::tempdir().unwrap();
    let toolchain = Toolchain::new(Arc::new(config()));

    let job = prepare_job(root.path(), "noise.mp4", vec![0x42; 4096]).await;
    let err = toolchain.convert(job).await.unwrap_err();
    assert!(
        matches!(err.code(), "tool-failed" | "frame-extraction-failed"),
        "got: {err}"
    );
}

// ── Screenshot ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_screenshot_of_local_page() {
    e2e_skip_unless_ready!();
    let page = axum::Router::new().route(
        "/",
        axum::routing::get(|| async {
            axum::response::Html("<html><body style='background:#c33'><h1>docshot</h1></body></html>")
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, page).await });

    let runtime = BrowserRuntime::new(&config());
    let request = ScreenshotRequest::parse(&format!("http://{addr}/")).unwrap();
    let jpeg = runtime.capture(&request).await.unwrap();
    assert_decodes(&jpeg, "screenshot");
    assert!(runtime.is_launched().await);

    // A second capture reuses the running browser.
    let again = runtime.capture(&request).await.unwrap();
    assert!(!again.is_empty());

    runtime.shutdown().await;
    assert!(!runtime.is_launched().await);
}

/// Poll until the browser reports `expected` tabs, returning the last count.
async fn settle_tabs(runtime: &BrowserRuntime, expected: usize) -> usize {
    let mut count = 0;
    for _ in 0..50 {
        count = runtime.open_tabs().await.unwrap_or(0);
        if count == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    count
}

#[tokio::test]
async fn test_browser_contexts_are_disposed() {
    e2e_skip_unless_ready!();
    let page = axum::Router::new().route(
        "/",
        axum::routing::get(|| async { axum::response::Html("<h1>tabs</h1>") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, page).await });

    let runtime = BrowserRuntime::new(&config());
    let good = ScreenshotRequest::parse(&format!("http://{addr}/")).unwrap();
    // Port 9 (discard) is not listening, so navigation is refused.
    let bad = ScreenshotRequest::parse("http://127.0.0.1:9/").unwrap();

    runtime.capture(&good).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    let baseline = runtime.open_tabs().await.expect("browser launched");

    let err = runtime.capture(&bad).await.unwrap_err();
    assert_eq!(err.code(), "navigation-failed", "got: {err}");
    assert_eq!(settle_tabs(&runtime, baseline).await, baseline);

    runtime.capture(&good).await.unwrap();
    assert_eq!(settle_tabs(&runtime, baseline).await, baseline);

    runtime.shutdown().await;
}

// ── Full router ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_router_with_real_toolchain() {
    e2e_skip_unless_ready!();
    let config = Arc::new(config());
    let browser = Arc::new(BrowserRuntime::new(&config));
    let app = router(AppState::new(
        Arc::clone(&config),
        Arc::new(Toolchain::new(Arc::clone(&config))),
        browser.clone(),
    ));

    let boundary = "e2e-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"two.pdf\"\r\n\
         Content-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(&minimal_pdf(2));
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let resp = app
        .oneshot(
            Request::post("/convert?response_format=json")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let pages: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1]["filename"], "page-2.jpg");

    // No screenshot was requested, so no browser was started.
    assert!(!browser.is_launched().await);
}
