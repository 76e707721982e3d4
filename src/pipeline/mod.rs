//! Pipeline stages for document-to-JPEG conversion.
//!
//! Each submodule implements exactly one transformation step or one
//! converter backend. Stages are strictly sequential within a request; the
//! only concurrency is the rasteriser running one page ahead of the consumer.
//!
//! ## Data Flow
//!
//! ```text
//!                ┌──▶ render ─────────────────────────┐
//! input ─────────┼──▶ office ──▶ render ──────────────┼──▶ PageSequence
//! (classify)     └──▶ video ──────────────────────────┘
//!
//! ScreenshotRequest ──▶ web ──▶ one JPEG
//! ```
//!
//! 1. [`input`]  : classify an upload into a [`SourceKind`]
//! 2. [`render`] : rasterise a PDF page by page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`office`] : headless office suite → PDF, then [`render`]
//! 4. [`video`]  : one representative frame via ffmpeg
//! 5. [`web`]    : screenshot of a URL in an isolated browser context
//! 6. [`encode`] : JPEG encoding and `data:` URIs
//! 7. [`process`]: bounded execution of the external tools above

pub mod encode;
pub mod input;
pub mod office;
pub mod process;
pub mod render;
pub mod video;
pub mod web;

use crate::config::ConversionConfig;
use crate::error::DocshotError;
use crate::job::ConversionJob;
use crate::sequence::{PageSequence, RawPageStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use input::SourceKind;
use render::{render_pages, PdfiumLibrary, RenderSettings};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use web::ScreenshotRequest;

/// The converter backend selected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// pdfium, page by page.
    Pdf,
    /// Office suite to PDF, then pdfium.
    Office,
    /// ffmpeg, exactly one frame.
    Video,
}

impl Backend {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Pdf => Backend::Pdf,
            SourceKind::Office => Backend::Office,
            SourceKind::Video => Backend::Video,
        }
    }

    /// Whether pages become available one at a time rather than all at once.
    pub fn is_incremental(self) -> bool {
        matches!(self, Backend::Pdf | Backend::Office)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Pdf => "pdf",
            Backend::Office => "office",
            Backend::Video => "video",
        })
    }
}

/// Turns a prepared job into its page sequence.
///
/// The returned sequence owns the job, so the job's workspace lives until
/// the sequence is dropped.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, job: ConversionJob) -> Result<PageSequence, DocshotError>;
}

/// Captures a single JPEG screenshot of a web page.
#[async_trait]
pub trait PageCapturer: Send + Sync {
    async fn capture(&self, request: &ScreenshotRequest) -> Result<Bytes, DocshotError>;
}

/// The production [`Converter`]: pdfium, soffice and ffmpeg.
#[derive(Debug)]
pub struct Toolchain {
    config: Arc<ConversionConfig>,
    pdfium: Arc<PdfiumLibrary>,
}

impl Toolchain {
    pub fn new(config: Arc<ConversionConfig>) -> Self {
        let pdfium = Arc::new(PdfiumLibrary::new(config.pdfium_library_dir.clone()));
        Self { config, pdfium }
    }

    fn render(&self, pdf: std::path::PathBuf) -> RawPageStream {
        render_pages(
            Arc::clone(&self.pdfium),
            pdf,
            RenderSettings::from_config(&self.config),
        )
    }
}

#[async_trait]
impl Converter for Toolchain {
    async fn convert(&self, job: ConversionJob) -> Result<PageSequence, DocshotError> {
        let backend = Backend::for_kind(job.kind);
        let start = Instant::now();
        info!(
            job_id = %job.id(),
            %backend,
            filename = %job.artifact.filename,
            bytes = job.artifact.len,
            "Starting conversion"
        );

        let pages: RawPageStream = match backend {
            Backend::Pdf => self.render(job.artifact.path.clone()),
            Backend::Office => {
                let pdf =
                    office::convert_to_pdf(&self.config, job.workspace(), &job.artifact.path)
                        .await?;
                self.render(pdf)
            }
            Backend::Video => {
                let frame =
                    video::extract_frame(&self.config, job.workspace(), &job.artifact.path)
                        .await?;
                Box::pin(stream::iter([Ok(frame)]))
            }
        };

        info!(
            job_id = %job.id(),
            %backend,
            incremental = backend.is_incremental(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Backend ready"
        );
        Ok(PageSequence::new(pages).scoped(job))
    }
}
