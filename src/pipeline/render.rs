//! PDF rasterisation: render every page to JPEG via pdfium, one at a time.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is CPU-bound
//! and not async-aware. Rendering runs on a blocking-pool thread and hands
//! each finished page to the request through a channel of capacity 1, so the
//! worker is never more than one page ahead of the consumer.
//!
//! ## Sharing pdfium
//!
//! pdfium is not thread-safe. The library is bound once per process and
//! every call into it (load, page access, render, and the drops that free
//! pdfium memory) happens under one process-wide lock. The lock is released
//! before a finished page is handed to the consumer, so a slow client only
//! ever stalls its own job.
//!
//! ## Time budget
//!
//! `pdf_timeout_secs` bounds the time spent inside pdfium and the JPEG
//! encoder, not the time the worker sits waiting for the consumer to take
//! the previous page. The worker tallies its own busy time and fails with
//! `timeout` once it is exceeded. The consumer side additionally gives up
//! if a single page takes longer than the whole budget, which covers a page
//! that never finishes rendering. Either way the receiver goes away and the
//! worker stops at the next page boundary.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 200 DPI would produce a
//! 6,600 × 9,400 px bitmap. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory bounded.

use crate::config::ConversionConfig;
use crate::error::DocshotError;
use crate::pipeline::encode::encode_jpeg;
use crate::sequence::RawPageStream;
use bytes::Bytes;
use futures::stream;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The process-wide binding. Populated on first successful bind.
static BOUND: Mutex<Option<Arc<Pdfium>>> = Mutex::new(None);

/// Held for the duration of every call into pdfium.
static PDFIUM_CALLS: Mutex<()> = Mutex::new(());

fn pdfium_calls() -> MutexGuard<'static, ()> {
    // The guarded data is `()`, so a poisoned lock carries no broken state.
    PDFIUM_CALLS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle on the process-wide pdfium binding, created on first use.
///
/// Binding failures are not cached: a later request retries, so installing
/// the library does not need a restart. Once bound, the first library loaded
/// is used for the rest of the process.
#[derive(Default)]
pub struct PdfiumLibrary {
    library_dir: Option<PathBuf>,
}

impl PdfiumLibrary {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    /// Blocking: may load a shared library.
    fn get(&self) -> Result<Arc<Pdfium>, DocshotError> {
        let mut bound = BOUND.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pdfium) = bound.as_ref() {
            return Ok(Arc::clone(pdfium));
        }

        let _calls = pdfium_calls();
        let bindings = match self.library_dir.as_deref() {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| DocshotError::PdfiumBindingFailed(format!("{e:?}")))?;

        info!(dir = ?self.library_dir, "Bound pdfium library");
        let pdfium = Arc::new(Pdfium::new(bindings));
        *bound = Some(Arc::clone(&pdfium));
        Ok(pdfium)
    }
}

impl std::fmt::Debug for PdfiumLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumLibrary")
            .field("library_dir", &self.library_dir)
            .finish()
    }
}

/// A loaded document whose teardown also happens under the call lock.
struct LockedDocument<'a> {
    document: Option<PdfDocument<'a>>,
}

impl<'a> LockedDocument<'a> {
    fn get(&self) -> Option<&PdfDocument<'a>> {
        self.document.as_ref()
    }
}

impl Drop for LockedDocument<'_> {
    fn drop(&mut self) {
        let _calls = pdfium_calls();
        drop(self.document.take());
    }
}

/// Render settings derived from [`ConversionConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub dpi: u32,
    pub max_pixels: u32,
    pub jpeg_quality: u8,
    pub timeout: Duration,
}

impl RenderSettings {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            jpeg_quality: config.jpeg_quality,
            timeout: config.pdf_timeout(),
        }
    }
}

/// Busy time spent on one document, excluding time blocked on the consumer.
#[derive(Debug)]
struct RenderBudget {
    limit: Duration,
    used: Duration,
}

impl RenderBudget {
    fn new(limit: Duration) -> Self {
        Self {
            limit,
            used: Duration::ZERO,
        }
    }

    fn charge(&mut self, elapsed: Duration) -> Result<(), DocshotError> {
        self.used += elapsed;
        if self.used > self.limit {
            warn!(
                secs = self.limit.as_secs(),
                used_ms = self.used.as_millis() as u64,
                "PDF rasterisation exceeded its time budget"
            );
            return Err(DocshotError::Timeout {
                tool: "pdfium",
                secs: self.limit.as_secs(),
            });
        }
        Ok(())
    }
}

/// Rasterise every page of the PDF at `pdf_path`, in order, as JPEG.
///
/// The returned stream is lazy in the sense that matters: at most one
/// finished page waits in the channel while the next one renders.
pub fn render_pages(
    library: Arc<PdfiumLibrary>,
    pdf_path: PathBuf,
    settings: RenderSettings,
) -> RawPageStream {
    let (tx, rx) = mpsc::channel::<Result<Bytes, DocshotError>>(1);

    let worker = tokio::task::spawn_blocking(move || {
        if let Err(e) = render_pages_blocking(&library, &pdf_path, settings, &tx) {
            // Nobody listening any more is fine; the request is gone.
            let _ = tx.blocking_send(Err(e));
        }
    });

    worker_pages(rx, worker, settings.timeout)
}

struct WorkerPages {
    rx: mpsc::Receiver<Result<Bytes, DocshotError>>,
    worker: JoinHandle<()>,
}

/// Adapt a rendering worker's channel into a page stream.
///
/// Each pull waits at most `per_page`. When the channel closes, a worker
/// that panicked is reported as an internal error rather than an early end
/// of document.
fn worker_pages(
    rx: mpsc::Receiver<Result<Bytes, DocshotError>>,
    worker: JoinHandle<()>,
    per_page: Duration,
) -> RawPageStream {
    let secs = per_page.as_secs();
    Box::pin(stream::unfold(
        Some(WorkerPages { rx, worker }),
        move |state| async move {
            let mut state = state?;
            match tokio::time::timeout(per_page, state.rx.recv()).await {
                Ok(Some(item)) => Some((item, Some(state))),
                Ok(None) => match state.worker.await {
                    Err(e) if e.is_panic() => {
                        error!("PDF rendering worker panicked");
                        Some((
                            Err(DocshotError::Internal(format!("render worker panicked: {e}"))),
                            None,
                        ))
                    }
                    _ => None,
                },
                Err(_) => {
                    warn!(secs, "Timed out waiting for the next rendered page");
                    Some((Err(DocshotError::Timeout { tool: "pdfium", secs }), None))
                }
            }
        },
    ))
}

/// Blocking implementation of page rendering.
///
/// Returns early (with `Ok`) as soon as the receiving side has gone away.
fn render_pages_blocking(
    library: &PdfiumLibrary,
    pdf_path: &Path,
    settings: RenderSettings,
    tx: &mpsc::Sender<Result<Bytes, DocshotError>>,
) -> Result<(), DocshotError> {
    let mut budget = RenderBudget::new(settings.timeout);
    let mut mark = Instant::now();
    let pdfium = library.get()?;

    let (document, total_pages) = {
        let _calls = pdfium_calls();
        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| match e {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                DocshotError::PasswordRequired
            }
            other => DocshotError::CorruptPdf {
                detail: format!("{other:?}"),
            },
        })?;
        let total_pages = document.pages().len() as usize;
        (
            LockedDocument {
                document: Some(document),
            },
            total_pages,
        )
    };
    info!(pages = total_pages, dpi = settings.dpi, "PDF loaded");
    if total_pages == 0 {
        return Err(DocshotError::EmptyDocument);
    }
    let Some(loaded) = document.get() else {
        return Err(DocshotError::Internal("PDF document released early".into()));
    };
    budget.charge(mark.elapsed())?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(settings.dpi as f32 / 72.0)
        .set_maximum_width(settings.max_pixels as i32)
        .set_maximum_height(settings.max_pixels as i32);

    let mut pages = loaded.pages().iter();
    for page_no in 1..=total_pages {
        if tx.is_closed() {
            debug!(page = page_no, "Consumer gone; stopping rasterisation");
            return Ok(());
        }
        mark = Instant::now();

        let image = {
            let _calls = pdfium_calls();
            let page = pages.next().ok_or_else(|| DocshotError::RasterisationFailed {
                page: page_no,
                detail: "page missing from document".into(),
            })?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                DocshotError::RasterisationFailed {
                    page: page_no,
                    detail: format!("{e:?}"),
                }
            })?;
            bitmap.as_image()
        };

        let jpeg = encode_jpeg(&image, settings.jpeg_quality).map_err(|e| {
            DocshotError::RasterisationFailed {
                page: page_no,
                detail: e.to_string(),
            }
        })?;
        debug!(
            page = page_no,
            width = image.width(),
            height = image.height(),
            elapsed_ms = mark.elapsed().as_millis() as u64,
            "Rendered page"
        );
        budget.charge(mark.elapsed())?;

        if tx.blocking_send(Ok(jpeg)).is_err() {
            debug!(page = page_no, "Consumer gone; stopping rasterisation");
            return Ok(());
        }
    }

    Ok(())
}
