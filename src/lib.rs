//! # docshot
//!
//! Turn PDFs, office documents, videos and web pages into JPEG page images,
//! served over HTTP in the format the client asks for.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Negotiate  response_format / Accept → multipart | zip | json
//!  ├─ 2. Spool      multipart field → per-request workspace on disk
//!  ├─ 3. Classify   extension / content type / %PDF sniff → backend
//!  ├─ 4. Convert    pdfium | soffice → pdfium | ffmpeg
//!  ├─ 5. Sequence   number pages 1..=N, forward-only, fail on N = 0
//!  └─ 6. Serialise  stream multipart, spool zip, or collect json
//!
//! url ─▶ validate ─▶ isolated browser context ─▶ one JPEG
//! ```
//!
//! Each request owns one [`ConversionJob`] whose temporary workspace is
//! removed when the job is dropped, on success, on error, and when a
//! client disconnects mid-stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshot::{router, AppState, BrowserRuntime, ConversionConfig, Toolchain};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(ConversionConfig::default());
//!     let browser = Arc::new(BrowserRuntime::new(&config));
//!     let state = AppState::new(
//!         Arc::clone(&config),
//!         Arc::new(Toolchain::new(Arc::clone(&config))),
//!         browser.clone(),
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, router(state)).await?;
//!     browser.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshot` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another service:
//! ```toml
//! docshot = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Input  | Needs |
//! |--------|-------|
//! | PDF    | pdfium shared library (`PDFIUM_LIB_PATH` or system-wide) |
//! | Office | `soffice` (LibreOffice) plus pdfium |
//! | Video  | `ffmpeg` |
//! | URL    | Chrome or Chromium |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod negotiate;
pub mod pipeline;
pub mod sequence;
pub mod serialize;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use error::{DocshotError, ErrorClass};
pub use job::{ConversionJob, JobWorkspace, SourceArtifact};
pub use negotiate::{negotiate, ResponseFormat};
pub use pipeline::input::{classify, SourceKind};
pub use pipeline::web::{BrowserRuntime, ScreenshotRequest};
pub use pipeline::{Backend, Converter, PageCapturer, Toolchain};
pub use sequence::{PageImage, PageSequence, RawPageStream};
pub use serialize::{serialize, EncodedResponse, ResponseBody};
pub use server::{router, AppState};
