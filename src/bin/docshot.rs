//! HTTP server binary for docshot.
//!
//! A thin shim over the library crate that maps CLI flags (with environment
//! fallbacks) to `ConversionConfig`, sets up logging and serves the router
//! until Ctrl-C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use docshot::{router, AppState, BrowserRuntime, ConversionConfig, Toolchain};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"ENDPOINTS:
  POST /convert      multipart/form-data field `file` (pdf, doc[x], xls[x], ppt[x], video)
                     ?response_format=multipart|zip|json  (or Accept: application/zip|json)
  POST /screenshot   ?url=https://…  or JSON body {"url": "https://…"}
  GET  /healthz      {"status":"ok"}

EXAMPLES:
  docshot --bind 127.0.0.1:8000
  curl -F file=@slides.pptx 'http://localhost:8000/convert?response_format=zip' -o pages.zip
  curl -X POST 'http://localhost:8000/screenshot?url=https://example.com' -o shot.jpg

PDFIUM:
  The pdfium shared library is loaded on the first PDF request.
  Point PDFIUM_LIB_PATH at the directory that contains it, or install it system-wide.
"#;

/// Convert documents, videos and web pages into JPEG page images over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "docshot",
    version,
    about = "Convert documents, videos and web pages into JPEG page images over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "DOCSHOT_BIND", default_value = "0.0.0.0:8000")]
    bind: SocketAddr,

    /// Rasterisation DPI for PDF pages (72–600).
    #[arg(long, env = "DOCSHOT_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Longest rendered edge in pixels.
    #[arg(long, env = "DOCSHOT_MAX_PIXELS", default_value_t = 5000)]
    max_pixels: u32,

    /// JPEG quality for pages and screenshots (1–100).
    #[arg(long, env = "DOCSHOT_JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Time budget for rasterising one PDF, in seconds.
    #[arg(long, env = "DOCSHOT_PDF_TIMEOUT", default_value_t = 120)]
    pdf_timeout: u64,

    /// Time budget for office → PDF conversion, in seconds.
    #[arg(long, env = "DOCSHOT_OFFICE_TIMEOUT", default_value_t = 120)]
    office_timeout: u64,

    /// Time budget for video frame extraction, in seconds.
    #[arg(long, env = "DOCSHOT_VIDEO_TIMEOUT", default_value_t = 60)]
    video_timeout: u64,

    /// Time budget for loading a page before a screenshot, in seconds.
    #[arg(long, env = "DOCSHOT_NAVIGATION_TIMEOUT", default_value_t = 30)]
    navigation_timeout: u64,

    /// Close the headless browser after this many idle seconds.
    #[arg(long, env = "DOCSHOT_BROWSER_IDLE_TIMEOUT", default_value_t = 3600)]
    browser_idle_timeout: u64,

    /// Office suite executable.
    #[arg(long, env = "DOCSHOT_SOFFICE", default_value = "soffice")]
    soffice: String,

    /// ffmpeg executable.
    #[arg(long, env = "DOCSHOT_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: String,

    /// Chrome/Chromium executable (auto-detected when unset).
    #[arg(long, env = "DOCSHOT_CHROME")]
    chrome: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Parent directory for per-request workspaces.
    #[arg(long, env = "DOCSHOT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "DOCSHOT_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// Verbose logging (debug level).
    #[arg(short, long, env = "DOCSHOT_VERBOSE")]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "DOCSHOT_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let default_filter = if cli.verbose {
        "docshot=debug,tower_http=debug,info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let config = Arc::new(build_config(&cli)?);
    info!(?config, "Starting docshot");

    let browser = Arc::new(BrowserRuntime::new(&config));
    let state = AppState::new(
        Arc::clone(&config),
        Arc::new(Toolchain::new(Arc::clone(&config))),
        browser.clone(),
    );

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!(addr = %cli.bind, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    browser.shutdown().await;
    info!("Shut down cleanly");
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .jpeg_quality(cli.jpeg_quality)
        .pdf_timeout_secs(cli.pdf_timeout)
        .office_timeout_secs(cli.office_timeout)
        .video_timeout_secs(cli.video_timeout)
        .navigation_timeout_secs(cli.navigation_timeout)
        .browser_idle_timeout_secs(cli.browser_idle_timeout)
        .soffice_path(cli.soffice.as_str())
        .ffmpeg_path(cli.ffmpeg.as_str())
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref path) = cli.chrome {
        builder = builder.chrome_path(path);
    }
    if let Some(ref dir) = cli.pdfium_lib_path {
        builder = builder.pdfium_library_dir(dir);
    }
    if let Some(ref dir) = cli.work_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create work dir {}", dir.display()))?;
        builder = builder.work_root(dir);
    }

    builder.build().context("Invalid configuration")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
