//! Configuration for the conversion service.
//!
//! Every knob lives in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. The struct is cheap to clone and is shared
//! read-only (behind an `Arc`) by every request, so there is exactly one
//! place to look when two deployments behave differently.

use crate::error::DocshotError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed browser viewport width for screenshots.
pub const VIEWPORT_WIDTH: u32 = 1920;
/// Fixed browser viewport height for screenshots.
pub const VIEWPORT_HEIGHT: u32 = 1080;

/// Configuration shared by every conversion job.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docshot::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(150)
///     .jpeg_quality(85)
///     .office_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rasterisation resolution for PDF pages. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Maximum rendered width or height in pixels. Default: 5000.
    ///
    /// Applied after the DPI scale, so a poster-sized page cannot allocate an
    /// unbounded bitmap.
    pub max_rendered_pixels: u32,

    /// JPEG quality for rendered pages and screenshots. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Budget for rasterising one whole PDF, in seconds. Default: 120.
    pub pdf_timeout_secs: u64,

    /// Budget for the office → PDF stage, in seconds. Default: 120.
    pub office_timeout_secs: u64,

    /// Budget for extracting a video frame, in seconds. Default: 60.
    pub video_timeout_secs: u64,

    /// Budget for loading a page in the browser, in seconds. Default: 30.
    pub navigation_timeout_secs: u64,

    /// Office suite executable. Default: `soffice`.
    pub soffice_path: String,

    /// ffmpeg executable. Default: `ffmpeg`.
    pub ffmpeg_path: String,

    /// Chrome/Chromium executable. `None` lets the browser crate search for one.
    pub chrome_path: Option<PathBuf>,

    /// Directory holding the pdfium shared library. `None` binds the system library.
    pub pdfium_library_dir: Option<PathBuf>,

    /// Parent directory for per-request workspaces. `None` uses the system temp dir.
    pub work_root: Option<PathBuf>,

    /// Largest accepted upload body in bytes. Default: 100 MiB.
    pub max_upload_bytes: usize,

    /// How long the shared browser may sit idle before it is shut down. Default: 3600.
    pub browser_idle_timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 5000,
            jpeg_quality: 90,
            pdf_timeout_secs: 120,
            office_timeout_secs: 120,
            video_timeout_secs: 60,
            navigation_timeout_secs: 30,
            soffice_path: "soffice".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            chrome_path: None,
            pdfium_library_dir: None,
            work_root: None,
            max_upload_bytes: 100 * 1024 * 1024,
            browser_idle_timeout_secs: 3600,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("pdf_timeout_secs", &self.pdf_timeout_secs)
            .field("office_timeout_secs", &self.office_timeout_secs)
            .field("video_timeout_secs", &self.video_timeout_secs)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("soffice_path", &self.soffice_path)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("chrome_path", &self.chrome_path)
            .field("pdfium_library_dir", &self.pdfium_library_dir)
            .field("work_root", &self.work_root)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("browser_idle_timeout_secs", &self.browser_idle_timeout_secs)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_timeout_secs)
    }

    pub fn office_timeout(&self) -> Duration {
        Duration::from_secs(self.office_timeout_secs)
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn pdf_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pdf_timeout_secs = secs;
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs;
        self
    }

    pub fn video_timeout_secs(mut self, secs: u64) -> Self {
        self.config.video_timeout_secs = secs;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<String>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn browser_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.browser_idle_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, DocshotError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(DocshotError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        let timeouts = [
            ("pdf_timeout_secs", c.pdf_timeout_secs),
            ("office_timeout_secs", c.office_timeout_secs),
            ("video_timeout_secs", c.video_timeout_secs),
            ("navigation_timeout_secs", c.navigation_timeout_secs),
            ("browser_idle_timeout_secs", c.browser_idle_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(DocshotError::InvalidConfig(format!(
                "{name} must be at least 1 second"
            )));
        }
        if c.soffice_path.trim().is_empty() || c.ffmpeg_path.trim().is_empty() {
            return Err(DocshotError::InvalidConfig(
                "Tool paths must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(DocshotError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
