//! Error types for the docshot library.
//!
//! Every request either produces a complete, non-empty page sequence or fails
//! as a whole, so there is a single fatal error type, [`DocshotError`].
//! Each variant belongs to one [`ErrorClass`], which decides the HTTP status
//! the server answers with:
//!
//! * [`ErrorClass::Validation`]: the request itself is unusable (bad upload,
//!   bad format selector, bad URL). Answered with 400.
//! * [`ErrorClass::Conversion`]: the input was accepted but the external
//!   converter could not turn it into pages (tool failure, timeout, empty
//!   document, navigation failure). Also answered with 400.
//! * [`ErrorClass::Internal`]: anything the client could not have caused
//!   (missing tool binary, unloadable pdfium, I/O on the workspace). 500.

use std::path::PathBuf;
use thiserror::Error;

/// Which side of the request a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Conversion,
    Internal,
}

/// All fatal errors returned by the docshot library.
#[derive(Debug, Error)]
pub enum DocshotError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Upload extension / content type is not one of the supported kinds.
    #[error("Unsupported file type for '{filename}'; expected a PDF, office document or video")]
    UnsupportedFileType { filename: String },

    /// The uploaded body was zero bytes long.
    #[error("Uploaded file is empty")]
    EmptyUpload,

    /// A required multipart field was not sent.
    #[error("Missing required form field '{field}'")]
    MissingField { field: &'static str },

    /// The multipart body could not be read.
    #[error("Malformed upload: {detail}")]
    MalformedUpload { detail: String },

    /// `response_format` was given but is not multipart, zip or json.
    #[error("Unsupported response_format '{value}'; expected one of multipart, zip, json")]
    InvalidResponseFormat { value: String },

    /// No URL was supplied to the screenshot endpoint.
    #[error("URL parameter is required")]
    MissingUrl,

    /// The URL could not be parsed at all.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The URL parsed but its scheme is not http or https.
    #[error("URL must start with http:// or https:// (got scheme '{scheme}')")]
    InvalidUrlScheme { scheme: String },

    /// The screenshot request body was not valid JSON.
    #[error("Invalid JSON body: {detail}")]
    InvalidJsonBody { detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// An external tool exceeded its time budget and was killed.
    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: &'static str, secs: u64 },

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed (exit status {status}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    /// Stage 1 of the office path (document → PDF) did not produce a PDF.
    #[error("Office document conversion failed: {detail}")]
    OfficeConversionFailed { detail: String },

    /// pdfium could not parse the document.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// The PDF is encrypted; passwords are not accepted over HTTP.
    #[error("PDF is encrypted and requires a password")]
    PasswordRequired,

    /// The document parsed but contains no pages.
    #[error("Document produced no pages")]
    EmptyDocument,

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The media file yielded no usable frame.
    #[error("Frame extraction failed: {detail}")]
    FrameExtractionFailed { detail: String },

    /// The browser could not load the page in time.
    #[error("Failed to capture screenshot of '{url}': {detail}")]
    NavigationFailed { url: String, detail: String },

    // ── Internal errors ───────────────────────────────────────────────────
    /// The tool binary could not be started at all.
    #[error("Failed to launch {tool} ('{program}'): {source}")]
    ToolUnavailable {
        tool: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    /// The headless browser could not be started.
    #[error("Failed to launch headless browser: {0}")]
    BrowserLaunchFailed(String),

    /// Creating or writing the per-request workspace failed.
    #[error("Workspace I/O error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocshotError {
    /// Which side of the request this error is attributed to.
    pub fn class(&self) -> ErrorClass {
        use DocshotError::*;
        match self {
            UnsupportedFileType { .. }
            | EmptyUpload
            | MissingField { .. }
            | MalformedUpload { .. }
            | InvalidResponseFormat { .. }
            | MissingUrl
            | InvalidUrl { .. }
            | InvalidUrlScheme { .. }
            | InvalidJsonBody { .. } => ErrorClass::Validation,

            Timeout { .. }
            | ToolFailed { .. }
            | OfficeConversionFailed { .. }
            | CorruptPdf { .. }
            | PasswordRequired
            | EmptyDocument
            | RasterisationFailed { .. }
            | FrameExtractionFailed { .. }
            | NavigationFailed { .. } => ErrorClass::Conversion,

            ToolUnavailable { .. }
            | PdfiumBindingFailed(_)
            | BrowserLaunchFailed(_)
            | Workspace { .. }
            | InvalidConfig(_)
            | Internal(_) => ErrorClass::Internal,
        }
    }

    /// Stable machine-readable code, returned to clients next to the message.
    pub fn code(&self) -> &'static str {
        use DocshotError::*;
        match self {
            UnsupportedFileType { .. } => "unsupported-file-type",
            EmptyUpload => "empty-upload",
            MissingField { .. } => "missing-field",
            MalformedUpload { .. } => "malformed-upload",
            InvalidResponseFormat { .. } => "invalid-response-format",
            MissingUrl => "missing-url",
            InvalidUrl { .. } => "invalid-url",
            InvalidUrlScheme { .. } => "invalid-url-scheme",
            InvalidJsonBody { .. } => "invalid-json-body",
            Timeout { .. } => "timeout",
            ToolFailed { .. } => "tool-failed",
            OfficeConversionFailed { .. } => "office-conversion-failed",
            CorruptPdf { .. } => "corrupt-pdf",
            PasswordRequired => "password-required",
            EmptyDocument => "empty-document",
            RasterisationFailed { .. } => "rasterisation-failed",
            FrameExtractionFailed { .. } => "frame-extraction-failed",
            NavigationFailed { .. } => "navigation-failed",
            ToolUnavailable { .. } => "tool-unavailable",
            PdfiumBindingFailed(_) => "pdfium-unavailable",
            BrowserLaunchFailed(_) => "browser-unavailable",
            Workspace { .. } => "workspace-io",
            InvalidConfig(_) => "invalid-config",
            Internal(_) => "internal",
        }
    }

    /// Wrap an I/O failure on a workspace path.
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocshotError::Workspace {
            path: path.into(),
            source,
        }
    }
}
