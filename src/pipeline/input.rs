//! Input classification: decide which backend an upload goes to.
//!
//! The declared filename's extension is authoritative when present. Clients
//! that send extension-less names still work through the declared content
//! type, and as a last resort a `%PDF` signature sniff (generic
//! `application/octet-stream` uploads were accepted as PDFs historically).
//! Classification has no side effects; rejecting an upload is a
//! [`DocshotError`] of the validation class.

use crate::error::DocshotError;
use crate::job::SourceArtifact;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Extensions routed through the office normaliser.
pub const OFFICE_EXTENSIONS: &[&str] = &["doc", "docx", "xls", "xlsx", "ppt", "pptx"];

/// Extensions routed through the video frame extractor.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "avi", "mkv", "webm", "mpg", "mpeg", "wmv", "flv", "3gp", "ogv", "ts",
];

/// The kind of source document, one per converter backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Office,
    Video,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Office => "office",
            SourceKind::Video => "video",
        })
    }
}

/// Lower-cased extension of `filename`, if it has a plausible one.
///
/// Only short alphanumeric suffixes count, so `archive.tar.gz` yields `gz`
/// and `report.` or `.bashrc` yield nothing.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Map an extension to a source kind.
pub fn kind_for_extension(ext: &str) -> Option<SourceKind> {
    let ext = ext.to_ascii_lowercase();
    if ext == "pdf" {
        Some(SourceKind::Pdf)
    } else if OFFICE_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Office)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(SourceKind::Video)
    } else {
        None
    }
}

/// Map a declared content type to a source kind.
pub fn kind_for_content_type(content_type: &str) -> Option<SourceKind> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/pdf" => Some(SourceKind::Pdf),
        "application/msword"
        | "application/vnd.ms-excel"
        | "application/vnd.ms-powerpoint" => Some(SourceKind::Office),
        m if m.starts_with("application/vnd.openxmlformats-officedocument.") => {
            Some(SourceKind::Office)
        }
        m if m.starts_with("video/") => Some(SourceKind::Video),
        _ => None,
    }
}

fn is_generic_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.trim().to_ascii_lowercase();
            ct.is_empty() || ct.starts_with("application/octet-stream")
        }
    }
}

/// Decide which backend handles `artifact`.
pub fn classify(artifact: &SourceArtifact) -> Result<SourceKind, DocshotError> {
    if artifact.len == 0 {
        return Err(DocshotError::EmptyUpload);
    }

    let unsupported = || DocshotError::UnsupportedFileType {
        filename: artifact.filename.clone(),
    };

    let kind = match extension_of(&artifact.filename) {
        Some(ext) => kind_for_extension(&ext).ok_or_else(unsupported)?,
        None => {
            let declared = artifact.content_type.as_deref();
            match declared.and_then(kind_for_content_type) {
                Some(kind) => kind,
                None if is_generic_content_type(declared) && artifact.head.starts_with(b"%PDF") => {
                    SourceKind::Pdf
                }
                None => return Err(unsupported()),
            }
        }
    };

    debug!(filename = %artifact.filename, %kind, "Classified upload");
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifact(filename: &str, content_type: Option<&str>, body: &[u8]) -> SourceArtifact {
        SourceArtifact {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            path: PathBuf::from("/nonexistent"),
            len: body.len() as u64,
            head: body.iter().take(8).copied().collect(),
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF").as_deref(), Some("pdf"));
        assert_eq!(extension_of("a/b/slides.pptx").as_deref(), Some("pptx"));
        assert_eq!(extension_of("C:\\docs\\sheet.xls").as_deref(), Some("xls"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("weird.p df"), None);
    }

    #[test]
    fn extensions_select_backends() {
        let cases = [
            ("a.pdf", SourceKind::Pdf),
            ("a.doc", SourceKind::Office),
            ("a.docx", SourceKind::Office),
            ("a.xls", SourceKind::Office),
            ("a.XLSX", SourceKind::Office),
            ("a.ppt", SourceKind::Office),
            ("a.pptx", SourceKind::Office),
            ("clip.mp4", SourceKind::Video),
            ("clip.MOV", SourceKind::Video),
            ("clip.webm", SourceKind::Video),
        ];
        for (name, expected) in cases {
            let got = classify(&artifact(name, None, b"data")).unwrap();
            assert_eq!(got, expected, "{name}");
        }
    }

    #[test]
    fn txt_is_rejected_even_with_pdf_content_type() {
        let err = classify(&artifact("notes.txt", Some("application/pdf"), b"%PDF-1.4")).unwrap_err();
        assert_eq!(err.code(), "unsupported-file-type");
    }

    #[test]
    fn empty_body_is_rejected_before_type_check() {
        let err = classify(&artifact("doc.pdf", Some("application/pdf"), b"")).unwrap_err();
        assert_eq!(err.code(), "empty-upload");
    }

    #[test]
    fn content_type_used_without_extension() {
        let ct = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        assert_eq!(
            classify(&artifact("upload", Some(ct), b"PK\x03\x04")).unwrap(),
            SourceKind::Office
        );
        assert_eq!(
            classify(&artifact("upload", Some("video/mp4"), b"....ftyp")).unwrap(),
            SourceKind::Video
        );
        assert_eq!(
            classify(&artifact("upload", Some("application/pdf; charset=binary"), b"x")).unwrap(),
            SourceKind::Pdf
        );
    }

    #[test]
    fn octet_stream_pdf_is_sniffed() {
        assert_eq!(
            classify(&artifact("blob", Some("application/octet-stream"), b"%PDF-1.7\n")).unwrap(),
            SourceKind::Pdf
        );
        assert!(classify(&artifact("blob", Some("application/octet-stream"), b"GIF89a")).is_err());
        assert!(classify(&artifact("blob", Some("text/plain"), b"%PDF-1.7")).is_err());
    }
}
