//! Zip encoder.
//!
//! The central directory sits at the end of a zip file, so nothing can be
//! sent until the last page is in. Pages are still written into the archive
//! as they arrive, into an unnamed temporary file inside the job workspace,
//! so memory stays at one page. The finished archive is streamed from disk
//! and the file disappears when the response body is dropped.

use super::{EncodedResponse, ResponseBody};
use crate::error::DocshotError;
use crate::sequence::PageSequence;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use tokio_util::io::ReaderStream;
use tracing::debug;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

pub const ARCHIVE_FILENAME: &str = "pages.zip";

fn zip_error(e: impl std::fmt::Display) -> DocshotError {
    DocshotError::Internal(format!("Failed to write zip archive: {e}"))
}

async fn blocking<T, F>(f: F) -> Result<T, DocshotError>
where
    F: FnOnce() -> Result<T, DocshotError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DocshotError::Internal(format!("Archive task panicked: {e}")))?
}

/// Drain `seq` into a zip archive on disk. Returns the rewound file and its size.
pub async fn write_archive(mut seq: PageSequence) -> Result<(File, u64), DocshotError> {
    let spool = match seq.workspace_dir() {
        Some(dir) => tempfile::tempfile_in(dir).map_err(|e| DocshotError::workspace(dir, e))?,
        None => tempfile::tempfile()
            .map_err(|e| DocshotError::workspace(std::env::temp_dir(), e))?,
    };

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut zip = ZipWriter::new(spool);

    while let Some(page) = seq.next_page().await {
        let page = page?;
        zip = blocking(move || {
            zip.start_file(page.filename(), options).map_err(zip_error)?;
            zip.write_all(page.data()).map_err(zip_error)?;
            Ok(zip)
        })
        .await?;
    }
    let pages = seq.emitted();
    drop(seq);

    let (file, len) = blocking(move || {
        let mut file = zip.finish().map_err(zip_error)?;
        let len = file.seek(SeekFrom::End(0)).map_err(zip_error)?;
        file.rewind().map_err(zip_error)?;
        Ok((file, len))
    })
    .await?;

    debug!(pages, bytes = len, "Zip archive ready");
    Ok((file, len))
}

/// Encode `seq` as a zip archive response.
pub async fn encode(seq: PageSequence) -> Result<EncodedResponse, DocshotError> {
    let (file, len) = write_archive(seq).await?;
    let body = ReaderStream::new(tokio::fs::File::from_std(file));

    Ok(EncodedResponse {
        content_type: "application/zip".to_string(),
        content_disposition: Some(format!("attachment; filename=\"{ARCHIVE_FILENAME}\"")),
        content_length: Some(len),
        body: ResponseBody::Streaming(Box::pin(body)),
    })
}
