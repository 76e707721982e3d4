//! Per-request conversion jobs and their scoped workspaces.
//!
//! A [`JobWorkspace`] is a [`TempDir`] created for one request. The uploaded
//! bytes are spooled into it, every external tool writes its output below it,
//! and it is removed when the owning value is dropped, whether the request
//! succeeded, failed, or the client went away mid-stream. Nothing inside it
//! is ever shared with another request.

use crate::error::DocshotError;
use crate::pipeline::input::{classify, SourceKind};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Bytes kept from the start of an upload for signature sniffing.
const HEAD_LEN: usize = 8;

/// Scoped temporary working area for one request.
#[derive(Debug)]
pub struct JobWorkspace {
    id: Uuid,
    dir: TempDir,
}

impl JobWorkspace {
    /// Create a fresh workspace under `root` (or the system temp dir).
    pub fn create(root: Option<&Path>) -> Result<Self, DocshotError> {
        let id = Uuid::new_v4();
        let mut builder = tempfile::Builder::new();
        builder.prefix("docshot-");
        let dir = match root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| DocshotError::workspace(root, e))?,
            None => builder
                .tempdir()
                .map_err(|e| DocshotError::workspace(std::env::temp_dir(), e))?,
        };
        debug!(job_id = %id, path = %dir.path().display(), "Created job workspace");
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create (if needed) and return a named subdirectory.
    pub async fn subdir(&self, name: &str) -> Result<PathBuf, DocshotError> {
        let dir = self.dir.path().join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DocshotError::workspace(&dir, e))?;
        Ok(dir)
    }

    /// Write an upload into the workspace chunk by chunk.
    ///
    /// The file is named `input.<ext>` after the declared filename's
    /// extension so that extension-sniffing tools see the right type.
    pub async fn spool<S, E>(
        &self,
        filename: &str,
        content_type: Option<&str>,
        chunks: S,
    ) -> Result<SourceArtifact, DocshotError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut chunks = std::pin::pin!(chunks);
        let path = self.dir.path().join(input_file_name(filename));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DocshotError::workspace(&path, e))?;

        let mut len: u64 = 0;
        let mut head = Vec::with_capacity(HEAD_LEN);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| DocshotError::MalformedUpload {
                detail: e.to_string(),
            })?;
            if head.len() < HEAD_LEN {
                let take = (HEAD_LEN - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| DocshotError::workspace(&path, e))?;
            len += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| DocshotError::workspace(&path, e))?;

        debug!(job_id = %self.id, filename, bytes = len, "Spooled upload");

        Ok(SourceArtifact {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            path,
            len,
            head,
        })
    }
}

/// Name for the spooled input: `input.<ext>`, or `input` without a usable extension.
fn input_file_name(filename: &str) -> String {
    match crate::pipeline::input::extension_of(filename) {
        Some(ext) => format!("input.{ext}"),
        None => "input".to_string(),
    }
}

/// The uploaded document, spooled to disk inside a [`JobWorkspace`].
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    /// Filename as declared by the client.
    pub filename: String,
    /// Content type as declared by the client.
    pub content_type: Option<String>,
    /// Location of the spooled bytes.
    pub path: PathBuf,
    /// Size of the upload in bytes.
    pub len: u64,
    /// First few bytes of the upload.
    pub head: Vec<u8>,
}

/// One request's unit of work: input, selected backend kind, and workspace.
///
/// Dropping the job removes the workspace and everything in it.
#[derive(Debug)]
pub struct ConversionJob {
    pub artifact: SourceArtifact,
    pub kind: SourceKind,
    workspace: JobWorkspace,
}

impl ConversionJob {
    /// Classify the artifact and bind it to its workspace.
    ///
    /// On error the workspace is dropped here, removing the spooled upload.
    pub fn prepare(workspace: JobWorkspace, artifact: SourceArtifact) -> Result<Self, DocshotError> {
        let kind = classify(&artifact)?;
        Ok(Self {
            artifact,
            kind,
            workspace,
        })
    }

    pub fn id(&self) -> Uuid {
        self.workspace.id()
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(*p))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn spool_writes_all_chunks_and_keeps_head() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(Some(root.path())).unwrap();
        let artifact = ws
            .spool("Report.PDF", Some("application/pdf"), chunks(&[b"%PD", b"F-1.7\n", b"rest"]))
            .await
            .unwrap();

        assert_eq!(artifact.len, 13);
        assert_eq!(artifact.head, b"%PDF-1.7");
        assert_eq!(artifact.path.file_name().unwrap(), "input.pdf");
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"%PDF-1.7\nrest");
    }

    #[tokio::test]
    async fn workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(Some(root.path())).unwrap();
        let path = ws.path().to_path_buf();
        ws.subdir("pages").await.unwrap();
        assert!(path.exists());
        drop(ws);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_prepare_releases_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(Some(root.path())).unwrap();
        let artifact = ws
            .spool("notes.txt", Some("text/plain"), chunks(&[b"hello"]))
            .await
            .unwrap();

        let err = ConversionJob::prepare(ws, artifact).unwrap_err();
        assert_eq!(err.code(), "unsupported-file-type");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stream_error_is_malformed_upload() {
        let ws = JobWorkspace::create(None).unwrap();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = ws.spool("a.pdf", None, body).await.unwrap_err();
        assert_eq!(err.code(), "malformed-upload");
    }
}
