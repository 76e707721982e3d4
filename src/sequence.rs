//! Page sequences: the ordered, forward-only output of one conversion.
//!
//! Backends produce a [`RawPageStream`] of JPEG buffers in document order.
//! [`PageSequence`] wraps it, numbers pages `1..=N` in the order they arrive
//! and guarantees the contract the serializers rely on:
//!
//! * indices are exactly `1..=N`, strictly increasing, with no gaps;
//! * `N ≥ 1`: a backend that finishes without emitting anything turns into
//!   [`DocshotError::EmptyDocument`] instead of an empty success;
//! * after the first error the sequence is finished; there is no restart.
//!
//! The sequence is pulled one page at a time. Nothing is buffered here beyond
//! what the backend itself keeps in flight, so a consumer that streams pages
//! out as it pulls them holds O(1) pages in memory. The sequence can also own
//! the request's [`ConversionJob`]; its workspace then lives exactly as long
//! as the sequence does.

use crate::error::DocshotError;
use crate::job::ConversionJob;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use tracing::debug;

/// Unnumbered JPEG buffers, in document order, as a backend emits them.
pub type RawPageStream = Pin<Box<dyn Stream<Item = Result<Bytes, DocshotError>> + Send>>;

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    index: usize,
    data: Bytes,
}

impl PageImage {
    pub fn new(index: usize, data: Bytes) -> Self {
        Self { index, data }
    }

    /// 1-based position in the document.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Deterministic name: `page-{index}.jpg`.
    pub fn filename(&self) -> String {
        page_filename(self.index)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Name of the page at `index`.
pub fn page_filename(index: usize) -> String {
    format!("page-{index}.jpg")
}

/// Lazy, forward-only sequence of [`PageImage`]s.
pub struct PageSequence {
    source: RawPageStream,
    next_index: usize,
    finished: bool,
    scope: Option<ConversionJob>,
}

impl PageSequence {
    pub fn new(source: RawPageStream) -> Self {
        Self {
            source,
            next_index: 1,
            finished: false,
            scope: None,
        }
    }

    /// A sequence over pages that already exist in memory.
    pub fn from_pages(pages: Vec<Bytes>) -> Self {
        Self::new(Box::pin(stream::iter(pages.into_iter().map(Ok))))
    }

    /// Tie the job's resources to the sequence's lifetime.
    pub fn scoped(mut self, job: ConversionJob) -> Self {
        self.scope = Some(job);
        self
    }

    /// Workspace of the owning job, if any.
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.scope.as_ref().map(|job| job.workspace().path())
    }

    /// Pages handed out so far.
    pub fn emitted(&self) -> usize {
        self.next_index - 1
    }

    /// Pull the next page.
    ///
    /// Returns `None` once the document is complete. An error is returned at
    /// most once, after which the sequence reports `None`.
    pub async fn next_page(&mut self) -> Option<Result<PageImage, DocshotError>> {
        if self.finished {
            return None;
        }

        match self.source.next().await {
            Some(Ok(data)) if data.is_empty() => {
                let page = self.next_index;
                self.finish();
                Some(Err(DocshotError::RasterisationFailed {
                    page,
                    detail: "backend produced an empty image".into(),
                }))
            }
            Some(Ok(data)) => {
                let page = PageImage::new(self.next_index, data);
                self.next_index += 1;
                debug!(page = page.index(), bytes = page.len(), "Page ready");
                Some(Ok(page))
            }
            Some(Err(e)) => {
                self.finish();
                Some(Err(e))
            }
            None => {
                let empty = self.next_index == 1;
                self.finish();
                if empty {
                    Some(Err(DocshotError::EmptyDocument))
                } else {
                    None
                }
            }
        }
    }

    /// Drain the whole sequence.
    ///
    /// Used by the formats that need every page before writing anything.
    pub async fn collect_all(mut self) -> Result<Vec<PageImage>, DocshotError> {
        let mut pages = Vec::new();
        while let Some(page) = self.next_page().await {
            pages.push(page?);
        }
        Ok(pages)
    }

    /// Adapt into a `Stream`, keeping the job scope alive inside it.
    pub fn into_stream(self) -> impl Stream<Item = Result<PageImage, DocshotError>> + Send {
        stream::unfold(self, |mut seq| async move {
            seq.next_page().await.map(|page| (page, seq))
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        // Release the backend (channel, worker, child process) right away.
        self.source = Box::pin(stream::empty());
    }
}

impl std::fmt::Debug for PageSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSequence")
            .field("next_index", &self.next_index)
            .field("finished", &self.finished)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}
