//! Streaming `multipart/mixed` encoder.
//!
//! One part per page, written as soon as the page is pulled from the
//! sequence, so only the page currently being sent is held in memory.
//!
//! Once the first part has gone out the status line is committed. A later
//! conversion error is therefore surfaced as a body error: the connection is
//! aborted before the closing delimiter and the client sees a truncated
//! multipart body rather than a misleading complete one.

use super::{ByteStream, EncodedResponse, ResponseBody};
use crate::error::DocshotError;
use crate::pipeline::encode::JPEG_MIME;
use crate::sequence::{PageImage, PageSequence};
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Writes part headers and delimiters for one boundary.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    boundary: Arc<str>,
}

impl MultipartEncoder {
    /// A fresh encoder with a random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("docshot-boundary-{}", Uuid::new_v4().simple()))
    }

    pub fn with_boundary(boundary: impl Into<Arc<str>>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    /// Delimiter, headers, body and trailing CRLF for one page.
    pub fn part(&self, page: &PageImage) -> Bytes {
        let header = format!(
            "--{boundary}\r\n\
             Content-Type: {mime}\r\n\
             Content-Disposition: attachment; filename=\"{filename}\"\r\n\
             Content-Length: {len}\r\n\
             \r\n",
            boundary = self.boundary,
            mime = JPEG_MIME,
            filename = page.filename(),
            len = page.len(),
        );
        let mut buf = BytesMut::with_capacity(header.len() + page.len() + 2);
        buf.put_slice(header.as_bytes());
        buf.put_slice(page.data());
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Closing delimiter.
    pub fn closing(&self) -> Bytes {
        Bytes::from(format!("--{}--\r\n", self.boundary))
    }
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

enum State {
    First(PageImage, PageSequence),
    Next(PageSequence),
    Done,
}

/// Encode `seq` as a streamed multipart body.
///
/// The first page is pulled before returning, so a document that fails
/// outright (corrupt, empty, timed out before page 1) still becomes a normal
/// error response.
pub async fn encode(mut seq: PageSequence) -> Result<EncodedResponse, DocshotError> {
    let first = match seq.next_page().await {
        Some(page) => page?,
        None => return Err(DocshotError::EmptyDocument),
    };

    let encoder = MultipartEncoder::new();
    let content_type = encoder.content_type();
    debug!(boundary = encoder.boundary(), "Streaming multipart response");

    let body: ByteStream = Box::pin(stream::unfold(
        State::First(first, seq),
        move |state| {
            let encoder = encoder.clone();
            async move {
                match state {
                    State::First(page, seq) => Some((Ok(encoder.part(&page)), State::Next(seq))),
                    State::Next(mut seq) => match seq.next_page().await {
                        Some(Ok(page)) => Some((Ok(encoder.part(&page)), State::Next(seq))),
                        Some(Err(e)) => {
                            error!(
                                code = e.code(),
                                pages_sent = seq.emitted(),
                                error = %e,
                                "Conversion failed mid-stream; aborting response"
                            );
                            Some((Err(std::io::Error::other(e.to_string())), State::Done))
                        }
                        None => {
                            debug!(pages = seq.emitted(), "Multipart response complete");
                            Some((Ok(encoder.closing()), State::Done))
                        }
                    },
                    State::Done => None,
                }
            }
        },
    ));

    Ok(EncodedResponse {
        content_type,
        content_disposition: None,
        content_length: None,
        body: ResponseBody::Streaming(body),
    })
}
