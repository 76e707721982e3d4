//! Response serialisation: page sequence → negotiated wire format.
//!
//! | Format    | Strategy                                   | Memory      |
//! |-----------|--------------------------------------------|-------------|
//! | multipart | stream each part as its page is pulled      | O(1) pages  |
//! | zip       | spool archive to disk, then stream the file | O(1) pages  |
//! | json      | collect, then one serialised array          | O(N) pages  |
//!
//! Every encoder pulls at least the first page before returning, so failures
//! that happen before any page exists become ordinary error responses.

pub mod archive;
pub mod json;
pub mod multipart;

use crate::error::DocshotError;
use crate::negotiate::ResponseFormat;
use crate::sequence::PageSequence;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use tracing::debug;

/// Response body chunks. An `Err` aborts the connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

pub enum ResponseBody {
    /// Written while it is being produced.
    Streaming(ByteStream),
    /// Fully materialised.
    Complete(Bytes),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Streaming(_) => f.write_str("Streaming(..)"),
            ResponseBody::Complete(b) => write!(f, "Complete({} bytes)", b.len()),
        }
    }
}

/// A serialised page sequence plus the headers that describe it.
#[derive(Debug)]
pub struct EncodedResponse {
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub content_length: Option<u64>,
    pub body: ResponseBody,
}

/// Serialise `seq` in `format`.
pub async fn serialize(
    seq: PageSequence,
    format: ResponseFormat,
) -> Result<EncodedResponse, DocshotError> {
    debug!(%format, streaming = format.is_streaming(), "Serialising pages");
    match format {
        ResponseFormat::Multipart => multipart::encode(seq).await,
        ResponseFormat::Zip => archive::encode(seq).await,
        ResponseFormat::Json => json::encode(seq).await,
    }
}
