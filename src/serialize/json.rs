//! JSON encoder: an array of `{page, filename, data}` objects, where `data`
//! is a `data:image/jpeg;base64,…` URI. Needs the whole sequence.

use super::{EncodedResponse, ResponseBody};
use crate::error::DocshotError;
use crate::pipeline::encode::to_data_uri;
use crate::sequence::{PageImage, PageSequence};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One page in the JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonPage {
    pub page: usize,
    pub filename: String,
    pub data: String,
}

impl From<&PageImage> for JsonPage {
    fn from(page: &PageImage) -> Self {
        Self {
            page: page.index(),
            filename: page.filename(),
            data: to_data_uri(page.data()),
        }
    }
}

/// Encode `seq` as one JSON array.
pub async fn encode(seq: PageSequence) -> Result<EncodedResponse, DocshotError> {
    let pages = seq.collect_all().await?;
    let entries: Vec<JsonPage> = pages.iter().map(JsonPage::from).collect();
    let body = serde_json::to_vec(&entries)
        .map_err(|e| DocshotError::Internal(format!("Failed to serialise pages: {e}")))?;
    debug!(pages = entries.len(), bytes = body.len(), "JSON response ready");

    Ok(EncodedResponse {
        content_type: "application/json".to_string(),
        content_disposition: None,
        content_length: Some(body.len() as u64),
        body: ResponseBody::Complete(Bytes::from(body)),
    })
}
