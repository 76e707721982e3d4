//! Content negotiation: which wire format a `/convert` response uses.
//!
//! An explicit `response_format` query value wins. Without one, the `Accept`
//! header decides between zip and json; everything else, `*/*` included,
//! gets the streaming multipart default. Negotiation is pure and runs before
//! any upload bytes are read, so a bad selector costs no conversion work.

use crate::error::DocshotError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Wire encoding of a page sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// `multipart/mixed`, one part per page, streamed.
    #[default]
    Multipart,
    /// `application/zip`, one entry per page.
    Zip,
    /// `application/json` array of base64 data URIs.
    Json,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseFormat::Multipart => "multipart",
            ResponseFormat::Zip => "zip",
            ResponseFormat::Json => "json",
        }
    }

    /// Whether the format can be written before the last page exists.
    pub fn is_streaming(self) -> bool {
        self == ResponseFormat::Multipart
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = DocshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multipart" => Ok(ResponseFormat::Multipart),
            "zip" => Ok(ResponseFormat::Zip),
            "json" => Ok(ResponseFormat::Json),
            _ => Err(DocshotError::InvalidResponseFormat {
                value: s.to_string(),
            }),
        }
    }
}

/// Resolve the response format from the query value and `Accept` header.
pub fn negotiate(
    response_format: Option<&str>,
    accept: Option<&str>,
) -> Result<ResponseFormat, DocshotError> {
    if let Some(value) = response_format.filter(|v| !v.trim().is_empty()) {
        return value.parse();
    }
    Ok(accept.map(from_accept).unwrap_or_default())
}

fn from_accept(accept: &str) -> ResponseFormat {
    let mut json = false;
    for media in accept.split(',') {
        let media = media
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media.as_str() {
            "application/zip" | "application/x-zip-compressed" => return ResponseFormat::Zip,
            "application/json" => json = true,
            _ => {}
        }
    }
    if json {
        ResponseFormat::Json
    } else {
        ResponseFormat::Multipart
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_multipart() {
        assert_eq!(negotiate(None, None).unwrap(), ResponseFormat::Multipart);
        assert_eq!(negotiate(None, Some("*/*")).unwrap(), ResponseFormat::Multipart);
        assert_eq!(
            negotiate(None, Some("text/html, image/*")).unwrap(),
            ResponseFormat::Multipart
        );
    }

    #[test]
    fn accept_header_selects() {
        assert_eq!(
            negotiate(None, Some("application/zip")).unwrap(),
            ResponseFormat::Zip
        );
        assert_eq!(
            negotiate(None, Some("application/x-zip-compressed")).unwrap(),
            ResponseFormat::Zip
        );
        assert_eq!(
            negotiate(None, Some("Application/JSON; charset=utf-8")).unwrap(),
            ResponseFormat::Json
        );
        assert_eq!(
            negotiate(None, Some("application/json, application/zip;q=0.5")).unwrap(),
            ResponseFormat::Zip
        );
    }

    #[test]
    fn query_overrides_accept() {
        assert_eq!(
            negotiate(Some("json"), Some("application/zip")).unwrap(),
            ResponseFormat::Json
        );
        assert_eq!(
            negotiate(Some("MULTIPART"), Some("application/json")).unwrap(),
            ResponseFormat::Multipart
        );
        assert_eq!(
            negotiate(Some(""), Some("application/zip")).unwrap(),
            ResponseFormat::Zip
        );
    }

    #[test]
    fn unknown_query_value_is_rejected() {
        let err = negotiate(Some("tar"), Some("application/zip")).unwrap_err();
        assert_eq!(err.code(), "invalid-response-format");
        assert!(err.to_string().contains("tar"));
    }

    #[test]
    fn only_multipart_streams() {
        assert!(ResponseFormat::Multipart.is_streaming());
        assert!(!ResponseFormat::Zip.is_streaming());
        assert!(!ResponseFormat::Json.is_streaming());
    }
}
