//! HTTP surface: `/convert`, `/screenshot` and `/healthz`.
//!
//! Handlers are thin. They extract the request, hand it to the pipeline in
//! order (negotiate → spool → classify → convert → serialise) and turn the
//! result into a response. Everything request-specific lives in the
//! [`ConversionJob`]; the only state shared between requests is the
//! read-only [`AppState`].

use crate::config::ConversionConfig;
use crate::error::{DocshotError, ErrorClass};
use crate::job::{ConversionJob, JobWorkspace};
use crate::negotiate::negotiate;
use crate::pipeline::web::ScreenshotRequest;
use crate::pipeline::{Converter, PageCapturer};
use crate::serialize::{serialize, EncodedResponse, ResponseBody};
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConversionConfig>,
    pub converter: Arc<dyn Converter>,
    pub capturer: Arc<dyn PageCapturer>,
}

impl AppState {
    pub fn new(
        config: Arc<ConversionConfig>,
        converter: Arc<dyn Converter>,
        capturer: Arc<dyn PageCapturer>,
    ) -> Self {
        Self {
            config,
            converter,
            capturer,
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/convert", post(convert))
        .route("/screenshot", post(screenshot))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

impl IntoResponse for DocshotError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = match self.class() {
            ErrorClass::Validation => {
                debug!(code, error = %self, "Rejected request");
                StatusCode::BAD_REQUEST
            }
            ErrorClass::Conversion => {
                warn!(code, error = %self, "Conversion failed");
                StatusCode::BAD_REQUEST
            }
            ErrorClass::Internal => {
                error!(code, error = %self, "Internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            detail: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

// ── /convert ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConvertQuery {
    response_format: Option<String>,
}

async fn convert(
    State(state): State<AppState>,
    uri: Uri,
    query: Result<Query<ConvertQuery>, QueryRejection>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, DocshotError> {
    // `response_format` is the only parameter, so an unreadable query
    // string can only be a bad format selector.
    let Query(query) = query.map_err(|_| DocshotError::InvalidResponseFormat {
        value: uri.query().unwrap_or_default().to_string(),
    })?;
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let format = negotiate(query.response_format.as_deref(), accept)?;

    let mut multipart = multipart.map_err(|e| DocshotError::MalformedUpload {
        detail: e.body_text(),
    })?;

    let workspace = JobWorkspace::create(state.config.work_root.as_deref())?;
    let artifact = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| DocshotError::MalformedUpload {
                detail: e.body_text(),
            })?
            .ok_or(DocshotError::MissingField { field: FILE_FIELD })?;

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        break workspace
            .spool(&filename, content_type.as_deref(), field)
            .await?;
    };

    let job = ConversionJob::prepare(workspace, artifact)?;
    info!(job_id = %job.id(), kind = %job.kind, %format, "Accepted conversion request");

    let pages = state.converter.convert(job).await?;
    let encoded = serialize(pages, format).await?;
    Ok(encoded_response(encoded))
}

fn encoded_response(encoded: EncodedResponse) -> Response {
    let body = match encoded.body {
        ResponseBody::Streaming(stream) => Body::from_stream(stream),
        ResponseBody::Complete(bytes) => Body::from(bytes),
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&encoded.content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = encoded
        .content_disposition
        .and_then(|d| HeaderValue::from_str(&d).ok())
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(len) = encoded.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    response
}

// ── /screenshot ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScreenshotQuery {
    url: Option<String>,
}

/// Pull `url` out of a JSON request body.
fn url_from_body(body: &[u8]) -> Result<String, DocshotError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DocshotError::MissingUrl);
    }
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| DocshotError::InvalidJsonBody {
            detail: e.to_string(),
        })?;
    match value.get("url") {
        Some(serde_json::Value::String(url)) => Ok(url.clone()),
        _ => Err(DocshotError::MissingUrl),
    }
}

async fn screenshot(
    State(state): State<AppState>,
    uri: Uri,
    query: Result<Query<ScreenshotQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Response, DocshotError> {
    let Query(query) = query.map_err(|e| DocshotError::InvalidUrl {
        url: uri.query().unwrap_or_default().to_string(),
        reason: e.body_text(),
    })?;
    let raw = match query.url.filter(|u| !u.trim().is_empty()) {
        Some(url) => url,
        None => url_from_body(&body)?,
    };
    let request = ScreenshotRequest::parse(&raw)?;
    info!(url = %request.url(), "Accepted screenshot request");

    let jpeg = state.capturer.capture(&request).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"screenshot.jpg\""),
        ],
        jpeg,
    )
        .into_response())
}

// ── /healthz ─────────────────────────────────────────────────────────────

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
