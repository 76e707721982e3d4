//! Image encoding: `DynamicImage` → JPEG bytes, and JPEG → base64 data URI.
//!
//! Every page leaves the service as baseline JPEG. Renders are flattened to
//! RGB first because JPEG has no alpha channel and pdfium bitmaps are BGRA.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// MIME type of every page image.
pub const JPEG_MIME: &str = "image/jpeg";

/// Encode a rasterised page as JPEG at `quality` (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::with_capacity((rgb.width() * rgb.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&rgb)?;
    debug!(
        width = rgb.width(),
        height = rgb.height(),
        bytes = buf.len(),
        "Encoded page as JPEG"
    );
    Ok(Bytes::from(buf))
}

/// `true` when `data` starts with the JPEG start-of-image marker.
pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Wrap JPEG bytes as `data:image/jpeg;base64,…`.
pub fn to_data_uri(data: &[u8]) -> String {
    format!("data:{JPEG_MIME};base64,{}", STANDARD.encode(data))
}
