//! Video frame extractor: one representative frame per upload, via ffmpeg.
//!
//! ffmpeg's `thumbnail` filter picks the most representative frame of the
//! first batch it sees, which avoids the black lead-in frame many clips start
//! with. The result always holds exactly one page.

use crate::config::ConversionConfig;
use crate::error::DocshotError;
use crate::job::JobWorkspace;
use crate::pipeline::encode::is_jpeg;
use crate::pipeline::process::ToolInvocation;
use bytes::Bytes;
use std::path::Path;
use tracing::info;

const FRAME_FILE: &str = "frame.jpg";

/// Build the ffmpeg command line that writes one JPEG frame to `output`.
pub fn ffmpeg_invocation(config: &ConversionConfig, input: &Path, output: &Path) -> ToolInvocation {
    ToolInvocation::new("ffmpeg", config.ffmpeg_path.as_str(), config.video_timeout())
        .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y", "-i"])
        .arg(input)
        .args(["-vf", "thumbnail", "-frames:v", "1", "-q:v", "2"])
        .arg(output)
}

/// Extract a single frame from the video at `input`.
pub async fn extract_frame(
    config: &ConversionConfig,
    workspace: &JobWorkspace,
    input: &Path,
) -> Result<Bytes, DocshotError> {
    let frames = workspace.subdir("frames").await?;
    let output = frames.join(FRAME_FILE);

    ffmpeg_invocation(config, input, &output)
        .run(workspace.path())
        .await?;

    let data = match tokio::fs::read(&output).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DocshotError::FrameExtractionFailed {
                detail: "no frame was written; the stream may have no video track".into(),
            })
        }
        Err(e) => return Err(DocshotError::workspace(&output, e)),
    };
    validate_frame(&data)?;

    info!(job_id = %workspace.id(), bytes = data.len(), "Extracted video frame");
    Ok(Bytes::from(data))
}

fn validate_frame(data: &[u8]) -> Result<(), DocshotError> {
    if data.is_empty() {
        return Err(DocshotError::FrameExtractionFailed {
            detail: "extracted frame is empty".into(),
        });
    }
    if !is_jpeg(data) {
        return Err(DocshotError::FrameExtractionFailed {
            detail: "extracted frame is not a JPEG image".into(),
        });
    }
    Ok(())
}
