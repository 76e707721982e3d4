//! Office normaliser: `.doc/.docx/.xls/.xlsx/.ppt/.pptx` → PDF via a headless
//! office suite, then the PDF goes through the rasteriser.
//!
//! Each job gets its own office user profile inside its workspace. A shared
//! profile would serialise (or corrupt) concurrent conversions.

use crate::config::ConversionConfig;
use crate::error::DocshotError;
use crate::job::JobWorkspace;
use crate::pipeline::process::ToolInvocation;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Build the stage-1 command line for `input`.
pub fn soffice_invocation(
    config: &ConversionConfig,
    profile_dir: &Path,
    out_dir: &Path,
    input: &Path,
) -> Result<ToolInvocation, DocshotError> {
    let profile = Url::from_directory_path(profile_dir).map_err(|_| {
        DocshotError::Internal(format!(
            "office profile path is not absolute: {}",
            profile_dir.display()
        ))
    })?;

    Ok(
        ToolInvocation::new("soffice", config.soffice_path.as_str(), config.office_timeout())
            .args(["--headless", "--norestore"])
            .arg(format!("-env:UserInstallation={profile}"))
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(input),
    )
}

/// Stage 1: convert the office document at `input` into a PDF inside `workspace`.
///
/// Every failure of this stage is reported as
/// [`DocshotError::OfficeConversionFailed`], except a missing executable,
/// which is a deployment problem.
pub async fn convert_to_pdf(
    config: &ConversionConfig,
    workspace: &JobWorkspace,
    input: &Path,
) -> Result<PathBuf, DocshotError> {
    let profile_dir = workspace.subdir("profile").await?;
    let out_dir = workspace.subdir("office").await?;

    let invocation = soffice_invocation(config, &profile_dir, &out_dir, input)?;
    invocation
        .run(workspace.path())
        .await
        .map_err(|e| match e {
            DocshotError::Timeout { secs, .. } => DocshotError::OfficeConversionFailed {
                detail: format!("timed out after {secs}s"),
            },
            DocshotError::ToolFailed { status, stderr, .. } => {
                DocshotError::OfficeConversionFailed {
                    detail: format!("exit status {status}: {stderr}"),
                }
            }
            other => other,
        })?;

    let pdf = find_output_pdf(&out_dir, input).await?;
    info!(job_id = %workspace.id(), pdf = %pdf.display(), "Office document normalised to PDF");
    Ok(pdf)
}

/// Locate the converted PDF: `<stem>.pdf`, or the only PDF in `out_dir`.
async fn find_output_pdf(out_dir: &Path, input: &Path) -> Result<PathBuf, DocshotError> {
    let expected = input
        .file_stem()
        .map(|stem| out_dir.join(stem).with_extension("pdf"));

    let mut candidates = Vec::new();
    if let Some(path) = expected {
        candidates.push(path);
    }
    let mut entries = tokio::fs::read_dir(out_dir)
        .await
        .map_err(|e| DocshotError::workspace(out_dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DocshotError::workspace(out_dir, e))?
    {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && !candidates.contains(&path) {
            candidates.push(path);
        }
    }

    for path in candidates {
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > 0 => return Ok(path),
            Ok(_) => debug!(path = %path.display(), "Office output is empty"),
            Err(_) => continue,
        }
    }

    Err(DocshotError::OfficeConversionFailed {
        detail: "office suite produced no PDF output".into(),
    })
}
