//! Bounded invocation of external conversion tools.
//!
//! Every tool runs as a child process with stdin closed and stdout/stderr
//! captured. The child is created with `kill_on_drop`, so when the time
//! budget runs out (or the request future is dropped because the client went
//! away) the process is killed rather than left running.

use crate::error::DocshotError;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum number of stderr lines carried into an error message.
const STDERR_TAIL_LINES: usize = 8;

/// One external tool call: program, arguments and time budget.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    tool: &'static str,
    program: String,
    args: Vec<OsString>,
    timeout: Duration,
}

impl ToolInvocation {
    /// `tool` is the short name used in logs and errors; `program` is what gets executed.
    pub fn new(tool: &'static str, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Run to completion, in `cwd`, within the time budget.
    ///
    /// Returns the captured output only when the process exits successfully.
    pub async fn run(&self, cwd: &Path) -> Result<Output, DocshotError> {
        let start = Instant::now();
        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DocshotError::ToolUnavailable {
                tool: self.tool,
                program: self.program.clone(),
                source,
            })?;

        debug!(tool = self.tool, pid = ?child.id(), "Spawned external tool");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| DocshotError::Internal(format!(
                "waiting for {} failed: {e}",
                self.tool
            )))?,
            Err(_) => {
                // Dropping the wait future dropped the child, which kills it.
                warn!(tool = self.tool, secs = self.timeout.as_secs(), "External tool timed out");
                return Err(DocshotError::Timeout {
                    tool: self.tool,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if !output.status.success() {
            warn!(tool = self.tool, status = %output.status, elapsed_ms, "External tool failed");
            return Err(DocshotError::ToolFailed {
                tool: self.tool,
                status: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: stderr_tail(&output.stderr),
            });
        }

        debug!(tool = self.tool, elapsed_ms, "External tool finished");
        Ok(output)
    }
}

/// Last few non-empty lines of stderr, joined with ` | `.
pub fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}
