//! Running external optimizer binaries
//!
//! The artifact is written to a temporary file, the tool rewrites it in
//! place, and the result is read back. The temporary file is owned by a
//! `NamedTempFile` guard, so it is removed on every exit path including
//! errors and timeouts. A tool that outlives its timeout is killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

use crate::error::TransformError;

/// One external tool with its binary, timeout and temp directory
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    tool: &'static str,
    binary: PathBuf,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(tool: &'static str, binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool,
            binary: binary.into(),
            timeout,
            temp_dir: None,
        }
    }

    /// Create temporary files in `dir` instead of the system temp directory
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    fn failed(&self, reason: impl Into<String>) -> TransformError {
        TransformError::external_process(self.tool, reason)
    }

    fn temp_file(&self, suffix: &str) -> Result<tempfile::NamedTempFile, TransformError> {
        let prefix = format!("imagestack-{}-", self.tool);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.map_err(|e| self.failed(format!("failed to create temporary file: {}", e)))
    }

    /// Run the tool as `binary args.. <tempfile>` and return the rewritten bytes
    pub async fn run(
        &self,
        input: &[u8],
        suffix: &str,
        args: &[String],
    ) -> Result<Vec<u8>, TransformError> {
        let file = self.temp_file(suffix)?;
        tokio::fs::write(file.path(), input)
            .await
            .map_err(|e| self.failed(format!("failed to write temporary file: {}", e)))?;

        debug!(
            tool = self.tool,
            binary = %self.binary.display(),
            args = ?args,
            "Running external post-processor"
        );

        let child = tokio::process::Command::new(&self.binary)
            .args(args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.failed(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.failed(format!("failed to wait for process: {}", e))),
            Err(_) => {
                return Err(self.failed(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(file.path())
            .await
            .map_err(|e| self.failed(format!("failed to read result: {}", e)))
    }
}
