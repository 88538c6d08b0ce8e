//! Invoke a taxonomy-local tool as a CGI script.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::request::CgiRequest;
use super::response::{parse_cgi_response, CgiResponse};
use crate::error::ApiError;
use crate::exec::{ExecError, Invocation, ProcessRunner};

#[derive(Debug, thiserror::Error)]
pub enum CgiError {
    #[error("tool not found in taxonomy directory: {0}")]
    ToolMissing(String),
    #[error("{0}")]
    Spawn(String),
    /// Nonzero exit. stdout is not parsed.
    #[error("tool failed ({exit}): {stderr}")]
    ToolExecution { exit: String, stderr: String },
    #[error("{0}")]
    Protocol(String),
    #[error("tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<CgiError> for ApiError {
    fn from(e: CgiError) -> Self {
        match e {
            CgiError::Protocol(msg) => ApiError::CgiProtocol(msg),
            CgiError::Timeout(d) => ApiError::ToolTimeout(d.as_secs()),
            CgiError::ToolExecution { exit, stderr } => {
                log::warn!("tool stderr: {}", stderr);
                ApiError::ToolExecution(format!("tool execution failed ({})", exit))
            }
            other => ApiError::ToolExecution(other.to_string()),
        }
    }
}

/// Runs one subprocess per call through the injected [`ProcessRunner`].
#[derive(Clone)]
pub struct CgiBridge {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl CgiBridge {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Run `tool_path` in `working_dir` with the request's CGI environment (and nothing else),
    /// the body on stdin, and stdout/stderr captured. No retry: tools are not assumed idempotent.
    pub async fn invoke(
        &self,
        tool_path: &Path,
        working_dir: &Path,
        request: CgiRequest,
    ) -> Result<CgiResponse, CgiError> {
        let tool_path = contained_tool(tool_path, working_dir)
            .await
            .ok_or_else(|| CgiError::ToolMissing(tool_path.display().to_string()))?;
        let env = request.environment();
        log::debug!(
            "cgi {} {}?{} via {}",
            request.method.as_str(),
            env.get("PATH_INFO").map(String::as_str).unwrap_or("/"),
            request.query_string,
            tool_path.display()
        );
        let invocation = Invocation::new(&tool_path, working_dir)
            .env_only(env)
            .stdin(request.body)
            .timeout(self.timeout);

        let output = self.runner.run(invocation).await.map_err(|e| match e {
            ExecError::TimedOut { timeout, .. } => CgiError::Timeout(timeout),
            spawn @ ExecError::Spawn { .. } => CgiError::Spawn(spawn.to_string()),
        })?;
        if !output.success() {
            return Err(CgiError::ToolExecution {
                exit: output.describe_exit(),
                stderr: output.stderr_text(),
            });
        }
        parse_cgi_response(&output.stdout)
    }
}

/// Resolved tool path when it is a regular file inside `working_dir` after resolving `..`
/// and symlinks on both sides.
async fn contained_tool(tool_path: &Path, working_dir: &Path) -> Option<PathBuf> {
    let root = tokio::fs::canonicalize(working_dir).await.ok()?;
    let tool = tokio::fs::canonicalize(tool_path).await.ok()?;
    (tool.starts_with(&root) && tool.is_file()).then_some(tool)
}
