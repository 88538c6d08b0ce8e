//! Process execution port: run a program with an argument list in a working directory.
//! No shell is used; arguments are passed as a list to avoid injection.
//!
//! [`ProcessRunner`] is the seam the CGI bridge and the taxonomy lifecycle depend on; tests
//! substitute an in-memory runner.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::ApiError;

/// Environment handed to the child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvMode {
    /// Inherit the server's environment (lifecycle commands: git, make, bash).
    Inherit,
    /// Clear the environment and set exactly these variables.
    Only(BTreeMap<String, String>),
}

/// One process invocation. Owned so runners can move it into a task.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: EnvMode,
    pub stdin: Vec<u8>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: EnvMode::Inherit,
            stdin: Vec::new(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env_only(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = EnvMode::Only(env);
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = input;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2` for logs.
    pub fn display(&self) -> String {
        let mut s = self.program.display().to_string();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; None when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    pub fn describe_exit(&self) -> String {
        match self.code {
            Some(c) => format!("exit status {}", c),
            None => "terminated by signal".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("exec failed for {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
}

/// Runs a process to completion with fully buffered stdio.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ExecError>;
}

/// Runner backed by `tokio::process`. A timed-out child is killed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ExecError> {
        let program = invocation.program.display().to_string();
        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let EnvMode::Only(vars) = &invocation.env {
            cmd.env_clear().envs(vars);
        }
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Feed stdin from a separate task so a chatty child cannot deadlock on a full stdout pipe.
        if let Some(mut stdin) = child.stdin.take() {
            let input = invocation.stdin;
            tokio::spawn(async move {
                if !input.is_empty() {
                    if let Err(e) = stdin.write_all(&input).await {
                        log::debug!("writing child stdin: {}", e);
                    }
                }
            });
        }

        let wait = child.wait_with_output();
        let output = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(ExecError::TimedOut {
                        program,
                        timeout: limit,
                    })
                }
            },
            None => wait.await,
        }
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run one lifecycle step (`git clone`, `make init`, ...) with the inherited environment.
/// Nonzero exit is an initialization error unless `suppress` is set, in which case it is logged and ignored.
pub async fn run_step(
    runner: &dyn ProcessRunner,
    program: &str,
    args: &[&str],
    cwd: &Path,
    suppress: bool,
) -> Result<(), ApiError> {
    let invocation = Invocation::new(program, cwd).args(args.iter().copied());
    let shown = invocation.display();
    log::info!("running `{}` in {}", shown, cwd.display());
    let result = runner.run(invocation).await;
    let failure = match result {
        Ok(out) if out.success() => return Ok(()),
        Ok(out) => format!("`{}` failed ({}): {}", shown, out.describe_exit(), out.stderr_text()),
        Err(e) => e.to_string(),
    };
    if suppress {
        log::warn!("ignoring failure: {}", failure);
        Ok(())
    } else {
        Err(ApiError::Initialization(failure))
    }
}
