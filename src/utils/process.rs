//! Type-safe subprocess builder for consistent command execution.
//!
//! Fluent API over [`tokio::process::Command`] used everywhere Atmos spawns
//! a process: `!exec` evaluation, tool dispatch, workflow steps, and the git
//! import adapter. Centralizing here keeps timeout handling, cancellation,
//! env plumbing, and error context uniform.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::AtmosError;

/// Builder for a single subprocess invocation.
///
/// ```rust,no_run
/// # use atmos_cli::utils::process::ProcessCommand;
/// # async fn example() -> anyhow::Result<()> {
/// let out = ProcessCommand::new("terraform")
///     .args(["plan", "-input=false"])
///     .current_dir("components/terraform/vpc")
///     .timeout(std::time::Duration::from_secs(600))
///     .execute()
///     .await?;
/// println!("{}", out.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    timeout_duration: Option<Duration>,
    capture_output: bool,
    cancel: Option<CancellationToken>,
}

/// Captured result of a completed subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

impl ProcessCommand {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            current_dir: None,
            timeout_duration: None,
            capture_output: true,
            cancel: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set several environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Bound execution time; the child is killed on expiry.
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = Some(duration);
        self
    }

    /// Abort when the invocation-level token fires.
    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Inherit stdout/stderr instead of capturing (interactive tools).
    #[must_use]
    pub fn inherit_output(mut self) -> Self {
        self.capture_output = false;
        self
    }

    /// The command line this builder would run, for logs and dry-run output.
    pub fn render(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Run the command, failing on non-zero exit.
    ///
    /// Timeout and cancellation both surface as
    /// [`AtmosError::SubprocessFailed`] with `code: None`.
    pub async fn execute(self) -> Result<ProcessOutput> {
        let rendered = self.render();
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            trace!(target: "process", "setting env var {key}");
            cmd.env(key, value);
        }
        if self.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        cmd.kill_on_drop(true);

        debug!(target: "process", "executing: {rendered}");

        let output_future = cmd.output();
        let cancel = self.cancel.unwrap_or_default();

        let result = tokio::select! {
            () = cancel.cancelled() => {
                warn!(target: "process", "cancelled: {rendered}");
                return Err(AtmosError::SubprocessFailed {
                    command: rendered,
                    code: None,
                    stderr: "cancelled".to_string(),
                }
                .into());
            }
            result = async {
                match self.timeout_duration {
                    Some(duration) => timeout(duration, output_future).await.ok(),
                    None => Some(output_future.await),
                }
            } => result,
        };

        let Some(io_result) = result else {
            let secs = self.timeout_duration.unwrap_or_default().as_secs();
            warn!(target: "process", "timed out after {secs}s: {rendered}");
            return Err(AtmosError::SubprocessFailed {
                command: rendered,
                code: None,
                stderr: format!("timed out after {secs} seconds"),
            }
            .into());
        };

        let output = io_result.with_context(|| format!("failed to spawn: {rendered}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if !output.status.success() {
            debug!(target: "process", "exit {:?}: {rendered}", output.status.code());
            return Err(AtmosError::SubprocessFailed {
                command: rendered,
                code: output.status.code(),
                stderr: if stderr.is_empty() { stdout } else { stderr },
            }
            .into());
        }

        Ok(ProcessOutput { stdout, stderr, code: output.status.code() })
    }

    /// Run and return only stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        Ok(self.execute().await?.stdout)
    }
}
