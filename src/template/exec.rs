//! `!exec` evaluation: subprocess with a bounded timeout.

use anyhow::Result;
use serde_json::Value as Json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::{EXEC_DEFAULT_ATTEMPTS, EXEC_TIMEOUT};
use crate::utils::ProcessCommand;
use crate::utils::backoff::exponential_backoff_with_delay;

/// Policy for one `!exec` call site.
#[derive(Debug, Clone, Copy)]
pub struct ExecPolicy {
    /// Wall-clock bound per attempt.
    pub timeout: std::time::Duration,
    /// Total attempts (1 = no retry).
    pub attempts: u32,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self { timeout: EXEC_TIMEOUT, attempts: EXEC_DEFAULT_ATTEMPTS }
    }
}

/// Run a shell command and capture stdout as the expression value.
///
/// Output parses as YAML when possible (numbers, booleans, structures),
/// otherwise the trimmed text stands. Non-zero exit or timeout fails the
/// evaluation after the policy's attempts are exhausted.
pub async fn run_exec(
    command: &str,
    policy: ExecPolicy,
    cancel: &CancellationToken,
) -> Result<Json> {
    let mut attempt: u32 = 0;
    loop {
        let result = ProcessCommand::new("sh")
            .args(["-c", command])
            .timeout(policy.timeout)
            .cancel_token(cancel.clone())
            .execute()
            .await;

        match result {
            Ok(output) => return Ok(parse_output(&output.stdout)),
            Err(err) if attempt + 1 < policy.attempts => {
                debug!(command, attempt, "exec failed, retrying: {err}");
                attempt = exponential_backoff_with_delay(attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Interpret stdout: structured when it parses, text otherwise.
fn parse_output(stdout: &str) -> Json {
    let trimmed = stdout.trim();
    match serde_yaml::from_str::<serde_yaml::Value>(trimmed) {
        Ok(value) if !value.is_null() || trimmed == "null" || trimmed == "~" => {
            crate::merge::value::yaml_to_json(&value)
        }
        _ => Json::String(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn captures_plain_text() {
        let value = run_exec("echo hello", ExecPolicy::default(), &cancel()).await.unwrap();
        assert_eq!(value, "hello");
    }

    #[tokio::test]
    async fn structured_output_parses() {
        let value =
            run_exec("echo '{\"a\": 1}'", ExecPolicy::default(), &cancel()).await.unwrap();
        assert_eq!(value, serde_json::json!({"a": 1}));
        let number = run_exec("echo 42", ExecPolicy::default(), &cancel()).await.unwrap();
        assert_eq!(number, 42);
    }

    #[tokio::test]
    async fn nonzero_exit_fails_the_evaluation() {
        assert!(run_exec("exit 7", ExecPolicy::default(), &cancel()).await.is_err());
    }

    #[tokio::test]
    async fn timeout_fails_after_attempts() {
        let policy =
            ExecPolicy { timeout: std::time::Duration::from_millis(50), attempts: 2 };
        let err = run_exec("sleep 5", policy, &cancel()).await.unwrap_err();
        assert!(err.to_string().contains("subprocess failed"));
    }

    #[tokio::test]
    async fn retry_policy_recovers_transient_failures() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran-once");
        let command = format!(
            "if [ -f {m} ]; then echo recovered; else touch {m}; exit 1; fi",
            m = marker.display()
        );
        let policy = ExecPolicy { timeout: EXEC_TIMEOUT, attempts: 2 };
        let value = run_exec(&command, policy, &cancel()).await.unwrap();
        assert_eq!(value, "recovered");
    }
}
