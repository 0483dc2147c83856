//! Credential-invalidation recovery for user-identity flows.
//!
//! Long-lived user credentials go stale: keys get rotated, MFA tokens
//! expire mid-flight. STS failures are classified and, when the
//! environment is interactive, recovered by re-prompting through a
//! registered callback and retrying exactly once. Repeated failure
//! surfaces as a fatal error with actionable hints.

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::core::AtmosError;

/// Lifecycle of one identity's cached user credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing cached yet.
    Uncached,
    /// Waiting on the interactive prompt.
    Prompting,
    /// Credentials saved and presumed valid.
    Cached,
    /// A refresh (STS call) is in flight.
    Refreshing,
    /// STS rejected the cached keys.
    Invalid,
}

/// Classification of an STS failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StsFailure {
    /// `InvalidClientTokenId`-class: the access keys themselves are bad.
    InvalidToken,
    /// The MFA token was rejected; long-lived keys are still good.
    InvalidMfa,
    /// Anything else: not recoverable by re-prompting.
    Other,
}

/// Classify an STS error message.
pub fn classify_sts_error(message: &str) -> StsFailure {
    if message.contains("InvalidClientTokenId") || message.contains("SignatureDoesNotMatch") {
        StsFailure::InvalidToken
    } else if message.contains("MultiFactorAuthentication")
        || message.contains("invalid MFA one time pass code")
    {
        StsFailure::InvalidMfa
    } else {
        StsFailure::Other
    }
}

/// Interactive credential prompt, registered by the CLI layer.
///
/// `mfa_only` re-prompts only the MFA token, preserving stored long-lived
/// credentials.
pub trait CredentialPrompt: Send + Sync {
    /// Ask the user for credentials (or just an MFA token).
    fn prompt<'a>(&'a self, identity: &'a str, mfa_only: bool) -> BoxFuture<'a, Result<()>>;
}

/// Delete-stale-then-reprompt recovery around an STS-backed operation.
///
/// Runs `operation`; on an STS failure, classifies it, clears the stale
/// cache entry via `invalidate`, prompts when interactive, and retries
/// once. Every path out of a second failure is fatal.
pub struct RecoveryRunner<'a> {
    /// Identity being refreshed.
    pub identity: &'a str,
    /// Whether a human is attached to stdin.
    pub interactive: bool,
    /// Prompt callback; `None` in non-interactive contexts.
    pub prompt: Option<&'a dyn CredentialPrompt>,
}

impl<'a> RecoveryRunner<'a> {
    /// Execute with one-shot recovery.
    pub async fn run<T, Op, Inv>(&self, mut operation: Op, invalidate: Inv) -> Result<T>
    where
        Op: FnMut() -> BoxFuture<'a, Result<T>>,
        Inv: Fn(StsFailure),
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(first) => {
                let failure = classify_sts_error(&first.to_string());
                if failure == StsFailure::Other {
                    return Err(first);
                }
                // Cached → Invalid: the stale entry must go before any retry.
                warn!(identity = self.identity, ?failure, "stored credentials rejected");
                invalidate(failure);

                let Some(prompt) = self.prompt.filter(|_| self.interactive) else {
                    return Err(AtmosError::CredentialsInvalid {
                        identity: self.identity.to_string(),
                        reason: first.to_string(),
                    }
                    .into());
                };

                // Invalid → Prompting → Cached, then the single retry.
                prompt.prompt(self.identity, failure == StsFailure::InvalidMfa).await?;
                debug!(identity = self.identity, "retrying after re-prompt");

                operation().await.map_err(|second| {
                    AtmosError::CredentialsInvalid {
                        identity: self.identity.to_string(),
                        reason: format!("still rejected after re-prompt: {second}"),
                    }
                    .into()
                })
            }
        }
    }
}
