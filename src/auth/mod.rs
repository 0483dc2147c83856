//! Per-invocation authentication context.
//!
//! Commands construct an empty [`AuthContext`]; an [`AuthManager`] populates
//! one provider entry per requested identity; the context is then passed by
//! reference through the evaluation path and consumed by in-process SDK
//! calls and subprocess env derivation. Nothing here persists beyond the
//! invocation; the context is never written into merged configuration.
//!
//! Provider-specific credential acquisition (SSO device flows, SAML browser
//! automation, keychains) lives behind the [`AuthManager`] trait; the core
//! only defines the contract and a file-materializing implementation for
//! statically-configured identities.

pub mod env;
pub mod lazy;
pub mod namespace;
pub mod recovery;
pub mod scanner;

pub use env::derived_env;
pub use lazy::LazyAuthHandle;
pub use namespace::{CredentialPaths, resolve_namespace};
pub use scanner::contains_auth_patterns;

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

use crate::core::AtmosError;

/// Credentials for one provider family, in the shape SDK calls and
/// subprocesses need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderCredentials {
    /// AWS: file-based credentials with a named profile.
    Aws {
        /// Path to the shared credentials file.
        credentials_file: PathBuf,
        /// Path to the config file.
        config_file: PathBuf,
        /// Profile name inside those files.
        profile: String,
        /// Default region, when the identity declares one.
        region: Option<String>,
    },
    /// GitHub: a bearer token.
    Github {
        /// The token value.
        token: String,
    },
    /// Azure: a subscription-scoped bearer token.
    Azure {
        /// The token value.
        token: String,
        /// Subscription the token is scoped to.
        subscription_id: String,
    },
    /// GCP: application default credentials file.
    Gcp {
        /// Path to the credentials JSON.
        credentials_file: PathBuf,
        /// Project the credentials target.
        project: Option<String>,
    },
}

impl ProviderCredentials {
    /// Provider family key (`aws`, `github`, ...).
    pub fn family(&self) -> &'static str {
        match self {
            Self::Aws { .. } => "aws",
            Self::Github { .. } => "github",
            Self::Azure { .. } => "azure",
            Self::Gcp { .. } => "gcp",
        }
    }
}

/// Per-invocation, multi-provider credential container.
///
/// Keyed by provider family; populated once per `--identity` argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    providers: BTreeMap<String, ProviderCredentials>,
    identities: Vec<String>,
}

impl AuthContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record credentials for a provider family, remembering the identity
    /// that produced them.
    pub fn insert(&mut self, identity: impl Into<String>, credentials: ProviderCredentials) {
        let identity = identity.into();
        debug!(identity, provider = credentials.family(), "auth context populated");
        self.providers.insert(credentials.family().to_string(), credentials);
        self.identities.push(identity);
    }

    /// Credentials for a family, if an identity populated it.
    pub fn get(&self, family: &str) -> Option<&ProviderCredentials> {
        self.providers.get(family)
    }

    /// The AWS entry, if present.
    pub fn aws(&self) -> Option<&ProviderCredentials> {
        self.get("aws")
    }

    /// Identities that populated this context, in authentication order.
    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    /// Whether no identity has been materialized.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Iterate provider entries in family order.
    pub fn providers(&self) -> impl Iterator<Item = (&String, &ProviderCredentials)> {
        self.providers.iter()
    }
}

/// The contract commands use to materialize identities.
///
/// One call per `--identity` argument (or the resolved default identity).
/// Implementations own provider-specific flows; the core only consumes the
/// populated context.
pub trait AuthManager: Send + Sync {
    /// Authenticate `identity` and populate `ctx` with its provider entry.
    fn authenticate<'a>(
        &'a self,
        identity: &'a str,
        ctx: &'a mut AuthContext,
    ) -> BoxFuture<'a, Result<()>>;

    /// The identity used when none is named explicitly, if configured.
    fn default_identity(&self) -> Option<String>;
}

/// Identity declaration from the root configuration.
///
/// Opaque to the merge pipeline; interpreted only by the auth manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Provider family this identity authenticates against.
    #[serde(default)]
    pub provider: String,
    /// Mark one identity as the default for the invocation.
    #[serde(default)]
    pub default: bool,
    /// AWS profile name to materialize (defaults to the identity name).
    #[serde(default)]
    pub profile: Option<String>,
    /// Region forwarded into the SDK config and derived env.
    #[serde(default)]
    pub region: Option<String>,
    /// Provider-specific settings passed through untouched.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// File-materializing auth manager for statically-configured identities.
///
/// Writes per-namespace credential files (0600 inside a 0700 directory)
/// and records their paths on the context. Anything requiring an
/// interactive flow belongs to an external collaborator implementing
/// [`AuthManager`].
pub struct StaticAuthManager {
    identities: BTreeMap<String, IdentityConfig>,
    paths: CredentialPaths,
}

impl StaticAuthManager {
    /// Build from declared identities and the namespace-resolved paths.
    pub fn new(identities: BTreeMap<String, IdentityConfig>, paths: CredentialPaths) -> Self {
        Self { identities, paths }
    }
}

impl AuthManager for StaticAuthManager {
    fn authenticate<'a>(
        &'a self,
        identity: &'a str,
        ctx: &'a mut AuthContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let config = self.identities.get(identity).ok_or_else(|| AtmosError::AuthFailed {
                identity: identity.to_string(),
                provider: "unknown".to_string(),
                reason: format!(
                    "identity not declared under auth.identities (known: {})",
                    self.identities.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })?;

            match config.provider.as_str() {
                "aws" | "" => {
                    let profile =
                        config.profile.clone().unwrap_or_else(|| identity.to_string());
                    let files = self.paths.materialize("aws")?;
                    ctx.insert(
                        identity,
                        ProviderCredentials::Aws {
                            credentials_file: files.credentials,
                            config_file: files.config,
                            profile,
                            region: config.region.clone(),
                        },
                    );
                    Ok(())
                }
                "github" => {
                    let token = config
                        .extra
                        .get("token_env")
                        .and_then(|v| v.as_str())
                        .and_then(|var| std::env::var(var).ok())
                        .ok_or_else(|| AtmosError::AuthFailed {
                            identity: identity.to_string(),
                            provider: "github".to_string(),
                            reason: "token_env is unset or the variable is empty".to_string(),
                        })?;
                    ctx.insert(identity, ProviderCredentials::Github { token });
                    Ok(())
                }
                other => Err(AtmosError::AuthFailed {
                    identity: identity.to_string(),
                    provider: other.to_string(),
                    reason: "provider requires an external auth collaborator".to_string(),
                }
                .into()),
            }
        })
    }

    fn default_identity(&self) -> Option<String> {
        self.identities.iter().find(|(_, c)| c.default).map(|(name, _)| name.clone())
    }
}
