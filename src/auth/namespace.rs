//! Credential-directory namespace isolation.
//!
//! Credential files are stored per provider *and per namespace* so two
//! repositories never share credential files just because their identities
//! have the same names. The namespace resolves, in order: environment
//! variable override, explicit `auth.namespace` in the root config, then an
//! 8-character hash of the root config file's path.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::constants::{AUTH_NAMESPACE_ENV, NAMESPACE_HASH_LEN};

/// Resolve the credential namespace for this invocation.
pub fn resolve_namespace(configured: Option<&str>, root_config_path: &Path) -> String {
    if let Ok(from_env) = std::env::var(AUTH_NAMESPACE_ENV) {
        if !from_env.is_empty() {
            return from_env;
        }
    }
    if let Some(explicit) = configured {
        if !explicit.is_empty() {
            return explicit.to_string();
        }
    }
    hash_namespace(root_config_path)
}

/// Derive the default namespace from the root config path.
pub fn hash_namespace(root_config_path: &Path) -> String {
    let canonical =
        root_config_path.canonicalize().unwrap_or_else(|_| root_config_path.to_path_buf());
    let digest = Sha256::digest(canonical.display().to_string().as_bytes());
    hex::encode(digest)[..NAMESPACE_HASH_LEN].to_string()
}

/// Materialized credential file pair for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFiles {
    /// `<base>/<provider>-<namespace>/credentials`
    pub credentials: PathBuf,
    /// `<base>/<provider>-<namespace>/config`
    pub config: PathBuf,
}

/// Factory for per-provider, per-namespace credential paths.
#[derive(Debug, Clone)]
pub struct CredentialPaths {
    base: PathBuf,
    namespace: String,
}

impl CredentialPaths {
    /// Paths rooted at `base` (conventionally `~/.atmos/credentials`).
    pub fn new(base: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self { base: base.into(), namespace: namespace.into() }
    }

    /// Paths under the user's home directory.
    pub fn default_base(namespace: impl Into<String>) -> Self {
        let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".atmos/credentials");
        Self::new(base, namespace)
    }

    /// The directory for one provider family.
    pub fn provider_dir(&self, provider: &str) -> PathBuf {
        self.base.join(format!("{provider}-{}", self.namespace))
    }

    /// Create the provider directory (0700) and empty credential files
    /// (0600) when absent; returns their paths.
    pub fn materialize(&self, provider: &str) -> Result<CredentialFiles> {
        let dir = self.provider_dir(provider);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        set_mode(&dir, 0o700)?;

        let credentials = dir.join("credentials");
        let config = dir.join("config");
        for file in [&credentials, &config] {
            if !file.exists() {
                std::fs::write(file, "")
                    .with_context(|| format!("failed to create {}", file.display()))?;
            }
            set_mode(file, 0o600)?;
        }
        Ok(CredentialFiles { credentials, config })
    }

    /// Paths under a fresh temp directory, for tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_tests() -> Self {
        let dir = std::env::temp_dir().join(format!("atmos-auth-test-{}", std::process::id()));
        Self::new(dir, "testns")
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_prefers_explicit_config() {
        // Env override is absent in tests; explicit config wins over hash.
        let ns = resolve_namespace(Some("team-a"), Path::new("/repo/atmos.yaml"));
        assert_eq!(ns, "team-a");
    }

    #[test]
    fn hash_namespace_is_stable_and_short() {
        let a = hash_namespace(Path::new("/repo-a/atmos.yaml"));
        let b = hash_namespace(Path::new("/repo-b/atmos.yaml"));
        assert_eq!(a.len(), NAMESPACE_HASH_LEN);
        assert_ne!(a, b);
        assert_eq!(a, hash_namespace(Path::new("/repo-a/atmos.yaml")));
    }

    #[test]
    fn different_namespaces_never_share_files() {
        let base = tempfile::tempdir().unwrap();
        let first = CredentialPaths::new(base.path(), "ns1").materialize("aws").unwrap();
        let second = CredentialPaths::new(base.path(), "ns2").materialize("aws").unwrap();
        assert_ne!(first.credentials, second.credentials);
        assert_ne!(first.config, second.config);
    }

    #[cfg(unix)]
    #[test]
    fn credential_files_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let base = tempfile::tempdir().unwrap();
        let files = CredentialPaths::new(base.path(), "ns").materialize("aws").unwrap();
        let mode = std::fs::metadata(&files.credentials).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(files.credentials.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
