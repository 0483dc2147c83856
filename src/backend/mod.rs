//! Terraform state backend abstraction.
//!
//! `!terraform.state` and `!terraform.output` route through here. Two
//! backend types read state in this build: `local` (a state file on disk)
//! and `s3` (the canonical remote). Any other declared type fails with
//! `UnsupportedBackendType` listing what is allowed.
//!
//! S3 clients are constructed at most once per `(region, role_arn,
//! profile)` and cached in a concurrent map; raw state reads are cached by
//! client key plus target so one invocation never fetches the same state
//! twice.

pub mod s3;

use anyhow::Result;
use dashmap::DashMap;
use serde_json::Value as Json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthContext;
use crate::core::AtmosError;

/// Backend types this build can read.
pub const ALLOWED_BACKENDS: &[&str] = &["local", "s3"];

/// Parsed backend declaration for one component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendSpec {
    /// State file on the local filesystem.
    Local {
        /// Path to the state file; defaults next to the component.
        path: PathBuf,
    },
    /// S3 remote state.
    S3 {
        /// Bucket holding the state object.
        bucket: String,
        /// Object key (already workspace-resolved by the caller).
        key: String,
        /// Bucket region.
        region: String,
        /// Role to assume for the read, when declared.
        role_arn: Option<String>,
    },
}

impl BackendSpec {
    /// Parse a component's `backend` section.
    ///
    /// `backend_type` comes from the sibling `backend_type` value; the
    /// mapping holds that type's attributes.
    pub fn parse(backend_type: &str, attributes: &Json) -> Result<Self, AtmosError> {
        match backend_type {
            "local" => {
                let path = attributes
                    .get("path")
                    .and_then(Json::as_str)
                    .unwrap_or("terraform.tfstate");
                Ok(Self::Local { path: PathBuf::from(path) })
            }
            "s3" => {
                let field = |name: &str| {
                    attributes.get(name).and_then(Json::as_str).map(ToString::to_string).ok_or_else(
                        || AtmosError::BackendError {
                            backend: "s3".to_string(),
                            reason: format!("missing required attribute '{name}'"),
                        },
                    )
                };
                Ok(Self::S3 {
                    bucket: field("bucket")?,
                    key: field("key")?,
                    region: field("region")?,
                    role_arn: attributes
                        .get("role_arn")
                        .and_then(Json::as_str)
                        .map(ToString::to_string),
                })
            }
            other => Err(AtmosError::UnsupportedBackendType {
                backend: other.to_string(),
                allowed: ALLOWED_BACKENDS.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

/// Cache key for S3 clients: one client per (region, role, profile).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ClientKey {
    pub region: String,
    pub role_arn: Option<String>,
    pub profile: Option<String>,
}

/// State reader with per-invocation client and result caches.
#[derive(Debug, Default)]
pub struct StateReader {
    clients: DashMap<ClientKey, aws_sdk_s3::Client>,
    results: DashMap<(ClientKey, String, String), Arc<Json>>,
}

impl StateReader {
    /// A reader with empty caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse raw state for `spec`.
    ///
    /// The S3 path demands an AWS entry on `auth` when one exists and
    /// falls back to ambient credentials otherwise.
    pub async fn read_state(
        &self,
        spec: &BackendSpec,
        auth: Option<&AuthContext>,
    ) -> Result<Arc<Json>> {
        match spec {
            BackendSpec::Local { path } => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AtmosError::BackendError {
                        backend: "local".to_string(),
                        reason: format!("{}: {e}", path.display()),
                    }
                })?;
                let parsed: Json =
                    serde_json::from_str(&raw).map_err(|e| AtmosError::BackendError {
                        backend: "local".to_string(),
                        reason: format!("invalid state JSON: {e}"),
                    })?;
                Ok(Arc::new(parsed))
            }
            BackendSpec::S3 { bucket, key, region, role_arn } => {
                let client_key = ClientKey {
                    region: region.clone(),
                    role_arn: role_arn.clone(),
                    profile: auth
                        .and_then(AuthContext::aws)
                        .and_then(|c| match c {
                            crate::auth::ProviderCredentials::Aws { profile, .. } => {
                                Some(profile.clone())
                            }
                            _ => None,
                        }),
                };
                let cache_key = (client_key.clone(), bucket.clone(), key.clone());
                if let Some(found) = self.results.get(&cache_key) {
                    debug!(bucket, key, "state cache hit");
                    return Ok(Arc::clone(&found));
                }

                let client = match self.clients.get(&client_key) {
                    Some(found) => found.clone(),
                    None => {
                        let built =
                            s3::build_client(region, role_arn.as_deref(), auth).await?;
                        self.clients.insert(client_key.clone(), built.clone());
                        built
                    }
                };

                let state = s3::read_object(&client, bucket, key).await?;
                let parsed: Json =
                    serde_json::from_slice(&state).map_err(|e| AtmosError::BackendError {
                        backend: "s3".to_string(),
                        reason: format!("invalid state JSON at s3://{bucket}/{key}: {e}"),
                    })?;
                let shared = Arc::new(parsed);
                self.results.insert(cache_key, Arc::clone(&shared));
                Ok(shared)
            }
        }
    }

    /// Read one output value from a component's state.
    pub async fn read_output(
        &self,
        spec: &BackendSpec,
        output: &str,
        auth: Option<&AuthContext>,
    ) -> Result<Json> {
        let state = self.read_state(spec, auth).await?;
        state
            .get("outputs")
            .and_then(|o| o.get(output))
            .and_then(|o| o.get("value"))
            .cloned()
            .ok_or_else(|| {
                AtmosError::BackendError {
                    backend: "state".to_string(),
                    reason: format!("output '{output}' not present in state"),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_lists_allowed_types() {
        let err = BackendSpec::parse("consul", &serde_json::json!({})).unwrap_err();
        match err {
            AtmosError::UnsupportedBackendType { backend, allowed } => {
                assert_eq!(backend, "consul");
                assert_eq!(allowed, ["local", "s3"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn s3_spec_requires_bucket_key_region() {
        let err = BackendSpec::parse("s3", &serde_json::json!({"bucket": "b"})).unwrap_err();
        assert!(err.to_string().contains("key"));

        let spec = BackendSpec::parse(
            "s3",
            &serde_json::json!({"bucket": "b", "key": "k", "region": "us-east-1"}),
        )
        .unwrap();
        assert!(matches!(spec, BackendSpec::S3 { role_arn: None, .. }));
    }

    #[tokio::test]
    async fn local_backend_reads_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("terraform.tfstate");
        std::fs::write(
            &state,
            r#"{"version": 4, "outputs": {"vpc_id": {"value": "vpc-123", "type": "string"}}}"#,
        )
        .unwrap();

        let reader = StateReader::new();
        let spec = BackendSpec::Local { path: state };
        let value = reader.read_output(&spec, "vpc_id", None).await.unwrap();
        assert_eq!(value, "vpc-123");

        let missing = reader.read_output(&spec, "nope", None).await.unwrap_err();
        assert!(missing.to_string().contains("not present"));
    }
}
