//! S3 client construction and object reads.
//!
//! The SDK config is loaded with the exact profile, credentials-file, and
//! config-file paths carried by the AuthContext entry, so in-process reads
//! see the same identity a spawned `terraform` would. Without an entry the
//! ambient credential chain applies.

use anyhow::Result;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use tokio::time::timeout;
use tracing::debug;

use crate::auth::{AuthContext, ProviderCredentials};
use crate::constants::BACKEND_READ_TIMEOUT;
use crate::core::AtmosError;

/// Build an S3 client for `region`, honoring the AuthContext and an
/// optional role assumption.
pub async fn build_client(
    region: &str,
    role_arn: Option<&str>,
    auth: Option<&AuthContext>,
) -> Result<aws_sdk_s3::Client> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()));

    if let Some(ProviderCredentials::Aws { credentials_file, config_file, profile, .. }) =
        auth.and_then(AuthContext::aws)
    {
        debug!(profile, "loading SDK config from auth context files");
        let files = ProfileFiles::builder()
            .with_file(ProfileFileKind::Credentials, credentials_file)
            .with_file(ProfileFileKind::Config, config_file)
            .build();
        loader = loader.profile_files(files).profile_name(profile);
    }

    let base = loader.load().await;

    let config = if let Some(role) = role_arn {
        let provider = aws_config::sts::AssumeRoleProvider::builder(role)
            .session_name("atmos-state-read")
            .configure(&base)
            .build()
            .await;
        aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(provider)
            .load()
            .await
    } else {
        base
    };

    Ok(aws_sdk_s3::Client::new(&config))
}

/// Fetch one object's bytes with the backend read deadline.
pub async fn read_object(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<Vec<u8>> {
    let fetch = async {
        let object = client.get_object().bucket(bucket).key(key).send().await.map_err(|e| {
            AtmosError::BackendError {
                backend: "s3".to_string(),
                reason: format!("get s3://{bucket}/{key}: {e}"),
            }
        })?;
        let data = object.body.collect().await.map_err(|e| AtmosError::BackendError {
            backend: "s3".to_string(),
            reason: format!("read s3://{bucket}/{key}: {e}"),
        })?;
        Ok::<_, anyhow::Error>(data.into_bytes().to_vec())
    };

    timeout(BACKEND_READ_TIMEOUT, fetch).await.map_err(|_| AtmosError::BackendError {
        backend: "s3".to_string(),
        reason: format!(
            "read of s3://{bucket}/{key} timed out after {}s",
            BACKEND_READ_TIMEOUT.as_secs()
        ),
    })?
}
