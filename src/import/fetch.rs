//! Fetch-based import adapters.
//!
//! Downloads remote imports to the per-invocation temp directory and
//! normalizes them to local file paths. HTTP(S) bodies that are zip archives
//! are extracted with guards against path traversal and decompression
//! bombs; git imports go through the system `git` binary with a shallow
//! clone; `s3://` reads use the AWS SDK with ambient credentials (import
//! resolution runs before identity materialization).

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_retry::Retry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::{FETCH_TIMEOUT, MAX_ARCHIVE_EXTRACT_BYTES};
use crate::core::AtmosError;
use crate::utils::ProcessCommand;
use crate::utils::backoff::fetch_retry_strategy;
use crate::utils::paths::safe_join;

/// Downloader for the enumerated fetch schemes.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl Fetcher {
    /// Create a fetcher bound to the invocation's cancellation token.
    pub fn new(cancel: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, cancel })
    }

    /// Fetch `uri` via `scheme` into `dest`, returning manifest paths in
    /// merge order.
    pub async fn fetch(&self, scheme: &str, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        match scheme {
            "http" | "https" => self.fetch_http(uri, dest).await,
            "file" => fetch_file(uri, dest),
            "git" | "ssh" => self.fetch_git(uri, dest).await,
            "s3" => self.fetch_s3(uri, dest).await,
            other => Err(AtmosError::UnresolvableImport {
                import: uri.to_string(),
                reason: format!("fetch scheme '{other}' is recognized but not supported yet"),
            }
            .into()),
        }
    }

    /// Download over HTTP with the standard fetch retry policy.
    async fn fetch_http(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let bytes = Retry::spawn(fetch_retry_strategy(), || async {
            if self.cancel.is_cancelled() {
                anyhow::bail!("cancelled");
            }
            let response = self.client.get(uri).send().await?.error_for_status()?;
            Ok::<_, anyhow::Error>(response.bytes().await?)
        })
        .await
        .map_err(|e| AtmosError::UnresolvableImport {
            import: uri.to_string(),
            reason: e.to_string(),
        })?;

        if is_zip(&bytes) {
            return extract_zip(&bytes, dest, uri);
        }

        let name = uri.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("import.yaml");
        let file = dest.join(name);
        std::fs::write(&file, &bytes)
            .with_context(|| format!("failed to write {}", file.display()))?;
        debug!(uri, file = %file.display(), "fetched http import");
        Ok(vec![file])
    }

    /// Shallow-clone a repository and pick out the `//subpath` suffix.
    ///
    /// URI shape: `git://<repo>//<subpath>[?ref=<ref>]`. The subpath may be
    /// a single file or a directory of manifests.
    async fn fetch_git(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let parsed = GitImport::parse(uri)?;
        let checkout = dest.join("repo");

        let mut cmd = ProcessCommand::new("git")
            .args(["clone", "--depth", "1", "--quiet"])
            .cancel_token(self.cancel.clone())
            .timeout(FETCH_TIMEOUT);
        if let Some(ref r) = parsed.reference {
            cmd = cmd.args(["--branch", r]);
        }
        cmd.arg(&parsed.repo)
            .arg(checkout.display().to_string())
            .execute()
            .await
            .map_err(|e| AtmosError::UnresolvableImport {
                import: uri.to_string(),
                reason: e.to_string(),
            })?;

        let target = checkout.join(&parsed.subpath);
        if target.is_file() {
            Ok(vec![target])
        } else if target.is_dir() {
            Ok(collect_manifests(&target))
        } else {
            Err(AtmosError::UnresolvableImport {
                import: uri.to_string(),
                reason: format!("'{}' not found in repository", parsed.subpath),
            }
            .into())
        }
    }

    /// Read an object through the AWS SDK with ambient credentials.
    async fn fetch_s3(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let rest = uri.strip_prefix("s3://").unwrap_or(uri);
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            AtmosError::UnresolvableImport {
                import: uri.to_string(),
                reason: "expected s3://<bucket>/<key>".to_string(),
            }
        })?;

        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_s3::Client::new(&config);
        let object = client.get_object().bucket(bucket).key(key).send().await.map_err(|e| {
            AtmosError::UnresolvableImport { import: uri.to_string(), reason: e.to_string() }
        })?;
        let bytes = object.body.collect().await.map_err(|e| {
            AtmosError::UnresolvableImport { import: uri.to_string(), reason: e.to_string() }
        })?;

        let name = key.rsplit('/').next().filter(|n| !n.is_empty()).unwrap_or("import.yaml");
        let file = dest.join(name);
        std::fs::write(&file, bytes.into_bytes())
            .with_context(|| format!("failed to write {}", file.display()))?;
        Ok(vec![file])
    }
}

/// Copy a `file://` import into the workspace.
fn fetch_file(uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
    let source = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
    if source.is_dir() {
        return Ok(collect_manifests(source));
    }
    let name = source.file_name().map(PathBuf::from).unwrap_or_else(|| "import.yaml".into());
    let target = dest.join(name);
    std::fs::copy(source, &target).map_err(|e| AtmosError::UnresolvableImport {
        import: uri.to_string(),
        reason: e.to_string(),
    })?;
    Ok(vec![target])
}

/// YAML manifests under `dir`, sorted for deterministic merge order.
fn collect_manifests(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| {
            matches!(p.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"))
        })
        .collect();
    files.sort();
    files
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == b"PK\x03\x04"
}

/// Extract a zip archive with traversal and bomb guards.
fn extract_zip(bytes: &[u8], dest: &Path, uri: &str) -> Result<Vec<PathBuf>> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| AtmosError::UnresolvableImport {
            import: uri.to_string(),
            reason: format!("invalid zip archive: {e}"),
        })?;

    let declared: u64 = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.size()))
        .sum();
    if declared > MAX_ARCHIVE_EXTRACT_BYTES {
        return Err(AtmosError::UnresolvableImport {
            import: uri.to_string(),
            reason: format!(
                "archive would extract to {declared} bytes, above the {MAX_ARCHIVE_EXTRACT_BYTES} limit"
            ),
        }
        .into());
    }

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            warn!(uri, entry = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let target = safe_join(dest, &name.to_string_lossy())?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.take(MAX_ARCHIVE_EXTRACT_BYTES).read_to_end(&mut contents)?;
        std::fs::write(&target, contents)?;
        extracted.push(target);
    }
    extracted.sort();
    Ok(extracted)
}

/// Parsed `git://` import URI.
#[derive(Debug, PartialEq, Eq)]
struct GitImport {
    repo: String,
    subpath: String,
    reference: Option<String>,
}

impl GitImport {
    fn parse(uri: &str) -> Result<Self, AtmosError> {
        let (base, reference) = match uri.split_once("?ref=") {
            Some((base, r)) => (base, Some(r.to_string())),
            None => (uri, None),
        };
        // Skip past "<scheme>://" so the authority's separator is not
        // mistaken for the subpath delimiter.
        let scheme_end = base.find("://").map_or(0, |i| i + 3);
        let Some(split) = base[scheme_end..].find("//").map(|i| i + scheme_end) else {
            return Err(AtmosError::UnresolvableImport {
                import: uri.to_string(),
                reason: "expected '<repo>//<subpath>' in git import".to_string(),
            });
        };
        let mut repo = base[..split].to_string();
        if let Some(rest) = repo.strip_prefix("git://") {
            repo = format!("https://{rest}");
        }
        Ok(Self { repo, subpath: base[split + 2..].to_string(), reference })
    }
}
