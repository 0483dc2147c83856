//! Path validation helpers shared by import extraction and component roots.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Reject paths containing parent-directory traversal.
pub fn validate_no_traversal(path: &Path) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        bail!("path '{}' contains parent directory traversal", path.display());
    }
    Ok(())
}

/// Join `name` under `base`, refusing absolute names and traversal.
///
/// Used when extracting archive entries so a crafted entry cannot escape the
/// per-invocation temp directory.
pub fn safe_join(base: &Path, name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        bail!("archive entry '{name}' has an absolute path");
    }
    validate_no_traversal(candidate)?;
    Ok(base.join(candidate))
}

/// Expand a leading tilde and return an absolute path relative to `base`.
pub fn absolutize(base: &Path, raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = Path::new(expanded.as_ref());
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        assert!(validate_no_traversal(Path::new("a/../../etc/passwd")).is_err());
        assert!(validate_no_traversal(Path::new("a/b/c.yaml")).is_ok());
    }

    #[test]
    fn safe_join_refuses_absolute_entries() {
        assert!(safe_join(Path::new("/tmp/x"), "/etc/passwd").is_err());
        assert!(safe_join(Path::new("/tmp/x"), "ok/file.yaml").is_ok());
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        let abs = absolutize(Path::new("/base"), "/other/path");
        assert_eq!(abs, PathBuf::from("/other/path"));
        let rel = absolutize(Path::new("/base"), "stacks");
        assert_eq!(rel, PathBuf::from("/base/stacks"));
    }
}
