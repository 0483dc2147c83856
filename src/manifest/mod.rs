//! Stack manifest loading and caching.
//!
//! A [`ManifestFile`] is a parsed YAML document plus its original path and a
//! [`PositionMap`] locating every JSONPath in the source text. Files are
//! parsed once per invocation and cached by canonical path in a
//! [`ManifestCache`]; the cache is discarded when the invocation ends.

pub mod position;

pub use position::{Position, PositionMap};

use anyhow::Result;
use dashmap::DashMap;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::core::AtmosError;

/// Key under which a manifest declares its imports.
pub const IMPORT_KEY: &str = "import";

/// Key under which locals are declared at any scope.
pub const LOCALS_KEY: &str = "locals";

/// A parsed YAML manifest with source positions.
#[derive(Debug, Clone)]
pub struct ManifestFile {
    /// Original (canonicalized) file path.
    pub path: PathBuf,
    /// Parsed document root. Always a mapping for valid manifests.
    pub document: Value,
    /// JSONPath to source-position map.
    pub positions: PositionMap,
}

impl ManifestFile {
    /// Parse YAML source into a manifest.
    ///
    /// Fails with [`AtmosError::InvalidManifest`] when the document is not
    /// parseable or its root is not a mapping.
    pub fn parse(path: impl Into<PathBuf>, source: &str) -> Result<Self, AtmosError> {
        let path = path.into();
        let document: Value =
            serde_yaml::from_str(source).map_err(|e| AtmosError::InvalidManifest {
                file: path.clone(),
                path: e.location().map(|l| format!("line {}", l.line())),
                message: e.to_string(),
            })?;

        // An empty file parses to null; treat it as an empty mapping so
        // imports of placeholder files merge cleanly.
        let document = if document.is_null() {
            Value::Mapping(serde_yaml::Mapping::new())
        } else {
            document
        };

        if !document.is_mapping() {
            return Err(AtmosError::InvalidManifest {
                file: path,
                path: None,
                message: "manifest root must be a mapping".to_string(),
            });
        }

        let positions = PositionMap::scan(source);
        Ok(Self { path, document, positions })
    }

    /// Load and parse a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, AtmosError> {
        let source = std::fs::read_to_string(path).map_err(|e| AtmosError::FileSystemError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(path, &source)
    }

    /// The manifest's `import:` list, in declaration order.
    ///
    /// A missing key yields an empty list; a non-sequence value is a schema
    /// violation.
    pub fn imports(&self) -> Result<Vec<String>, AtmosError> {
        let Some(node) = self.document.get(IMPORT_KEY) else {
            return Ok(Vec::new());
        };
        let Some(seq) = node.as_sequence() else {
            return Err(AtmosError::InvalidManifest {
                file: self.path.clone(),
                path: Some(IMPORT_KEY.to_string()),
                message: "'import' must be a list".to_string(),
            });
        };
        seq.iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    AtmosError::InvalidManifest {
                        file: self.path.clone(),
                        path: Some(format!("{IMPORT_KEY}[{i}]")),
                        message: "import entries must be strings".to_string(),
                    }
                })
            })
            .collect()
    }

    /// Position of a JSONPath in this file, when known.
    pub fn position(&self, json_path: &str) -> Option<Position> {
        self.positions.get(json_path)
    }
}

/// Per-invocation manifest cache keyed by canonical path.
///
/// Read-mostly after stack discovery; concurrent loads of the same file are
/// de-duplicated at the value level (last writer wins, both writers hold
/// identical content).
#[derive(Debug, Default)]
pub struct ManifestCache {
    files: DashMap<PathBuf, Arc<ManifestFile>>,
}

impl ManifestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest through the cache.
    pub fn get(&self, path: &Path) -> Result<Arc<ManifestFile>, AtmosError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(found) = self.files.get(&canonical) {
            trace!(path = %canonical.display(), "manifest cache hit");
            return Ok(Arc::clone(&found));
        }
        let manifest = Arc::new(ManifestFile::load(&canonical)?);
        self.files.insert(canonical, Arc::clone(&manifest));
        Ok(manifest)
    }

    /// Number of cached manifests.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_imports_in_declaration_order() {
        let manifest = ManifestFile::parse(
            "stacks/dev.yaml",
            "import:\n  - catalog/vpc\n  - mixins/region\nvars: {stage: dev}\n",
        )
        .unwrap();
        assert_eq!(manifest.imports().unwrap(), vec!["catalog/vpc", "mixins/region"]);
    }

    #[test]
    fn missing_import_key_is_empty() {
        let manifest = ManifestFile::parse("a.yaml", "vars: {}\n").unwrap();
        assert!(manifest.imports().unwrap().is_empty());
    }

    #[test]
    fn non_list_import_is_schema_error() {
        let manifest = ManifestFile::parse("a.yaml", "import: catalog/vpc\n").unwrap();
        let err = manifest.imports().unwrap_err();
        assert!(matches!(err, AtmosError::InvalidManifest { .. }));
    }

    #[test]
    fn empty_file_parses_to_empty_mapping() {
        let manifest = ManifestFile::parse("empty.yaml", "").unwrap();
        assert!(manifest.document.as_mapping().unwrap().is_empty());
    }

    #[test]
    fn scalar_root_is_rejected() {
        assert!(ManifestFile::parse("bad.yaml", "just a string").is_err());
    }

    #[test]
    fn yaml_error_carries_file_and_location() {
        let err = ManifestFile::parse("bad.yaml", "a:\n  - ]\n").unwrap_err();
        match err {
            AtmosError::InvalidManifest { file, .. } => {
                assert_eq!(file, PathBuf::from("bad.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cache_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stack.yaml");
        std::fs::write(&file, "vars: {a: 1}\n").unwrap();

        let cache = ManifestCache::new();
        let first = cache.get(&file).unwrap();
        let second = cache.get(&file).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
