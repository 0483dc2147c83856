//! Transformation adapters: pluggable generators of YAML manifests.
//!
//! A transformation adapter takes an import URI and materializes one or more
//! YAML files under the per-invocation temp directory. Unlike fetch schemes,
//! the output is *generated or transformed* from the source rather than
//! downloaded verbatim (a synthetic adapter for testing, an HCL-to-YAML
//! bridge for migration tooling). Adapters register by scheme name and are
//! consulted before the fetch scheme list.

use anyhow::Result;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::AtmosError;

/// A transformation adapter keyed by URI scheme.
///
/// `materialize` writes the generated manifests under `dest` and returns
/// their paths in merge order. Adapters must be pure with respect to the
/// invocation: the same URI materializes the same documents.
pub trait TransformAdapter: Send + Sync {
    /// Scheme this adapter claims (without `://`).
    fn scheme(&self) -> &str;

    /// Produce YAML files for `uri` under `dest`.
    fn materialize(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>>;
}

/// Dynamic registry of transformation adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Box<dyn TransformAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous claim on its scheme.
    pub fn register(&mut self, adapter: Box<dyn TransformAdapter>) {
        debug!(scheme = adapter.scheme(), "registering transformation adapter");
        self.adapters.insert(adapter.scheme().to_string(), adapter);
    }

    /// Schemes currently claimed, for routing.
    pub fn schemes(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Materialize `uri` through the adapter owning `scheme`.
    pub fn materialize(&self, scheme: &str, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let adapter = self.adapters.get(scheme).ok_or_else(|| AtmosError::UnresolvableImport {
            import: uri.to_string(),
            reason: format!("no transformation adapter registered for scheme '{scheme}'"),
        })?;
        adapter.materialize(uri, dest)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").field("schemes", &self.schemes()).finish()
    }
}

/// Synthetic adapter serving documents from an in-memory map.
///
/// Registered under a scheme such as `mock`; an import of
/// `mock://defaults` materializes the document stored under `defaults`.
/// Exists for tests and for wiring examples without network access.
pub struct SyntheticAdapter {
    scheme: String,
    documents: BTreeMap<String, String>,
}

impl SyntheticAdapter {
    /// Build a synthetic adapter over `documents` (name → YAML source).
    pub fn new(scheme: impl Into<String>, documents: BTreeMap<String, String>) -> Self {
        Self { scheme: scheme.into(), documents }
    }
}

impl TransformAdapter for SyntheticAdapter {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn materialize(&self, uri: &str, dest: &Path) -> Result<Vec<PathBuf>> {
        let prefix = format!("{}://", self.scheme);
        let name = uri.strip_prefix(&prefix).unwrap_or(uri);
        let source = self.documents.get(name).ok_or_else(|| AtmosError::UnresolvableImport {
            import: uri.to_string(),
            reason: format!("synthetic adapter has no document named '{name}'"),
        })?;
        std::fs::create_dir_all(dest)?;
        let file = dest.join(format!("{}.yaml", name.replace('/', "_")));
        std::fs::write(&file, source)?;
        Ok(vec![file])
    }
}
