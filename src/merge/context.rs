//! Per-file merge context.

use std::path::PathBuf;
use std::sync::Arc;

use crate::manifest::ManifestFile;

/// Context for one file being folded into a merge.
///
/// Carries the file (with its position map) and the import chain that led
/// to it; children are created when descending into imports. The chain
/// length is the provenance depth of every value this file writes.
#[derive(Debug, Clone)]
pub struct MergeContext {
    /// The file currently being merged.
    pub file: Arc<ManifestFile>,
    /// Importing files from the root down to this file's importer.
    pub import_chain: Vec<PathBuf>,
}

impl MergeContext {
    /// Context for a root file (empty chain).
    pub fn root(file: Arc<ManifestFile>) -> Self {
        Self { file, import_chain: Vec::new() }
    }

    /// Context for an imported file.
    pub fn imported(file: Arc<ManifestFile>, import_chain: Vec<PathBuf>) -> Self {
        Self { file, import_chain }
    }

    /// Provenance depth of writes from this file.
    pub fn depth(&self) -> u32 {
        self.import_chain.len() as u32
    }

    /// Whether this file was reached through an import.
    pub fn is_import(&self) -> bool {
        !self.import_chain.is_empty()
    }
}
