//! Provenance tracking for merged configuration values.
//!
//! Every leaf value written by the merge engine appends a
//! [`ProvenanceEntry`] to the chain for its JSONPath. The last entry
//! explains the effective value; earlier entries are the inheritance
//! history that `describe` projections surface. Chains outlive the merge
//! and are read back long after the MergeContexts that produced them are
//! gone.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Why a value landed at its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceKind {
    /// First set in the file being processed.
    Inline,
    /// Inherited across a file boundary unchanged.
    Import,
    /// A later precedence wrote a new value over an existing chain.
    Override,
    /// Produced by expression evaluation.
    Computed,
    /// Engine-supplied default.
    Default,
}

/// One step in a value's history.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceEntry {
    /// Manifest the write came from.
    pub file: PathBuf,
    /// Source line of the key, 1-based; 0 when the scanner had no position.
    pub line: u32,
    /// Source column of the key, 1-based; 0 when unknown.
    pub column: u32,
    /// Why the write happened.
    pub kind: ProvenanceKind,
    /// Import depth of the writing file (root file is 0).
    pub depth: u32,
    /// Short content hash of the written value.
    pub value_hash: String,
}

/// Hash a value for provenance comparison.
pub fn hash_value(value: &serde_yaml::Value) -> String {
    let serialized = serde_yaml::to_string(value).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    hex::encode(&digest[..8])
}

/// Ordered provenance chains per JSONPath.
///
/// Assembled by exclusive appends during merge; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceStore {
    chains: HashMap<String, Vec<ProvenanceEntry>>,
}

impl ProvenanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the chain for `path`.
    pub fn record(&mut self, path: &str, entry: ProvenanceEntry) {
        self.chains.entry(path.to_string()).or_default().push(entry);
    }

    /// Full chain for `path`, oldest first.
    pub fn chain(&self, path: &str) -> &[ProvenanceEntry] {
        self.chains.get(path).map_or(&[], Vec::as_slice)
    }

    /// The entry explaining the effective value at `path`.
    pub fn effective(&self, path: &str) -> Option<&ProvenanceEntry> {
        self.chains.get(path).and_then(|c| c.last())
    }

    /// Whether any value was recorded at or under `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.chains.contains_key(path)
    }

    /// All recorded paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Merge another store's chains into this one (used when parallel
    /// workers each built a per-file store).
    pub fn absorb(&mut self, other: Self) {
        for (path, mut chain) in other.chains {
            self.chains.entry(path).or_default().append(&mut chain);
        }
    }
}
