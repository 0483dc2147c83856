//! Scheme dispatch for import paths.
//!
//! An import path routes to one of three handlers: a registered
//! transformation adapter (checked first, so adapters may shadow fetch
//! schemes), the fetch-based adapter set, or the local filesystem. Fetch
//! schemes are an explicit, enumerated list; transformation adapters are a
//! dynamic registry.

use serde::{Deserialize, Serialize};

/// Fetch-based schemes this build recognizes, longest prefix first.
pub const FETCH_SCHEMES: &[&str] =
    &["https://", "http://", "git://", "ssh://", "s3://", "gcs://", "oci://", "file://"];

/// How an import path was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    /// Relative or absolute path on the local filesystem.
    Local,
    /// Downloaded by a fetch-based scheme adapter.
    Remote,
    /// Produced by a transformation adapter.
    Adapter,
}

/// Routing decision for one import path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Handled by the named transformation adapter.
    Adapter(String),
    /// Handled by the fetch adapter for the given scheme (without `://`).
    Fetch(String),
    /// A plain filesystem path.
    Local,
}

impl Route {
    /// The [`ImportType`] this route produces.
    pub fn import_type(&self) -> ImportType {
        match self {
            Self::Adapter(_) => ImportType::Adapter,
            Self::Fetch(_) => ImportType::Remote,
            Self::Local => ImportType::Local,
        }
    }
}

/// Decide how to handle `path`, given the registered adapter schemes.
///
/// Adapter schemes are matched first so a registry entry may shadow a fetch
/// scheme; detection is prefix-based in both cases.
pub fn route(path: &str, adapter_schemes: &[String]) -> Route {
    for scheme in adapter_schemes {
        let prefix = format!("{scheme}://");
        if path.starts_with(&prefix) {
            return Route::Adapter(scheme.clone());
        }
    }
    for prefix in FETCH_SCHEMES {
        if path.starts_with(prefix) {
            return Route::Fetch(prefix.trim_end_matches("://").to_string());
        }
    }
    Route::Local
}
