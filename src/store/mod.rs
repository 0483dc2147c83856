//! Key/value stores backing `!store` and `!store.get`.
//!
//! Stores are declared under `stores.<name>` in the root configuration and
//! addressed by name from tagged functions. Two kinds ship in-tree: `file`
//! (a JSON document on disk, keys addressed as dotted paths) and `memory`
//! (seeded inline, for tests and dry wiring). Remote kinds plug in behind
//! the same trait.

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::AtmosError;

/// A named key/value store.
pub trait Store: Send + Sync {
    /// Read one key; missing keys are an error carrying the store name.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Json>>;
}

/// Declaration of one store in the root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// JSON document on disk.
    File {
        /// Path to the document, relative to the repository root.
        path: PathBuf,
    },
    /// Inline data, held in memory for the invocation.
    Memory {
        /// Seeded key/value pairs.
        #[serde(default)]
        data: BTreeMap<String, Json>,
    },
}

/// Registry of configured stores, keyed by name.
#[derive(Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Box<dyn Store>>,
}

impl StoreRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from root-config declarations.
    pub fn from_config(configs: &BTreeMap<String, StoreConfig>, base: &std::path::Path) -> Self {
        let mut registry = Self::new();
        for (name, config) in configs {
            let store: Box<dyn Store> = match config {
                StoreConfig::File { path } => {
                    let path =
                        if path.is_absolute() { path.clone() } else { base.join(path) };
                    Box::new(FileStore { name: name.clone(), path })
                }
                StoreConfig::Memory { data } => {
                    Box::new(MemoryStore { name: name.clone(), data: data.clone() })
                }
            };
            registry.register(name.clone(), store);
        }
        registry
    }

    /// Register a store under `name`.
    pub fn register(&mut self, name: impl Into<String>, store: Box<dyn Store>) {
        self.stores.insert(name.into(), store);
    }

    /// Read `key` from the store called `name`.
    pub async fn get(&self, name: &str, key: &str) -> Result<Json> {
        let store = self.stores.get(name).ok_or_else(|| AtmosError::StoreNotFound {
            store: name.to_string(),
            available: self.stores.keys().cloned().collect(),
        })?;
        store.get(key).await
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Dotted-path lookup into a JSON document.
fn lookup<'a>(doc: &'a Json, key: &str) -> Option<&'a Json> {
    let mut node = doc;
    for segment in key.split('.') {
        node = match node {
            Json::Object(map) => map.get(segment)?,
            Json::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

struct FileStore {
    name: String,
    path: PathBuf,
}

impl Store for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Json>> {
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                AtmosError::BackendError {
                    backend: format!("store/{}", self.name),
                    reason: format!("{}: {e}", self.path.display()),
                }
            })?;
            let doc: Json = serde_json::from_str(&raw).map_err(|e| AtmosError::BackendError {
                backend: format!("store/{}", self.name),
                reason: format!("invalid JSON in {}: {e}", self.path.display()),
            })?;
            lookup(&doc, key).cloned().ok_or_else(|| {
                AtmosError::BackendError {
                    backend: format!("store/{}", self.name),
                    reason: format!("key '{key}' not found"),
                }
                .into()
            })
        })
    }
}

struct MemoryStore {
    name: String,
    data: BTreeMap<String, Json>,
}

impl Store for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Json>> {
        Box::pin(async move {
            if let Some(direct) = self.data.get(key) {
                return Ok(direct.clone());
            }
            let doc = Json::Object(self.data.clone().into_iter().collect());
            lookup(&doc, key).cloned().ok_or_else(|| {
                AtmosError::BackendError {
                    backend: format!("store/{}", self.name),
                    reason: format!("key '{key}' not found"),
                }
                .into()
            })
        })
    }
}
