//! Recursive import resolution for stack manifests.
//!
//! Walks a manifest's `import:` list transitively, routing each entry to a
//! transformation adapter, a fetch adapter, or the local filesystem, and
//! produces the flattened, ordered list of files to merge. Order is the
//! merge precedence: a file's imports come before the file itself, siblings
//! stay in declaration order, so earlier entries are lower precedence.
//!
//! Cycles fail with `CyclicImport` carrying each offending file exactly
//! once; nesting past the depth bound fails with `MaxDepthExceeded`.

pub mod adapter;
pub mod fetch;
pub mod scheme;

pub use adapter::{AdapterRegistry, SyntheticAdapter, TransformAdapter};
pub use fetch::Fetcher;
pub use scheme::{ImportType, Route, route};

use anyhow::Result;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::constants::MAX_IMPORT_DEPTH;
use crate::core::AtmosError;
use crate::manifest::{ManifestCache, ManifestFile};

/// One resolved manifest in the merge order.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Local path of the manifest (possibly under the temp dir for remote
    /// and adapter imports).
    pub file_path: PathBuf,
    /// Chain of importing files from the root down to this file's importer.
    pub import_chain: Vec<PathBuf>,
    /// How this file entered the tree.
    pub import_type: ImportType,
}

impl ResolvedPath {
    /// Depth of this file in the import tree (root is 0).
    pub fn depth(&self) -> u32 {
        self.import_chain.len() as u32
    }
}

/// Recursive import resolver.
///
/// One per invocation; borrows the adapter registry and the manifest cache,
/// owns the fetcher and the temp directory remote imports land in.
pub struct ImportResolver<'a> {
    base_path: PathBuf,
    temp_dir: PathBuf,
    max_depth: u32,
    adapters: &'a AdapterRegistry,
    fetcher: Fetcher,
    cache: &'a ManifestCache,
}

impl<'a> ImportResolver<'a> {
    /// Build a resolver rooted at `base_path` (the stacks directory).
    pub fn new(
        base_path: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        adapters: &'a AdapterRegistry,
        fetcher: Fetcher,
        cache: &'a ManifestCache,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            temp_dir: temp_dir.into(),
            max_depth: MAX_IMPORT_DEPTH,
            adapters,
            fetcher,
            cache,
        }
    }

    /// Override the import depth bound.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve the transitive import tree of `root`.
    ///
    /// The returned list is in merge order and ends with `root` itself.
    pub async fn resolve(&self, root: &Path) -> Result<Vec<ResolvedPath>> {
        let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut out = Vec::new();
        let mut chain = Vec::new();
        self.resolve_inner(&canonical, ImportType::Local, &mut chain, &mut out, 0).await?;
        Ok(out)
    }

    fn resolve_inner<'s>(
        &'s self,
        file: &'s Path,
        import_type: ImportType,
        chain: &'s mut Vec<PathBuf>,
        out: &'s mut Vec<ResolvedPath>,
        depth: u32,
    ) -> BoxFuture<'s, Result<()>> {
        Box::pin(async move {
            if depth > self.max_depth {
                return Err(AtmosError::MaxDepthExceeded {
                    depth,
                    max: self.max_depth,
                    file: file.to_path_buf(),
                }
                .into());
            }
            if chain.iter().any(|seen| seen.as_path() == file) {
                let mut cycle: Vec<String> =
                    chain.iter().map(|p| p.display().to_string()).collect();
                cycle.push(file.display().to_string());
                return Err(AtmosError::CyclicImport { chain: cycle }.into());
            }

            let manifest = self.cache.get(file)?;
            chain.push(file.to_path_buf());

            for entry in manifest.imports()? {
                for (child, child_type) in self.materialize(&manifest, &entry).await? {
                    self.resolve_inner(&child, child_type, chain, out, depth + 1).await?;
                }
            }

            chain.pop();
            out.push(ResolvedPath {
                file_path: file.to_path_buf(),
                import_chain: chain.clone(),
                import_type,
            });
            trace!(file = %file.display(), depth, "resolved import");
            Ok(())
        })
    }

    /// Turn one `import:` entry into local file paths.
    async fn materialize(
        &self,
        importer: &ManifestFile,
        entry: &str,
    ) -> Result<Vec<(PathBuf, ImportType)>> {
        match route(entry, &self.adapters.schemes()) {
            Route::Adapter(scheme) => {
                let dest = self.temp_dir.join("adapter").join(sanitize(entry));
                let files = self.adapters.materialize(&scheme, entry, &dest)?;
                Ok(files.into_iter().map(|f| (f, ImportType::Adapter)).collect())
            }
            Route::Fetch(scheme) => {
                let dest = self.temp_dir.join("fetch").join(sanitize(entry));
                let files = self.fetcher.fetch(&scheme, entry, &dest).await?;
                Ok(files.into_iter().map(|f| (f, ImportType::Remote)).collect())
            }
            Route::Local => Ok(self
                .resolve_local(importer, entry)?
                .into_iter()
                .map(|f| (f, ImportType::Local))
                .collect()),
        }
    }

    /// Resolve a local import: extensionless lookup and glob expansion,
    /// relative to the stacks base path.
    fn resolve_local(&self, importer: &ManifestFile, entry: &str) -> Result<Vec<PathBuf>> {
        let pattern = if Path::new(entry).is_absolute() {
            PathBuf::from(entry)
        } else {
            self.base_path.join(entry)
        };

        if entry.contains('*') || entry.contains('?') || entry.contains('[') {
            let matches = expand_glob(&pattern)?;
            if matches.is_empty() {
                return Err(AtmosError::UnresolvableImport {
                    import: entry.to_string(),
                    reason: format!("glob matched no files under {}", self.base_path.display()),
                }
                .into());
            }
            return Ok(matches);
        }

        for candidate in candidates(&pattern) {
            if candidate.is_file() {
                return Ok(vec![candidate.canonicalize().unwrap_or(candidate)]);
            }
        }
        Err(AtmosError::UnresolvableImport {
            import: entry.to_string(),
            reason: format!(
                "not found relative to {} (imported by {})",
                self.base_path.display(),
                importer.path.display()
            ),
        }
        .into())
    }
}

/// The path itself, then `.yaml` and `.yml` completions.
fn candidates(pattern: &Path) -> Vec<PathBuf> {
    let mut list = vec![pattern.to_path_buf()];
    if pattern.extension().is_none() {
        let mut yaml = pattern.as_os_str().to_owned();
        yaml.push(".yaml");
        list.push(PathBuf::from(&yaml));
        let mut yml = pattern.as_os_str().to_owned();
        yml.push(".yml");
        list.push(PathBuf::from(yml));
    }
    list
}

fn expand_glob(pattern: &Path) -> Result<Vec<PathBuf>> {
    let rendered = pattern.display().to_string();
    let mut matches: Vec<PathBuf> = glob::glob(&rendered)
        .map_err(|e| AtmosError::UnresolvableImport {
            import: rendered.clone(),
            reason: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    Ok(matches)
}

fn sanitize(entry: &str) -> String {
    entry.chars().map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' }).collect()
}
