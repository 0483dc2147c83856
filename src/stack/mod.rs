//! Stack discovery, naming, and the stack index.
//!
//! Stack manifests live under `stacks.base_path`, filtered by
//! included/excluded globs. Each discovered manifest derives a logical
//! stack name: `name_template` (a template over the manifest's content)
//! wins over the tokenized `name_pattern`
//! (`{tenant}-{environment}-{stage}`), which falls back to the
//! extension-less relative path. The index maps logical names to manifest
//! paths and is also addressable by relative path directly. Duplicate
//! logical names are fatal.
//!
//! Discovery parses manifests in parallel under a bounded worker pool.

pub mod component;
pub mod resolver;

pub use component::{RawComponentView, build_component_view};
pub use resolver::{ResolvedComponent, StackResolver};

use anyhow::Result;
use futures::StreamExt;
use glob::Pattern;
use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::config::AtmosConfig;
use crate::constants::STACK_DISCOVERY_CONCURRENCY;
use crate::core::AtmosError;
use crate::manifest::{ManifestCache, ManifestFile};
use crate::merge::value::yaml_key_to_string;
use crate::template::{TemplateContext, TemplateEngine};

/// One discovered stack manifest.
#[derive(Debug, Clone)]
pub struct StackEntry {
    /// Logical stack name.
    pub name: String,
    /// Absolute manifest path.
    pub manifest_path: PathBuf,
    /// Path relative to the stacks root, without extension.
    pub relative: String,
}

/// Map of logical stack names to manifests.
#[derive(Debug, Default)]
pub struct StackIndex {
    entries: BTreeMap<String, StackEntry>,
    by_relative: BTreeMap<String, String>,
}

impl StackIndex {
    /// Discover and index every stack manifest under the configured root.
    pub async fn build(
        config: &AtmosConfig,
        cache: &ManifestCache,
        engine: &TemplateEngine,
    ) -> Result<Self> {
        let stacks_dir = config.stacks_dir();
        let candidates = discover_files(&stacks_dir, &config.stacks.included_paths,
            &config.stacks.excluded_paths);
        debug!(count = candidates.len(), root = %stacks_dir.display(), "discovered stack manifests");

        // Parse in parallel; naming needs the parsed document.
        let parsed: Vec<(PathBuf, Arc<ManifestFile>)> =
            futures::stream::iter(candidates.into_iter().map(|path| async move {
                let manifest = tokio::task::block_in_place(|| cache.get(&path))?;
                Ok::<_, anyhow::Error>((path, manifest))
            }))
            .buffer_unordered(STACK_DISCOVERY_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;

        let mut index = Self::default();
        // Deterministic insertion independent of parse completion order.
        let mut sorted = parsed;
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, manifest) in sorted {
            let relative = relative_name(&stacks_dir, &path);
            let Some(name) = derive_name(config, engine, &manifest, &relative)? else {
                trace!(path = %path.display(), "manifest derives no stack name; treated as catalog");
                continue;
            };
            if let Some(existing) = index.entries.get(&name) {
                return Err(AtmosError::DuplicateStackName {
                    name,
                    first: existing.manifest_path.clone(),
                    second: path,
                }
                .into());
            }
            index.by_relative.insert(relative.clone(), name.clone());
            index.entries.insert(name.clone(), StackEntry {
                name,
                manifest_path: path,
                relative,
            });
        }
        Ok(index)
    }

    /// Look up a stack by logical name or by manifest-relative path.
    pub fn get(&self, name_or_path: &str) -> Option<&StackEntry> {
        if let Some(entry) = self.entries.get(name_or_path) {
            return Some(entry);
        }
        let trimmed = name_or_path
            .trim_end_matches(".yaml")
            .trim_end_matches(".yml");
        self.by_relative.get(trimmed).and_then(|name| self.entries.get(name))
    }

    /// Look up or fail with the known-stacks list.
    pub fn require(&self, name_or_path: &str) -> Result<&StackEntry, AtmosError> {
        self.get(name_or_path).ok_or_else(|| AtmosError::StackNotFound {
            stack: name_or_path.to_string(),
            available: self.names().into_iter().map(ToString::to_string).collect(),
        })
    }

    /// All logical names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// All entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &StackEntry> {
        self.entries.values()
    }

    /// Number of indexed stacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether discovery found nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Files under `root` matching the include globs and no exclude glob.
fn discover_files(root: &Path, included: &[String], excluded: &[String]) -> Vec<PathBuf> {
    let include: Vec<Pattern> =
        included.iter().filter_map(|g| Pattern::new(g).ok()).collect();
    let exclude: Vec<Pattern> =
        excluded.iter().filter_map(|g| Pattern::new(g).ok()).collect();

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            let Ok(rel) = path.strip_prefix(root) else { return false };
            let rel = rel.to_string_lossy();
            include.iter().any(|p| p.matches(&rel)) && !exclude.iter().any(|p| p.matches(&rel))
        })
        .collect();
    files.sort();
    files
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.with_extension("").to_string_lossy().replace('\\', "/")
}

/// Derive the logical name for one manifest, or `None` for catalog files
/// that lack the naming inputs.
fn derive_name(
    config: &AtmosConfig,
    engine: &TemplateEngine,
    manifest: &ManifestFile,
    relative: &str,
) -> Result<Option<String>, AtmosError> {
    if let Some(template) = &config.stacks.name_template {
        let mut ctx = TemplateContext::new();
        ctx.insert("vars", &vars_of(&manifest.document));
        ctx.insert("settings", &section_json(&manifest.document, "settings"));
        let name = engine.render("stacks.name_template", template, &ctx)?;
        let name = name.trim();
        return Ok((!name.is_empty()).then(|| name.to_string()));
    }

    if let Some(pattern) = &config.stacks.name_pattern {
        return apply_name_pattern(pattern, &manifest.document);
    }

    Ok(Some(relative.to_string()))
}

/// Substitute `{token}` placeholders from the manifest's `vars`.
fn apply_name_pattern(pattern: &str, doc: &Yaml) -> Result<Option<String>, AtmosError> {
    let vars = doc.get("vars");
    let mut out = String::new();
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            return Err(AtmosError::InvalidConfiguration {
                message: format!("unterminated token in stacks.name_pattern '{pattern}'"),
            });
        };
        let token = &rest[start + 1..start + end];
        let value = vars
            .and_then(|v| v.get(token))
            .map(yaml_key_to_string)
            .filter(|v| !v.is_empty());
        match value {
            Some(value) => out.push_str(&value),
            // A manifest without the token is a catalog file, not a stack.
            None => return Ok(None),
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(Some(out))
}

fn vars_of(doc: &Yaml) -> serde_json::Value {
    section_json(doc, "vars")
}

fn section_json(doc: &Yaml, key: &str) -> serde_json::Value {
    doc.get(key)
        .map(crate::merge::value::yaml_to_json)
        .unwrap_or_else(|| serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(dir: &Path, pattern: Option<&str>, template: Option<&str>) -> AtmosConfig {
        let mut config = AtmosConfig::default();
        config.base_path = dir.to_path_buf();
        config.stacks.name_pattern = pattern.map(ToString::to_string);
        config.stacks.name_template = template.map(ToString::to_string);
        config
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join("stacks").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn indexes_by_pattern_and_by_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy/dev.yaml", "vars: {tenant: acme, environment: ue1, stage: dev}\n");
        write(dir.path(), "deploy/prod.yaml", "vars: {tenant: acme, environment: ue1, stage: prod}\n");

        let config =
            config_with(dir.path(), Some("{tenant}-{environment}-{stage}"), None);
        let cache = ManifestCache::new();
        let engine = TemplateEngine::new();
        let index = StackIndex::build(&config, &cache, &engine).await.unwrap();

        assert_eq!(index.names(), ["acme-ue1-dev", "acme-ue1-prod"]);
        // Addressable by manifest path too, pointing at the same file.
        let by_path = index.get("deploy/prod").unwrap();
        let by_name = index.get("acme-ue1-prod").unwrap();
        assert_eq!(by_path.manifest_path, by_name.manifest_path);
        assert!(index.get("deploy/prod.yaml").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn catalog_files_without_tokens_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dev.yaml", "vars: {tenant: acme, environment: ue1, stage: dev}\n");
        write(dir.path(), "catalog/vpc.yaml", "components: {terraform: {vpc: {vars: {}}}}\n");

        let config =
            config_with(dir.path(), Some("{tenant}-{environment}-{stage}"), None);
        let index = StackIndex::build(&config, &ManifestCache::new(), &TemplateEngine::new())
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_logical_names_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "vars: {stage: dev}\n");
        write(dir.path(), "b.yaml", "vars: {stage: dev}\n");

        let config = config_with(dir.path(), Some("{stage}"), None);
        let err = StackIndex::build(&config, &ManifestCache::new(), &TemplateEngine::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast::<AtmosError>().unwrap(),
            AtmosError::DuplicateStackName { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_template_wins_over_pattern() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dev.yaml", "vars: {stage: dev, region: ue1}\n");

        let config = config_with(
            dir.path(),
            Some("{stage}"),
            Some("{{ vars.region }}-{{ vars.stage }}"),
        );
        let index = StackIndex::build(&config, &ManifestCache::new(), &TemplateEngine::new())
            .await
            .unwrap();
        assert_eq!(index.names(), ["ue1-dev"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relative_path_naming_is_the_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "deploy/us/dev.yaml", "vars: {}\n");
        let config = config_with(dir.path(), None, None);
        let index = StackIndex::build(&config, &ManifestCache::new(), &TemplateEngine::new())
            .await
            .unwrap();
        assert_eq!(index.names(), ["deploy/us/dev"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn excluded_paths_filter_discovery() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dev.yaml", "vars: {}\n");
        write(dir.path(), "_defaults.yaml", "vars: {}\n");
        let config = config_with(dir.path(), None, None);
        let index = StackIndex::build(&config, &ManifestCache::new(), &TemplateEngine::new())
            .await
            .unwrap();
        assert_eq!(index.names(), ["dev"]);
    }
}
