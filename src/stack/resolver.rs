//! The invocation-scoped resolution pipeline.
//!
//! [`StackResolver`] owns every per-invocation cache (manifest files,
//! merged stacks, resolved values, backend clients) and drives the full
//! data flow for a `(component, stack)` request: import-resolve →
//! per-file locals → merge → view assembly → expression evaluation. It
//! also implements [`ComponentLookup`], so `atmos.Component` and the
//! terraform functions recurse through the same pipeline under one
//! resolution context.

use anyhow::Result;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value as Json;
use serde_yaml::Value as Yaml;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::AuthContext;
use crate::backend::StateReader;
use crate::config::AtmosConfig;
use crate::core::{AtmosError, ComponentType, did_you_mean};
use crate::import::{AdapterRegistry, Fetcher, ImportResolver, ResolvedPath};
use crate::locals::{FileLocals, LocalsMap, resolve_file_locals};
use crate::manifest::ManifestCache;
use crate::merge::{ListMergePolicy, MergeContext, Merger, ProvenanceStore};
use crate::stack::component::{RawComponentView, build_component_view, component_names};
use crate::stack::StackIndex;
use crate::store::StoreRegistry;
use crate::template::{
    ComponentLookup, EvalOptions, EvalScope, Evaluator, Frame, LocalsProvider,
    ResolutionContext, TemplateEngine, ValueCache,
};

/// A merged stack: document, provenance, and per-file locals.
#[derive(Debug)]
pub struct MergedStack {
    /// The fully merged stack document (tags preserved).
    pub document: Yaml,
    /// Provenance for every leaf of the document.
    pub provenance: ProvenanceStore,
    /// Resolved locals per contributing file.
    pub locals_by_file: HashMap<PathBuf, FileLocals>,
    /// The files that merged, in precedence order.
    pub files: Vec<ResolvedPath>,
}

/// A fully resolved `(component, stack)` view.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    /// Component name.
    pub component: String,
    /// Logical stack name.
    pub stack: String,
    /// Tool family.
    pub component_type: ComponentType,
    /// Evaluated view consumed by dispatch and projections.
    pub view: Json,
    /// Raw view and provenance, for describe output.
    pub raw: Arc<RawComponentView>,
}

/// Per-invocation resolver. See the module docs for the pipeline.
pub struct StackResolver {
    /// Root configuration.
    pub config: AtmosConfig,
    /// Parsed-manifest cache.
    pub manifest_cache: ManifestCache,
    /// Template engine (parse cache inside).
    pub engine: TemplateEngine,
    /// Transformation adapter registry.
    pub adapters: AdapterRegistry,
    /// Terraform state reader.
    pub state_reader: StateReader,
    /// `!store` registry.
    pub stores: StoreRegistry,
    /// Resolved-value cache.
    pub value_cache: ValueCache,
    /// Evaluation options for this invocation.
    pub options: EvalOptions,

    index: StackIndex,
    policy: ListMergePolicy,
    temp_dir: tempfile::TempDir,
    cancel: CancellationToken,
    auth: RwLock<Option<Arc<AuthContext>>>,
    merged: DashMap<String, Arc<MergedStack>>,
}

impl StackResolver {
    /// Build the resolver: load stores, index stacks, prepare caches.
    pub async fn build(
        config: AtmosConfig,
        options: EvalOptions,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let engine = TemplateEngine::new();
        let manifest_cache = ManifestCache::new();
        let index = StackIndex::build(&config, &manifest_cache, &engine).await?;
        let stores = StoreRegistry::from_config(&config.stores, &config.base_path);
        let policy = config.list_merge_policy()?;
        let temp_dir = tempfile::Builder::new().prefix("atmos-imports-").tempdir()?;

        Ok(Self {
            config,
            manifest_cache,
            engine,
            adapters: AdapterRegistry::new(),
            state_reader: StateReader::new(),
            stores,
            value_cache: ValueCache::new(),
            options,
            index,
            policy,
            temp_dir,
            cancel,
            auth: RwLock::new(None),
            merged: DashMap::new(),
        })
    }

    /// The stack index.
    pub fn index(&self) -> &StackIndex {
        &self.index
    }

    /// The invocation's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install the materialized auth context (from the lazy handle).
    pub fn set_auth(&self, auth: Option<Arc<AuthContext>>) {
        *self.auth.write().expect("auth lock") = auth;
    }

    fn current_auth(&self) -> Option<Arc<AuthContext>> {
        self.auth.read().expect("auth lock").clone()
    }

    /// Import-resolve, locals-resolve, and merge one stack.
    ///
    /// Results are cached per logical stack name for the invocation.
    pub async fn merged_stack(&self, stack: &str) -> Result<Arc<MergedStack>> {
        let entry = self.index.require(stack)?;
        if let Some(found) = self.merged.get(&entry.name) {
            return Ok(Arc::clone(&found));
        }

        let fetcher = Fetcher::new(self.cancel.clone())?;
        let resolver = ImportResolver::new(
            self.config.stacks_dir(),
            self.temp_dir.path(),
            &self.adapters,
            fetcher,
            &self.manifest_cache,
        );
        let files = resolver.resolve(&entry.manifest_path).await?;

        let mut locals_by_file = HashMap::new();
        let mut contexts = Vec::with_capacity(files.len());
        for resolved in &files {
            let manifest = self.manifest_cache.get(&resolved.file_path)?;
            let locals = resolve_file_locals(&manifest, &self.engine)?;
            locals_by_file.insert(manifest.path.clone(), locals);
            contexts.push(MergeContext::imported(
                Arc::clone(&manifest),
                resolved.import_chain.clone(),
            ));
        }

        let (document, provenance) = Merger::new(self.policy.clone()).merge_files(&contexts);
        debug!(stack = entry.name, files = files.len(), "merged stack");

        let merged = Arc::new(MergedStack { document, provenance, locals_by_file, files });
        self.merged.insert(entry.name.clone(), Arc::clone(&merged));
        Ok(merged)
    }

    /// The raw (unevaluated) view of one component.
    pub async fn raw_component(
        &self,
        ty: ComponentType,
        component: &str,
        stack: &str,
    ) -> Result<(Arc<MergedStack>, RawComponentView)> {
        let merged = self.merged_stack(stack).await?;
        let raw = build_component_view(
            &merged.document,
            &merged.provenance,
            ty,
            component,
            &self.policy,
        )
        .map_err(|e| match e {
            AtmosError::ComponentNotFound { component, available, .. } => {
                AtmosError::ComponentNotFound {
                    component,
                    stack: stack.to_string(),
                    available,
                }
            }
            other => other,
        })?;
        Ok((merged, raw))
    }

    /// Fully resolve one `(component, stack)`.
    pub async fn resolve_component(
        &self,
        ty: ComponentType,
        component: &str,
        stack: &str,
        rctx: &mut ResolutionContext,
    ) -> Result<ResolvedComponent> {
        let entry_name = self.index.require(stack)?.name.clone();
        let (merged, raw) = self.raw_component(ty, component, &entry_name).await?;

        let is_root = rctx.depth() == 0;
        if is_root {
            rctx.push(Frame::root(component, entry_name.clone()))?;
        }

        let raw = Arc::new(raw);
        let locals = ProvenanceLocals {
            raw: Arc::clone(&raw),
            merged: Arc::clone(&merged),
            root_file: self.index.require(&entry_name)?.manifest_path.clone(),
            ty,
            component: component.to_string(),
        };

        let evaluator = Evaluator {
            engine: &self.engine,
            state_reader: &self.state_reader,
            stores: &self.stores,
            auth: self.current_auth(),
            cache: &self.value_cache,
            locals: &locals,
            lookup: self,
            cancel: self.cancel.clone(),
            options: self.options.clone(),
        };

        let scope = EvalScope { component: component.to_string(), stack: entry_name.clone() };
        let result = evaluator.evaluate_view(&raw.view, &scope, rctx).await;
        if is_root {
            rctx.pop();
        }

        Ok(ResolvedComponent {
            component: component.to_string(),
            stack: entry_name,
            component_type: ty,
            view: result?,
            raw,
        })
    }

    /// Scan the raw import closure of `stacks` for auth-requiring patterns.
    ///
    /// Runs on file *text*, before any evaluation, so it is safe to call
    /// prior to credential materialization.
    pub async fn scan_auth_patterns(&self, stacks: &[String]) -> Result<bool> {
        for stack in stacks {
            let merged = self.merged_stack(stack).await?;
            for file in &merged.files {
                let text = tokio::fs::read_to_string(&file.file_path).await.unwrap_or_default();
                if crate::auth::contains_auth_patterns(&text) {
                    debug!(stack, file = %file.file_path.display(), "auth pattern found");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Find which tool family declares `component` in a merged stack.
    fn find_component_type(&self, document: &Yaml, component: &str) -> Option<ComponentType> {
        ComponentType::ALL
            .into_iter()
            .find(|ty| component_names(document, *ty).iter().any(|n| n == component))
    }
}

impl ComponentLookup for StackResolver {
    fn resolve_view<'a>(
        &'a self,
        component: &'a str,
        stack: &'a str,
        rctx: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, Result<Json>> {
        Box::pin(async move {
            let merged = self.merged_stack(stack).await?;
            let ty = self.find_component_type(&merged.document, component).ok_or_else(|| {
                AtmosError::ComponentNotFound {
                    component: component.to_string(),
                    stack: stack.to_string(),
                    available: component_names(&merged.document, ComponentType::Terraform),
                }
            })?;
            let resolved = self.resolve_component(ty, component, stack, rctx).await?;
            Ok(resolved.view)
        })
    }
}

/// Locals selection keyed by the provenance of each view path.
///
/// A value merged in from `catalog/vpc.yaml` sees that file's locals, not
/// the root manifest's. Locals never leak across files, even through
/// `import`.
struct ProvenanceLocals {
    raw: Arc<RawComponentView>,
    merged: Arc<MergedStack>,
    root_file: PathBuf,
    ty: ComponentType,
    component: String,
}

impl ProvenanceLocals {
    fn owning_file(&self, json_path: &str) -> PathBuf {
        self.raw
            .provenance
            .effective(json_path)
            .map(|e| e.file.clone())
            .unwrap_or_else(|| self.root_file.clone())
    }

    fn scope(&self, file: &PathBuf) -> LocalsMap {
        self.merged
            .locals_by_file
            .get(file)
            .map(|fl| fl.scope_for(self.ty, &self.component))
            .unwrap_or_default()
    }
}

impl LocalsProvider for ProvenanceLocals {
    fn locals_for(&self, json_path: &str) -> LocalsMap {
        self.scope(&self.owning_file(json_path))
    }

    fn undefined(&self, json_path: &str, name: &str) -> AtmosError {
        let file = self.owning_file(json_path);
        let available: Vec<String> = self.scope(&file).keys().cloned().collect();
        let suggestion = did_you_mean(name, available.iter().map(String::as_str));
        AtmosError::UndefinedLocal {
            name: name.to_string(),
            file,
            available,
            did_you_mean: suggestion,
        }
    }
}
