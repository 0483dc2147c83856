//! Describe and list projections.
//!
//! Pure transformations over the stack index and merged views: no
//! side effects beyond the resolution they request, and tagged functions
//! can be skipped for projections that must not actuate anything. Row
//! construction lives here; filtering, column extraction, sorting, and
//! rendering are composed by the CLI layer from the sibling modules.

pub mod columns;
pub mod filters;
pub mod format;

pub use columns::{ColumnSpec, SortSpec};
pub use filters::Filter;
pub use format::{OutputFormat, RowSet, RowStyle};

use anyhow::Result;
use serde_json::Value as Json;

use crate::core::ComponentType;
use crate::merge::value::yaml_to_json;
use crate::stack::component::component_names;
use crate::stack::resolver::StackResolver;
use crate::template::ResolutionContext;

/// Fully-resolved view of one component, with optional provenance chains.
pub async fn describe_component(
    resolver: &StackResolver,
    ty: ComponentType,
    component: &str,
    stack: &str,
    include_provenance: bool,
) -> Result<Json> {
    let mut rctx = ResolutionContext::new();
    let resolved = resolver.resolve_component(ty, component, stack, &mut rctx).await?;

    let mut out = resolved.view.clone();
    if let Some(map) = out.as_object_mut() {
        map.insert("atmos_component".to_string(), Json::String(resolved.component.clone()));
        map.insert("atmos_stack".to_string(), Json::String(resolved.stack.clone()));
        map.insert(
            "inherits".to_string(),
            Json::Array(resolved.raw.inherits.iter().cloned().map(Json::String).collect()),
        );
        if include_provenance {
            let mut chains = serde_json::Map::new();
            for path in resolved.raw.provenance.paths() {
                let chain = resolved.raw.provenance.chain(path);
                chains.insert(path.to_string(), serde_json::to_value(chain)?);
            }
            map.insert("atmos_provenance".to_string(), Json::Object(chains));
        }
    }
    Ok(out)
}

/// Stack documents, keyed by logical name.
///
/// With a `--stack` filter the projection is file-scoped: only values
/// defined in that stack's own manifest, not its transitive imports.
pub async fn describe_stacks(resolver: &StackResolver, stack: Option<&str>) -> Result<Json> {
    let mut out = serde_json::Map::new();
    match stack {
        Some(name) => {
            let entry = resolver.index().require(name)?;
            let manifest = resolver.manifest_cache.get(&entry.manifest_path)?;
            out.insert(entry.name.clone(), yaml_to_json(&manifest.document));
        }
        None => {
            let names: Vec<String> =
                resolver.index().entries().map(|e| e.name.clone()).collect();
            for name in names {
                let merged = resolver.merged_stack(&name).await?;
                out.insert(name, yaml_to_json(&merged.document));
            }
        }
    }
    Ok(Json::Object(out))
}

/// Resolved locals per contributing file of one stack.
pub async fn describe_locals(resolver: &StackResolver, stack: &str) -> Result<Json> {
    let merged = resolver.merged_stack(stack).await?;
    let mut out = serde_json::Map::new();
    let mut files: Vec<_> = merged.locals_by_file.iter().collect();
    files.sort_by_key(|(path, _)| path.display().to_string());
    for (path, locals) in files {
        let mut scopes = serde_json::Map::new();
        if !locals.global.is_empty() {
            scopes.insert("globals".to_string(), map_to_json(&locals.global));
        }
        for (ty, section) in &locals.sections {
            scopes.insert(ty.section().to_string(), map_to_json(section));
        }
        for ((ty, component), comp_locals) in &locals.components {
            scopes.insert(
                format!("components.{}.{component}", ty.section()),
                map_to_json(comp_locals),
            );
        }
        if !scopes.is_empty() {
            out.insert(path.display().to_string(), Json::Object(scopes));
        }
    }
    Ok(Json::Object(out))
}

/// Row contexts for `list stacks`.
pub async fn list_stacks(resolver: &StackResolver) -> Result<Vec<Json>> {
    let mut rows = Vec::new();
    let entries: Vec<_> = resolver
        .index()
        .entries()
        .map(|e| (e.name.clone(), e.manifest_path.clone(), e.relative.clone()))
        .collect();
    for (name, manifest_path, relative) in entries {
        let merged = resolver.merged_stack(&name).await?;
        let components: usize = ComponentType::ALL
            .iter()
            .map(|ty| component_names(&merged.document, *ty).len())
            .sum();
        rows.push(serde_json::json!({
            "name": name,
            "file": relative,
            "path": manifest_path.display().to_string(),
            "imports": merged.files.len().saturating_sub(1),
            "components": components,
        }));
    }
    Ok(rows)
}

/// Row contexts for `list components`, optionally scoped to one stack.
pub async fn list_components(
    resolver: &StackResolver,
    stack: Option<&str>,
) -> Result<Vec<Json>> {
    let names: Vec<String> = match stack {
        Some(name) => vec![resolver.index().require(name)?.name.clone()],
        None => resolver.index().entries().map(|e| e.name.clone()).collect(),
    };

    let mut rows = Vec::new();
    for stack_name in names {
        let merged = resolver.merged_stack(&stack_name).await?;
        for ty in ComponentType::ALL {
            for component in component_names(&merged.document, ty) {
                let body = merged
                    .document
                    .get("components")
                    .and_then(|c| c.get(ty.section()))
                    .and_then(|c| c.get(&component));
                let is_abstract = body
                    .and_then(|b| b.get("metadata"))
                    .and_then(|m| m.get("type"))
                    .and_then(serde_yaml::Value::as_str)
                    .is_some_and(|t| t == "abstract");
                let enabled = body
                    .and_then(|b| b.get("settings"))
                    .and_then(|s| s.get("enabled"))
                    .and_then(serde_yaml::Value::as_bool)
                    .unwrap_or(true);
                rows.push(serde_json::json!({
                    "name": component,
                    "type": ty.section(),
                    "stack": stack_name,
                    "abstract": is_abstract,
                    "enabled": enabled,
                    "vars": body.and_then(|b| b.get("vars")).map(yaml_to_json),
                    "settings": body.and_then(|b| b.get("settings")).map(yaml_to_json),
                    "metadata": body.and_then(|b| b.get("metadata")).map(yaml_to_json),
                }));
            }
        }
    }
    Ok(rows)
}

/// Row contexts for `list values`: one row per leaf of a section across
/// the selected component in every stack that declares it.
pub async fn list_values(
    resolver: &StackResolver,
    component: &str,
    section: &str,
) -> Result<Vec<Json>> {
    let names: Vec<String> = resolver.index().entries().map(|e| e.name.clone()).collect();
    let mut rows = Vec::new();
    for stack_name in names {
        let merged = resolver.merged_stack(&stack_name).await?;
        for ty in ComponentType::ALL {
            if !component_names(&merged.document, ty).iter().any(|n| n == component) {
                continue;
            }
            let (_, raw) = resolver.raw_component(ty, component, &stack_name).await?;
            let Some(values) = raw.view.get(section) else { continue };
            let json = yaml_to_json(values);
            collect_leaves(&json, String::new(), &mut |path, value| {
                rows.push(serde_json::json!({
                    "name": component,
                    "stack": stack_name,
                    "key": path,
                    "value": value,
                }));
            });
        }
    }
    Ok(rows)
}

/// Row contexts for `list workflows`.
pub fn list_workflows(manifest: &crate::workflow::WorkflowManifest) -> Vec<Json> {
    manifest
        .workflows
        .iter()
        .map(|(name, wf)| {
            serde_json::json!({
                "name": name,
                "description": wf.description,
                "steps": wf.steps.len(),
            })
        })
        .collect()
}

fn map_to_json(map: &crate::locals::LocalsMap) -> Json {
    Json::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn collect_leaves(value: &Json, path: String, visit: &mut impl FnMut(String, &Json)) {
    match value {
        Json::Object(map) => {
            for (k, v) in map {
                let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                collect_leaves(v, child, visit);
            }
        }
        other => visit(path, other),
    }
}
