//! File-scoped locals resolution.
//!
//! Locals are declared at three scopes of a manifest: top-level `locals:`,
//! section-level (`terraform.locals`, `helmfile.locals`, `packer.locals`),
//! and component-level (`components.<type>.<name>.locals`). Each scope is
//! resolved in dependency order within its own file; inner scopes see outer
//! scopes as parent context. Locals never cross file boundaries, even
//! through `import`; that isolation is what makes a file's expressions
//! reviewable in place.
//!
//! Resolution builds a directed graph per scope from `locals.<name>`
//! references, topologically sorts it, and evaluates in order. A cycle is
//! reported as `CircularLocal` with the minimal cycle path recovered by
//! DFS; a reference to a name missing from the scope chain is
//! `UndefinedLocal` with a did-you-mean suggestion.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::Value as Json;
use serde_yaml::Value as Yaml;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

use crate::core::{AtmosError, ComponentType, did_you_mean};
use crate::manifest::{LOCALS_KEY, ManifestFile};
use crate::merge::value::{yaml_key_to_string, yaml_to_json};
use crate::template::engine::{TemplateContext, TemplateEngine};
use crate::template::refs::{extract_refs, has_template};

/// A resolved locals map: name → value, in name order.
pub type LocalsMap = BTreeMap<String, Json>;

/// All resolved locals of one manifest file.
#[derive(Debug, Clone, Default)]
pub struct FileLocals {
    /// Top-level `locals:`.
    pub global: LocalsMap,
    /// Per-section `locals:`.
    pub sections: BTreeMap<ComponentType, LocalsMap>,
    /// Per-component `locals:`, keyed by `(type, component name)`.
    pub components: BTreeMap<(ComponentType, String), LocalsMap>,
}

impl FileLocals {
    /// The merged scope chain visible to a component's expressions:
    /// global, overlaid by section, overlaid by component locals.
    pub fn scope_for(&self, ty: ComponentType, component: &str) -> LocalsMap {
        let mut merged = self.global.clone();
        if let Some(section) = self.sections.get(&ty) {
            merged.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(comp) = self.components.get(&(ty, component.to_string())) {
            merged.extend(comp.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// The scope chain visible to section-level expressions.
    pub fn section_scope(&self, ty: ComponentType) -> LocalsMap {
        let mut merged = self.global.clone();
        if let Some(section) = self.sections.get(&ty) {
            merged.extend(section.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

/// Resolve every locals scope of `manifest`.
///
/// Scope order is fixed: global first, then each section, then each
/// component (eagerly, before any other expression in the file is
/// evaluated).
pub fn resolve_file_locals(
    manifest: &ManifestFile,
    engine: &TemplateEngine,
) -> Result<FileLocals, AtmosError> {
    let mut locals = FileLocals::default();

    if let Some(raw) = raw_locals(&manifest.document) {
        locals.global = resolve_scope(manifest, engine, &raw, &LocalsMap::new())?;
    }

    for ty in ComponentType::ALL {
        let Some(section) = manifest.document.get(ty.section()) else { continue };

        if let Some(raw) = raw_locals(section) {
            let resolved = resolve_scope(manifest, engine, &raw, &locals.global)?;
            locals.sections.insert(ty, resolved);
        }

        let parent = locals.section_scope(ty);
        let Some(components) =
            manifest.document.get("components").and_then(|c| c.get(ty.section()))
        else {
            continue;
        };
        let Some(components) = components.as_mapping() else { continue };
        for (name, body) in components {
            let Some(raw) = raw_locals(body) else { continue };
            let resolved = resolve_scope(manifest, engine, &raw, &parent)?;
            locals.components.insert((ty, yaml_key_to_string(name)), resolved);
        }
    }

    trace!(file = %manifest.path.display(), globals = locals.global.len(), "locals resolved");
    Ok(locals)
}

/// Extract a node's raw `locals:` mapping, if declared.
fn raw_locals(node: &Yaml) -> Option<BTreeMap<String, Yaml>> {
    let map = node.get(LOCALS_KEY)?.as_mapping()?;
    Some(map.iter().map(|(k, v)| (yaml_key_to_string(k), v.clone())).collect())
}

/// Resolve one scope in dependency order.
fn resolve_scope(
    manifest: &ManifestFile,
    engine: &TemplateEngine,
    raw: &BTreeMap<String, Yaml>,
    parent: &LocalsMap,
) -> Result<LocalsMap, AtmosError> {
    let order = dependency_order(manifest, raw, parent)?;

    let mut resolved = LocalsMap::new();
    for name in order {
        let value = &raw[&name];
        let mut scope = parent.clone();
        scope.extend(resolved.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut ctx = TemplateContext::new();
        ctx.insert("locals", &scope);
        let origin = format!("{}#locals.{}", manifest.path.display(), name);

        let rendered = render_value(engine, &origin, value, &ctx)?;
        resolved.insert(name, rendered);
    }
    Ok(resolved)
}

/// Topological evaluation order for one scope.
///
/// Keys are added in sorted order so the result is independent of the
/// textual declaration order (`a, b, c` with `c → b → a` resolves the same
/// written in any order).
fn dependency_order(
    manifest: &ManifestFile,
    raw: &BTreeMap<String, Yaml>,
    parent: &LocalsMap,
) -> Result<Vec<String>, AtmosError> {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    for name in raw.keys() {
        nodes.insert(name.clone(), graph.add_node(name.clone()));
    }

    for (name, value) in raw {
        for referenced in collect_string_refs(value) {
            if let Some(&dep) = nodes.get(&referenced) {
                // Self-loops are cycles of length one.
                graph.update_edge(dep, nodes[name], ());
            } else if !parent.contains_key(&referenced) {
                let mut available: Vec<String> = raw.keys().cloned().collect();
                available.extend(parent.keys().cloned());
                available.sort();
                available.dedup();
                let suggestion =
                    did_you_mean(&referenced, available.iter().map(String::as_str));
                return Err(AtmosError::UndefinedLocal {
                    name: referenced,
                    file: manifest.path.clone(),
                    available,
                    did_you_mean: suggestion,
                });
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|idx| graph[idx].clone()).collect()),
        Err(_) => {
            let chain = recover_cycle(&graph);
            Err(AtmosError::CircularLocal { file: manifest.path.clone(), chain })
        }
    }
}

/// All `locals.X` references inside a value's string leaves.
fn collect_string_refs(value: &Yaml) -> Vec<String> {
    let mut refs = Vec::new();
    walk_strings(value, &mut |s| refs.extend(extract_refs(s, "locals")));
    refs
}

fn walk_strings(value: &Yaml, visit: &mut impl FnMut(&str)) {
    match value {
        Yaml::String(s) => visit(s),
        Yaml::Sequence(seq) => seq.iter().for_each(|v| walk_strings(v, visit)),
        Yaml::Mapping(map) => map.iter().for_each(|(_, v)| walk_strings(v, visit)),
        Yaml::Tagged(tagged) => walk_strings(&tagged.value, visit),
        _ => {}
    }
}

/// Render every template string inside a local's value.
fn render_value(
    engine: &TemplateEngine,
    origin: &str,
    value: &Yaml,
    ctx: &TemplateContext,
) -> Result<Json, AtmosError> {
    Ok(match value {
        Yaml::String(s) if has_template(s) => Json::String(engine.render(origin, s, ctx)?),
        Yaml::Sequence(seq) => Json::Array(
            seq.iter()
                .map(|v| render_value(engine, origin, v, ctx))
                .collect::<Result<_, _>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(yaml_key_to_string(k), render_value(engine, origin, v, ctx)?);
            }
            Json::Object(out)
        }
        other => yaml_to_json(other),
    })
}

/// DFS with white/gray/black coloring to recover a minimal cycle path.
fn recover_cycle(graph: &DiGraph<String, ()>) -> Vec<String> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn visit(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);
        for next in graph.neighbors(node) {
            match colors.get(&next).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let start = path.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = visit(graph, next, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    let mut colors = HashMap::new();
    let mut path = Vec::new();
    for node in graph.node_indices() {
        if colors.get(&node).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = visit(graph, node, &mut colors, &mut path) {
                return cycle.into_iter().map(|idx| graph[idx].clone()).collect();
            }
        }
    }
    Vec::new()
}
