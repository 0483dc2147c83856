//! Deep-merge engine with provenance tracking.
//!
//! Folds an ordered list of manifests (imports first, importing file last)
//! into a single document. Mappings merge recursively; lists follow the
//! [`strategy::ListMergePolicy`] for their path; every leaf write appends a
//! [`provenance::ProvenanceEntry`] to the chain for its JSONPath. The
//! result is deterministic: map key ordering never affects it, and list
//! order is preserved under `append` and `replace`.

pub mod context;
pub mod provenance;
pub mod strategy;
pub mod value;

pub use context::MergeContext;
pub use provenance::{ProvenanceEntry, ProvenanceKind, ProvenanceStore, hash_value};
pub use strategy::{ListMergePolicy, ListStrategy};

use serde_yaml::Value as Yaml;
use tracing::trace;

use crate::manifest::LOCALS_KEY;
use crate::merge::value::yaml_key_to_string;

/// Merge engine bound to a list policy.
#[derive(Debug, Default)]
pub struct Merger {
    policy: ListMergePolicy,
}

impl Merger {
    /// Engine with the given list policy.
    pub fn new(policy: ListMergePolicy) -> Self {
        Self { policy }
    }

    /// Fold an ordered set of files into one document.
    ///
    /// `ordered` is lowest precedence first (the import resolver's output
    /// order). Top-level `locals` are excluded: they are file-scoped and
    /// must not leak across the merge.
    pub fn merge_files(&self, ordered: &[MergeContext]) -> (Yaml, ProvenanceStore) {
        let mut target = Yaml::Mapping(serde_yaml::Mapping::new());
        let mut store = ProvenanceStore::new();

        for ctx in ordered {
            trace!(file = %ctx.file.path.display(), depth = ctx.depth(), "merging manifest");
            self.merge_document(&mut target, &ctx.file.document, ctx, &mut store);
        }
        (target, store)
    }

    /// Merge one document into the accumulating target.
    pub fn merge_document(
        &self,
        target: &mut Yaml,
        source: &Yaml,
        ctx: &MergeContext,
        store: &mut ProvenanceStore,
    ) {
        if !source.is_mapping() {
            return;
        }
        for (key, val) in non_local_entries(source) {
            let key_str = yaml_key_to_string(&key);
            self.merge_node(target, &key, &val, &key_str, ctx, store);
        }
    }

    fn merge_node(
        &self,
        parent: &mut Yaml,
        key: &Yaml,
        source: &Yaml,
        path: &str,
        ctx: &MergeContext,
        store: &mut ProvenanceStore,
    ) {
        if !parent.is_mapping() {
            *parent = Yaml::Mapping(serde_yaml::Mapping::new());
        }
        let map = parent.as_mapping_mut().expect("parent coerced to mapping");

        if !map.contains_key(key) {
            if source.is_mapping() {
                let mut fresh = Yaml::Mapping(serde_yaml::Mapping::new());
                for (nested_key, nested_val) in non_local_entries(source) {
                    let nested_path = format!("{path}.{}", yaml_key_to_string(&nested_key));
                    self.merge_node(&mut fresh, &nested_key, &nested_val, &nested_path, ctx, store);
                }
                map.insert(key.clone(), fresh);
            } else {
                map.insert(key.clone(), source.clone());
                self.record_leaf(path, source, ctx, store, false, false);
            }
            return;
        }

        let existing = map.get_mut(key).expect("key checked above");
        if existing.is_mapping() && source.is_mapping() {
            for (nested_key, nested_val) in non_local_entries(source) {
                let nested_path = format!("{path}.{}", yaml_key_to_string(&nested_key));
                self.merge_node(existing, &nested_key, &nested_val, &nested_path, ctx, store);
            }
        } else if existing.is_sequence() && source.is_sequence() {
            let items = source.as_sequence().expect("checked sequence");
            let merged = match self.policy.for_path(path) {
                ListStrategy::Replace => Yaml::Sequence(items.clone()),
                ListStrategy::Append => {
                    let mut combined = existing.as_sequence().expect("checked sequence").clone();
                    combined.extend(items.iter().cloned());
                    Yaml::Sequence(combined)
                }
                ListStrategy::Merge => {
                    merge_elementwise(existing.as_sequence().expect("checked sequence"), items)
                }
            };
            let changed = *existing != merged;
            *existing = merged;
            let snapshot = existing.clone();
            self.record_leaf(path, &snapshot, ctx, store, true, changed);
        } else {
            let changed = existing != source;
            *existing = source.clone();
            self.record_leaf(path, source, ctx, store, true, changed);
            if source.is_mapping() {
                self.record_subtree(path, source, ctx, store);
            }
        }
    }

    fn record_leaf(
        &self,
        path: &str,
        value: &Yaml,
        ctx: &MergeContext,
        store: &mut ProvenanceStore,
        existed: bool,
        changed: bool,
    ) {
        let kind = if existed && changed {
            ProvenanceKind::Override
        } else if ctx.is_import() {
            ProvenanceKind::Import
        } else {
            ProvenanceKind::Inline
        };
        let position = ctx.file.position(path);
        store.record(
            path,
            ProvenanceEntry {
                file: ctx.file.path.clone(),
                line: position.map_or(0, |p| p.line),
                column: position.map_or(0, |p| p.column),
                kind,
                depth: ctx.depth(),
                value_hash: hash_value(value),
            },
        );
    }

    /// When a scalar is replaced by a mapping, its new leaves need chains.
    fn record_subtree(
        &self,
        path: &str,
        source: &Yaml,
        ctx: &MergeContext,
        store: &mut ProvenanceStore,
    ) {
        if let Some(map) = source.as_mapping() {
            for (k, v) in map {
                let nested = format!("{path}.{}", yaml_key_to_string(k));
                if v.is_mapping() {
                    self.record_subtree(&nested, v, ctx, store);
                } else {
                    self.record_leaf(&nested, v, ctx, store, false, false);
                }
            }
        }
    }
}

/// Provenance-free deep merge used when assembling component views from
/// sections of an already-merged (and already-tracked) stack document.
pub fn deep_merge_values(target: &mut Yaml, source: &Yaml, policy: &ListMergePolicy, path: &str) {
    // A null node (`vpc:` with no body) asserts presence, not content.
    if source.is_null() {
        return;
    }
    if !source.is_mapping() || !target.is_mapping() {
        if target.is_sequence() && source.is_sequence() {
            let existing = target.as_sequence().expect("checked sequence").clone();
            let items = source.as_sequence().expect("checked sequence");
            *target = match policy.for_path(path) {
                ListStrategy::Replace => source.clone(),
                ListStrategy::Append => {
                    let mut combined = existing;
                    combined.extend(items.iter().cloned());
                    Yaml::Sequence(combined)
                }
                ListStrategy::Merge => merge_elementwise(&existing, items),
            };
        } else {
            *target = source.clone();
        }
        return;
    }

    for (key, val) in non_local_entries(source) {
        let key_str = yaml_key_to_string(&key);
        let child_path = if path.is_empty() { key_str } else { format!("{path}.{}", key_str) };
        let map = target.as_mapping_mut().expect("checked mapping");
        if !map.contains_key(&key) {
            map.insert(key.clone(), Yaml::Mapping(serde_yaml::Mapping::new()));
        }
        let slot = map.get_mut(&key).expect("inserted above");
        if slot.is_mapping() && val.is_mapping() {
            deep_merge_values(slot, &val, policy, &child_path);
        } else if slot.is_sequence() && val.is_sequence() {
            deep_merge_values(slot, &val, policy, &child_path);
        } else if val.is_mapping() {
            *slot = Yaml::Mapping(serde_yaml::Mapping::new());
            deep_merge_values(slot, &val, policy, &child_path);
        } else {
            *slot = val.clone();
        }
    }
}

/// A mapping's entries with file-scoped `locals` filtered out.
fn non_local_entries(source: &Yaml) -> Vec<(Yaml, Yaml)> {
    source
        .as_mapping()
        .map(|m| {
            m.iter()
                .filter(|(k, _)| yaml_key_to_string(k) != LOCALS_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Element-wise list merge: mappings at the same index deep-merge.
fn merge_elementwise(existing: &[Yaml], incoming: &[Yaml]) -> Yaml {
    let mut out = Vec::with_capacity(existing.len().max(incoming.len()));
    for i in 0..existing.len().max(incoming.len()) {
        match (existing.get(i), incoming.get(i)) {
            (Some(old @ Yaml::Mapping(_)), Some(new @ Yaml::Mapping(_))) => {
                out.push(merge_elementwise_mapping(old, new));
            }
            (_, Some(new)) => out.push(new.clone()),
            (Some(old), None) => out.push(old.clone()),
            (None, None) => unreachable!(),
        }
    }
    Yaml::Sequence(out)
}

fn merge_elementwise_mapping(old: &Yaml, new: &Yaml) -> Yaml {
    let (Some(old_map), Some(new_map)) = (old.as_mapping(), new.as_mapping()) else {
        return new.clone();
    };
    let mut merged = old_map.clone();
    for (k, v) in new_map {
        match merged.get_mut(k) {
            Some(slot) if slot.is_mapping() && v.is_mapping() => {
                *slot = merge_elementwise_mapping(slot, v);
            }
            Some(slot) => *slot = v.clone(),
            None => {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    Yaml::Mapping(merged)
}
