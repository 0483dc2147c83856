//! Component view assembly.
//!
//! From a merged stack document, builds the raw (pre-evaluation) view of
//! one `(component type, component name)`: global sections first, then the
//! tool section, then the inheritance chain lowest-to-highest, then the
//! component's own configuration. Provenance chains for the view are
//! re-rooted copies of the stack document's chains, so `describe` can show
//! the full lineage of every leaf.

use serde_yaml::Value as Yaml;

use crate::core::{AtmosError, ComponentType};
use crate::merge::value::yaml_key_to_string;
use crate::merge::{ListMergePolicy, ProvenanceStore, deep_merge_values};

/// Keys copied from the global (top) level of a stack document.
const GLOBAL_KEYS: &[&str] = &["vars", "settings", "env"];

/// Keys copied from a tool section (`terraform:`, `helmfile:`, ...).
const SECTION_KEYS: &[&str] =
    &["vars", "settings", "env", "command", "backend_type", "backend", "remote_state_backend"];

/// A component's raw merged view plus its metadata.
#[derive(Debug, Clone)]
pub struct RawComponentView {
    /// The merged view: `vars`, `settings`, `env`, `metadata`, `command`,
    /// `component`, `backend_type`, `backend`, `remote_state_backend`.
    /// Tagged values are preserved for the evaluator.
    pub view: Yaml,
    /// Provenance re-rooted to view paths (`vars.x`, not
    /// `components.terraform.vpc.vars.x`).
    pub provenance: ProvenanceStore,
    /// Inheritance chain that was applied, lowest precedence first.
    pub inherits: Vec<String>,
    /// Declared only for inheritance; never dispatched.
    pub is_abstract: bool,
}

/// Components declared in a stack document for one tool type.
pub fn component_names(stack_doc: &Yaml, ty: ComponentType) -> Vec<String> {
    stack_doc
        .get("components")
        .and_then(|c| c.get(ty.section()))
        .and_then(Yaml::as_mapping)
        .map(|m| m.keys().map(yaml_key_to_string).collect())
        .unwrap_or_default()
}

/// Build the raw view for `(ty, component)` from a merged stack document.
pub fn build_component_view(
    stack_doc: &Yaml,
    stack_store: &ProvenanceStore,
    ty: ComponentType,
    component: &str,
    policy: &ListMergePolicy,
) -> Result<RawComponentView, AtmosError> {
    let body = component_body(stack_doc, ty, component).ok_or_else(|| {
        AtmosError::ComponentNotFound {
            component: component.to_string(),
            stack: String::new(),
            available: component_names(stack_doc, ty),
        }
    })?;

    let chain = inheritance_chain(stack_doc, ty, component)?;

    let mut view = Yaml::Mapping(serde_yaml::Mapping::new());

    // 1. Global sections.
    merge_keys(&mut view, stack_doc, GLOBAL_KEYS, policy);
    // 2. Tool section.
    if let Some(section) = stack_doc.get(ty.section()) {
        merge_keys(&mut view, section, SECTION_KEYS, policy);
    }
    // 3. Ancestors, lowest precedence first.
    for ancestor in &chain {
        if let Some(ancestor_body) = component_body(stack_doc, ty, ancestor) {
            deep_merge_values(&mut view, ancestor_body, policy, "");
        }
    }
    // 4. The component's own configuration wins over everything.
    deep_merge_values(&mut view, body, policy, "");

    let is_abstract = view
        .get("metadata")
        .and_then(|m| m.get("type"))
        .and_then(Yaml::as_str)
        .is_some_and(|t| t == "abstract");

    let provenance = reroot_provenance(stack_store, ty, component, &chain);

    Ok(RawComponentView { view, provenance, inherits: chain, is_abstract })
}

fn component_body<'a>(stack_doc: &'a Yaml, ty: ComponentType, component: &str) -> Option<&'a Yaml> {
    stack_doc.get("components")?.get(ty.section())?.get(component)
}

/// Expand `metadata.inherits` depth-first, ancestors before descendants.
///
/// The chain is deduplicated; re-entry of a component already on the
/// expansion path is a cycle.
fn inheritance_chain(
    stack_doc: &Yaml,
    ty: ComponentType,
    component: &str,
) -> Result<Vec<String>, AtmosError> {
    fn expand(
        stack_doc: &Yaml,
        ty: ComponentType,
        name: &str,
        path: &mut Vec<String>,
        out: &mut Vec<String>,
    ) -> Result<(), AtmosError> {
        if path.iter().any(|p| p == name) {
            let mut chain = path.clone();
            chain.push(name.to_string());
            return Err(AtmosError::CircularDependency {
                chain,
                kinds: vec!["metadata.inherits".to_string(); path.len()],
            });
        }
        path.push(name.to_string());
        let parents: Vec<String> = component_body(stack_doc, ty, name)
            .and_then(|b| b.get("metadata"))
            .and_then(|m| m.get("inherits"))
            .and_then(Yaml::as_sequence)
            .map(|seq| seq.iter().map(yaml_key_to_string).collect())
            .unwrap_or_default();
        for parent in parents {
            expand(stack_doc, ty, &parent, path, out)?;
            if !out.contains(&parent) {
                out.push(parent);
            }
        }
        path.pop();
        Ok(())
    }

    let mut out = Vec::new();
    let mut path = Vec::new();
    expand(stack_doc, ty, component, &mut path, &mut out)?;
    Ok(out)
}

/// Merge selected keys of `source` into the accumulating view.
fn merge_keys(view: &mut Yaml, source: &Yaml, keys: &[&str], policy: &ListMergePolicy) {
    let mut slice = serde_yaml::Mapping::new();
    for key in keys {
        if let Some(value) = source.get(key) {
            slice.insert(Yaml::String((*key).to_string()), value.clone());
        }
    }
    deep_merge_values(view, &Yaml::Mapping(slice), policy, "");
}

/// Copy stack-document chains onto view-rooted paths.
///
/// For a view path `vars.x`, contributions come from the global section
/// (`vars.x`), the tool section (`terraform.vars.x`), each ancestor, and
/// the component itself, in precedence order.
fn reroot_provenance(
    store: &ProvenanceStore,
    ty: ComponentType,
    component: &str,
    chain: &[String],
) -> ProvenanceStore {
    let mut out = ProvenanceStore::new();
    let section = ty.section();
    let mut sources: Vec<String> = vec![String::new(), format!("{section}.")];
    for ancestor in chain {
        sources.push(format!("components.{section}.{ancestor}."));
    }
    sources.push(format!("components.{section}.{component}."));

    // Prefixes iterate outermost so each view path's chain lands in
    // precedence order and the last entry explains the effective value.
    for prefix in &sources {
        for path in store.paths() {
            let matched = if prefix.is_empty() {
                GLOBAL_KEYS.iter().any(|k| path == *k || path.starts_with(&format!("{k}.")))
            } else {
                path.starts_with(prefix.as_str())
            };
            if matched {
                let view_path = &path[prefix.len()..];
                for entry in store.chain(path) {
                    out.record(view_path, entry.clone());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str) -> Yaml {
        serde_yaml::from_str(source).unwrap()
    }

    const STACK: &str = r#"
vars:
  region: us-east-1
  stage: dev
terraform:
  vars:
    enabled: true
  backend_type: s3
  backend:
    bucket: tf-state
    region: us-east-1
components:
  terraform:
    base:
      metadata:
        type: abstract
      vars:
        instance_type: t3.small
        tags:
          Team: infra
    vpc:
      metadata:
        inherits: [base]
      vars:
        instance_type: m5.large
        name: main-vpc
"#;

    #[test]
    fn layers_apply_in_precedence_order() {
        let stack = doc(STACK);
        let view = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "vpc",
            &ListMergePolicy::default(),
        )
        .unwrap();

        // Global, section, ancestor, and own values all visible.
        assert_eq!(view.view["vars"]["region"], Yaml::String("us-east-1".into()));
        assert_eq!(view.view["vars"]["enabled"], Yaml::Bool(true));
        assert_eq!(view.view["vars"]["tags"]["Team"], Yaml::String("infra".into()));
        // Own value wins over the inherited one.
        assert_eq!(view.view["vars"]["instance_type"], Yaml::String("m5.large".into()));
        assert_eq!(view.inherits, ["base"]);
        assert!(!view.is_abstract);
        // Backend comes along from the section.
        assert_eq!(view.view["backend_type"], Yaml::String("s3".into()));
    }

    #[test]
    fn abstract_components_are_flagged() {
        let stack = doc(STACK);
        let view = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "base",
            &ListMergePolicy::default(),
        )
        .unwrap();
        assert!(view.is_abstract);
    }

    #[test]
    fn missing_component_lists_available() {
        let stack = doc(STACK);
        let err = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "nope",
            &ListMergePolicy::default(),
        )
        .unwrap_err();
        match err {
            AtmosError::ComponentNotFound { available, .. } => {
                assert_eq!(available, ["base", "vpc"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn deep_inheritance_applies_grandparents_first() {
        let stack = doc(
            r#"
components:
  terraform:
    grand:
      vars: {a: from-grand, b: from-grand, c: from-grand}
    parent:
      metadata: {inherits: [grand]}
      vars: {b: from-parent, c: from-parent}
    child:
      metadata: {inherits: [parent]}
      vars: {c: from-child}
"#,
        );
        let view = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "child",
            &ListMergePolicy::default(),
        )
        .unwrap();
        assert_eq!(view.inherits, ["grand", "parent"]);
        assert_eq!(view.view["vars"]["a"], Yaml::String("from-grand".into()));
        assert_eq!(view.view["vars"]["b"], Yaml::String("from-parent".into()));
        assert_eq!(view.view["vars"]["c"], Yaml::String("from-child".into()));
    }

    #[test]
    fn inheritance_cycles_are_rejected() {
        let stack = doc(
            r#"
components:
  terraform:
    a:
      metadata: {inherits: [b]}
    b:
      metadata: {inherits: [a]}
"#,
        );
        let err = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "a",
            &ListMergePolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AtmosError::CircularDependency { .. }));
    }

    #[test]
    fn tagged_values_survive_assembly() {
        let stack = doc(
            "components:\n  terraform:\n    vpc:\n      vars:\n        id: !terraform.state net dev vpc_id\n",
        );
        let view = build_component_view(
            &stack,
            &ProvenanceStore::new(),
            ComponentType::Terraform,
            "vpc",
            &ListMergePolicy::default(),
        )
        .unwrap();
        assert!(matches!(view.view["vars"]["id"], Yaml::Tagged(_)));
    }
}
