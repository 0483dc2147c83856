//! Expression resolution context: cycle detection and value caching.
//!
//! Every cross-component call (`!terraform.state`, `!terraform.output`,
//! `atmos.Component`) pushes a frame keyed by `(component, stack)` onto a
//! call stack local to one resolution. A repeated key is a cycle, rejected
//! before any subprocess or network call fires. Frames are strictly nested
//! (push/pop discipline); cross-component recursion borrows the same
//! context object.

use dashmap::DashMap;
use serde_json::Value as Json;
use std::fmt;

use crate::core::AtmosError;

/// The expression kinds that introduce cross-component edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// `!terraform.state`
    TerraformState,
    /// `!terraform.output`
    TerraformOutput,
    /// `atmos.Component` template helper
    AtmosComponent,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TerraformState => "terraform.state",
            Self::TerraformOutput => "terraform.output",
            Self::AtmosComponent => "atmos.Component",
        };
        f.write_str(name)
    }
}

/// One entry on the resolution stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Component being resolved.
    pub component: String,
    /// Stack it is resolved in.
    pub stack: String,
    /// The call that created the frame; `None` for the root resolution.
    pub kind: Option<FunctionKind>,
}

impl Frame {
    /// Frame for a cross-component call.
    pub fn new(component: impl Into<String>, stack: impl Into<String>, kind: FunctionKind) -> Self {
        Self { component: component.into(), stack: stack.into(), kind: Some(kind) }
    }

    /// Frame for the `(component, stack)` a resolution starts from.
    pub fn root(component: impl Into<String>, stack: impl Into<String>) -> Self {
        Self { component: component.into(), stack: stack.into(), kind: None }
    }

    /// `stack/component` rendering used in cycle chains.
    pub fn label(&self) -> String {
        format!("{}/{}", self.stack, self.component)
    }
}

/// Call stack guarding cross-component expressions.
///
/// A frame moves `Fresh → Resolving` on push (where the cycle check
/// happens) and back out on pop; a failure anywhere short-circuits the
/// stack as the error unwinds through the callers.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    frames: Vec<Frame>,
}

impl ResolutionContext {
    /// An empty context rooted at one `(component, stack)` resolution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame, rejecting re-entry of a visited `(component, stack)`.
    pub fn push(&mut self, frame: Frame) -> Result<(), AtmosError> {
        if self.frames.iter().any(|f| f.component == frame.component && f.stack == frame.stack) {
            let mut chain: Vec<String> = self.frames.iter().map(Frame::label).collect();
            chain.push(frame.label());
            let kinds = self
                .frames
                .iter()
                .filter_map(|f| f.kind.map(|k| k.to_string()))
                .chain(frame.kind.map(|k| k.to_string()))
                .collect();
            return Err(AtmosError::CircularDependency { chain, kinds });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Pop the top frame after its evaluation resolved.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Resolved-value cache: one-shot write per `(component, stack, JSONPath)`,
/// many reads. A second reader of the same key sees identical output.
#[derive(Debug, Default)]
pub struct ValueCache {
    values: DashMap<(String, String, String), Json>,
}

impl ValueCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for a key.
    pub fn get(&self, component: &str, stack: &str, path: &str) -> Option<Json> {
        self.values
            .get(&(component.to_string(), stack.to_string(), path.to_string()))
            .map(|v| v.clone())
    }

    /// Record a resolved value. First write wins.
    pub fn insert(&self, component: &str, stack: &str, path: &str, value: Json) {
        self.values
            .entry((component.to_string(), stack.to_string(), path.to_string()))
            .or_insert(value);
    }

    /// Number of resolved values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has resolved yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_pushes_are_fine() {
        let mut ctx = ResolutionContext::new();
        ctx.push(Frame::new("vpc", "core", FunctionKind::TerraformState)).unwrap();
        ctx.push(Frame::new("other", "staging", FunctionKind::TerraformState)).unwrap();
        assert_eq!(ctx.depth(), 2);
        ctx.pop();
        ctx.pop();
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn reentry_is_a_cycle_with_rendered_chain() {
        let mut ctx = ResolutionContext::new();
        ctx.push(Frame::root("vpc", "core")).unwrap();
        ctx.push(Frame::new("other", "staging", FunctionKind::TerraformState)).unwrap();
        let err = ctx.push(Frame::new("vpc", "core", FunctionKind::TerraformState)).unwrap_err();
        match err {
            AtmosError::CircularDependency { chain, kinds } => {
                assert_eq!(chain, ["core/vpc", "staging/other", "core/vpc"]);
                assert_eq!(kinds, ["terraform.state", "terraform.state"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn same_component_different_stack_is_not_a_cycle() {
        let mut ctx = ResolutionContext::new();
        ctx.push(Frame::new("vpc", "dev", FunctionKind::AtmosComponent)).unwrap();
        assert!(ctx.push(Frame::new("vpc", "prod", FunctionKind::AtmosComponent)).is_ok());
    }

    #[test]
    fn cache_is_write_once() {
        let cache = ValueCache::new();
        cache.insert("vpc", "dev", "vars.name", serde_json::json!("first"));
        cache.insert("vpc", "dev", "vars.name", serde_json::json!("second"));
        assert_eq!(cache.get("vpc", "dev", "vars.name").unwrap(), "first");
        assert!(cache.get("vpc", "prod", "vars.name").is_none());
    }
}
