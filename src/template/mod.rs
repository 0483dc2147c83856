//! Unified expression evaluation.
//!
//! Every leaf string of a merged section passes through here after merge.
//! Two expression kinds compose in the same value: tagged YAML functions
//! (`!template`, `!exec`, `!env`, `!store`, `!terraform.output`,
//! `!terraform.state`) and embedded templates (`{{ ... }}`) rendered
//! against `vars`, `settings`, `env`, `locals`, and the `atmos.*` helpers.
//!
//! Cross-component lookups (`atmos.Component`, the terraform functions)
//! push frames on the [`resolution::ResolutionContext`]; a repeated
//! `(component, stack)` is rejected as `CircularDependency` before any
//! subprocess or network call fires. Resolved values are cached per
//! `(component, stack, JSONPath)` for the invocation.

pub mod engine;
pub mod exec;
pub mod functions;
pub mod refs;
pub mod resolution;

pub use engine::{TemplateContext, TemplateEngine, normalize_go_syntax};
pub use exec::ExecPolicy;
pub use functions::{TaggedFunction, parse_tagged};
pub use resolution::{Frame, FunctionKind, ResolutionContext, ValueCache};

use anyhow::Result;
use futures::future::BoxFuture;
use regex::Regex;
use serde_json::Value as Json;
use serde_yaml::Value as Yaml;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::auth::AuthContext;
use crate::backend::{BackendSpec, StateReader};
use crate::core::AtmosError;
use crate::locals::LocalsMap;
use crate::merge::value::{yaml_key_to_string, yaml_to_json};
use crate::store::StoreRegistry;

/// Resolver for other components' views, supplied by the stack layer.
///
/// Implementations evaluate the target `(component, stack)` with the same
/// resolution context so cross-component cycles are caught at the frame
/// push, never by exhausting the call stack.
pub trait ComponentLookup: Send + Sync {
    /// Fully-resolved view of another component.
    fn resolve_view<'a>(
        &'a self,
        component: &'a str,
        stack: &'a str,
        rctx: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, Result<Json>>;
}

/// Source of file-scoped locals during evaluation.
///
/// Locals bind to the file that produced a value, not to the root manifest;
/// implementations select the scope chain per JSONPath (the stack layer
/// keys this off the provenance store). References to names outside the
/// scope fail with `UndefinedLocal` before any render.
pub trait LocalsProvider: Send + Sync {
    /// The merged locals scope for the file owning `json_path`.
    fn locals_for(&self, json_path: &str) -> LocalsMap;

    /// The error for an out-of-scope reference at `json_path`.
    fn undefined(&self, json_path: &str, name: &str) -> AtmosError;
}

/// A single locals scope applied to every path.
pub struct StaticLocals(pub LocalsMap);

impl LocalsProvider for StaticLocals {
    fn locals_for(&self, _json_path: &str) -> LocalsMap {
        self.0.clone()
    }

    fn undefined(&self, _json_path: &str, name: &str) -> AtmosError {
        let available: Vec<String> = self.0.keys().cloned().collect();
        let did_you_mean =
            crate::core::did_you_mean(name, available.iter().map(String::as_str));
        AtmosError::UndefinedLocal {
            name: name.to_string(),
            file: std::path::PathBuf::new(),
            available,
            did_you_mean,
        }
    }
}

/// Per-call evaluation options.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Render `{{ ... }}` templates.
    pub process_templates: bool,
    /// Evaluate tagged functions at all (describe-style projections
    /// disable this to avoid side effects).
    pub process_functions: bool,
    /// Tags to leave literal even when functions are processed.
    pub skip_tags: HashSet<String>,
    /// `!exec` timeout/attempt policy.
    pub exec_policy: ExecPolicy,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            process_templates: true,
            process_functions: true,
            skip_tags: HashSet::new(),
            exec_policy: ExecPolicy::default(),
        }
    }
}

/// Identity of the view being evaluated.
#[derive(Debug, Clone)]
pub struct EvalScope {
    /// Component name.
    pub component: String,
    /// Stack name.
    pub stack: String,
}

/// The expression evaluator for one invocation.
///
/// Borrow-shared across concurrent `(component, stack)` resolutions; all
/// mutable state lives in the caches, which are concurrent.
pub struct Evaluator<'a> {
    /// Template engine (parse cache lives inside).
    pub engine: &'a TemplateEngine,
    /// Terraform state reader with client/result caches.
    pub state_reader: &'a StateReader,
    /// Configured stores for `!store`.
    pub stores: &'a StoreRegistry,
    /// Credentials for SDK-backed reads, when materialized.
    pub auth: Option<Arc<AuthContext>>,
    /// Resolved-value cache.
    pub cache: &'a ValueCache,
    /// File-scoped locals selection.
    pub locals: &'a dyn LocalsProvider,
    /// Cross-component resolver.
    pub lookup: &'a dyn ComponentLookup,
    /// Invocation-level cancellation.
    pub cancel: CancellationToken,
    /// Options for this call.
    pub options: EvalOptions,
}

impl Evaluator<'_> {
    /// Evaluate a merged view (tags preserved in the `Yaml`) into its
    /// final JSON form.
    ///
    /// `rctx` must already hold the root frame for `scope`.
    pub async fn evaluate_view(
        &self,
        view: &Yaml,
        scope: &EvalScope,
        rctx: &mut ResolutionContext,
    ) -> Result<Json> {
        let base = self.base_context(view, scope);
        self.eval_node(view, String::new(), &base, scope, rctx).await
    }

    /// Template context from the raw (unevaluated) view. Locals are
    /// inserted per path at render time, since they vary by source file.
    fn base_context(&self, view: &Yaml, scope: &EvalScope) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        let raw = yaml_to_json(view);
        for key in ["vars", "settings", "env"] {
            ctx.insert(key, raw.get(key).unwrap_or(&Json::Object(Default::default())));
        }
        ctx.insert(
            "atmos",
            &serde_json::json!({ "component": scope.component, "stack": scope.stack }),
        );
        ctx
    }

    fn eval_node<'s>(
        &'s self,
        node: &'s Yaml,
        path: String,
        base: &'s TemplateContext,
        scope: &'s EvalScope,
        rctx: &'s mut ResolutionContext,
    ) -> BoxFuture<'s, Result<Json>> {
        Box::pin(async move {
            match node {
                Yaml::Tagged(tagged) => {
                    let tag = format!("!{}", tagged.tag.to_string().trim_start_matches('!'));
                    let payload = payload_string(&tagged.value);
                    self.eval_tagged(&tag, &payload, &path, base, scope, rctx).await
                }
                Yaml::String(s) => {
                    if let Some(cached) = self.cache.get(&scope.component, &scope.stack, &path) {
                        trace!(path, "value cache hit");
                        return Ok(cached);
                    }
                    let value = self.eval_string(s, &path, base, scope, rctx).await?;
                    self.cache.insert(&scope.component, &scope.stack, &path, value.clone());
                    Ok(value)
                }
                Yaml::Mapping(map) => {
                    let mut out = serde_json::Map::new();
                    for (k, v) in map {
                        let key = yaml_key_to_string(k);
                        let child_path =
                            if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                        out.insert(
                            key,
                            self.eval_node(v, child_path, base, scope, rctx).await?,
                        );
                    }
                    Ok(Json::Object(out))
                }
                Yaml::Sequence(seq) => {
                    let mut out = Vec::with_capacity(seq.len());
                    for (i, v) in seq.iter().enumerate() {
                        out.push(
                            self.eval_node(v, format!("{path}[{i}]"), base, scope, rctx).await?,
                        );
                    }
                    Ok(Json::Array(out))
                }
                other => Ok(yaml_to_json(other)),
            }
        })
    }

    /// Evaluate one tagged function.
    async fn eval_tagged(
        &self,
        tag: &str,
        payload: &str,
        path: &str,
        base: &TemplateContext,
        scope: &EvalScope,
        rctx: &mut ResolutionContext,
    ) -> Result<Json> {
        let literal = || Json::String(format!("{tag} {payload}").trim_end().to_string());

        if !self.options.process_functions || self.options.skip_tags.contains(tag) {
            return Ok(literal());
        }

        // Templates compose inside tagged payloads; render them first.
        let payload = match self.eval_string(payload, path, base, scope, rctx).await? {
            Json::String(s) => s,
            other => other.to_string(),
        };

        let Some(parsed) = parse_tagged(tag, &payload) else {
            // Unknown tags are not ours to interpret.
            return Ok(literal());
        };
        let function = parsed?;

        match function {
            TaggedFunction::Template { template } => {
                let rendered = self.eval_string(&template, path, base, scope, rctx).await?;
                let Json::String(text) = rendered else { return Ok(rendered) };
                match serde_yaml::from_str::<Yaml>(&text) {
                    Ok(value) if !value.is_null() => Ok(yaml_to_json(&value)),
                    _ => Ok(Json::String(text)),
                }
            }
            TaggedFunction::Exec { command } => {
                exec::run_exec(&command, self.options.exec_policy, &self.cancel).await
            }
            TaggedFunction::Env { name, default } => match std::env::var(&name) {
                Ok(value) => Ok(Json::String(value)),
                Err(_) => default.map(Json::String).ok_or_else(|| {
                    AtmosError::InvalidFunctionCall {
                        function: "!env".to_string(),
                        message: format!("environment variable '{name}' is not set"),
                    }
                    .into()
                }),
            },
            TaggedFunction::StoreGet { store, key } => self.stores.get(&store, &key).await,
            TaggedFunction::TerraformOutput { component, stack, output } => {
                let stack = stack.unwrap_or_else(|| scope.stack.clone());
                self.read_remote(
                    &component,
                    &stack,
                    Some(&output),
                    FunctionKind::TerraformOutput,
                    rctx,
                )
                .await
            }
            TaggedFunction::TerraformState { component, stack, output } => {
                let stack = stack.unwrap_or_else(|| scope.stack.clone());
                self.read_remote(
                    &component,
                    &stack,
                    output.as_deref(),
                    FunctionKind::TerraformState,
                    rctx,
                )
                .await
            }
        }
    }

    /// Read another component's state through its declared backend.
    ///
    /// The frame push happens before the target view is resolved, so a
    /// cycle fails here with no I/O performed.
    async fn read_remote(
        &self,
        component: &str,
        stack: &str,
        output: Option<&str>,
        kind: FunctionKind,
        rctx: &mut ResolutionContext,
    ) -> Result<Json> {
        rctx.push(Frame::new(component, stack, kind))?;
        let result = async {
            let view = self.lookup.resolve_view(component, stack, rctx).await?;
            let spec = backend_spec_from_view(&view, stack)?;
            match output {
                Some(name) => self.state_reader.read_output(&spec, name, self.auth.as_deref()).await,
                None => {
                    let state = self.state_reader.read_state(&spec, self.auth.as_deref()).await?;
                    Ok(collapse_outputs(&state))
                }
            }
        }
        .await;
        rctx.pop();
        result
    }

    /// Render a string that may embed template expressions.
    async fn eval_string(
        &self,
        value: &str,
        path: &str,
        base: &TemplateContext,
        scope: &EvalScope,
        rctx: &mut ResolutionContext,
    ) -> Result<Json> {
        if !self.options.process_templates || !refs::has_template(value) {
            return Ok(Json::String(value.to_string()));
        }

        // Locals bind to the file that produced this value; references
        // outside that scope fail before the engine ever runs.
        let locals = self.locals.locals_for(path);
        for name in refs::extract_refs(value, "locals") {
            if !locals.contains_key(&name) {
                return Err(self.locals.undefined(path, &name).into());
            }
        }

        let normalized = normalize_go_syntax(value);
        let calls: Vec<_> = {
            let mut seen = HashSet::new();
            refs::extract_component_calls(&normalized)
                .into_iter()
                .filter(|c| seen.insert((c.component.clone(), c.stack.clone())))
                .collect()
        };

        let mut components = serde_json::Map::new();
        for call in &calls {
            rctx.push(Frame::new(&call.component, &call.stack, FunctionKind::AtmosComponent))?;
            let resolved = self.lookup.resolve_view(&call.component, &call.stack, rctx).await;
            rctx.pop();
            components.insert(format!("{}/{}", call.component, call.stack), resolved?);
        }
        let rewritten =
            if calls.is_empty() { normalized } else { refs::rewrite_component_calls(&normalized) };

        let mut ctx = base.clone();
        ctx.insert("locals", &locals);
        if !components.is_empty() {
            ctx.insert("__components", &components);
        }

        // A value that is exactly one component lookup returns the
        // projection itself rather than a stringified map.
        if let Some(slot) = whole_value_lookup(&rewritten) {
            return Ok(components.get(&slot).cloned().unwrap_or(Json::Null));
        }

        let rendered = self.engine.render(path, &rewritten, &ctx)?;
        Ok(Json::String(rendered))
    }
}

/// Derive a [`BackendSpec`] from a resolved component view.
pub fn backend_spec_from_view(view: &Json, stack: &str) -> Result<BackendSpec, AtmosError> {
    let backend_type =
        view.get("backend_type").and_then(Json::as_str).unwrap_or("local").to_string();
    let empty = Json::Object(Default::default());
    let mut attributes = view.get("backend").cloned().unwrap_or(empty);

    // S3 keys are commonly declared as a workspace prefix plus stack.
    if backend_type == "s3" && attributes.get("key").is_none() {
        if let Some(prefix) =
            attributes.get("workspace_key_prefix").and_then(Json::as_str).map(ToString::to_string)
        {
            attributes["key"] = Json::String(format!("{prefix}/{stack}/terraform.tfstate"));
        }
    }

    BackendSpec::parse(&backend_type, &attributes)
}

/// The whole-outputs map of a state document, collapsed to name → value.
fn collapse_outputs(state: &Json) -> Json {
    let mut out = serde_json::Map::new();
    if let Some(outputs) = state.get("outputs").and_then(Json::as_object) {
        for (name, entry) in outputs {
            out.insert(name.clone(), entry.get("value").cloned().unwrap_or(Json::Null));
        }
    }
    Json::Object(out)
}

/// A tagged scalar's payload as the argument string.
fn payload_string(value: &Yaml) -> String {
    match value {
        Yaml::String(s) => s.clone(),
        Yaml::Null => String::new(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim_end().to_string(),
    }
}

fn whole_value_lookup(rewritten: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"^\{\{\s*__components\["([^"]+)"\]\s*\}\}$"#).expect("static lookup pattern")
    });
    re.captures(rewritten.trim()).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locals::LocalsMap;

    /// Lookup that serves fixed views and records resolutions.
    struct FixedLookup {
        views: std::collections::HashMap<(String, String), Json>,
    }

    impl ComponentLookup for FixedLookup {
        fn resolve_view<'a>(
            &'a self,
            component: &'a str,
            stack: &'a str,
            _rctx: &'a mut ResolutionContext,
        ) -> BoxFuture<'a, Result<Json>> {
            Box::pin(async move {
                self.views
                    .get(&(component.to_string(), stack.to_string()))
                    .cloned()
                    .ok_or_else(|| {
                        AtmosError::ComponentNotFound {
                            component: component.to_string(),
                            stack: stack.to_string(),
                            available: vec![],
                        }
                        .into()
                    })
            })
        }
    }

    struct Harness {
        engine: TemplateEngine,
        reader: StateReader,
        stores: StoreRegistry,
        cache: ValueCache,
        lookup: FixedLookup,
        locals: StaticLocals,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                engine: TemplateEngine::new(),
                reader: StateReader::new(),
                stores: StoreRegistry::new(),
                cache: ValueCache::new(),
                lookup: FixedLookup { views: Default::default() },
                locals: StaticLocals(LocalsMap::new()),
            }
        }

        fn evaluator(&self) -> Evaluator<'_> {
            Evaluator {
                engine: &self.engine,
                state_reader: &self.reader,
                stores: &self.stores,
                auth: None,
                cache: &self.cache,
                locals: &self.locals,
                lookup: &self.lookup,
                cancel: CancellationToken::new(),
                options: EvalOptions::default(),
            }
        }
    }

    fn scope() -> EvalScope {
        EvalScope { component: "vpc".into(), stack: "dev".into() }
    }

    async fn eval(harness: &Harness, source: &str) -> Result<Json> {
        let view: Yaml = serde_yaml::from_str(source).unwrap();
        let mut rctx = ResolutionContext::new();
        rctx.push(Frame::root("vpc", "dev")).unwrap();
        harness.evaluator().evaluate_view(&view, &scope(), &mut rctx).await
    }

    async fn eval_with_locals(
        harness: &mut Harness,
        source: &str,
        locals: &LocalsMap,
    ) -> Result<Json> {
        harness.locals = StaticLocals(locals.clone());
        eval(harness, source).await
    }

    #[tokio::test]
    async fn renders_templates_against_vars_and_locals() {
        let mut harness = Harness::new();
        let mut locals = LocalsMap::new();
        locals.insert("region".into(), serde_json::json!("us-east-1"));
        locals.insert("base".into(), serde_json::json!("myapp"));
        let out = eval_with_locals(
            &mut harness,
            "vars:\n  name: \"{{ .locals.base }}-{{ .locals.region }}\"\n",
            &locals,
        )
        .await
        .unwrap();
        assert_eq!(out["vars"]["name"], "myapp-us-east-1");
    }

    #[tokio::test]
    async fn env_function_reads_variables() {
        // Use a variable guaranteed present, plus a default fallback.
        let harness = Harness::new();
        let out = eval(&harness, "vars:\n  missing: !env ATMOS_SURELY_UNSET_VAR fallback\n")
            .await
            .unwrap();
        assert_eq!(out["vars"]["missing"], "fallback");

        let err =
            eval(&harness, "vars:\n  missing: !env ATMOS_SURELY_UNSET_VAR\n").await.unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[tokio::test]
    async fn exec_function_captures_stdout() {
        let harness = Harness::new();
        let out = eval(&harness, "vars:\n  who: !exec echo evaluated\n").await.unwrap();
        assert_eq!(out["vars"]["who"], "evaluated");
    }

    #[tokio::test]
    async fn unknown_tags_stay_literal() {
        let harness = Harness::new();
        let out = eval(&harness, "vars:\n  cfn: !Ref SomeResource\n").await.unwrap();
        assert_eq!(out["vars"]["cfn"], "!Ref SomeResource");
    }

    #[tokio::test]
    async fn skip_set_bypasses_side_effects() {
        let harness = Harness::new();
        let view: Yaml = serde_yaml::from_str("vars:\n  x: !exec echo should-not-run\n").unwrap();
        let mut rctx = ResolutionContext::new();
        let mut evaluator = harness.evaluator();
        evaluator.options.skip_tags.insert("!exec".to_string());
        let out = evaluator
            .evaluate_view(&view, &scope(), &mut rctx)
            .await
            .unwrap();
        assert_eq!(out["vars"]["x"], "!exec echo should-not-run");
    }

    #[tokio::test]
    async fn functions_disabled_leaves_everything_literal() {
        let harness = Harness::new();
        let view: Yaml =
            serde_yaml::from_str("vars:\n  x: !terraform.state other staging\n").unwrap();
        let mut rctx = ResolutionContext::new();
        let mut evaluator = harness.evaluator();
        evaluator.options.process_functions = false;
        let out = evaluator
            .evaluate_view(&view, &scope(), &mut rctx)
            .await
            .unwrap();
        assert_eq!(out["vars"]["x"], "!terraform.state other staging");
    }

    #[tokio::test]
    async fn component_lookup_returns_projection() {
        let mut harness = Harness::new();
        harness.lookup.views.insert(
            ("eks".to_string(), "dev".to_string()),
            serde_json::json!({"vars": {"cluster": "dev-eks"}}),
        );
        let out = eval(
            &harness,
            r#"vars:
  cluster: '{{ atmos.Component "eks" "dev" }}'
  name: 'cluster-{{ atmos_component(component="eks", stack="dev").vars.cluster }}'
"#,
        )
        .await
        .unwrap();
        assert_eq!(out["vars"]["cluster"], serde_json::json!({"vars": {"cluster": "dev-eks"}}));
        assert_eq!(out["vars"]["name"], "cluster-dev-eks");
    }

    #[tokio::test]
    async fn template_function_parses_structured_result() {
        let mut harness = Harness::new();
        let mut locals = LocalsMap::new();
        locals.insert("count".into(), serde_json::json!(3));
        let out = eval_with_locals(
            &mut harness,
            "vars:\n  replicas: !template \"{{ locals.count }}\"\n",
            &locals,
        )
        .await
        .unwrap();
        assert_eq!(out["vars"]["replicas"], 3);
    }

    #[tokio::test]
    async fn local_state_read_via_view_backend() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("terraform.tfstate");
        std::fs::write(
            &state,
            r#"{"outputs": {"vpc_id": {"value": "vpc-9"}, "cidr": {"value": "10.0.0.0/16"}}}"#,
        )
        .unwrap();

        let mut harness = Harness::new();
        harness.lookup.views.insert(
            ("net".to_string(), "dev".to_string()),
            serde_json::json!({
                "backend_type": "local",
                "backend": {"path": state.display().to_string()},
            }),
        );

        let out = eval(&harness, "vars:\n  vpc: !terraform.state net dev vpc_id\n").await.unwrap();
        assert_eq!(out["vars"]["vpc"], "vpc-9");

        // Whole-state form collapses the outputs map.
        let out = eval(&harness, "vars:\n  all: !terraform.state net dev\n").await.unwrap();
        assert_eq!(out["vars"]["all"]["cidr"], "10.0.0.0/16");
    }

    #[tokio::test]
    async fn resolved_values_cache_per_path() {
        let mut harness = Harness::new();
        let mut locals = LocalsMap::new();
        locals.insert("x".into(), serde_json::json!("1"));
        let first = eval_with_locals(&mut harness, "vars:\n  a: \"{{ locals.x }}\"\n", &locals)
            .await
            .unwrap();
        assert_eq!(harness.cache.get("vpc", "dev", "vars.a").unwrap(), first["vars"]["a"]);

        // Second evaluation sees identical output from the cache.
        let second = eval_with_locals(&mut harness, "vars:\n  a: \"{{ locals.x }}\"\n", &locals)
            .await
            .unwrap();
        assert_eq!(first, second);
    }
}
