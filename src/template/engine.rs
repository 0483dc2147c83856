//! Tera-backed template engine with Go-template compatibility.
//!
//! Manifests in the wild carry two spellings: native Tera
//! (`{{ locals.base }}`) and the Go form (`{{ .locals.base }}`,
//! `{{ atmos.Component "vpc" "dev" }}`, `{{ .TrailingArgs }}`). A pre-parse
//! rewriter converts the Go forms; everything else is Tera-native. Parsed
//! templates are cached by content hash so a value is parsed once per
//! invocation regardless of how many times it renders.

use anyhow::Result;
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Mutex;
use tera::Tera;

use crate::core::{AtmosError, did_you_mean};

pub use tera::Context as TemplateContext;

/// Workflow/custom-command context keys with Go-style PascalCase aliases.
const PASCAL_ALIASES: &[(&str, &str)] = &[
    (".TrailingArgs", "trailing_args"),
    (".Arguments", "arguments"),
    (".Flags", "flags"),
    (".ComponentConfig", "component_config"),
];

/// Rewrite Go-template spellings into Tera syntax.
///
/// Three rewrites, applied only inside `{{ }}` / `{% %}` blocks:
/// 1. PascalCase workflow keys (`.TrailingArgs` → `trailing_args`),
/// 2. `atmos.Component "name" "stack"` → `atmos_component(...)`,
/// 3. a leading dot on a field path (`.locals.base` → `locals.base`).
pub fn normalize_go_syntax(template: &str) -> String {
    use std::sync::OnceLock;
    static BLOCK: OnceLock<regex::Regex> = OnceLock::new();
    static COMPONENT: OnceLock<regex::Regex> = OnceLock::new();
    static LEADING_DOT: OnceLock<regex::Regex> = OnceLock::new();

    let block = BLOCK.get_or_init(|| {
        regex::Regex::new(r"(?s)(\{\{.*?\}\})|(\{%.*?%\})").expect("static block pattern")
    });
    let component = COMPONENT.get_or_init(|| {
        regex::Regex::new(r#"atmos\.Component\s+"([^"]+)"\s+"([^"]+)""#)
            .expect("static component pattern")
    });
    let leading_dot = LEADING_DOT.get_or_init(|| {
        regex::Regex::new(r"(^|[\s(|])\.([A-Za-z_])").expect("static dot pattern")
    });

    block
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let mut inner = caps[0].to_string();
            for (go, tera) in PASCAL_ALIASES {
                inner = inner.replace(go, tera);
            }
            inner = component
                .replace_all(&inner, r#"atmos_component(component="$1", stack="$2")"#)
                .into_owned();
            leading_dot.replace_all(&inner, "$1$2").into_owned()
        })
        .into_owned()
}

/// Template engine shared by the evaluator, locals resolver, projections,
/// and workflow steps.
///
/// Wraps a [`Tera`] instance behind a mutex; registration is idempotent per
/// content hash. The engine carries no I/O-capable functions by default;
/// the evaluator registers `atmos_component` with pre-resolved values so
/// render stays synchronous.
pub struct TemplateEngine {
    tera: Mutex<Tera>,
    registered: Mutex<HashSet<String>>,
}

impl TemplateEngine {
    /// Create an engine with no templates registered.
    pub fn new() -> Self {
        Self { tera: Mutex::new(Tera::default()), registered: Mutex::new(HashSet::new()) }
    }

    /// Register a Tera function (e.g. `atmos_component`).
    pub fn register_function<F: tera::Function + 'static>(&self, name: &str, function: F) {
        self.tera.lock().expect("engine lock").register_function(name, function);
    }

    /// Render `template` against `context`.
    ///
    /// `origin` names the template in error messages (a file path or
    /// JSONPath). The template is normalized, parsed once, and cached.
    pub fn render(
        &self,
        origin: &str,
        template: &str,
        context: &TemplateContext,
    ) -> Result<String, AtmosError> {
        let normalized = normalize_go_syntax(template);
        let key = cache_key(&normalized);

        {
            let mut registered = self.registered.lock().expect("registry lock");
            if !registered.contains(&key) {
                let mut tera = self.tera.lock().expect("engine lock");
                tera.add_raw_template(&key, &normalized).map_err(|e| AtmosError::TemplateError {
                    context: origin.to_string(),
                    message: clean_tera_error(&e),
                })?;
                registered.insert(key.clone());
            }
        }

        let tera = self.tera.lock().expect("engine lock");
        tera.render(&key, context).map_err(|e| AtmosError::TemplateError {
            context: origin.to_string(),
            message: clean_with_suggestion(&e, context),
        })
    }

    /// Render a template that is expected to contain expressions; plain
    /// strings pass through untouched without entering the cache.
    pub fn render_if_template(
        &self,
        origin: &str,
        value: &str,
        context: &TemplateContext,
    ) -> Result<String, AtmosError> {
        if super::refs::has_template(value) {
            self.render(origin, value, context)
        } else {
            Ok(value.to_string())
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.registered.lock().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("TemplateEngine").field("cached_templates", &count).finish()
    }
}

fn cache_key(normalized: &str) -> String {
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("tpl_{:016x}", hasher.finish())
}

/// Strip Tera's multi-line framing down to the significant line.
fn clean_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message = cause.to_string();
        source = cause.source();
    }
    message.lines().next().unwrap_or(&message).trim().to_string()
}

/// Attach a "did you mean" when the failure is an unknown top-level
/// variable.
fn clean_with_suggestion(error: &tera::Error, context: &TemplateContext) -> String {
    let message = clean_tera_error(error);
    let known: Vec<String> = context
        .clone()
        .into_json()
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();

    if let Some(name) = extract_missing_variable(&message) {
        if let Some(suggestion) = did_you_mean(&name, known.iter().map(String::as_str)) {
            return format!("{message} (did you mean '{suggestion}'?)");
        }
    }
    message
}

fn extract_missing_variable(message: &str) -> Option<String> {
    let re = regex::Regex::new(r"Variable `([^`]+)` not found").ok()?;
    re.captures(message).map(|c| c[1].split('.').next().unwrap_or(&c[1]).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with(key: &str, value: serde_json::Value) -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.insert(key, &value);
        ctx
    }

    #[test]
    fn normalizes_leading_dot_references() {
        assert_eq!(normalize_go_syntax("{{ .locals.base }}"), "{{ locals.base }}");
        assert_eq!(
            normalize_go_syntax("{{ .vars.a }}-{{ .vars.b }}"),
            "{{ vars.a }}-{{ vars.b }}"
        );
    }

    #[test]
    fn normalizes_component_calls() {
        assert_eq!(
            normalize_go_syntax(r#"{{ atmos.Component "vpc" "dev" }}"#),
            r#"{{ atmos_component(component="vpc", stack="dev") }}"#
        );
    }

    #[test]
    fn normalizes_pascal_workflow_keys() {
        assert_eq!(normalize_go_syntax("echo {{ .TrailingArgs }}"), "echo {{ trailing_args }}");
    }

    #[test]
    fn text_outside_blocks_is_untouched() {
        assert_eq!(normalize_go_syntax("a.b {{ .x.y }} c.d"), "a.b {{ x.y }} c.d");
    }

    #[test]
    fn renders_with_context() {
        let engine = TemplateEngine::new();
        let ctx = context_with("locals", serde_json::json!({"base": "myapp", "region": "us-east-1"}));
        let out = engine
            .render("test", "{{ .locals.base }}-{{ .locals.region }}", &ctx)
            .unwrap();
        assert_eq!(out, "myapp-us-east-1");
    }

    #[test]
    fn plain_values_bypass_the_engine() {
        let engine = TemplateEngine::new();
        let ctx = TemplateContext::new();
        assert_eq!(engine.render_if_template("t", "plain", &ctx).unwrap(), "plain");
    }

    #[test]
    fn unknown_variable_gets_suggestion() {
        let engine = TemplateEngine::new();
        let ctx = context_with("locals", serde_json::json!({"region": "us-east-1"}));
        let err = engine.render("t", "{{ locale.region }}", &ctx).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("locale"), "unexpected: {message}");
        assert!(message.contains("did you mean 'locals'"), "unexpected: {message}");
    }

    #[test]
    fn parse_failure_is_template_error() {
        let engine = TemplateEngine::new();
        let err = engine.render("bad", "{{ unclosed", &TemplateContext::new());
        assert!(matches!(err, Err(AtmosError::TemplateError { .. })));
    }
}
