//! Template AST inspection by prefix.
//!
//! One dependable primitive, shared by the locals resolver and the
//! cross-component dependency scanner: extract every field reference with a
//! given prefix (all `locals.X`, all `vars.X`) and every component lookup
//! from a template string. Both Go-style (`{{ .locals.base }}`) and
//! Tera-style (`{{ locals.base }}`) spellings are recognized, since the
//! compatibility rewriter accepts both on input.

use regex::Regex;
use std::sync::OnceLock;

/// Expression delimiters: `{{ ... }}` and `{% ... %}` blocks.
fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}").unwrap())
}

/// Whether `value` contains any template expression at all.
pub fn has_template(value: &str) -> bool {
    block_re().is_match(value)
}

/// Extract field names referenced as `<prefix>.<name>` inside expressions.
///
/// `extract_refs("{{ .locals.base }}-{{ locals.region | upper }}", "locals")`
/// yields `["base", "region"]`. Duplicates are preserved in document order;
/// callers needing a set dedup themselves.
pub fn extract_refs(template: &str, prefix: &str) -> Vec<String> {
    let field = Regex::new(&format!(
        r"(?:^|[^A-Za-z0-9_.]){}\.([A-Za-z_][A-Za-z0-9_]*)",
        regex::escape(prefix)
    ))
    .expect("static reference pattern");

    let mut refs = Vec::new();
    for block in block_re().captures_iter(template) {
        let inner = block.get(1).or_else(|| block.get(2)).map_or("", |m| m.as_str());
        // Leading-dot Go spellings become detectable by padding the
        // expression so `.locals.x` at block start still matches.
        let padded = format!(" {inner}");
        for cap in field.captures_iter(&padded) {
            refs.push(cap[1].to_string());
        }
    }
    refs
}

/// A component lookup found in a template expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentRef {
    /// Component name argument.
    pub component: String,
    /// Stack name argument.
    pub stack: String,
}

fn go_component_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"atmos\.Component\s+"([^"]+)"\s+"([^"]+)""#).unwrap())
}

fn tera_component_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"atmos_component\(\s*component\s*=\s*"([^"]+)"\s*,\s*stack\s*=\s*"([^"]+)"\s*\)"#,
        )
        .unwrap()
    })
}

/// Extract `atmos.Component "name" "stack"` / `atmos_component(...)` calls.
///
/// Only literal arguments are recognized; a computed component name cannot
/// be pre-resolved and fails later at render time.
pub fn extract_component_calls(template: &str) -> Vec<ComponentRef> {
    let mut calls = Vec::new();
    for block in block_re().captures_iter(template) {
        let inner = block.get(1).or_else(|| block.get(2)).map_or("", |m| m.as_str());
        for cap in go_component_re().captures_iter(inner) {
            calls.push(ComponentRef { component: cap[1].to_string(), stack: cap[2].to_string() });
        }
        for cap in tera_component_re().captures_iter(inner) {
            calls.push(ComponentRef { component: cap[1].to_string(), stack: cap[2].to_string() });
        }
    }
    calls
}

/// Rewrite every component call into a `__components` lookup.
///
/// The evaluator pre-resolves the referenced views and injects them under
/// `__components` keyed by `component/stack`, keeping render synchronous.
pub fn rewrite_component_calls(template: &str) -> String {
    tera_component_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            format!(r#"__components["{}/{}"]"#, &caps[1], &caps[2])
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_go_and_tera_spellings() {
        let refs = extract_refs("{{ .locals.base }}-{{ locals.region | upper }}", "locals");
        assert_eq!(refs, vec!["base", "region"]);
    }

    #[test]
    fn prefix_matching_is_exact() {
        // `mylocals.x` must not match prefix `locals`.
        let refs = extract_refs("{{ mylocals.x }} {{ locals.y }}", "locals");
        assert_eq!(refs, vec!["y"]);
    }

    #[test]
    fn references_outside_expressions_are_ignored() {
        let refs = extract_refs("locals.not_a_ref {{ locals.real }}", "locals");
        assert_eq!(refs, vec!["real"]);
    }

    #[test]
    fn statement_blocks_are_scanned() {
        let refs = extract_refs("{% if locals.enabled %}on{% endif %}", "locals");
        assert_eq!(refs, vec!["enabled"]);
    }

    #[test]
    fn nested_path_reports_first_segment() {
        let refs = extract_refs("{{ vars.tags.team }}", "vars");
        assert_eq!(refs, vec!["tags"]);
    }

    #[test]
    fn component_calls_both_syntaxes() {
        let calls = extract_component_calls(
            r#"{{ atmos.Component "vpc" "core" }} and {{ atmos_component(component="eks", stack="dev").outputs }}"#,
        );
        assert_eq!(
            calls,
            vec![
                ComponentRef { component: "vpc".into(), stack: "core".into() },
                ComponentRef { component: "eks".into(), stack: "dev".into() },
            ]
        );
    }

    #[test]
    fn rewrite_tolerates_spacing_variants() {
        let rewritten = rewrite_component_calls(
            r#"{{ atmos_component( component = "vpc", stack = "dev" ).vars.id }}"#,
        );
        assert_eq!(rewritten, r#"{{ __components["vpc/dev"].vars.id }}"#);
    }

    #[test]
    fn plain_strings_have_no_template() {
        assert!(!has_template("plain value"));
        assert!(has_template("{{ vars.x }}"));
    }
}
