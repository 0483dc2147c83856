//! Pre-authentication pattern scanner.
//!
//! `describe` and `list` commands must not prompt for credentials when the
//! configuration they touch needs none. Before authenticating, the scoped
//! slice of *raw* manifests is scanned for the fixed set of
//! credential-requiring patterns; when none match and function processing
//! is disabled by the caller, authentication is skipped entirely.

use regex::Regex;
use std::sync::OnceLock;

/// Patterns whose presence requires a materialized AuthContext.
fn auth_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"!terraform\.state|!terraform\.output|!store(\.get)?\b|atmos\.Component|atmos_component",
        )
        .expect("static auth pattern")
    })
}

/// Whether one raw document contains any auth-requiring pattern.
pub fn contains_auth_patterns(raw: &str) -> bool {
    auth_pattern().is_match(raw)
}

/// Scan a scoped slice of raw manifests.
///
/// Returns true as soon as any document matches; order follows the input
/// so callers can pass the narrowest slice first.
pub fn scan_documents<'a, I>(documents: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    documents.into_iter().any(contains_auth_patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_config_needs_no_auth() {
        assert!(!contains_auth_patterns("vars:\n  region: us-east-1\n"));
    }

    #[test]
    fn terraform_state_triggers() {
        assert!(contains_auth_patterns("vars:\n  vpc_id: !terraform.state vpc core vpc_id\n"));
    }

    #[test]
    fn store_variants_trigger() {
        assert!(contains_auth_patterns("vars:\n  secret: !store ssm /path\n"));
        assert!(contains_auth_patterns("vars:\n  secret: !store.get prod /path\n"));
    }

    #[test]
    fn store_prefix_of_other_word_does_not_trigger() {
        assert!(!contains_auth_patterns("vars:\n  name: !storefront thing\n"));
        assert!(!contains_auth_patterns("description: restore from backup\n"));
    }

    #[test]
    fn component_helper_both_spellings_trigger() {
        assert!(contains_auth_patterns(r#"name: '{{ atmos.Component "vpc" "dev" }}'"#));
        assert!(contains_auth_patterns(
            r#"name: '{{ atmos_component(component="vpc", stack="dev") }}'"#
        ));
    }

    #[test]
    fn scan_short_circuits_across_documents() {
        let docs = ["vars: {a: 1}", "x: !terraform.output vpc dev id"];
        assert!(scan_documents(docs));
        assert!(!scan_documents(["vars: {a: 1}", "vars: {b: 2}"]));
    }
}
