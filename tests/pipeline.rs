//! End-to-end pipeline tests: import → locals → merge → evaluate.

mod common;

use atmos_cli::core::{AtmosError, ComponentType};
use atmos_cli::merge::ProvenanceKind;
use atmos_cli::template::ResolutionContext;
use common::TestRepo;

#[tokio::test(flavor = "multi_thread")]
async fn basic_merge_and_evaluate() {
    let repo = TestRepo::new();
    repo.stack(
        "dev.yaml",
        r#"
locals: { region: us-east-1, base: myapp }
components:
  terraform:
    vpc:
      vars:
        name: "{{ .locals.base }}-{{ .locals.region }}"
"#,
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let resolved = resolver
        .resolve_component(ComponentType::Terraform, "vpc", "dev", &mut rctx)
        .await
        .unwrap();
    assert_eq!(resolved.view["vars"]["name"], "myapp-us-east-1");
}

#[tokio::test(flavor = "multi_thread")]
async fn locals_are_isolated_across_imports() {
    let repo = TestRepo::new();
    repo.stack(
        "defaults.yaml",
        "locals: { shared: x }\nvars: { a: \"{{ .locals.shared }}\" }\n",
    );
    repo.stack(
        "prod.yaml",
        "import: [defaults]\nlocals: { own: y }\nvars: { b: \"{{ .locals.shared }}\" }\ncomponents:\n  terraform:\n    app:\n      vars: {}\n",
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let err = resolver
        .resolve_component(ComponentType::Terraform, "app", "prod", &mut rctx)
        .await
        .unwrap_err();

    match err.downcast::<AtmosError>().unwrap() {
        AtmosError::UndefinedLocal { name, file, .. } => {
            assert_eq!(name, "shared");
            assert!(file.ends_with("prod.yaml"), "wrong file: {}", file.display());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn imported_values_resolve_against_their_own_locals() {
    let repo = TestRepo::new();
    repo.stack(
        "defaults.yaml",
        "locals: { shared: x }\nvars: { a: \"{{ .locals.shared }}\" }\n",
    );
    repo.stack(
        "prod.yaml",
        "import: [defaults]\ncomponents:\n  terraform:\n    app:\n      vars: {}\n",
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let resolved = resolver
        .resolve_component(ComponentType::Terraform, "app", "prod", &mut rctx)
        .await
        .unwrap();
    // `a` came from defaults.yaml and resolved within that file's scope.
    assert_eq!(resolved.view["vars"]["a"], "x");
}

#[tokio::test(flavor = "multi_thread")]
async fn cross_component_state_cycle_is_detected() {
    let repo = TestRepo::new();
    repo.stack(
        "core.yaml",
        "components:\n  terraform:\n    vpc:\n      vars:\n        x: !terraform.state other staging\n",
    );
    repo.stack(
        "staging.yaml",
        "components:\n  terraform:\n    other:\n      vars:\n        y: !terraform.state vpc core\n",
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let err = resolver
        .resolve_component(ComponentType::Terraform, "vpc", "core", &mut rctx)
        .await
        .unwrap_err();

    match err.downcast::<AtmosError>().unwrap() {
        AtmosError::CircularDependency { chain, kinds } => {
            assert_eq!(chain, ["core/vpc", "staging/other", "core/vpc"]);
            assert_eq!(kinds, ["terraform.state", "terraform.state"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_precedence_and_inheritance() {
    let repo = TestRepo::new();
    repo.stack(
        "catalog/base.yaml",
        r#"
vars: { stage: unknown, region: us-east-1 }
components:
  terraform:
    defaults:
      metadata: { type: abstract }
      vars: { instance_type: t3.small, monitoring: true }
"#,
    );
    repo.stack(
        "dev.yaml",
        r#"
import: [catalog/base]
vars: { stage: dev }
components:
  terraform:
    app:
      metadata: { inherits: [defaults] }
      vars: { instance_type: m5.large }
"#,
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let resolved = resolver
        .resolve_component(ComponentType::Terraform, "app", "dev", &mut rctx)
        .await
        .unwrap();

    // Current file's global wins over the import.
    assert_eq!(resolved.view["vars"]["stage"], "dev");
    // Import-only value survives.
    assert_eq!(resolved.view["vars"]["region"], "us-east-1");
    // Inherited from the abstract ancestor.
    assert_eq!(resolved.view["vars"]["monitoring"], true);
    // Own value beats the ancestor's.
    assert_eq!(resolved.view["vars"]["instance_type"], "m5.large");
    assert_eq!(resolved.raw.inherits, vec!["defaults".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn provenance_chains_cover_every_leaf() {
    let repo = TestRepo::new();
    repo.stack("catalog/base.yaml", "vars: { region: us-east-1 }\n");
    repo.stack(
        "dev.yaml",
        "import: [catalog/base]\nvars: { region: eu-west-1 }\ncomponents:\n  terraform:\n    app:\n      vars: { name: app }\n",
    );

    let resolver = repo.resolver().await;
    let (_, raw) = resolver
        .raw_component(ComponentType::Terraform, "app", "dev")
        .await
        .unwrap();

    // The overridden global: import entry then override entry.
    let chain = raw.provenance.chain("vars.region");
    assert!(chain.len() >= 2, "chain too short: {chain:?}");
    assert_eq!(chain[0].kind, ProvenanceKind::Import);
    assert_eq!(chain[0].depth, 1);
    let last = chain.last().unwrap();
    assert_eq!(last.kind, ProvenanceKind::Override);
    assert!(last.file.ends_with("dev.yaml"));

    // The component-level leaf has provenance too.
    assert!(!raw.provenance.chain("vars.name").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_is_deterministic_across_runs() {
    let source_base = "vars: { b: 2, a: 1 }\ncomponents:\n  terraform:\n    app:\n      vars: { z: 9, y: 8 }\n";
    let mut serialized = Vec::new();
    for _ in 0..2 {
        let repo = TestRepo::new();
        repo.stack("dev.yaml", source_base);
        let resolver = repo.resolver().await;
        let mut rctx = ResolutionContext::new();
        let resolved = resolver
            .resolve_component(ComponentType::Terraform, "app", "dev", &mut rctx)
            .await
            .unwrap();
        serialized.push(serde_json::to_string(&resolved.view).unwrap());
    }
    assert_eq!(serialized[0], serialized[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_component_reports_available_names() {
    let repo = TestRepo::new();
    repo.stack(
        "dev.yaml",
        "components:\n  terraform:\n    vpc: { vars: {} }\n    eks: { vars: {} }\n",
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let err = resolver
        .resolve_component(ComponentType::Terraform, "vcp", "dev", &mut rctx)
        .await
        .unwrap_err();
    match err.downcast::<AtmosError>().unwrap() {
        AtmosError::ComponentNotFound { stack, available, .. } => {
            assert_eq!(stack, "dev");
            assert_eq!(available, ["eks", "vpc"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn atmos_component_helper_reads_other_stacks() {
    let repo = TestRepo::new();
    repo.stack(
        "shared.yaml",
        "components:\n  terraform:\n    dns:\n      vars: { zone: example.com }\n",
    );
    repo.stack(
        "dev.yaml",
        r#"
components:
  terraform:
    app:
      vars:
        dns_view: '{{ atmos.Component "dns" "shared" }}'
        fqdn: 'app.{{ atmos_component(component="dns", stack="shared").vars.zone }}'
"#,
    );

    let resolver = repo.resolver().await;
    let mut rctx = ResolutionContext::new();
    let resolved = resolver
        .resolve_component(ComponentType::Terraform, "app", "dev", &mut rctx)
        .await
        .unwrap();
    assert_eq!(resolved.view["vars"]["fqdn"], "app.example.com");
    assert_eq!(resolved.view["vars"]["dns_view"]["vars"]["zone"], "example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_scan_sees_only_scoped_raw_config() {
    let repo = TestRepo::new();
    repo.stack("static.yaml", "components:\n  terraform:\n    app: { vars: { a: 1 } }\n");
    repo.stack(
        "stateful.yaml",
        "components:\n  terraform:\n    app:\n      vars:\n        id: !terraform.state net core\n",
    );

    let resolver = repo.resolver().await;
    assert!(!resolver.scan_auth_patterns(&["static".to_string()]).await.unwrap());
    assert!(resolver.scan_auth_patterns(&["stateful".to_string()]).await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_tags_leave_functions_unevaluated() {
    let repo = TestRepo::new();
    repo.stack(
        "dev.yaml",
        "components:\n  terraform:\n    app:\n      vars:\n        who: !exec echo nope\n",
    );

    let mut options = atmos_cli::template::EvalOptions::default();
    options.skip_tags.insert("!exec".to_string());
    let resolver = repo.resolver_with(options).await;
    let mut rctx = ResolutionContext::new();
    let resolved = resolver
        .resolve_component(ComponentType::Terraform, "app", "dev", &mut rctx)
        .await
        .unwrap();
    assert_eq!(resolved.view["vars"]["who"], "!exec echo nope");
}
