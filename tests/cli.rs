//! CLI-level integration tests driven through the binary.

mod common;

use assert_cmd::Command;
use common::TestRepo;
use predicates::prelude::*;

fn atmos(repo: &TestRepo) -> Command {
    let mut cmd = Command::cargo_bin("atmos").expect("binary builds");
    cmd.current_dir(repo.root());
    cmd.env_remove("ATMOS_CLI_CONFIG_PATH");
    cmd
}

#[test]
fn version_prints_and_exits_zero() {
    let repo = TestRepo::new();
    atmos(&repo).arg("version").assert().success().stdout(predicate::str::contains("atmos"));
}

#[test]
fn list_stacks_renders_json_rows() {
    let repo = TestRepo::new();
    repo.stack("dev.yaml", "components:\n  terraform:\n    vpc: { vars: {} }\n");
    repo.stack("prod.yaml", "components:\n  terraform:\n    vpc: { vars: {} }\n");

    atmos(&repo)
        .args(["list", "stacks", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"dev\""))
        .stdout(predicate::str::contains("\"name\": \"prod\""));
}

#[test]
fn describe_component_resolves_templates() {
    let repo = TestRepo::new();
    repo.stack(
        "dev.yaml",
        "locals: { base: myapp }\ncomponents:\n  terraform:\n    vpc:\n      vars:\n        name: \"{{ .locals.base }}-vpc\"\n",
    );

    atmos(&repo)
        .args(["describe", "component", "vpc", "-s", "dev", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name: myapp-vpc"));
}

#[test]
fn unknown_stack_exits_with_reference_code() {
    let repo = TestRepo::new();
    repo.stack("dev.yaml", "components:\n  terraform:\n    vpc: { vars: {} }\n");

    atmos(&repo)
        .args(["describe", "component", "vpc", "-s", "nope"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn cyclic_import_exits_with_cycle_code() {
    let repo = TestRepo::new();
    repo.stack("a.yaml", "import: [b]\ncomponents:\n  terraform:\n    x: { vars: {} }\n");
    repo.stack("b.yaml", "import: [a]\n");

    atmos(&repo)
        .args(["describe", "component", "x", "-s", "a"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cyclic import"));
}

#[test]
fn custom_command_preserves_passthrough_args() {
    let repo = TestRepo::new();
    repo.write(
        "atmos.yaml",
        r#"
stacks:
  base_path: stacks
commands:
  - name: mycmd
    description: echo the tail
    steps:
      - echo {{ .TrailingArgs }}
"#,
    );
    repo.stack("dev.yaml", "vars: {}\n");

    atmos(&repo)
        .args(["mycmd", "--", "echo", "hello  world", "$VAR", "a;b"])
        .assert()
        .success()
        // The double space survives and the metacharacters stay literal.
        .stdout(predicate::str::contains("hello  world"))
        .stdout(predicate::str::contains("$VAR"))
        .stdout(predicate::str::contains("a;b"));
}

#[test]
fn dry_run_prints_invocation_without_spawning() {
    let repo = TestRepo::new();
    repo.stack(
        "dev.yaml",
        "components:\n  terraform:\n    vpc:\n      vars: { name: x }\n",
    );
    repo.write("components/terraform/vpc/main.tf", "");

    atmos(&repo)
        .args(["terraform", "plan", "vpc", "-s", "dev", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("terraform plan"))
        .stdout(predicate::str::contains("components/terraform/vpc"));
}

#[test]
fn validate_stacks_reports_every_failure() {
    let repo = TestRepo::new();
    repo.stack("good.yaml", "vars: { a: 1 }\n");
    repo.stack("bad.yaml", "import: [missing-file]\n");

    atmos(&repo)
        .args(["validate", "stacks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad"));
}
