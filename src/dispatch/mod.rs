//! Tool dispatch: the contract handed to Terraform/Helmfile/Packer runners.
//!
//! The core produces a fully resolved [`ToolInvocation`] (working
//! directory, vars, env list, binary override, passthrough tail) and the
//! runner spawns the subprocess. Spawned-process env is a strict function
//! of the component view plus the auth context; nothing else leaks in.

use anyhow::Result;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::{AuthContext, env::assemble_env_list};
use crate::core::AtmosError;
use crate::config::AtmosConfig;
use crate::stack::ResolvedComponent;
use crate::utils::ProcessCommand;

/// Everything a tool runner needs to spawn one subprocess.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Binary to spawn (`terraform`, `tofu`, `helmfile`, `packer`).
    pub command: String,
    /// Tool subcommand and arguments before the passthrough tail.
    pub args: Vec<String>,
    /// Resolved component working directory.
    pub working_dir: PathBuf,
    /// Resolved vars, to be materialized as a varfile or `-var` flags.
    pub vars: Json,
    /// Sorted `KEY=VALUE` env list for the child.
    pub env_list: Vec<String>,
    /// Arguments after `--`, forwarded verbatim.
    pub passthrough: Vec<String>,
}

impl ToolInvocation {
    /// Assemble an invocation from a resolved component.
    ///
    /// Abstract components are inheritance sources only and refuse to
    /// dispatch.
    pub fn build(
        config: &AtmosConfig,
        resolved: &ResolvedComponent,
        auth: Option<&AuthContext>,
        subcommand: &[String],
        passthrough: &[String],
    ) -> Result<Self, AtmosError> {
        if resolved.raw.is_abstract {
            return Err(AtmosError::InvalidConfiguration {
                message: format!(
                    "component '{}' is abstract and cannot be dispatched",
                    resolved.component
                ),
            });
        }

        let view = &resolved.view;
        let command = view
            .get("command")
            .and_then(Json::as_str)
            .unwrap_or(resolved.component_type.default_command())
            .to_string();

        // `metadata.component` (or the legacy top-level `component`) points
        // at the source folder when it differs from the component name.
        let source = view
            .get("metadata")
            .and_then(|m| m.get("component"))
            .or_else(|| view.get("component"))
            .and_then(Json::as_str)
            .unwrap_or(&resolved.component);
        let working_dir = config.components_dir(resolved.component_type).join(source);

        let declared: BTreeMap<String, String> = view
            .get("env")
            .and_then(Json::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.clone(), json_env_value(v)))
                    .collect()
            })
            .unwrap_or_default();
        let inherited: BTreeMap<String, String> = std::env::vars().collect();
        let env_list = match auth {
            Some(ctx) => assemble_env_list(&inherited, &declared, ctx),
            None => assemble_env_list(&inherited, &declared, &AuthContext::new()),
        };

        Ok(Self {
            command,
            args: subcommand.to_vec(),
            working_dir,
            vars: view.get("vars").cloned().unwrap_or_else(|| Json::Object(Default::default())),
            env_list,
            passthrough: passthrough.to_vec(),
        })
    }

    /// The vars as a JSON varfile body.
    pub fn varfile_json(&self) -> String {
        serde_json::to_string_pretty(&self.vars).unwrap_or_else(|_| "{}".to_string())
    }

    /// Human-readable rendering for `--dry-run` and logs.
    pub fn render(&self) -> String {
        let mut argv = vec![self.command.clone()];
        argv.extend(self.args.iter().cloned());
        argv.extend(self.passthrough.iter().cloned());
        format!("cd {} && {}", self.working_dir.display(), argv.join(" "))
    }

    /// Spawn the tool in its working directory with the assembled env
    /// and wait for it.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(command = self.command, dir = %self.working_dir.display(), "dispatching tool");

        let mut cmd = ProcessCommand::new(&self.command)
            .args(self.args.iter().cloned())
            .args(self.passthrough.iter().cloned())
            .current_dir(&self.working_dir)
            .cancel_token(cancel)
            .inherit_output();
        for entry in &self.env_list {
            if let Some((key, value)) = entry.split_once('=') {
                cmd = cmd.env(key, value);
            }
        }
        cmd.execute().await?;
        Ok(())
    }
}

/// Env values must be strings; scalars render bare, structures as JSON.
fn json_env_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ComponentType;
    use crate::stack::component::RawComponentView;
    use std::sync::Arc;

    fn resolved(view: Json, is_abstract: bool) -> ResolvedComponent {
        ResolvedComponent {
            component: "vpc".into(),
            stack: "dev".into(),
            component_type: ComponentType::Terraform,
            view,
            raw: Arc::new(RawComponentView {
                view: serde_yaml::Value::Null,
                provenance: crate::merge::ProvenanceStore::new(),
                inherits: vec![],
                is_abstract,
            }),
        }
    }

    fn config() -> AtmosConfig {
        let mut config = AtmosConfig::default();
        config.base_path = "/repo".into();
        config
    }

    #[test]
    fn builds_working_dir_from_metadata_component() {
        let view = serde_json::json!({
            "metadata": {"component": "vpc-flavors/ipv6"},
            "vars": {"name": "x"},
        });
        let invocation = ToolInvocation::build(
            &config(),
            &resolved(view, false),
            None,
            &["plan".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(
            invocation.working_dir,
            PathBuf::from("/repo/components/terraform/vpc-flavors/ipv6")
        );
        assert_eq!(invocation.command, "terraform");
    }

    #[test]
    fn command_override_selects_alternate_binary() {
        let view = serde_json::json!({"command": "tofu", "vars": {}});
        let invocation =
            ToolInvocation::build(&config(), &resolved(view, false), None, &[], &[]).unwrap();
        assert_eq!(invocation.command, "tofu");
    }

    #[test]
    fn abstract_components_refuse_dispatch() {
        let err = ToolInvocation::build(
            &config(),
            &resolved(serde_json::json!({}), true),
            None,
            &[],
            &[],
        )
        .unwrap_err();
        assert!(err.to_string().contains("abstract"));
    }

    #[test]
    fn declared_env_reaches_the_list() {
        let view = serde_json::json!({"env": {"TF_VAR_region": "us-east-1", "COUNT": 3}});
        let invocation =
            ToolInvocation::build(&config(), &resolved(view, false), None, &[], &[]).unwrap();
        assert!(invocation.env_list.contains(&"TF_VAR_region=us-east-1".to_string()));
        assert!(invocation.env_list.contains(&"COUNT=3".to_string()));
    }

    #[test]
    fn render_includes_passthrough_tail() {
        let view = serde_json::json!({"vars": {}});
        let invocation = ToolInvocation::build(
            &config(),
            &resolved(view, false),
            None,
            &["plan".to_string()],
            &["-target".to_string(), "aws_vpc.main".to_string()],
        )
        .unwrap();
        assert!(invocation.render().contains("terraform plan -target aws_vpc.main"));
    }
}
