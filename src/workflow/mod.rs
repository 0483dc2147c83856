//! Custom commands and workflows.
//!
//! A `commands:` section in the root config declares named actions with
//! positional arguments, flags, tool dependencies, and a `steps:` list of
//! shell templates. Workflow manifests declare named step sequences that
//! mix shell steps with nested atmos invocations. Step templates render
//! against a context exposing `arguments`, `flags`, `component_config`,
//! and the shell-safe `trailing_args` (also addressable in the Go
//! spelling, `.Arguments` / `.TrailingArgs`).

pub mod tools;

pub use tools::{NoInstaller, ToolInstaller, check_tools};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AtmosConfig;
use crate::core::AtmosError;
use crate::template::{TemplateContext, TemplateEngine};
use crate::utils::{PassthroughArgs, ProcessCommand};

/// One custom command declared under `commands:`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Invocation name.
    pub name: String,
    /// One-line description for listings.
    pub description: String,
    /// Positional arguments, in order.
    pub arguments: Vec<ArgumentSpec>,
    /// Named flags.
    pub flags: Vec<FlagSpec>,
    /// Shell templates executed in order.
    pub steps: Vec<String>,
    /// Commands run before/after the steps.
    pub hooks: HooksConfig,
    /// Tool dependencies gating execution.
    pub dependencies: DependenciesConfig,
}

/// A positional argument declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentSpec {
    /// Argument name, addressable as `arguments.<name>`.
    pub name: String,
    /// Missing required arguments abort before any step runs.
    pub required: bool,
    /// Value when the argument is omitted.
    pub default: Option<String>,
}

/// A flag declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSpec {
    /// Flag name, addressable as `flags.<name>`.
    pub name: String,
    /// Single-letter shorthand.
    pub shorthand: Option<String>,
    /// Value when the flag is omitted.
    pub default: Option<String>,
}

/// Pre/post hook commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Run before the first step.
    pub before: Vec<String>,
    /// Run after the last step succeeds.
    pub after: Vec<String>,
}

/// Declared tool dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    /// Tool name → semver constraint.
    pub tools: BTreeMap<String, String>,
}

/// A workflow manifest file (`workflows/<name>.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowManifest {
    /// Named workflows.
    pub workflows: BTreeMap<String, Workflow>,
}

/// One named workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    /// One-line description for listings.
    pub description: String,
    /// Steps executed in order.
    pub steps: Vec<WorkflowStep>,
}

/// One workflow step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStep {
    /// Step name, used by `--from-step`.
    pub name: Option<String>,
    /// The command template.
    pub command: String,
    /// `shell` (default) or `atmos` (re-entrant invocation).
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Stack forwarded to atmos steps.
    pub stack: Option<String>,
}

/// How a workflow step executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Run through `sh -c`.
    #[default]
    Shell,
    /// Re-invoke the atmos binary with the command line.
    Atmos,
}

/// Inputs bound from the command line for one custom-command run.
#[derive(Debug, Clone, Default)]
pub struct CommandInputs {
    /// Positional values by declared name.
    pub arguments: BTreeMap<String, String>,
    /// Flag values by declared name.
    pub flags: BTreeMap<String, String>,
    /// Arguments after `--`, verbatim.
    pub trailing: Vec<String>,
    /// Resolved component config exposed as `component_config`.
    pub component_config: Option<Json>,
}

/// Bind raw CLI arguments against a command's declared shape.
pub fn bind_inputs(command: &CommandConfig, raw: &[String]) -> Result<CommandInputs, AtmosError> {
    let split = PassthroughArgs::split(raw);
    let mut inputs = CommandInputs { trailing: split.after, ..Default::default() };

    let mut positionals = Vec::new();
    let mut iter = split.before.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            let spec = command.flags.iter().find(|f| f.name == name);
            match (spec, iter.peek()) {
                (Some(_), Some(value)) => {
                    inputs.flags.insert(name.to_string(), (*value).clone());
                    iter.next();
                }
                (Some(_), None) => {
                    inputs.flags.insert(name.to_string(), "true".to_string());
                }
                (None, _) => {
                    return Err(AtmosError::InvalidConfiguration {
                        message: format!(
                            "command '{}' has no flag '--{name}'",
                            command.name
                        ),
                    });
                }
            }
        } else {
            positionals.push(arg.clone());
        }
    }

    for (i, spec) in command.arguments.iter().enumerate() {
        match positionals.get(i).cloned().or_else(|| spec.default.clone()) {
            Some(value) => {
                inputs.arguments.insert(spec.name.clone(), value);
            }
            None if spec.required => {
                return Err(AtmosError::InvalidConfiguration {
                    message: format!(
                        "command '{}' requires argument '{}'",
                        command.name, spec.name
                    ),
                });
            }
            None => {}
        }
    }
    for flag in &command.flags {
        if let Some(default) = &flag.default {
            inputs.flags.entry(flag.name.clone()).or_insert_with(|| default.clone());
        }
    }
    Ok(inputs)
}

/// Render one step template against the bound inputs.
pub fn render_step(
    engine: &TemplateEngine,
    origin: &str,
    template: &str,
    inputs: &CommandInputs,
) -> Result<String, AtmosError> {
    let mut ctx = TemplateContext::new();
    ctx.insert("arguments", &inputs.arguments);
    ctx.insert("flags", &inputs.flags);
    ctx.insert(
        "component_config",
        inputs.component_config.as_ref().unwrap_or(&Json::Object(Default::default())),
    );
    let quoted = crate::utils::quote_args(&inputs.trailing)
        .map_err(|e| AtmosError::Other { message: e.to_string() })?;
    ctx.insert("trailing_args", &quoted);
    engine.render(origin, template, &ctx)
}

/// Run a custom command: dependency gate, hooks, then each step.
pub async fn run_command(
    config: &AtmosConfig,
    engine: &TemplateEngine,
    command: &CommandConfig,
    inputs: &CommandInputs,
    installer: &dyn ToolInstaller,
    cancel: CancellationToken,
) -> Result<()> {
    check_tools(&command.dependencies.tools, &config.toolchain, installer).await?;

    for hook in &command.hooks.before {
        run_shell(hook, config, cancel.clone()).await?;
    }
    for (i, step) in command.steps.iter().enumerate() {
        let origin = format!("commands.{}.steps[{i}]", command.name);
        let rendered = render_step(engine, &origin, step, inputs)?;
        info!(command = command.name, step = i, "running step");
        run_shell(&rendered, config, cancel.clone()).await?;
    }
    for hook in &command.hooks.after {
        run_shell(hook, config, cancel.clone()).await?;
    }
    Ok(())
}

/// Load a workflow manifest by name from the workflows directory.
pub fn load_workflow_manifest(
    config: &AtmosConfig,
    file: Option<&str>,
) -> Result<WorkflowManifest, AtmosError> {
    let path = match file {
        Some(explicit) => config.workflows_dir().join(explicit),
        None => config.workflows_dir().join("workflows.yaml"),
    };
    let source =
        std::fs::read_to_string(&path).map_err(|e| AtmosError::FileSystemError {
            path: path.clone(),
            message: e.to_string(),
        })?;
    serde_yaml::from_str(&source).map_err(|e| AtmosError::InvalidManifest {
        file: path,
        path: None,
        message: e.to_string(),
    })
}

/// Run a named workflow, optionally resuming at `--from-step`.
pub async fn run_workflow(
    config: &AtmosConfig,
    engine: &TemplateEngine,
    manifest: &WorkflowManifest,
    name: &str,
    from_step: Option<&str>,
    inputs: &CommandInputs,
    cancel: CancellationToken,
) -> Result<()> {
    let workflow = manifest.workflows.get(name).ok_or_else(|| {
        let available: Vec<String> = manifest.workflows.keys().cloned().collect();
        AtmosError::InvalidConfiguration {
            message: format!(
                "workflow '{name}' not found (available: {})",
                available.join(", ")
            ),
        }
    })?;

    let mut started = from_step.is_none();
    for (i, step) in workflow.steps.iter().enumerate() {
        if !started {
            started = step.name.as_deref() == from_step;
            if !started {
                debug!(workflow = name, step = i, "skipped by --from-step");
                continue;
            }
        }
        let origin = format!("workflows.{name}.steps[{i}]");
        let rendered = render_step(engine, &origin, &step.command, inputs)?;
        match step.step_type {
            StepType::Shell => run_shell(&rendered, config, cancel.clone()).await?,
            StepType::Atmos => {
                let exe = std::env::current_exe()
                    .map_err(|e| AtmosError::Other { message: e.to_string() })?;
                let mut args =
                    shlex::split(&rendered).unwrap_or_else(|| vec![rendered.clone()]);
                if let Some(stack) = &step.stack {
                    args.extend(["-s".to_string(), stack.clone()]);
                }
                ProcessCommand::new(exe.display().to_string())
                    .args(args)
                    .cancel_token(cancel.clone())
                    .inherit_output()
                    .execute()
                    .await?;
            }
        }
    }

    if !started {
        return Err(AtmosError::InvalidConfiguration {
            message: format!(
                "workflow '{name}' has no step named '{}'",
                from_step.unwrap_or_default()
            ),
        }
        .into());
    }
    Ok(())
}

async fn run_shell(command: &str, config: &AtmosConfig, cancel: CancellationToken) -> Result<()> {
    ProcessCommand::new("sh")
        .args(["-c", command])
        .current_dir(&config.base_path)
        .cancel_token(cancel)
        .inherit_output()
        .execute()
        .await?;
    Ok(())
}
