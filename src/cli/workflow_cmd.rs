//! `atmos workflow` and custom-command execution.

use anyhow::Result;
use clap::Args;

use crate::core::AtmosError;
use crate::template::EvalOptions;
use crate::workflow::{CommandInputs, NoInstaller, bind_inputs, load_workflow_manifest};

use super::common::{GlobalArgs, Invocation};

#[derive(Debug, Args)]
pub struct WorkflowArgs {
    /// Workflow name.
    pub name: String,

    /// Workflow manifest file under the workflows directory.
    #[arg(short, long)]
    pub file: Option<String>,

    /// Resume from the named step, skipping those before it.
    #[arg(long)]
    pub from_step: Option<String>,

    /// Arguments after `--`, exposed as `{{ .TrailingArgs }}`.
    #[arg(last = true)]
    pub tail: Vec<String>,
}

/// Run a named workflow.
pub async fn run_workflow(args: WorkflowArgs, globals: &GlobalArgs) -> Result<()> {
    let invocation = Invocation::prepare(globals, EvalOptions::default()).await?;
    let manifest = load_workflow_manifest(&invocation.config, args.file.as_deref())?;
    let inputs = CommandInputs { trailing: args.tail.clone(), ..Default::default() };
    crate::workflow::run_workflow(
        &invocation.config,
        &invocation.resolver.engine,
        &manifest,
        &args.name,
        args.from_step.as_deref(),
        &inputs,
        invocation.cancel.clone(),
    )
    .await
}

/// Route an unrecognized subcommand to the custom commands declared in
/// the root configuration.
pub async fn run_custom(raw: Vec<String>, globals: &GlobalArgs) -> Result<()> {
    let invocation = Invocation::prepare(globals, EvalOptions::default()).await?;
    let Some(name) = raw.first().cloned() else {
        return Err(AtmosError::Other { message: "empty custom command".to_string() }.into());
    };

    let command = invocation
        .config
        .commands
        .iter()
        .find(|c| c.name == name)
        .cloned()
        .ok_or_else(|| {
            let known: Vec<String> =
                invocation.config.commands.iter().map(|c| c.name.clone()).collect();
            let hint = crate::core::did_you_mean(&name, known.iter().map(String::as_str))
                .map(|s| format!(" (did you mean '{s}'?)"))
                .unwrap_or_default();
            AtmosError::Other { message: format!("unknown command '{name}'{hint}") }
        })?;

    let inputs = bind_inputs(&command, &raw[1..])?;
    crate::workflow::run_command(
        &invocation.config,
        &invocation.resolver.engine,
        &command,
        &inputs,
        &NoInstaller,
        invocation.cancel.clone(),
    )
    .await
}
