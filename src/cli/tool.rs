//! Tool dispatch commands: `atmos terraform|helmfile|packer`.

use anyhow::Result;
use clap::Args;

use crate::core::ComponentType;
use crate::dispatch::ToolInvocation;
use crate::template::{EvalOptions, ResolutionContext};

use super::common::{GlobalArgs, Invocation};

/// Arguments shared by the three tool commands.
#[derive(Debug, Args)]
pub struct ToolArgs {
    /// Tool subcommand (`plan`, `apply`, `sync`, `build`, ...).
    pub subcommand: String,

    /// Component name.
    pub component: String,

    /// Stack name or manifest path.
    #[arg(short, long)]
    pub stack: String,

    /// Print the resolved invocation without spawning.
    #[arg(long)]
    pub dry_run: bool,

    /// Arguments after `--`, forwarded to the tool verbatim.
    #[arg(last = true)]
    pub tail: Vec<String>,
}

/// Resolve and dispatch one component to its tool runner.
pub async fn run_tool(ty: ComponentType, args: ToolArgs, globals: &GlobalArgs) -> Result<()> {
    let invocation = Invocation::prepare(globals, EvalOptions::default()).await?;
    let scoped = vec![args.stack.clone()];
    let auth = invocation.materialize_auth(&scoped, true).await?;

    let mut rctx = ResolutionContext::new();
    let resolved = invocation
        .resolver
        .resolve_component(ty, &args.component, &args.stack, &mut rctx)
        .await?;
    let tool = ToolInvocation::build(
        &invocation.config,
        &resolved,
        auth.as_deref(),
        std::slice::from_ref(&args.subcommand),
        &args.tail,
    )?;

    if args.dry_run {
        println!("{}", tool.render());
        println!("# varfile:\n{}", tool.varfile_json());
        return Ok(());
    }
    tool.run(invocation.cancel.clone()).await
}
