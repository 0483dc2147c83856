//! `atmos describe` subcommands.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::collections::HashSet;

use crate::core::ComponentType;
use crate::describe::format::{OutputFormat, emit_value};
use crate::template::EvalOptions;

use super::common::{GlobalArgs, Invocation};

/// Inspect resolved configuration.
#[derive(Debug, Subcommand)]
pub enum DescribeCommand {
    /// Fully-resolved view of one component in one stack.
    Component(DescribeComponentArgs),
    /// Stack documents; file-scoped with `--stack`.
    Stacks(DescribeStacksArgs),
    /// Resolved locals per file of one stack.
    Locals(DescribeLocalsArgs),
    /// Effective root configuration after env overrides.
    Config(DescribeConfigArgs),
}

#[derive(Debug, Args)]
pub struct DescribeComponentArgs {
    /// Component name.
    pub component: String,

    /// Stack name or manifest path.
    #[arg(short, long)]
    pub stack: String,

    /// Component type.
    #[arg(long, default_value = "terraform")]
    pub r#type: String,

    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: String,

    /// Include provenance chains per path.
    #[arg(long)]
    pub provenance: bool,

    /// Tags to leave unevaluated (repeatable), e.g. `!exec`.
    #[arg(long = "skip")]
    pub skip: Vec<String>,

    /// Disable tagged-function evaluation entirely.
    #[arg(long)]
    pub no_functions: bool,
}

#[derive(Debug, Args)]
pub struct DescribeStacksArgs {
    /// Restrict to one stack, file-scoped (no imports).
    #[arg(long)]
    pub stack: Option<String>,

    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: String,
}

#[derive(Debug, Args)]
pub struct DescribeLocalsArgs {
    /// Stack name or manifest path.
    #[arg(short, long)]
    pub stack: String,

    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: String,
}

#[derive(Debug, Args)]
pub struct DescribeConfigArgs {
    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: String,
}

impl DescribeCommand {
    /// Execute the subcommand.
    pub async fn run(self, globals: &GlobalArgs) -> Result<()> {
        match self {
            Self::Component(args) => {
                let options = EvalOptions {
                    process_functions: !args.no_functions,
                    skip_tags: args.skip.iter().cloned().collect::<HashSet<_>>(),
                    ..EvalOptions::default()
                };
                let process_functions = options.process_functions;
                let invocation = Invocation::prepare(globals, options).await?;
                let scoped = vec![args.stack.clone()];
                invocation.materialize_auth(&scoped, process_functions).await?;

                let ty: ComponentType = args.r#type.parse()?;
                let view = crate::describe::describe_component(
                    &invocation.resolver,
                    ty,
                    &args.component,
                    &args.stack,
                    args.provenance,
                )
                .await?;
                emit_value(args.format.parse::<OutputFormat>()?, &view)
            }
            Self::Stacks(args) => {
                let options =
                    EvalOptions { process_functions: false, ..EvalOptions::default() };
                let invocation = Invocation::prepare(globals, options).await?;
                let view =
                    crate::describe::describe_stacks(&invocation.resolver, args.stack.as_deref())
                        .await?;
                emit_value(args.format.parse::<OutputFormat>()?, &view)
            }
            Self::Locals(args) => {
                let options =
                    EvalOptions { process_functions: false, ..EvalOptions::default() };
                let invocation = Invocation::prepare(globals, options).await?;
                let view =
                    crate::describe::describe_locals(&invocation.resolver, &args.stack).await?;
                emit_value(args.format.parse::<OutputFormat>()?, &view)
            }
            Self::Config(args) => {
                let invocation =
                    Invocation::prepare(globals, EvalOptions::default()).await?;
                let view = serde_json::to_value(&invocation.config)?;
                emit_value(args.format.parse::<OutputFormat>()?, &view)
            }
        }
    }
}
