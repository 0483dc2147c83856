//! Command-line interface for Atmos.
//!
//! Each command group lives in its own module: `describe` and `list` are
//! pure projections, `terraform`/`helmfile`/`packer` dispatch to tool
//! runners, `workflow` runs declared step sequences, and unrecognized
//! subcommands route to the custom commands declared in the root
//! configuration.

pub mod common;
mod describe;
mod list;
mod tool;
mod validate;
mod workflow_cmd;

pub use common::GlobalArgs;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::core::ComponentType;

/// Stack-configuration and workflow orchestrator for infrastructure
/// tooling.
#[derive(Debug, Parser)]
#[command(name = "atmos", version, about, disable_help_subcommand = true)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect resolved configuration.
    #[command(subcommand)]
    Describe(describe::DescribeCommand),

    /// List stacks, components, workflows, and configuration slices.
    #[command(subcommand)]
    List(list::ListCommand),

    /// Run Terraform (or OpenTofu via `command` override) for a component.
    Terraform(tool::ToolArgs),

    /// Run Helmfile for a component.
    Helmfile(tool::ToolArgs),

    /// Run Packer for a component.
    Packer(tool::ToolArgs),

    /// Run a declared workflow.
    Workflow(workflow_cmd::WorkflowArgs),

    /// Validate configuration.
    #[command(subcommand)]
    Validate(validate::ValidateCommand),

    /// Print version information.
    Version,

    /// Custom commands declared in the root configuration.
    #[command(external_subcommand)]
    Custom(Vec<String>),
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let globals = self.globals;
        match self.command {
            Command::Describe(cmd) => cmd.run(&globals).await,
            Command::List(cmd) => cmd.run(&globals).await,
            Command::Terraform(args) => {
                tool::run_tool(ComponentType::Terraform, args, &globals).await
            }
            Command::Helmfile(args) => {
                tool::run_tool(ComponentType::Helmfile, args, &globals).await
            }
            Command::Packer(args) => tool::run_tool(ComponentType::Packer, args, &globals).await,
            Command::Workflow(args) => workflow_cmd::run_workflow(args, &globals).await,
            Command::Validate(cmd) => cmd.run(&globals).await,
            Command::Version => {
                println!("atmos {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            Command::Custom(raw) => workflow_cmd::run_custom(raw, &globals).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_tool_dispatch_with_tail() {
        let cli = Cli::parse_from([
            "atmos", "terraform", "plan", "vpc", "-s", "dev", "--", "-target", "aws_vpc.main",
        ]);
        match cli.command {
            Command::Terraform(args) => {
                assert_eq!(args.subcommand, "plan");
                assert_eq!(args.component, "vpc");
                assert_eq!(args.stack, "dev");
                assert_eq!(args.tail, ["-target", "aws_vpc.main"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_identity_flags() {
        let cli =
            Cli::parse_from(["atmos", "--identity", "deploy", "list", "stacks"]);
        assert_eq!(cli.globals.identity, ["deploy"]);
    }

    #[test]
    fn unknown_subcommand_routes_to_custom() {
        let cli = Cli::parse_from(["atmos", "mycmd", "arg1", "--flag", "v"]);
        match cli.command {
            Command::Custom(raw) => {
                assert_eq!(raw, ["mycmd", "arg1", "--flag", "v"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
