//! `atmos validate stacks`.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::core::AtmosError;
use crate::template::EvalOptions;

use super::common::{GlobalArgs, Invocation};

#[derive(Debug, Subcommand)]
pub enum ValidateCommand {
    /// Parse and merge every discovered stack, reporting all failures.
    Stacks,
}

impl ValidateCommand {
    /// Execute the subcommand.
    pub async fn run(self, globals: &GlobalArgs) -> Result<()> {
        match self {
            Self::Stacks => validate_stacks(globals).await,
        }
    }
}

/// Merge every stack; collect failures instead of stopping at the first.
async fn validate_stacks(globals: &GlobalArgs) -> Result<()> {
    let options = EvalOptions { process_functions: false, ..EvalOptions::default() };
    let invocation = Invocation::prepare(globals, options).await?;

    let names: Vec<String> =
        invocation.resolver.index().entries().map(|e| e.name.clone()).collect();
    let mut failures = Vec::new();
    for name in &names {
        if let Err(err) = invocation.resolver.merged_stack(name).await {
            failures.push((name.clone(), err));
        }
    }

    if failures.is_empty() {
        eprintln!("{} {} stacks validated", "✓".green(), names.len());
        return Ok(());
    }

    for (stack, err) in &failures {
        eprintln!("{} {stack}: {err:#}", "✗".red());
    }
    Err(AtmosError::InvalidConfiguration {
        message: format!("{} of {} stacks failed validation", failures.len(), names.len()),
    }
    .into())
}
