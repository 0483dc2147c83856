//! Atmos CLI entry point.
//!
//! Parses arguments, initializes logging, executes the command, and maps
//! errors to their stable exit codes.

use anyhow::Result;
use atmos_cli::cli;
use atmos_cli::core::user_friendly_error;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Logging level rules:
    // 1. RUST_LOG set: use it, regardless of --verbose
    // 2. --verbose without RUST_LOG: debug
    // 3. --quiet: errors only
    // 4. none of the above: off
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else if cli.globals.verbose {
        EnvFilter::new("debug")
    } else if cli.globals.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("off")
    };

    if cli.globals.no_color {
        colored::control::set_override(false);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(error) => {
            let ctx = user_friendly_error(error);
            let code = ctx.error.exit_code();
            ctx.display();
            std::process::exit(code);
        }
    }
}
