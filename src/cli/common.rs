//! Shared invocation context for CLI commands.
//!
//! Builds the resolver and the lazy auth handle from global flags. Auth
//! follows the lazy contract: explicit `--identity NAME` authenticates
//! immediately, `--identity false` disables outright, and the default
//! path scans the scoped raw manifests before deciding.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::lazy::AuthRequest;
use crate::auth::namespace::{CredentialPaths, resolve_namespace};
use crate::auth::{LazyAuthHandle, StaticAuthManager};
use crate::config::{AtmosConfig, load_config};
use crate::stack::StackResolver;
use crate::template::EvalOptions;

/// Global flags shared by every command.
#[derive(Debug, Clone, clap::Args)]
pub struct GlobalArgs {
    /// Path to the root configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Identity to authenticate (repeatable); `false` disables auth.
    #[arg(long, global = true)]
    pub identity: Vec<String>,
}

/// Everything a command needs to run.
pub struct Invocation {
    /// Loaded root configuration.
    pub config: AtmosConfig,
    /// The resolution pipeline.
    pub resolver: StackResolver,
    /// Lazily-initialized auth.
    pub auth_request: AuthRequest,
    /// Cancellation root, wired to Ctrl-C.
    pub cancel: CancellationToken,
}

impl Invocation {
    /// Load config and build the resolver with the given eval options.
    pub async fn prepare(globals: &GlobalArgs, options: EvalOptions) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let config = load_config(globals.config.as_deref(), &cwd)?;

        let cancel = CancellationToken::new();
        let ctrl_c_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_token.cancel();
            }
        });

        let resolver = StackResolver::build(config.clone(), options, cancel.clone()).await?;
        let auth_request = AuthRequest::from_flags(&globals.identity);
        Ok(Self { config, resolver, auth_request, cancel })
    }

    /// Build the lazy auth handle after scanning the scoped stacks.
    ///
    /// `scoped_stacks` narrows the scan; `process_functions` mirrors the
    /// caller's eval options; scanning is skipped entirely when both say
    /// no auth can be needed.
    pub async fn auth_handle(
        &self,
        scoped_stacks: &[String],
        process_functions: bool,
    ) -> Result<LazyAuthHandle> {
        let manager = Arc::new(StaticAuthManager::new(
            self.config.auth.identities.clone(),
            CredentialPaths::default_base(resolve_namespace(
                self.config.auth.namespace.as_deref(),
                &self.config.config_path,
            )),
        ));

        let patterns_present = match self.auth_request {
            // Explicit identity always authenticates; disable never does.
            // Only Auto needs the scan, and only when functions will run.
            AuthRequest::Auto if process_functions => {
                self.resolver.scan_auth_patterns(scoped_stacks).await?
            }
            _ => false,
        };

        Ok(LazyAuthHandle::new(self.auth_request.clone(), manager, patterns_present))
    }

    /// Materialize auth (if warranted), install it on the resolver, and
    /// return it for env derivation.
    pub async fn materialize_auth(
        &self,
        scoped_stacks: &[String],
        process_functions: bool,
    ) -> Result<Option<std::sync::Arc<crate::auth::AuthContext>>> {
        let handle = self.auth_handle(scoped_stacks, process_functions).await?;
        let auth = handle.get().await?;
        self.resolver.set_auth(auth.clone());
        Ok(auth)
    }
}
