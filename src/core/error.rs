//! Error handling for Atmos.
//!
//! The error system is built around two types:
//! - [`AtmosError`] - strongly-typed error variants for every failure mode in
//!   the stack-configuration engine
//! - [`ErrorContext`] - wrapper adding actionable hints and a key/value
//!   context bag for CLI display
//!
//! Every variant maps onto a stable [`ErrorKind`], and each kind maps onto a
//! stable process exit code. Errors crossing a component boundary are never
//! reformatted: the merge engine returns import-resolver errors as-is, the
//! evaluator returns auth errors as-is. Wrapping (via [`anyhow::Context`])
//! preserves the cause chain; the original [`AtmosError`] stays
//! downcastable at the CLI boundary.

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Joiner used when rendering dependency cycles.
pub const CYCLE_ARROW: &str = " → ";

/// Stable error categories surfaced to the CLI.
///
/// Exit codes are part of the public contract and must not be renumbered
/// across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// YAML parse failure, schema violation, or unknown required field.
    InvalidManifest,
    /// A cycle in the import graph.
    CyclicImport,
    /// A cycle between locals within one file.
    CyclicLocal,
    /// A cycle in the cross-component expression graph.
    CyclicExpression,
    /// A local, component, stack, or store that does not exist.
    UndefinedReference,
    /// Authentication needed but not available.
    AuthRequired,
    /// Authentication was attempted and failed.
    AuthFailed,
    /// Credentials exist but are no longer valid (rotated or revoked).
    CredentialsInvalid,
    /// Remote state read failure.
    BackendError,
    /// `!exec` or tool execution failure.
    SubprocessFailed,
    /// Tool version constraints cannot be satisfied.
    ConstraintConflict,
    /// Misconfigured root: bad name pattern, duplicate stack names,
    /// missing base paths.
    InvalidConfiguration,
    /// Everything else, including I/O.
    Internal,
}

impl ErrorKind {
    /// Stable process exit code for this kind.
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InvalidManifest => 2,
            Self::CyclicImport => 3,
            Self::CyclicLocal => 4,
            Self::CyclicExpression => 5,
            Self::UndefinedReference => 6,
            Self::AuthRequired => 7,
            Self::AuthFailed => 8,
            Self::CredentialsInvalid => 9,
            Self::BackendError => 10,
            Self::SubprocessFailed => 11,
            Self::ConstraintConflict => 12,
            Self::InvalidConfiguration => 13,
            Self::Internal => 1,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidManifest => "InvalidManifest",
            Self::CyclicImport => "CyclicImport",
            Self::CyclicLocal => "CyclicLocal",
            Self::CyclicExpression => "CyclicExpression",
            Self::UndefinedReference => "UndefinedReference",
            Self::AuthRequired => "AuthRequired",
            Self::AuthFailed => "AuthFailed",
            Self::CredentialsInvalid => "CredentialsInvalid",
            Self::BackendError => "BackendError",
            Self::SubprocessFailed => "SubprocessFailed",
            Self::ConstraintConflict => "ConstraintConflict",
            Self::InvalidConfiguration => "InvalidConfiguration",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Render a dependency cycle as `a → b → a`.
pub fn render_chain<S: AsRef<str>>(chain: &[S]) -> String {
    chain.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(CYCLE_ARROW)
}

/// The main error type for Atmos operations.
///
/// Each variant represents a specific failure mode and carries the context
/// needed to print an actionable message: file paths, dependency chains,
/// identity names. Variants are grouped by the subsystem that produces them.
#[derive(Error, Debug)]
pub enum AtmosError {
    /// Manifest failed to parse or violated the schema.
    #[error("invalid manifest {file}: {message}")]
    InvalidManifest {
        /// File that failed to parse or validate.
        file: PathBuf,
        /// JSONPath of the offending node, when known.
        path: Option<String>,
        /// Parser or validator message.
        message: String,
    },

    /// A file re-entered its own import chain.
    #[error("cyclic import detected: {}", render_chain(chain))]
    CyclicImport {
        /// The offending files, each exactly once, closed by the re-entered file.
        chain: Vec<String>,
    },

    /// Import nesting exceeded the configured bound.
    #[error("import depth {depth} exceeds maximum {max} at {file}")]
    MaxDepthExceeded {
        /// Depth at which resolution stopped.
        depth: u32,
        /// The configured bound.
        max: u32,
        /// File whose imports pushed past the bound.
        file: PathBuf,
    },

    /// A fetch or transformation adapter could not produce the import.
    #[error("unable to resolve import '{import}': {reason}")]
    UnresolvableImport {
        /// The import path as written in the manifest.
        import: String,
        /// Adapter failure detail.
        reason: String,
    },

    /// Locals within one file form a cycle.
    #[error("circular locals in {file}: {}", render_chain(chain))]
    CircularLocal {
        /// File whose locals are cyclic.
        file: PathBuf,
        /// Minimal cycle, closed (first element repeated last).
        chain: Vec<String>,
    },

    /// A template referenced a local not defined in the same file.
    #[error("undefined local '{name}' in {file}")]
    UndefinedLocal {
        /// The missing identifier.
        name: String,
        /// File whose expression referenced it.
        file: PathBuf,
        /// Locals that are in scope, for the error report.
        available: Vec<String>,
        /// Closest in-scope name by edit distance, if any is close enough.
        did_you_mean: Option<String>,
    },

    /// Cross-component expressions form a cycle.
    #[error("circular dependency detected: {}", render_chain(chain))]
    CircularDependency {
        /// `component (stack)` frames, closed by the re-entered frame.
        chain: Vec<String>,
        /// Function kind per edge (`terraform.state`, `atmos.Component`, ...).
        kinds: Vec<String>,
    },

    /// A named stack does not exist in the index.
    #[error("stack '{stack}' not found")]
    StackNotFound {
        /// The requested logical name or manifest path.
        stack: String,
        /// Known stack names for the suggestion list.
        available: Vec<String>,
    },

    /// A component is not defined in the given stack.
    #[error("component '{component}' not found in stack '{stack}'")]
    ComponentNotFound {
        /// Requested component.
        component: String,
        /// Stack that was searched.
        stack: String,
        /// Components that exist in that stack.
        available: Vec<String>,
    },

    /// Template failed to parse or render.
    #[error("template error in {context}: {message}")]
    TemplateError {
        /// Where the template came from (file or JSONPath).
        context: String,
        /// Engine message, already cleaned up for display.
        message: String,
    },

    /// A tagged function was invoked with a malformed argument list.
    #[error("invalid arguments to {function}: {message}")]
    InvalidFunctionCall {
        /// The tag, e.g. `!terraform.state`.
        function: String,
        /// What was wrong.
        message: String,
    },

    /// An expression requires credentials that were never materialized.
    #[error("authentication required by {function}")]
    AuthRequired {
        /// The expression or subsystem demanding credentials.
        function: String,
        /// Identity that would satisfy it, when one is configured.
        identity: Option<String>,
    },

    /// The auth collaborator failed to authenticate an identity.
    #[error("authentication failed for identity '{identity}'")]
    AuthFailed {
        /// Identity that failed.
        identity: String,
        /// Provider family (`aws`, `github`, ...).
        provider: String,
        /// Underlying reason.
        reason: String,
    },

    /// Stored credentials were rejected (rotated or revoked keys).
    #[error("credentials for identity '{identity}' are no longer valid")]
    CredentialsInvalid {
        /// Identity whose credentials were rejected.
        identity: String,
        /// Classification detail (e.g. the STS error code).
        reason: String,
    },

    /// Remote state read failure.
    #[error("backend error ({backend}): {reason}")]
    BackendError {
        /// Backend type, e.g. `s3`.
        backend: String,
        /// Read failure detail.
        reason: String,
    },

    /// A component must read state but its backend type is not supported.
    #[error("unsupported backend type '{backend}' (allowed: {})", allowed.join(", "))]
    UnsupportedBackendType {
        /// The declared backend type.
        backend: String,
        /// Backend types this build can read.
        allowed: Vec<String>,
    },

    /// A named store does not exist in the root configuration.
    #[error("store '{store}' is not configured")]
    StoreNotFound {
        /// The requested store name.
        store: String,
        /// Stores that are configured.
        available: Vec<String>,
    },

    /// `!exec` or a dispatched tool exited non-zero or timed out.
    #[error("subprocess failed: {command}")]
    SubprocessFailed {
        /// The command line that failed.
        command: String,
        /// Exit code when the process exited; `None` on timeout or signal.
        code: Option<i32>,
        /// Captured stderr, possibly truncated.
        stderr: String,
    },

    /// A declared tool dependency cannot be satisfied.
    #[error("tool '{tool}' does not satisfy constraint '{constraint}'")]
    ConstraintConflict {
        /// Tool name as declared under `dependencies.tools`.
        tool: String,
        /// The version constraint.
        constraint: String,
        /// Version found on the system, if the tool exists at all.
        found: Option<String>,
    },

    /// Root configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// What is wrong with the root config.
        message: String,
    },

    /// Two manifests derive the same logical stack name.
    #[error("duplicate stack name '{name}'")]
    DuplicateStackName {
        /// The colliding logical name.
        name: String,
        /// First manifest deriving it.
        first: PathBuf,
        /// Second manifest deriving it.
        second: PathBuf,
    },

    /// Filesystem operation failure with path context.
    #[error("file system error at {path}: {message}")]
    FileSystemError {
        /// Path the operation touched.
        path: PathBuf,
        /// Operation detail.
        message: String,
    },

    /// Standard I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML syntax error outside of a tracked manifest.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Catch-all for errors that do not fit other categories.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl AtmosError {
    /// The stable category this error surfaces as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidManifest { .. } => ErrorKind::InvalidManifest,
            Self::CyclicImport { .. }
            | Self::MaxDepthExceeded { .. }
            | Self::UnresolvableImport { .. } => ErrorKind::CyclicImport,
            Self::CircularLocal { .. } => ErrorKind::CyclicLocal,
            Self::CircularDependency { .. } => ErrorKind::CyclicExpression,
            Self::UndefinedLocal { .. }
            | Self::StackNotFound { .. }
            | Self::ComponentNotFound { .. }
            | Self::StoreNotFound { .. } => ErrorKind::UndefinedReference,
            Self::AuthRequired { .. } => ErrorKind::AuthRequired,
            Self::AuthFailed { .. } => ErrorKind::AuthFailed,
            Self::CredentialsInvalid { .. } => ErrorKind::CredentialsInvalid,
            Self::BackendError { .. } | Self::UnsupportedBackendType { .. } => {
                ErrorKind::BackendError
            }
            Self::SubprocessFailed { .. } => ErrorKind::SubprocessFailed,
            Self::ConstraintConflict { .. } => ErrorKind::ConstraintConflict,
            Self::InvalidConfiguration { .. } | Self::DuplicateStackName { .. } => {
                ErrorKind::InvalidConfiguration
            }
            Self::TemplateError { .. } | Self::InvalidFunctionCall { .. } => {
                ErrorKind::InvalidManifest
            }
            Self::FileSystemError { .. }
            | Self::IoError(_)
            | Self::YamlError(_)
            | Self::Other { .. } => ErrorKind::Internal,
        }
    }

    /// Exit code the CLI should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

/// Wrapper adding hints and a context bag to an [`AtmosError`] for display.
///
/// Hints are actionable steps printed one per line in green; the context bag
/// is a compact key/value table (identity, provider, file, chain, ...)
/// printed dimmed below the message.
pub struct ErrorContext {
    /// The underlying error.
    pub error: AtmosError,
    /// Actionable hints, each printed on its own line.
    pub hints: Vec<String>,
    /// Key/value context pairs.
    pub context: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context with no hints or context pairs.
    #[must_use]
    pub const fn new(error: AtmosError) -> Self {
        Self { error, hints: Vec::new(), context: Vec::new() }
    }

    /// Add an actionable hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Add a key/value pair to the context table.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// Layout: `error[Kind]: message`, then each hint in green, then the
    /// context table dimmed.
    pub fn display(&self) {
        eprintln!(
            "{}{}{}{} {}",
            "error[".red().bold(),
            self.error.kind().to_string().red().bold(),
            "]".red().bold(),
            ":".red().bold(),
            self.error
        );

        for hint in &self.hints {
            eprintln!("{}: {}", "hint".green(), hint);
        }

        if !self.context.is_empty() {
            let width = self.context.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in &self.context {
                eprintln!("  {:>width$}: {}", key.dimmed(), value, width = width);
            }
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error.kind(), self.error)?;
        for hint in &self.hints {
            write!(f, "\nhint: {hint}")?;
        }
        for (key, value) in &self.context {
            write!(f, "\n  {key}: {value}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Convert any error into a displayable [`ErrorContext`].
///
/// Downcasts to [`AtmosError`] when possible and attaches kind-specific
/// hints; everything else becomes [`AtmosError::Other`] with the full cause
/// chain flattened into the message.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let error = match error.downcast::<AtmosError>() {
        Ok(e) => e,
        Err(other) => {
            let message = other.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ");
            return ErrorContext::new(AtmosError::Other { message });
        }
    };

    let mut hints: Vec<String> = Vec::new();
    let mut context: Vec<(String, String)> = Vec::new();

    match &error {
        AtmosError::CyclicImport { chain } => {
            hints.push("remove one of the imports to break the cycle".into());
            context.push(("chain".into(), render_chain(chain)));
        }
        AtmosError::CircularLocal { file, chain } => {
            hints.push("rewrite one local so it no longer references the others".into());
            context.push(("file".into(), file.display().to_string()));
            context.push(("chain".into(), render_chain(chain)));
        }
        AtmosError::CircularDependency { chain, kinds } => {
            hints.push("break the cycle by reading the value from a store or a var instead".into());
            context.push(("chain".into(), render_chain(chain)));
            context.push(("kinds".into(), kinds.join(", ")));
        }
        AtmosError::UndefinedLocal { file, available, did_you_mean, .. } => {
            if let Some(name) = did_you_mean {
                hints.push(format!("did you mean '{name}'?"));
            }
            context.push(("file".into(), file.display().to_string()));
            context.push(("available locals".into(), available.join(", ")));
        }
        AtmosError::StackNotFound { available, .. } => {
            context.push(("available stacks".into(), available.join(", ")));
        }
        AtmosError::ComponentNotFound { available, .. } => {
            context.push(("available components".into(), available.join(", ")));
        }
        AtmosError::AuthRequired { identity, .. } => {
            hints.push(match identity {
                Some(name) => format!("authenticate with `--identity {name}`"),
                None => "declare an identity under auth.identities and pass --identity".into(),
            });
        }
        AtmosError::CredentialsInvalid { identity, .. } => {
            hints.push(format!("re-authenticate identity '{identity}'; stored keys were rejected"));
            hints.push("if keys were rotated, update the provider configuration".into());
        }
        AtmosError::UnsupportedBackendType { allowed, .. } => {
            context.push(("allowed backends".into(), allowed.join(", ")));
        }
        AtmosError::ConstraintConflict { tool, .. } => {
            hints.push(format!("install a matching version of '{tool}' or relax the constraint"));
        }
        AtmosError::MaxDepthExceeded { .. } => {
            hints.push("flatten the import hierarchy or raise the depth limit".into());
        }
        _ => {}
    }

    let mut ctx = ErrorContext::new(error);
    ctx.hints = hints;
    ctx.context = context;
    ctx
}

/// Suggest the closest name from `candidates` within a 50% edit-distance
/// threshold, shared by every "did you mean" site.
pub fn did_you_mean<'a, I>(target: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = target.len().div_ceil(2).max(1);
    candidates
        .into_iter()
        .map(|c| (strsim::levenshtein(target, c), c))
        .filter(|(d, _)| *d <= threshold)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ErrorKind::InvalidManifest.exit_code(), 2);
        assert_eq!(ErrorKind::CyclicImport.exit_code(), 3);
        assert_eq!(ErrorKind::CyclicLocal.exit_code(), 4);
        assert_eq!(ErrorKind::CyclicExpression.exit_code(), 5);
        assert_eq!(ErrorKind::UndefinedReference.exit_code(), 6);
        assert_eq!(ErrorKind::SubprocessFailed.exit_code(), 11);
        assert_eq!(ErrorKind::Internal.exit_code(), 1);
    }

    #[test]
    fn kind_mapping_covers_reference_errors() {
        let err = AtmosError::UndefinedLocal {
            name: "regon".into(),
            file: "stacks/dev.yaml".into(),
            available: vec!["region".into(), "base".into()],
            did_you_mean: Some("region".into()),
        };
        assert_eq!(err.kind(), ErrorKind::UndefinedReference);
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn chain_rendering_uses_arrow_joiner() {
        let err = AtmosError::CyclicImport {
            chain: vec!["a.yaml".into(), "b.yaml".into(), "a.yaml".into()],
        };
        assert_eq!(err.to_string(), "cyclic import detected: a.yaml → b.yaml → a.yaml");
    }

    #[test]
    fn did_you_mean_respects_threshold() {
        let names = ["region", "environment", "stage"];
        assert_eq!(did_you_mean("regin", names.iter().copied()), Some("region".into()));
        assert_eq!(did_you_mean("zzzzzz", names.iter().copied()), None);
    }

    #[test]
    fn unknown_errors_flatten_cause_chain() {
        let err = anyhow::anyhow!("outer").context("inner context");
        let ctx = user_friendly_error(err);
        assert!(ctx.to_string().contains("inner context"));
    }
}
