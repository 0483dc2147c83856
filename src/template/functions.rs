//! Tagged YAML function grammar.
//!
//! A fixed set of tags is recognized on scalar values: `!template`,
//! `!exec`, `!env`, `!store` / `!store.get`, `!terraform.output`,
//! `!terraform.state`. Unknown tags are left literal. Each tag has an
//! argument grammar parsed here; evaluation lives in the evaluator so the
//! grammar stays testable without I/O.

use crate::core::AtmosError;
use crate::template::resolution::FunctionKind;

/// Tags this engine evaluates.
pub const KNOWN_TAGS: &[&str] =
    &["!template", "!exec", "!env", "!store", "!store.get", "!terraform.output", "!terraform.state"];

/// A parsed tagged-function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedFunction {
    /// `!template <template>`: render, then parse the result as YAML.
    Template {
        /// The template body.
        template: String,
    },
    /// `!exec <command>`: run a shell command, capture stdout.
    Exec {
        /// The command line, passed to `sh -c`.
        command: String,
    },
    /// `!env <NAME> [default]`: read an environment variable.
    Env {
        /// Variable name.
        name: String,
        /// Value when unset; unset without default is an error.
        default: Option<String>,
    },
    /// `!store <store> <key>` / `!store.get <store> <key>`.
    StoreGet {
        /// Configured store name.
        store: String,
        /// Key within the store.
        key: String,
    },
    /// `!terraform.output <component> [<stack>] <output>`.
    TerraformOutput {
        /// Target component.
        component: String,
        /// Target stack; the current stack when omitted.
        stack: Option<String>,
        /// Output name.
        output: String,
    },
    /// `!terraform.state <component> [<stack>] [<output>]`.
    TerraformState {
        /// Target component.
        component: String,
        /// Target stack; the current stack when omitted.
        stack: Option<String>,
        /// Output name; the whole outputs map when omitted.
        output: Option<String>,
    },
}

impl TaggedFunction {
    /// The cross-component kind, for resolution frames.
    pub fn function_kind(&self) -> Option<FunctionKind> {
        match self {
            Self::TerraformState { .. } => Some(FunctionKind::TerraformState),
            Self::TerraformOutput { .. } => Some(FunctionKind::TerraformOutput),
            _ => None,
        }
    }

    /// The tag this call was written with.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Template { .. } => "!template",
            Self::Exec { .. } => "!exec",
            Self::Env { .. } => "!env",
            Self::StoreGet { .. } => "!store",
            Self::TerraformOutput { .. } => "!terraform.output",
            Self::TerraformState { .. } => "!terraform.state",
        }
    }
}

/// Parse a tagged scalar.
///
/// Returns `None` for tags outside the fixed set (the caller leaves the
/// value literal), `Some(Err)` for a known tag with a malformed argument
/// list.
pub fn parse_tagged(tag: &str, payload: &str) -> Option<Result<TaggedFunction, AtmosError>> {
    let invalid = |message: String| AtmosError::InvalidFunctionCall {
        function: tag.to_string(),
        message,
    };

    match tag {
        "!template" => Some(Ok(TaggedFunction::Template { template: payload.to_string() })),
        "!exec" => Some(Ok(TaggedFunction::Exec { command: payload.to_string() })),
        "!env" => Some(match split_args(payload) {
            args if args.len() == 1 => {
                Ok(TaggedFunction::Env { name: args[0].clone(), default: None })
            }
            args if args.len() == 2 => Ok(TaggedFunction::Env {
                name: args[0].clone(),
                default: Some(args[1].clone()),
            }),
            args => Err(invalid(format!("expected NAME [default], got {} arguments", args.len()))),
        }),
        "!store" | "!store.get" => Some(match split_args(payload) {
            args if args.len() == 2 => {
                Ok(TaggedFunction::StoreGet { store: args[0].clone(), key: args[1].clone() })
            }
            args => Err(invalid(format!("expected STORE KEY, got {} arguments", args.len()))),
        }),
        "!terraform.output" => Some(match split_args(payload) {
            args if args.len() == 2 => Ok(TaggedFunction::TerraformOutput {
                component: args[0].clone(),
                stack: None,
                output: args[1].clone(),
            }),
            args if args.len() == 3 => Ok(TaggedFunction::TerraformOutput {
                component: args[0].clone(),
                stack: Some(args[1].clone()),
                output: args[2].clone(),
            }),
            args => Err(invalid(format!(
                "expected COMPONENT [STACK] OUTPUT, got {} arguments",
                args.len()
            ))),
        }),
        "!terraform.state" => Some(match split_args(payload) {
            args if args.len() == 1 => Ok(TaggedFunction::TerraformState {
                component: args[0].clone(),
                stack: None,
                output: None,
            }),
            args if args.len() == 2 => Ok(TaggedFunction::TerraformState {
                component: args[0].clone(),
                stack: Some(args[1].clone()),
                output: None,
            }),
            args if args.len() == 3 => Ok(TaggedFunction::TerraformState {
                component: args[0].clone(),
                stack: Some(args[1].clone()),
                output: Some(args[2].clone()),
            }),
            args => Err(invalid(format!(
                "expected COMPONENT [STACK] [OUTPUT], got {} arguments",
                args.len()
            ))),
        }),
        _ => None,
    }
}

/// Split a tagged payload into arguments, honoring quotes.
fn split_args(payload: &str) -> Vec<String> {
    shlex::split(payload.trim()).unwrap_or_else(|| {
        payload.split_whitespace().map(ToString::to_string).collect()
    })
}
