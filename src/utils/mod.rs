//! Cross-cutting utilities: subprocess execution, backoff, shell quoting,
//! and path validation.

pub mod backoff;
pub mod paths;
pub mod process;
pub mod shell;

pub use process::{ProcessCommand, ProcessOutput};
pub use shell::{PassthroughArgs, quote_args};
