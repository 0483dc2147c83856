//! Separator-aware passthrough arguments and shell-safe quoting.
//!
//! Arguments after `--` on the command line are forwarded to tools without
//! corruption. Two renderings are produced: the raw `Vec<String>` for direct
//! subprocess invocation, and a shell-quoted string for template contexts
//! (`{{ trailing_args }}` in custom command steps). Joining with a plain
//! space is never safe once the result is re-parsed by a shell; quoting
//! goes through `shlex`.

use anyhow::{Result, anyhow};

/// Argument-list split at the first `--` separator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassthroughArgs {
    /// Arguments before the separator.
    pub before: Vec<String>,
    /// Arguments after the separator, exactly as the user supplied them.
    pub after: Vec<String>,
    /// Whether a separator was present at all.
    pub had_separator: bool,
}

impl PassthroughArgs {
    /// Split `args` at the first `--`.
    ///
    /// `before` + `--` + `after` reassembles the original list; without a
    /// separator everything lands in `before`.
    pub fn split(args: &[String]) -> Self {
        match args.iter().position(|a| a == "--") {
            Some(idx) => Self {
                before: args[..idx].to_vec(),
                after: args[idx + 1..].to_vec(),
                had_separator: true,
            },
            None => Self { before: args.to_vec(), after: Vec::new(), had_separator: false },
        }
    }

    /// Shell-safe quoted rendering of the tail for template contexts.
    pub fn quoted_tail(&self) -> Result<String> {
        quote_args(&self.after)
    }
}

/// Quote an argument list so a conformant shell parses it back verbatim.
///
/// Whitespace, metacharacters, empty strings, and newlines all round-trip.
pub fn quote_args<S: AsRef<str>>(args: &[S]) -> Result<String> {
    let mut quoted = Vec::with_capacity(args.len());
    for arg in args {
        let arg = arg.as_ref();
        let q = shlex::try_quote(arg)
            .map_err(|e| anyhow!("argument {arg:?} cannot be shell-quoted: {e}"))?;
        quoted.push(q.into_owned());
    }
    Ok(quoted.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn split_preserves_tail_exactly() {
        let args = strings(&["plan", "-s", "dev", "--", "-target", "aws_vpc.main"]);
        let split = PassthroughArgs::split(&args);
        assert_eq!(split.before, strings(&["plan", "-s", "dev"]));
        assert_eq!(split.after, strings(&["-target", "aws_vpc.main"]));
        assert!(split.had_separator);
    }

    #[test]
    fn only_first_separator_splits() {
        let args = strings(&["a", "--", "b", "--", "c"]);
        let split = PassthroughArgs::split(&args);
        assert_eq!(split.before, strings(&["a"]));
        assert_eq!(split.after, strings(&["b", "--", "c"]));
    }

    #[test]
    fn no_separator_yields_empty_tail() {
        let split = PassthroughArgs::split(&strings(&["plan"]));
        assert!(split.after.is_empty());
        assert!(!split.had_separator);
    }

    #[test]
    fn quoting_round_trips_through_shlex() {
        let args =
            strings(&["hello  world", "$VAR", "a;b", "", "new\nline", "it's", "tab\there"]);
        let quoted = quote_args(&args).unwrap();
        let reparsed = shlex::split(&quoted).unwrap();
        assert_eq!(reparsed, args);
    }

    #[test]
    fn double_space_survives() {
        let quoted = quote_args(&["hello  world"]).unwrap();
        assert_eq!(shlex::split(&quoted).unwrap(), vec!["hello  world"]);
    }

    #[test]
    fn empty_string_is_preserved() {
        let quoted = quote_args(&[""]).unwrap();
        assert_eq!(shlex::split(&quoted).unwrap(), vec![""]);
    }
}
