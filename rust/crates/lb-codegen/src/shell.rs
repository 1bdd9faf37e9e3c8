//! Shell quoting and lex-validation of the final rendered command.

use lb_core::error::BuildError;
use lb_core::Result;

/// POSIX-style single-quote shell quoting.
pub fn quote(value: &str) -> String {
    shlex::try_quote(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| format!("'{}'", value.replace('\'', "'\\''")))
}

/// Validates that `command` tokenizes as a shell command (balanced quotes, no trailing escape).
pub fn validate(command: &str, step: &str) -> Result<()> {
    match shlex::split(command) {
        Some(_) => Ok(()),
        None => Err(BuildError::ShellLexFailed {
            step: step.to_string(),
            command: command.to_string(),
        }),
    }
}
