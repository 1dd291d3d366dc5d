//! Sandboxed command execution.
//!
//! RUN directives never spawn processes directly: they go through a
//! [`SandboxedExec`] collaborator after the allow-list check in the
//! interpreter. [`ShellExec`] is the local implementation; container or
//! remote sandboxes plug in behind the same trait.

mod terminal;

pub use terminal::ShellExec;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::util::truncate_output;

/// Maximum characters of folded command output handed back to a model.
pub const MAX_OUTPUT_CHARS: usize = 10_000;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    /// Fold stdout, stderr and the exit code into one result string.
    pub fn fold(&self) -> String {
        let mut result = format!("Exit code: {}\n", self.code);

        if !self.stdout.is_empty() {
            result.push_str("\n--- stdout ---\n");
            result.push_str(&self.stdout);
        }

        if !self.stderr.is_empty() {
            result.push_str("\n--- stderr ---\n");
            result.push_str(&self.stderr);
        }

        truncate_output(result, MAX_OUTPUT_CHARS)
    }
}

/// Runs commands on behalf of agents.
#[async_trait]
pub trait SandboxedExec: Send + Sync {
    /// Run `command` in `cwd`, killing it after `timeout`.
    ///
    /// # Errors
    /// Spawn failures and timeouts. A non-zero exit is not an error.
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration)
        -> anyhow::Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_includes_all_sections() {
        let out = CommandOutput {
            stdout: "1 passed".into(),
            stderr: "warning: x".into(),
            code: 1,
        };
        let folded = out.fold();
        assert!(folded.starts_with("Exit code: 1\n"));
        assert!(folded.contains("--- stdout ---\n1 passed"));
        assert!(folded.contains("--- stderr ---\nwarning: x"));
    }

    #[test]
    fn fold_omits_empty_streams() {
        let out = CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            code: 0,
        };
        assert_eq!(out.fold(), "Exit code: 0\n");
    }
}
