//! Local shell execution for RUN directives.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandOutput, SandboxedExec};
use crate::util::sanitize_output;

/// Commands that hang on a whole-filesystem walk or damage the host.
const BLOCKED_PATTERNS: &[(&str, &str)] = &[
    ("find /", "search inside the project instead"),
    ("grep -r /", "search inside the project instead"),
    ("grep -rn /", "search inside the project instead"),
    ("grep -R /", "search inside the project instead"),
    ("ls -laR /", "list a project directory instead"),
    ("du -sh /", "measure a project directory instead"),
    ("du -a /", "measure a project directory instead"),
    ("rm -rf /", "this would destroy the host"),
    ("rm -rf ~", "this would destroy the home directory"),
    ("dd if=/dev/", "raw disk access is blocked"),
];

/// Wrappers looked through when matching [`BLOCKED_PATTERNS`].
const WRAPPERS: &[&str] = &["sudo ", "time ", "nice ", "nohup ", "env "];

/// Refuse commands matching a blocked pattern, directly or behind a wrapper.
fn screen(command: &str) -> Result<(), String> {
    let mut command = command.trim();
    while let Some(rest) = WRAPPERS.iter().find_map(|w| command.strip_prefix(*w)) {
        command = rest.trim_start();
    }
    match BLOCKED_PATTERNS
        .iter()
        .find(|(pattern, _)| command.starts_with(*pattern))
    {
        Some((pattern, hint)) => Err(format!("Blocked command pattern '{}': {}", pattern, hint)),
        None => Ok(()),
    }
}

/// Runs commands through the platform shell with a hard timeout.
///
/// The child is killed when the timeout elapses (`kill_on_drop`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExec;

#[async_trait]
impl SandboxedExec for ShellExec {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> anyhow::Result<CommandOutput> {
        if let Err(reason) = screen(command) {
            tracing::warn!("Refused command `{}`: {}", command, reason);
            anyhow::bail!(reason);
        }
        tracing::info!("Executing command in {:?}: {}", cwd, command);

        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        };

        let output = match tokio::time::timeout(
            timeout,
            Command::new(shell)
                .arg(shell_arg)
                .arg(command)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!("Command execution failed: {}", e);
                return Err(anyhow::anyhow!("Failed to execute command: {}", e));
            }
            Err(_) => {
                tracing::error!("Command timed out after {:?}", timeout);
                return Err(anyhow::anyhow!(
                    "Command timed out after {} seconds",
                    timeout.as_secs()
                ));
            }
        };

        let result = CommandOutput {
            stdout: sanitize_output(&output.stdout),
            stderr: sanitize_output(&output.stderr),
            code: output.status.code().unwrap_or(-1),
        };

        tracing::debug!(
            "Command completed: exit={}, stdout_len={}, stderr_len={}",
            result.code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }
}
