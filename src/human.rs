//! The human on the other end of the master agent.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Answers questions raised by the master's MESSAGE and FINISH directives.
#[async_trait]
pub trait HumanInterface: Send + Sync {
    async fn ask(&self, message: &str) -> anyhow::Result<String>;
}

/// Console implementation: prints the message, reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinHuman;

#[async_trait]
impl HumanInterface for StdinHuman {
    async fn ask(&self, message: &str) -> anyhow::Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("\n{}\n> ", message).as_bytes())
            .await?;
        stdout.flush().await?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        if read == 0 {
            // EOF ends the session the same way an explicit "exit" does
            return Ok("exit".to_string());
        }
        Ok(line.trim_end().to_string())
    }
}

/// Whether a human reply ends the master session.
pub fn is_session_end(reply: &str) -> bool {
    matches!(
        reply.trim().to_lowercase().as_str(),
        "" | "exit" | "quit"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_end_replies() {
        assert!(is_session_end(""));
        assert!(is_session_end("  EXIT "));
        assert!(is_session_end("quit"));
        assert!(!is_session_end("add more tests"));
    }
}
