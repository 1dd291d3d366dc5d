//! Core types for the agent system.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directive::{Dialect, EphemeralKind};

/// Unique identifier for an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Create a new unique agent ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of agent in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Top-level agent in front of the root manager
    Master,
    /// Owns a directory and its doc file
    Manager,
    /// Owns a single file
    Coder,
    /// Short-lived helper working in a scratch file
    Ephemeral(EphemeralKind),
}

impl AgentKind {
    /// Directive language this kind speaks.
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Master => Dialect::Master,
            Self::Manager => Dialect::Manager,
            Self::Coder | Self::Ephemeral(_) => Dialect::Coder,
        }
    }

    /// Template used to render this kind's user prompt.
    pub fn template(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Manager => "manager",
            Self::Coder => "coder",
            Self::Ephemeral(EphemeralKind::Tester) => "tester",
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral(_))
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Manager => f.write_str("manager"),
            Self::Coder => f.write_str("coder"),
            Self::Ephemeral(kind) => write!(f, "{}", kind.as_str().to_lowercase()),
        }
    }
}

/// What part of the project an agent is responsible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The whole project, no file of its own (master)
    Project,
    Dir(PathBuf),
    File(PathBuf),
}

impl Scope {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Dir(path) => Some(path),
            _ => None,
        }
    }
}

/// One `(prompt, response)` pair of a finished turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub prompt: String,
    pub response: String,
}

/// Errors raised while interpreting a directive.
///
/// None of these escape a turn: each is rendered into the `VERB failed: ...`
/// follow-up prompt of the agent that caused it.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Write or delete outside the agent's scope
    #[error("permission denied: {0}")]
    Permission(String),

    /// Unknown child, busy children, nothing to wait for
    #[error("{0}")]
    Delegation(String),

    /// Disallowed command, spawn failure or timeout
    #[error("{0}")]
    Command(String),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    pub fn io(action: &'static str, path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testers_speak_the_coder_dialect() {
        assert_eq!(AgentKind::Ephemeral(EphemeralKind::Tester).dialect(), Dialect::Coder);
        assert_eq!(AgentKind::Manager.dialect(), Dialect::Manager);
        assert_eq!(AgentKind::Ephemeral(EphemeralKind::Tester).to_string(), "tester");
    }

    #[test]
    fn agent_id_parses_back() {
        let id = AgentId::new();
        let parsed: AgentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
