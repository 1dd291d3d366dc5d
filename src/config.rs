//! Configuration management for codetree.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required by the network client. Your OpenRouter API key.
//! - `DEFAULT_MODEL` - Optional. Model used by every agent. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `CODETREE_MAX_TREE_DEPTH` - Optional. Depth of the codebase listing shown to agents. Defaults to `3`.
//! - `CODETREE_COMMAND_TIMEOUT_SECS` - Optional. Hard timeout for RUN directives. Defaults to `60`.
//! - `CODETREE_PROVIDER_BACKOFF_SECS` - Optional. Delay after a rate-limit or context-overflow. Defaults to `30`.
//! - `CODETREE_WATCHDOG_SECS` - Optional. Master inactivity timeout. Defaults to `600`.
//! - `CODETREE_MAX_CONSECUTIVE_ERRORS` - Optional. Failed turns before an agent gives up. Defaults to `5`.
//! - `CODETREE_SCRATCH_EXTENSION` - Optional. Extension of tester scratch files. Defaults to `py`.
//! - `CODETREE_REFRESH_DOCS` - Optional. Whether managers rewrite their doc file after each task. Defaults to `true`.
//! - `CODETREE_POLICY` - Optional. YAML file with the RUN allow-list.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::env_var_parse;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read command policy {path}: {source}")]
    PolicyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse command policy {path}: {source}")]
    PolicyParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Allow-list for RUN directives.
///
/// A command is permitted when its trimmed text starts with one of the
/// prefixes and the prefix ends on a word boundary (`pytest` allows
/// `pytest -q` but not `pytestx`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPolicy {
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            allowed_prefixes: ["python", "python3", "pytest", "ls", "cat", "echo"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CommandPolicy {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Load the policy from a YAML document on disk.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::PolicyIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::PolicyParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check a command against the allow-list.
    pub fn allows(&self, command: &str) -> bool {
        self.check(command).is_ok()
    }

    /// Check a command, returning why it is refused.
    ///
    /// Commands run through a shell, so anything that chains, substitutes or
    /// redirects is refused outright: the prefix only vouches for the first
    /// program.
    pub fn check(&self, command: &str) -> Result<(), String> {
        let command = command.trim();
        if command.is_empty() {
            return Err("empty command".to_string());
        }
        if let Some(meta) = SHELL_METACHARACTERS
            .iter()
            .find(|meta| command.contains(**meta))
        {
            return Err(format!("shell syntax {:?} is not allowed", meta));
        }
        let permitted = self.allowed_prefixes.iter().any(|prefix| {
            let prefix = prefix.trim();
            !prefix.is_empty()
                && command.starts_with(prefix)
                && command[prefix.len()..]
                    .chars()
                    .next()
                    .map_or(true, char::is_whitespace)
        });
        if permitted {
            Ok(())
        } else {
            Err("no allowed prefix matches".to_string())
        }
    }
}

/// Shell syntax that runs a second command or writes through a redirect.
const SHELL_METACHARACTERS: &[&str] = &[";", "&", "|", "<", ">", "`", "$(", "${", "\n", "\r"];

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// Model identifier (OpenRouter format)
    pub default_model: String,

    /// Depth bound for the codebase listing rendered into prompts
    pub max_tree_depth: usize,

    /// Hard timeout for sandboxed commands
    pub command_timeout: Duration,

    /// Fixed delay applied after a provider rate-limit or context overflow
    pub provider_backoff: Duration,

    /// Master inactivity interval before its state is reset
    pub watchdog_interval: Duration,

    /// Consecutive failed turns before an agent abandons its task
    pub max_consecutive_errors: u32,

    /// Extension (without dot) for scratch files owned by manager-spawned testers
    pub scratch_extension: String,

    /// Character budget for the prior-context section of a prompt
    pub max_context_chars: usize,

    /// Whether a manager asks its model to refresh its doc file after FINISH
    pub refresh_docs: bool,

    /// Allow-list for RUN
    pub policy: CommandPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let default_model = std::env::var("DEFAULT_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-sonnet-4.5".to_string());

        let max_tree_depth = parse_var("CODETREE_MAX_TREE_DEPTH", 3usize)?;
        let command_timeout = parse_var("CODETREE_COMMAND_TIMEOUT_SECS", 60u64)?;
        let provider_backoff = parse_var("CODETREE_PROVIDER_BACKOFF_SECS", 30u64)?;
        let watchdog = parse_var("CODETREE_WATCHDOG_SECS", 600u64)?;
        let max_consecutive_errors = parse_var("CODETREE_MAX_CONSECUTIVE_ERRORS", 5u32)?;
        let refresh_docs = parse_var("CODETREE_REFRESH_DOCS", true)?;

        let scratch_extension = std::env::var("CODETREE_SCRATCH_EXTENSION")
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|_| "py".to_string());

        let policy = match std::env::var("CODETREE_POLICY") {
            Ok(path) => CommandPolicy::from_file(Path::new(&path))?,
            Err(_) => CommandPolicy::default(),
        };

        Ok(Self {
            api_key,
            default_model,
            max_tree_depth,
            command_timeout: Duration::from_secs(command_timeout),
            provider_backoff: Duration::from_secs(provider_backoff),
            watchdog_interval: Duration::from_secs(watchdog),
            max_consecutive_errors,
            scratch_extension,
            max_context_chars: 24_000,
            refresh_docs,
            policy,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            api_key,
            default_model,
            max_tree_depth: 3,
            command_timeout: Duration::from_secs(60),
            provider_backoff: Duration::from_secs(30),
            watchdog_interval: Duration::from_secs(600),
            max_consecutive_errors: 5,
            scratch_extension: "py".to_string(),
            max_context_chars: 24_000,
            refresh_docs: true,
            policy: CommandPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    env_var_parse(name, default).map_err(|raw| ConfigError::InvalidValue(name.to_string(), raw))
}
