//! Directive language - one command per model turn.
//!
//! Wire format: `VERB [FILE|FOLDER "name"]* [KEY="value"]*`, with `KEY` one of
//! `PROMPT`, `CONTENT`, `COMMAND`. Each agent kind speaks its own dialect
//! and parses into a closed enum; `Display` renders canonical text, so
//! `parse(d.to_string()) == d` holds for every directive.
//!
//! # Dialects
//! - **Coder** (file-owning agents, and testers on their scratch file)
//! - **Manager** (directory-owning agents)
//! - **Master** (top-level agent)

mod coder;
mod lexer;
mod manager;
mod master;
mod syntax;

pub use coder::CoderDirective;
pub use lexer::quote;
pub use manager::ManagerDirective;
pub use master::MasterDirective;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A file or folder named by a directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub is_folder: bool,
}

impl Target {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: false,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_folder: true,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = if self.is_folder { "FOLDER" } else { "FILE" };
        write!(f, "{} {}", word, quote(&self.name))
    }
}

/// Kinds of short-lived helper agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EphemeralKind {
    /// Writes and runs tests in a scratch file
    Tester,
}

impl EphemeralKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EphemeralKind::Tester => "TESTER",
        }
    }
}

impl fmt::Display for EphemeralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EphemeralKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TESTER" => Ok(EphemeralKind::Tester),
            _ => Err(()),
        }
    }
}

/// One helper requested by SPAWN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnItem {
    pub kind: EphemeralKind,
    pub prompt: String,
}

impl fmt::Display for SpawnItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} PROMPT={}", self.kind, quote(&self.prompt))
    }
}

/// Malformed directive text. Never fatal: it becomes a `PARSING FAILED` self-prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response, expected a directive")]
    Empty,

    #[error("response must start with a directive verb")]
    MissingVerb,

    #[error("unknown verb {verb}; expected one of {expected}")]
    UnknownVerb { verb: String, expected: String },

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("{0} must be followed by a quoted name")]
    ExpectedName(String),

    #[error("{0}= must be followed by a quoted value")]
    ExpectedValue(String),

    #[error("unknown key {0}; expected PROMPT, CONTENT or COMMAND")]
    UnknownKey(String),

    #[error("unknown agent type {0}; expected TESTER")]
    UnknownEphemeral(String),

    #[error("quoted string \"{0}\" is not attached to FILE, FOLDER or a KEY=")]
    StrayString(String),

    #[error("'=' without a key")]
    StrayEquals,

    #[error("{verb} is missing its {what}")]
    MissingArgument { verb: String, what: &'static str },

    #[error("{verb} does not accept {found}")]
    Unexpected { verb: String, found: String },
}

/// The three directive languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Coder,
    Manager,
    Master,
}

impl Dialect {
    pub fn verbs(&self) -> &'static [&'static str] {
        match self {
            Dialect::Coder => CoderDirective::VERBS,
            Dialect::Manager => ManagerDirective::VERBS,
            Dialect::Master => MasterDirective::VERBS,
        }
    }

    fn unknown_verb(&self, verb: String) -> ParseError {
        ParseError::UnknownVerb {
            verb,
            expected: self.verbs().join(", "),
        }
    }
}

/// A parsed directive of any dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Coder(CoderDirective),
    Manager(ManagerDirective),
    Master(MasterDirective),
}

impl Directive {
    /// Parse one model response in the given dialect.
    pub fn parse(dialect: Dialect, text: &str) -> Result<Self, ParseError> {
        let body = prepare(dialect, text);
        let tokens = lexer::tokenize(body)?;
        let (verb, items) = syntax::split(tokens)?;
        let parsed = match dialect {
            Dialect::Coder => {
                CoderDirective::from_parts(&verb, items).map(|r| r.map(Directive::Coder))
            }
            Dialect::Manager => {
                ManagerDirective::from_parts(&verb, items).map(|r| r.map(Directive::Manager))
            }
            Dialect::Master => {
                MasterDirective::from_parts(&verb, items).map(|r| r.map(Directive::Master))
            }
        };
        parsed.unwrap_or_else(|| Err(dialect.unknown_verb(verb)))
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Directive::Coder(_) => Dialect::Coder,
            Directive::Manager(_) => Dialect::Manager,
            Directive::Master(_) => Dialect::Master,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Directive::Coder(d) => d.verb(),
            Directive::Manager(d) => d.verb(),
            Directive::Master(d) => d.verb(),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Coder(d) => d.fmt(f),
            Directive::Manager(d) => d.fmt(f),
            Directive::Master(d) => d.fmt(f),
        }
    }
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("static fence pattern")
});

/// Strip a surrounding code fence and any prose before the first line that
/// starts with a verb of `dialect`.
fn prepare(dialect: Dialect, text: &str) -> &str {
    let trimmed = text.trim();
    let body = FENCE_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    if starts_with_verb(dialect, body) {
        return body;
    }

    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if starts_with_verb(dialect, line.trim_start()) {
            return body[offset..].trim();
        }
        offset += line.len();
    }
    body
}

fn starts_with_verb(dialect: Dialect, text: &str) -> bool {
    let word: String = text
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let rest = &text[word.len()..];
    !word.is_empty()
        && dialect.verbs().contains(&word.to_ascii_uppercase().as_str())
        && rest.chars().next().map_or(true, char::is_whitespace)
}
