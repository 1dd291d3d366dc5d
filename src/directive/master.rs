//! Master dialect, spoken by the agent in front of the root manager.

use std::fmt;

use super::lexer::quote;
use super::syntax::{self, Item, Key};
use super::{ParseError, SpawnItem, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterDirective {
    Read { targets: Vec<Target> },
    /// Always addressed to the root manager
    Delegate { prompt: String },
    Spawn { items: Vec<SpawnItem> },
    Run { command: String },
    Wait,
    UpdateDocumentation { content: String },
    Finish { prompt: String },
    /// Ask the human without ending the task
    Message { prompt: String },
}

impl MasterDirective {
    pub const VERBS: &'static [&'static str] = &[
        "READ",
        "DELEGATE",
        "SPAWN",
        "RUN",
        "WAIT",
        "UPDATE_DOCUMENTATION",
        "FINISH",
        "MESSAGE",
    ];

    pub(super) fn from_parts(verb: &str, items: Vec<Item>) -> Option<Result<Self, ParseError>> {
        let parsed = match verb {
            "READ" => syntax::targets(verb, items).map(|targets| Self::Read { targets }),
            "DELEGATE" => {
                syntax::keyed(verb, Key::Prompt, items).map(|prompt| Self::Delegate { prompt })
            }
            "SPAWN" => syntax::spawn_items(verb, items).map(|items| Self::Spawn { items }),
            "RUN" => syntax::keyed(verb, Key::Command, items).map(|command| Self::Run { command }),
            "WAIT" => syntax::none(verb, items).map(|_| Self::Wait),
            "UPDATE_DOCUMENTATION" => syntax::keyed(verb, Key::Content, items)
                .map(|content| Self::UpdateDocumentation { content }),
            "FINISH" => syntax::optional_keyed(verb, Key::Prompt, items).map(|prompt| Self::Finish {
                prompt: prompt.unwrap_or_default(),
            }),
            "MESSAGE" => {
                syntax::keyed(verb, Key::Prompt, items).map(|prompt| Self::Message { prompt })
            }
            _ => return None,
        };
        Some(parsed)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Read { .. } => "READ",
            Self::Delegate { .. } => "DELEGATE",
            Self::Spawn { .. } => "SPAWN",
            Self::Run { .. } => "RUN",
            Self::Wait => "WAIT",
            Self::UpdateDocumentation { .. } => "UPDATE_DOCUMENTATION",
            Self::Finish { .. } => "FINISH",
            Self::Message { .. } => "MESSAGE",
        }
    }
}

impl fmt::Display for MasterDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            Self::Read { targets } => {
                for target in targets {
                    write!(f, " {}", target)?;
                }
            }
            Self::Delegate { prompt } | Self::Message { prompt } => {
                write!(f, " PROMPT={}", quote(prompt))?
            }
            Self::Spawn { items } => {
                for item in items {
                    write!(f, " {}", item)?;
                }
            }
            Self::Run { command } => write!(f, " COMMAND={}", quote(command))?,
            Self::Wait => {}
            Self::UpdateDocumentation { content } => write!(f, " CONTENT={}", quote(content))?,
            Self::Finish { prompt } if prompt.is_empty() => {}
            Self::Finish { prompt } => write!(f, " PROMPT={}", quote(prompt))?,
        }
        Ok(())
    }
}
