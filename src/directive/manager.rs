//! Manager dialect, spoken by directory-owning agents.

use std::fmt;

use super::lexer::quote;
use super::syntax::{self, Item, Key};
use super::{ParseError, SpawnItem, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerDirective {
    Create {
        target: Target,
        content: Option<String>,
    },
    Delete {
        target: Target,
    },
    Read {
        targets: Vec<Target>,
    },
    /// One prompt per named child
    Delegate {
        assignments: Vec<(Target, String)>,
    },
    Run {
        command: String,
    },
    UpdateReadme {
        content: String,
    },
    Spawn {
        items: Vec<SpawnItem>,
    },
    Wait,
    Finish {
        prompt: String,
    },
}

impl ManagerDirective {
    pub const VERBS: &'static [&'static str] = &[
        "CREATE",
        "DELETE",
        "READ",
        "DELEGATE",
        "RUN",
        "UPDATE_README",
        "SPAWN",
        "WAIT",
        "FINISH",
    ];

    pub(super) fn from_parts(verb: &str, items: Vec<Item>) -> Option<Result<Self, ParseError>> {
        let parsed = match verb {
            "CREATE" => syntax::target_with_content(verb, items)
                .map(|(target, content)| Self::Create { target, content }),
            "DELETE" => syntax::single_target(verb, items).map(|target| Self::Delete { target }),
            "READ" => syntax::targets(verb, items).map(|targets| Self::Read { targets }),
            "DELEGATE" => {
                syntax::assignments(verb, items).map(|assignments| Self::Delegate { assignments })
            }
            "RUN" => syntax::keyed(verb, Key::Command, items).map(|command| Self::Run { command }),
            "UPDATE_README" => syntax::keyed(verb, Key::Content, items)
                .map(|content| Self::UpdateReadme { content }),
            "SPAWN" => syntax::spawn_items(verb, items).map(|items| Self::Spawn { items }),
            "WAIT" => syntax::none(verb, items).map(|_| Self::Wait),
            "FINISH" => syntax::optional_keyed(verb, Key::Prompt, items).map(|prompt| Self::Finish {
                prompt: prompt.unwrap_or_default(),
            }),
            _ => return None,
        };
        Some(parsed)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Read { .. } => "READ",
            Self::Delegate { .. } => "DELEGATE",
            Self::Run { .. } => "RUN",
            Self::UpdateReadme { .. } => "UPDATE_README",
            Self::Spawn { .. } => "SPAWN",
            Self::Wait => "WAIT",
            Self::Finish { .. } => "FINISH",
        }
    }
}

impl fmt::Display for ManagerDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            Self::Create { target, content } => {
                write!(f, " {}", target)?;
                if let Some(content) = content {
                    write!(f, " CONTENT={}", quote(content))?;
                }
            }
            Self::Delete { target } => write!(f, " {}", target)?,
            Self::Read { targets } => {
                for target in targets {
                    write!(f, " {}", target)?;
                }
            }
            Self::Delegate { assignments } => {
                for (target, prompt) in assignments {
                    write!(f, " {} PROMPT={}", target, quote(prompt))?;
                }
            }
            Self::Run { command } => write!(f, " COMMAND={}", quote(command))?,
            Self::UpdateReadme { content } => write!(f, " CONTENT={}", quote(content))?,
            Self::Spawn { items } => {
                for item in items {
                    write!(f, " {}", item)?;
                }
            }
            Self::Wait => {}
            Self::Finish { prompt } if prompt.is_empty() => {}
            Self::Finish { prompt } => write!(f, " PROMPT={}", quote(prompt))?,
        }
        Ok(())
    }
}
