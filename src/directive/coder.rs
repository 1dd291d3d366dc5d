//! Coder dialect, spoken by file-owning agents and by testers.

use std::fmt;

use super::lexer::quote;
use super::syntax::{self, Item, Key};
use super::{ParseError, SpawnItem, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoderDirective {
    Read { targets: Vec<Target> },
    Run { command: String },
    /// Overwrite the agent's own file
    Change { content: String },
    Spawn { items: Vec<SpawnItem> },
    Wait,
    /// An empty prompt renders without `PROMPT=`
    Finish { prompt: String },
}

impl CoderDirective {
    pub const VERBS: &'static [&'static str] = &["READ", "RUN", "CHANGE", "SPAWN", "WAIT", "FINISH"];

    /// `None` when `verb` is not part of the dialect.
    pub(super) fn from_parts(verb: &str, items: Vec<Item>) -> Option<Result<Self, ParseError>> {
        let parsed = match verb {
            "READ" => syntax::targets(verb, items).map(|targets| Self::Read { targets }),
            "RUN" => syntax::keyed(verb, Key::Command, items).map(|command| Self::Run { command }),
            "CHANGE" => {
                syntax::keyed(verb, Key::Content, items).map(|content| Self::Change { content })
            }
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
            Self::Read { .. } => "READ",
            Self::Run { .. } => "RUN",
            Self::Change { .. } => "CHANGE",
            Self::Spawn { .. } => "SPAWN",
            Self::Wait => "WAIT",
            Self::Finish { .. } => "FINISH",
        }
    }
}

impl fmt::Display for CoderDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())?;
        match self {
            Self::Read { targets } => {
                for target in targets {
                    write!(f, " {}", target)?;
                }
            }
            Self::Run { command } => write!(f, " COMMAND={}", quote(command))?,
            Self::Change { content } => write!(f, " CONTENT={}", quote(content))?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Dialect, Directive, EphemeralKind};

    fn parse(text: &str) -> Result<CoderDirective, ParseError> {
        match Directive::parse(Dialect::Coder, text)? {
            Directive::Coder(d) => Ok(d),
            other => panic!("wrong dialect: {:?}", other),
        }
    }

    #[test]
    fn parses_every_verb() {
        assert_eq!(
            parse("READ FILE \"a.py\" FOLDER \"lib\"").unwrap(),
            CoderDirective::Read {
                targets: vec![Target::file("a.py"), Target::folder("lib")]
            }
        );
        assert_eq!(
            parse("run command=\"pytest -q\"").unwrap(),
            CoderDirective::Run {
                command: "pytest -q".into()
            }
        );
        assert_eq!(
            parse("CHANGE CONTENT=\"print(1)\"").unwrap(),
            CoderDirective::Change {
                content: "print(1)".into()
            }
        );
        assert_eq!(
            parse("SPAWN TESTER PROMPT=\"cover edge cases\"").unwrap(),
            CoderDirective::Spawn {
                items: vec![SpawnItem {
                    kind: EphemeralKind::Tester,
                    prompt: "cover edge cases".into()
                }]
            }
        );
        assert_eq!(parse("WAIT").unwrap(), CoderDirective::Wait);
        assert_eq!(
            parse("FINISH PROMPT=\"done\"").unwrap(),
            CoderDirective::Finish {
                prompt: "done".into()
            }
        );
        assert_eq!(
            parse("FINISH").unwrap(),
            CoderDirective::Finish {
                prompt: String::new()
            }
        );
    }

    #[test]
    fn manager_verbs_are_rejected() {
        assert!(matches!(
            parse("CREATE FILE \"b.py\""),
            Err(ParseError::UnknownVerb { .. })
        ));
    }

    #[test]
    fn shape_errors() {
        assert_eq!(
            parse("RUN").unwrap_err(),
            ParseError::MissingArgument {
                verb: "RUN".into(),
                what: "COMMAND"
            }
        );
        assert!(matches!(
            parse("WAIT FILE \"a.py\"").unwrap_err(),
            ParseError::Unexpected { .. }
        ));
        assert!(matches!(
            parse("CHANGE PROMPT=\"x\"").unwrap_err(),
            ParseError::Unexpected { .. }
        ));
        assert_eq!(
            parse("SPAWN CODER PROMPT=\"x\"").unwrap_err(),
            ParseError::UnknownEphemeral("CODER".into())
        );
        assert!(matches!(
            parse("CHANGE CONTENT=\"open").unwrap_err(),
            ParseError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn multiline_content_round_trips() {
        let directive = CoderDirective::Change {
            content: "import os\n\ndef main():\n    print(\"hi\\tthere\")\n".into(),
        };
        assert_eq!(parse(&directive.to_string()).unwrap(), directive);
    }
}
