//! Argument-level grammar shared by all dialects.
//!
//! After the verb, a directive is a flat list of items. Each dialect checks
//! the item sequence against the shape its verb expects.

use super::lexer::Token;
use super::{EphemeralKind, ParseError, SpawnItem, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Prompt,
    Content,
    Command,
}

impl Key {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "PROMPT" => Some(Key::Prompt),
            "CONTENT" => Some(Key::Content),
            "COMMAND" => Some(Key::Command),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Key::Prompt => "PROMPT",
            Key::Content => "CONTENT",
            Key::Command => "COMMAND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Target(Target),
    Keyed(Key, String),
    Word(String),
}

/// Split tokens into the verb and its items.
pub fn split(tokens: Vec<Token>) -> Result<(String, Vec<Item>), ParseError> {
    let mut iter = tokens.into_iter().peekable();
    let verb = match iter.next() {
        Some(Token::Word(verb)) => verb,
        Some(_) => return Err(ParseError::MissingVerb),
        None => return Err(ParseError::Empty),
    };

    let mut items = Vec::new();
    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) if word == "FILE" || word == "FOLDER" => match iter.next() {
                Some(Token::Str(name)) => items.push(Item::Target(Target {
                    name,
                    is_folder: word == "FOLDER",
                })),
                _ => return Err(ParseError::ExpectedName(word)),
            },
            Token::Word(word) if iter.peek() == Some(&Token::Eq) => {
                iter.next();
                let key = Key::parse(&word).ok_or_else(|| ParseError::UnknownKey(word.clone()))?;
                match iter.next() {
                    Some(Token::Str(value)) => items.push(Item::Keyed(key, value)),
                    _ => return Err(ParseError::ExpectedValue(word)),
                }
            }
            Token::Word(word) => items.push(Item::Word(word)),
            Token::Str(value) => return Err(ParseError::StrayString(value)),
            Token::Eq => return Err(ParseError::StrayEquals),
        }
    }

    Ok((verb, items))
}

/// `VERB` with nothing after it.
pub fn none(verb: &str, items: Vec<Item>) -> Result<(), ParseError> {
    if items.is_empty() {
        Ok(())
    } else {
        Err(ParseError::Unexpected {
            verb: verb.to_string(),
            found: describe(&items[0]),
        })
    }
}

/// `VERB (FILE|FOLDER "name")+`
pub fn targets(verb: &str, items: Vec<Item>) -> Result<Vec<Target>, ParseError> {
    if items.is_empty() {
        return Err(ParseError::MissingArgument {
            verb: verb.to_string(),
            what: "FILE or FOLDER target",
        });
    }
    items
        .into_iter()
        .map(|item| match item {
            Item::Target(target) => Ok(target),
            other => Err(ParseError::Unexpected {
                verb: verb.to_string(),
                found: describe(&other),
            }),
        })
        .collect()
}

/// `VERB (FILE|FOLDER "name")`
pub fn single_target(verb: &str, items: Vec<Item>) -> Result<Target, ParseError> {
    let mut all = targets(verb, items)?;
    if all.len() > 1 {
        return Err(ParseError::Unexpected {
            verb: verb.to_string(),
            found: "a second target".to_string(),
        });
    }
    Ok(all.remove(0))
}

/// `VERB KEY="value"` where the keyed value is required.
pub fn keyed(verb: &str, key: Key, items: Vec<Item>) -> Result<String, ParseError> {
    optional_keyed(verb, key, items)?.ok_or_else(|| ParseError::MissingArgument {
        verb: verb.to_string(),
        what: key.as_str(),
    })
}

/// `VERB [KEY="value"]`
pub fn optional_keyed(verb: &str, key: Key, items: Vec<Item>) -> Result<Option<String>, ParseError> {
    let mut iter = items.into_iter();
    let value = match iter.next() {
        None => None,
        Some(Item::Keyed(k, value)) if k == key => Some(value),
        Some(other) => {
            return Err(ParseError::Unexpected {
                verb: verb.to_string(),
                found: describe(&other),
            })
        }
    };
    match iter.next() {
        None => Ok(value),
        Some(other) => Err(ParseError::Unexpected {
            verb: verb.to_string(),
            found: describe(&other),
        }),
    }
}

/// `VERB (FILE|FOLDER "name" PROMPT="p")+`
pub fn assignments(verb: &str, items: Vec<Item>) -> Result<Vec<(Target, String)>, ParseError> {
    let mut out = Vec::new();
    let mut iter = items.into_iter();
    while let Some(item) = iter.next() {
        let target = match item {
            Item::Target(target) => target,
            other => {
                return Err(ParseError::Unexpected {
                    verb: verb.to_string(),
                    found: describe(&other),
                })
            }
        };
        match iter.next() {
            Some(Item::Keyed(Key::Prompt, prompt)) => out.push((target, prompt)),
            _ => {
                return Err(ParseError::MissingArgument {
                    verb: verb.to_string(),
                    what: "PROMPT after each target",
                })
            }
        }
    }
    if out.is_empty() {
        return Err(ParseError::MissingArgument {
            verb: verb.to_string(),
            what: "FILE or FOLDER target",
        });
    }
    Ok(out)
}

/// `SPAWN (TYPE PROMPT="p")+`
pub fn spawn_items(verb: &str, items: Vec<Item>) -> Result<Vec<SpawnItem>, ParseError> {
    let mut out = Vec::new();
    let mut iter = items.into_iter();
    while let Some(item) = iter.next() {
        let kind = match item {
            Item::Word(word) => word
                .parse::<EphemeralKind>()
                .map_err(|_| ParseError::UnknownEphemeral(word))?,
            other => {
                return Err(ParseError::Unexpected {
                    verb: verb.to_string(),
                    found: describe(&other),
                })
            }
        };
        match iter.next() {
            Some(Item::Keyed(Key::Prompt, prompt)) => out.push(SpawnItem { kind, prompt }),
            _ => {
                return Err(ParseError::MissingArgument {
                    verb: verb.to_string(),
                    what: "PROMPT after each agent type",
                })
            }
        }
    }
    if out.is_empty() {
        return Err(ParseError::MissingArgument {
            verb: verb.to_string(),
            what: "agent type",
        });
    }
    Ok(out)
}

/// `CREATE (FILE|FOLDER "name") [CONTENT="c"]`
pub fn target_with_content(
    verb: &str,
    mut items: Vec<Item>,
) -> Result<(Target, Option<String>), ParseError> {
    if items.is_empty() {
        return Err(ParseError::MissingArgument {
            verb: verb.to_string(),
            what: "FILE or FOLDER target",
        });
    }
    let rest = items.split_off(1);
    let target = single_target(verb, items)?;
    let content = optional_keyed(verb, Key::Content, rest)?;
    Ok((target, content))
}

fn describe(item: &Item) -> String {
    match item {
        Item::Target(t) if t.is_folder => format!("FOLDER \"{}\"", t.name),
        Item::Target(t) => format!("FILE \"{}\"", t.name),
        Item::Keyed(key, _) => format!("{}=", key.as_str()),
        Item::Word(word) => word.clone(),
    }
}
