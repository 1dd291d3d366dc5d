//! Tokenizer for directive text.

use super::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare identifier, upper-cased (`READ`, `FILE`, `PROMPT`, `TESTER`)
    Word(String),
    /// Double-quoted string with escapes decoded
    Str(String),
    Eq,
}

/// Split directive text into tokens.
///
/// Strings may span lines. Recognized escapes are `\"`, `\\`, `\n` and `\t`;
/// any other backslash sequence is kept verbatim so code content survives.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Eq);
        } else if c == '"' {
            chars.next();
            tokens.push(Token::Str(read_string(&mut chars, offset)?));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    word.push(c.to_ascii_uppercase());
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else {
            return Err(ParseError::UnexpectedChar { ch: c, offset });
        }
    }

    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    start: usize,
) -> Result<String, ParseError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => match chars.next() {
                Some((_, '"')) => out.push('"'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => break,
            },
            other => out.push(other),
        }
    }
    Err(ParseError::UnterminatedString { offset: start })
}

/// Quote a string so [`tokenize`] yields it back unchanged.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_upper_cased() {
        let tokens = tokenize("read file \"a.py\"").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("READ".into()),
                Token::Word("FILE".into()),
                Token::Str("a.py".into()),
            ]
        );
    }

    #[test]
    fn strings_span_lines_and_decode_escapes() {
        let tokens = tokenize("CONTENT=\"a\nb \\\"q\\\" \\d\"").unwrap();
        assert_eq!(tokens[0], Token::Word("CONTENT".into()));
        assert_eq!(tokens[1], Token::Eq);
        assert_eq!(tokens[2], Token::Str("a\nb \"q\" \\d".into()));
    }

    #[test]
    fn unterminated_string_is_reported() {
        let err = tokenize("PROMPT=\"never closed").unwrap_err();
        assert_eq!(err, ParseError::UnterminatedString { offset: 7 });
    }

    #[test]
    fn quote_survives_tokenize() {
        let raw = "print(\"x\\n\")\n\tend";
        let tokens = tokenize(&quote(raw)).unwrap();
        assert_eq!(tokens, vec![Token::Str(raw.to_string())]);
    }
}
