//! Reader for Python literal syntax
//!
//! Older extraction rows were stored as the `repr()` of a Python list of
//! dicts: single-quoted strings, `None`/`True`/`False`, tuples, trailing
//! commas and implicitly concatenated string literals. This reader turns
//! that text into a `serde_json::Value`. Only literals are accepted; there
//! is no expression evaluation.

use serde_json::{Map, Number, Value};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// A literal could not be read
#[derive(Debug, Clone, PartialEq, Error)]
#[error("literal syntax error at byte {offset}: {message}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse a complete Python literal. Trailing non-whitespace is an error.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut reader = Reader {
        src: text,
        chars: text.char_indices().peekable(),
    };
    let value = reader.value()?;
    reader.skip_ws();
    if let Some((offset, c)) = reader.chars.peek().copied() {
        return Err(LiteralError {
            offset,
            message: format!("unexpected trailing character {c:?}"),
        });
    }
    Ok(value)
}

struct Reader<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Reader<'a> {
    fn offset(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.src.len())
    }

    fn error<T>(&mut self, message: impl Into<String>) -> Result<T, LiteralError> {
        Err(LiteralError {
            offset: self.offset(),
            message: message.into(),
        })
    }

    fn skip_ws(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => self.error("unexpected end of input"),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('{') => self.dict(),
            Some('\'') | Some('"') => self.strings().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.word(),
            Some(c) => self.error(format!("unexpected character {c:?}")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, LiteralError> {
        self.expect(open)?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.chars.next();
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some(c) if c == close => {}
                _ => return self.error(format!("expected ',' or {close:?}")),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.chars.next();
                return Ok(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                Value::Null => "None".to_string(),
                other => other.to_string(),
            };
            self.skip_ws();
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.chars.next();
                }
                Some('}') => {}
                _ => return self.error("expected ',' or '}'"),
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), LiteralError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.chars.next();
                Ok(())
            }
            _ => self.error(format!("expected {expected:?}")),
        }
    }

    /// One or more adjacent string literals, concatenated as Python does.
    fn strings(&mut self) -> Result<String, LiteralError> {
        let mut out = self.string()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('\'') | Some('"') => out.push_str(&self.string()?),
                _ => return Ok(out),
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let Some((_, quote)) = self.chars.next() else {
            return self.error("expected string");
        };
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return self.error("unterminated string");
            };
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let Some((_, esc)) = self.chars.next() else {
                        return self.error("unterminated escape");
                    };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        '\\' | '\'' | '"' => out.push(esc),
                        '\n' => {}
                        'x' => out.push(self.hex_escape(2)?),
                        'u' => out.push(self.hex_escape(4)?),
                        'U' => out.push(self.hex_escape(8)?),
                        other => {
                            out.push('\\');
                            out.push(other);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let Some(d) = self.peek().and_then(|c| c.to_digit(16)) else {
                return self.error("invalid hex escape");
            };
            self.chars.next();
            code = code * 16 + d;
        }
        match char::from_u32(code) {
            Some(c) => Ok(c),
            None => self.error("escape is not a valid code point"),
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_') {
                self.chars.next();
            } else {
                break;
            }
        }
        let end = self.offset();
        let raw: String = self.src[start..end].chars().filter(|c| *c != '_').collect();
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        match raw.parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Ok(Value::Number(n)),
            None => Err(LiteralError {
                offset: start,
                message: format!("invalid number {raw:?}"),
            }),
        }
    }

    /// Keywords, plus the `u'...'`/`r'...'`/`b'...'` string prefixes.
    fn word(&mut self) -> Result<Value, LiteralError> {
        let start = self.offset();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.chars.next();
            } else {
                break;
            }
        }
        let end = self.offset();
        let src = self.src;
        let word = &src[start..end];
        if matches!(self.peek(), Some('\'') | Some('"'))
            && matches!(word, "u" | "U" | "r" | "R" | "b" | "B")
        {
            return self.strings().map(Value::String);
        }
        match word {
            "None" | "null" => Ok(Value::Null),
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            _ => Err(LiteralError {
                offset: start,
                message: format!("unknown name {word:?}"),
            }),
        }
    }
}
